use std::{
    fmt::Write,
    io::{self, IsTerminal},
};

use clap::builder::styling::{AnsiColor, Effects, Style, Styles};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Whether stderr is an interactive terminal that understands ANSI escapes
static IS_ANSI_TERMINAL: std::sync::LazyLock<bool> = std::sync::LazyLock::new(|| {
    io::stderr().is_terminal() && std::env::var("TERM").map_or(true, |term| term != "dumb")
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns a `Styles` object with the default styles for the CLI.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default() | Effects::BOLD)
        .invalid(AnsiColor::Red.on_default() | Effects::BOLD)
}

fn apply_style(text: &str, style: &Style, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }

    let mut styled = String::with_capacity(text.len() + 20);
    let _ = write!(styled, "{}", style);
    styled.push_str(text);
    let _ = write!(styled, "{}", style.render_reset());
    styled
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Applies the styles defined in [`styles`] to text printed on stderr.
///
/// Text is left plain when stderr is not an ANSI-capable terminal.
pub trait AnsiStyles {
    /// Apply header style to text
    fn header(&self) -> String;

    /// Apply literal style to text
    fn literal(&self) -> String;

    /// Apply error style to text
    fn error(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: AsRef<str>> AnsiStyles for T {
    fn header(&self) -> String {
        apply_style(self.as_ref(), styles().get_header(), *IS_ANSI_TERMINAL)
    }

    fn literal(&self) -> String {
        apply_style(self.as_ref(), styles().get_literal(), *IS_ANSI_TERMINAL)
    }

    fn error(&self) -> String {
        apply_style(self.as_ref(), styles().get_error(), *IS_ANSI_TERMINAL)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styles_apply_style_plain() {
        assert_eq!(apply_style("test", styles().get_error(), false), "test");
        assert_eq!(apply_style("", styles().get_header(), false), "");
    }

    #[test]
    fn test_styles_apply_style_ansi() {
        let error = apply_style("test", styles().get_error(), true);
        assert!(error.contains("\x1b[1m"));
        assert!(error.contains("\x1b[31m"));
        assert!(error.contains("test"));
        assert!(error.ends_with("\x1b[0m"));

        let literal = apply_style("测试", styles().get_literal(), true);
        assert!(literal.contains("\x1b[34m"));
        assert!(literal.contains("测试"));
    }
}

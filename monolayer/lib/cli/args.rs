use std::path::PathBuf;

use clap::Parser;

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Monolayer CLI - Materializes container image filesystems from OCI layer diffs
#[derive(Debug, Parser)]
#[command(name = "monolayer", author, about, version, styles=styles::styles())]
pub struct MonolayerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<MonolayerSubcommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum MonolayerSubcommand {
    /// Unpack an OCI image layout into a chain of materialized layers
    #[command(name = "unpack")]
    Unpack {
        /// The OCI image layout directory holding `index.json`
        #[arg(value_name = "IMAGE_DIR")]
        image_dir: PathBuf,

        /// Where the layers are unpacked; defaults to `$MONOLAYER_HOME/layers`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Operating system of the manifest to unpack
        #[arg(long, requires = "arch")]
        os: Option<String>,

        /// Architecture of the manifest to unpack
        #[arg(long, requires = "os")]
        arch: Option<String>,

        /// Clone the first layer instead of symlinking it (macOS only)
        #[arg(long)]
        clone_base: bool,
    },

    /// Apply a diff onto a base tree
    #[command(name = "apply")]
    Apply {
        /// The tree the diff is applied onto
        #[arg(long)]
        base: PathBuf,

        /// The diff tree
        #[arg(long)]
        diff: PathBuf,

        /// Where the merged tree is written
        #[arg(long)]
        merged: PathBuf,
    },

    /// Compute the diff between a base tree and a modified tree
    #[command(name = "diff")]
    Diff {
        /// The original tree
        #[arg(long)]
        base: PathBuf,

        /// The tree holding the changes
        #[arg(long)]
        modified: PathBuf,

        /// Where the diff is written
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Materialize a chain of already extracted layers
    #[command(name = "chain")]
    Chain {
        /// The directory holding one `<layer>/diff` directory per layer
        #[arg(long)]
        root: Option<PathBuf>,

        /// Clone the first layer instead of symlinking it (macOS only)
        #[arg(long)]
        clone_base: bool,

        /// The layer identifiers, in application order
        #[arg(required = true, value_name = "LAYER")]
        layers: Vec<String>,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_command_is_valid() {
        MonolayerArgs::command().debug_assert();
    }

    #[test]
    fn test_args_parse_unpack() -> anyhow::Result<()> {
        let args = MonolayerArgs::try_parse_from([
            "monolayer", "unpack", "/images/alpine", "--os", "linux", "--arch", "arm64", "-v",
        ])?;

        assert!(args.verbose);
        match args.subcommand {
            Some(MonolayerSubcommand::Unpack {
                image_dir,
                output,
                os,
                arch,
                clone_base,
            }) => {
                assert_eq!(image_dir, PathBuf::from("/images/alpine"));
                assert_eq!(output, None);
                assert_eq!(os.as_deref(), Some("linux"));
                assert_eq!(arch.as_deref(), Some("arm64"));
                assert!(!clone_base);
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_args_platform_requires_both_parts() {
        let result = MonolayerArgs::try_parse_from(["monolayer", "unpack", "/img", "--os", "linux"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_parse_chain() -> anyhow::Result<()> {
        let args =
            MonolayerArgs::try_parse_from(["monolayer", "chain", "--root", "/layers", "a", "b"])?;

        match args.subcommand {
            Some(MonolayerSubcommand::Chain { root, layers, .. }) => {
                assert_eq!(root, Some(PathBuf::from("/layers")));
                assert_eq!(layers, vec!["a", "b"]);
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }

        Ok(())
    }
}

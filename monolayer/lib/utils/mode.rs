//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Formats the permission bits of a mode as an `ls`-style string.
///
/// ## Examples
///
/// ```
/// use monolayer::utils::format_mode;
///
/// assert_eq!(format_mode(0o755), "rwxr-xr-x");
/// assert_eq!(format_mode(0o640), "rw-r-----");
/// assert_eq!(format_mode(0o4755), "rwsr-xr-x");
/// ```
pub fn format_mode(mode: u32) -> String {
    let mut chars = ['-'; 9];
    let bits = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];

    for (idx, (bit, c)) in bits.iter().enumerate() {
        if mode & bit != 0 {
            chars[idx] = *c;
        }
    }

    // setuid, setgid and sticky replace the matching execute slot
    let specials = [(0o4000, 2, 's', 'S'), (0o2000, 5, 's', 'S'), (0o1000, 8, 't', 'T')];
    for (bit, idx, exec, no_exec) in specials {
        if mode & bit != 0 {
            chars[idx] = if chars[idx] == 'x' { exec } else { no_exec };
        }
    }

    chars.iter().collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

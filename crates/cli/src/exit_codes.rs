//! CLI Exit Code Registry
//!
//! Single source of truth for `fwk` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | Formula did not evaluate, failed validation, or recalc    |
//! |      | left stale / cyclic variables                             |
//! | 2    | Usage or IO error (bad args, unreadable or invalid file)  |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Evaluation or validation failure.
pub const EXIT_FAILURE: u8 = 1;

/// Usage error - bad arguments, missing or malformed input file.
pub const EXIT_USAGE: u8 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_FAILURE, EXIT_USAGE];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

//! Error handling foundation for dentalis.
//!
//! Only the `Result` alias lives here. Each crate keeps its error enums next
//! to the code that raises them; infrastructure failures travel inside a
//! rootcause `Report` and are recovered or converted at crate boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct BadMinutes;

    impl fmt::Display for BadMinutes {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "not a number of minutes")
        }
    }

    impl std::error::Error for BadMinutes {}

    fn parse_minutes(raw: &str) -> Result<u32, BadMinutes> {
        let minutes = raw.trim().parse().map_err(|_| BadMinutes)?;
        Ok(minutes)
    }

    #[test]
    fn result_type_works() {
        let ok: Result<u8> = Ok(7);
        assert_eq!(ok.expect("should be ok"), 7);
    }

    #[test]
    fn question_mark_wraps_context_in_report() {
        assert_eq!(parse_minutes(" 30 ").expect("should parse"), 30);
        assert!(parse_minutes("half an hour").is_err());
    }
}

use nnpforge::core::pairs::enumerate::PairMode;
use nnpforge::core::units::Length;
use nnpforge::engine::config::Architecture;
use std::str::FromStr;

pub fn parse_length(s: &str) -> Result<Length, String> {
    Length::from_str(s).map_err(|e| e.to_string())
}

pub fn parse_pair_mode(s: &str) -> Result<PairMode, String> {
    PairMode::from_str(s)
}

pub fn parse_architecture(s: &str) -> Result<Architecture, String> {
    Architecture::from_str(s).map_err(|e| e.to_string())
}

/// Splits a `-S KEY=VALUE` argument, trimming both sides.
pub fn parse_key_value(s: &str) -> Option<(&str, &str)> {
    let (key, value) = s.split_once('=')?;
    let (key, value) = (key.trim(), value.trim());
    (!key.is_empty()).then_some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_requires_a_unit() {
        assert_eq!(parse_length("0.5 nm"), Ok(Length::nanometers(0.5)));
        assert!(parse_length("0.5").is_err());
    }

    #[test]
    fn architecture_names_are_case_insensitive() {
        assert_eq!(parse_architecture("SchNet"), Ok(Architecture::SchNet));
        assert!(parse_architecture("transformer").is_err());
    }

    #[test]
    fn key_value_pairs_are_split_on_the_first_equals_sign() {
        assert_eq!(parse_key_value("a = b=c"), Some(("a", "b=c")));
        assert_eq!(parse_key_value("=value"), None);
        assert_eq!(parse_key_value("novalue"), None);
    }
}

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format for CLI responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
        assert!(!OutputFormat::Text.is_json());
        assert!(OutputFormat::Json.is_json());
    }

    #[test]
    fn test_output_format_value_enum_parse() {
        let parsed = OutputFormat::from_str("json", true).unwrap();
        assert_eq!(parsed, OutputFormat::Json);
        assert!(OutputFormat::from_str("yaml", true).is_err());
    }
}

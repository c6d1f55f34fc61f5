//! Configuration structures for the receipt parser.

use serde::{Deserialize, Serialize};

use crate::error::RcptError;

/// Main configuration for rcpt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcptConfig {
    /// Parser configuration.
    pub parser: ParserConfig,

    /// Output configuration for the CLI.
    pub output: OutputConfig,
}

/// What to do when an item receives a second non-negative price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceConflict {
    /// The most recent price line replaces the earlier one.
    #[default]
    LastWins,
    /// The item is discarded as unresolved.
    Reject,
}

/// Receipt parser configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Number of lines after a field label searched for its value.
    pub value_window: usize,

    /// Handling of repeated prices for one item.
    pub price_conflict: PriceConflict,

    /// Letters accepted as the tax-flag prefix of item and discount lines.
    pub tax_flag_letters: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            value_window: 3,
            price_conflict: PriceConflict::LastWins,
            tax_flag_letters: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
        }
    }
}

/// Output format for parse results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Text,
}

/// CLI output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Format used when none is given on the command line.
    pub default_format: OutputFormat,

    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl RcptConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> crate::Result<()> {
        if self.parser.value_window == 0 {
            return Err(RcptError::Config(
                "parser.value_window must be at least 1".to_string(),
            ));
        }

        if let Some(c) = self
            .parser
            .tax_flag_letters
            .chars()
            .find(|c| !c.is_ascii_uppercase())
        {
            return Err(RcptError::Config(format!(
                "parser.tax_flag_letters may only contain A-Z, found {:?}",
                c
            )));
        }

        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RcptConfig =
            serde_json::from_str(r#"{"parser": {"price_conflict": "reject"}}"#).unwrap();

        assert_eq!(config.parser.price_conflict, PriceConflict::Reject);
        assert_eq!(config.parser.value_window, 3);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_validate() {
        assert!(RcptConfig::default().validate().is_ok());

        let mut config = RcptConfig::default();
        config.parser.value_window = 0;
        assert!(matches!(config.validate(), Err(RcptError::Config(_))));

        let mut config = RcptConfig::default();
        config.parser.tax_flag_letters = "Ee".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tax_flag_letters"));
    }

    #[test]
    fn test_default_round_trips_through_json() {
        let config = RcptConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"last_wins\""));
        assert_eq!(serde_json::from_str::<RcptConfig>(&json).unwrap(), config);
    }
}

//! TOML parsing with typed errors.

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::WeaveError;

/// Parse a TOML file into `T`.
///
/// Read failures keep the I/O error as cause; syntax and shape errors become
/// [`WeaveError::ConfigParseError`] carrying the parser message.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content, path)
}

/// Parse TOML `content` that was read from `origin`.
pub fn parse_config_str<T>(content: &str, origin: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    toml::from_str(content).map_err(|e| {
        WeaveError::ConfigParseError {
            file: origin.display().to_string(),
            reason: e.message().to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sample.toml");
        std::fs::write(&path, "name = \"weave\"\ncount = 3\n").unwrap();

        let sample: Sample = parse_config(&path).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "weave".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn test_parse_config_syntax_error() {
        let err = parse_config_str::<Sample>("name = ", Path::new("bad.toml")).unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::ConfigParseError {
                file,
                ..
            }) => assert_eq!(file, "bad.toml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = parse_config::<Sample>(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

//! Configuration loader for the intake engine.
//!
//! Reads the intake TOML document from disk. Loading is strict: a missing
//! or malformed file is fatal, because the tables and scripts it declares
//! are the whole reason the process runs.

use std::path::Path;

use intake_types::config::IntakeConfig;
use intake_types::error::ConfigError;

/// Load the intake configuration from `path`.
pub async fn load_config(path: &Path) -> Result<IntakeConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;

    let config: IntakeConfig = toml::from_str(&content)
        .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;

    tracing::debug!(
        tables = config.tables.len(),
        scripts = config.scripts.len(),
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_config_parses_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("intake.toml");
        tokio::fs::write(
            &path,
            r#"
side_channel_grace_secs = 30

[tables.members]
id = "incr_integer"
name = "string"

[scripts.registration]
beginning = "Welcome."
table = "members"

[[scripts.registration.questions]]
name = "name"
display_name = "Name"
query = "What is your name?"
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.side_channel_grace_secs, 30);
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.scripts.len(), 1);
    }

    #[tokio::test]
    async fn test_load_config_missing_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("absent.toml"))
            .await
            .expect_err("missing config must not default");
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().contains("absent.toml"), "got: {err}");
    }

    #[tokio::test]
    async fn test_load_config_malformed_toml_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("intake.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!").await.unwrap();

        let err = load_config(&path).await.expect_err("malformed config must not default");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

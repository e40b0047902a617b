// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::DatawhConfig;
use crate::domain::errors::EtlError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DatawhConfig
/// 4. Applies environment variable overrides (DATAWH_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use datawh::config::loader::load_config;
///
/// let config = load_config("datawh.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DatawhConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EtlError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        EtlError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration text
///
/// Performs the same substitution, override and validation steps as
/// [`load_config`] on an in-memory document.
pub fn parse_config(contents: &str) -> Result<DatawhConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: DatawhConfig = toml::from_str(&contents)
        .map_err(|e| EtlError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        EtlError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| EtlError::Configuration(format!("Invalid substitution pattern: {}", e)))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(EtlError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        EtlError::Configuration(format!("Invalid value '{}' for {}", value, name))
    })
}

/// Applies environment variable overrides using the DATAWH_* prefix
///
/// Environment variables follow the pattern DATAWH_<SECTION>_<KEY>, for
/// example DATAWH_ETL_DATAFILE_DIR or DATAWH_LOGGING_LOCAL_PATH.
fn apply_env_overrides(config: &mut DatawhConfig) -> Result<()> {
    if let Ok(val) = std::env::var("DATAWH_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    if let Ok(val) = std::env::var("DATAWH_ETL_DATAFILE_DIR") {
        config.etl.datafile_dir = Some(val);
    }
    if let Ok(val) = std::env::var("DATAWH_ETL_LOOKUP_BATCH_SIZE") {
        config.etl.lookup_batch_size = parse_override("DATAWH_ETL_LOOKUP_BATCH_SIZE", &val)?;
    }
    if let Ok(val) = std::env::var("DATAWH_ETL_LOOKUP_MISS_RETRIES") {
        config.etl.lookup_miss_retries = parse_override("DATAWH_ETL_LOOKUP_MISS_RETRIES", &val)?;
    }

    if let Ok(val) = std::env::var("DATAWH_WORKFLOW_LOOKUP_CACHE_SIZE") {
        config.workflow.lookup_cache_size =
            parse_override("DATAWH_WORKFLOW_LOOKUP_CACHE_SIZE", &val)?;
    }

    if let Ok(val) = std::env::var("DATAWH_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("DATAWH_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("DATAWH_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("DATAWH_TEST_SUBST_DIR", "/data/out");
        let input = "datafile_dir = \"${DATAWH_TEST_SUBST_DIR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "datafile_dir = \"/data/out\"");
        std::env::remove_var("DATAWH_TEST_SUBST_DIR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("DATAWH_TEST_MISSING_VAR");
        let input = "datafile_dir = \"${DATAWH_TEST_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("DATAWH_TEST_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_env_vars_skips_comments() {
        std::env::remove_var("DATAWH_TEST_COMMENTED");
        let input = "# datafile_dir = \"${DATAWH_TEST_COMMENTED}\"\n[etl]";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-datawh.toml");
        assert!(matches!(result, Err(EtlError::Configuration(_))));
    }

    #[test]
    fn test_parse_config_rejects_invalid_section() {
        let result = parse_config("[etl]\nlookup_batch_size = 0\n");
        assert!(matches!(result, Err(EtlError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[etl]
datafile_dir = "/data/datawh"
lookup_batch_size = 250

[workflow]
lookup_cache_size = 128

[logging]
local_enabled = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.etl.datafile_dir.as_deref(), Some("/data/datawh"));
        assert_eq!(config.etl.lookup_batch_size, 250);
        assert_eq!(config.workflow.lookup_cache_size, 128);
        assert!(!config.logging.local_enabled);
    }
}

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ber::EngineLimits;
use crate::LdapCodecError;

/// How an AND/OR filter with no children is treated when it arrives on the
/// wire. Encoding always emits empty sets as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFilterSets {
    /// Fail the decode with `InvalidValue`.
    #[default]
    Reject,
    /// Accept them as the absolute true/false filters of RFC 4526.
    Absolute,
}

/// Explicit codec handle. Built once and shared by every decoder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub max_pdu_size: usize,
    pub max_depth: usize,
    pub max_filter_depth: usize,
    pub empty_filter_sets: EmptyFilterSets,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 16 * 1024 * 1024,
            max_depth: 64,
            max_filter_depth: 32,
            empty_filter_sets: EmptyFilterSets::Reject,
        }
    }
}

impl CodecConfig {
    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        let config: CodecConfig = serde_yaml::from_str(content)
            .map_err(|e| LdapCodecError::Config(format!("Invalid codec config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.max_pdu_size == 0 {
            return Err(LdapCodecError::Config(
                "max_pdu_size must be greater than zero".to_string(),
            ));
        }
        // Envelope, op, and the filter itself sit above the first filter level
        if self.max_depth < 4 {
            return Err(LdapCodecError::Config(format!(
                "max_depth {} is too small to hold an LDAP message",
                self.max_depth
            )));
        }
        if self.max_filter_depth == 0 {
            return Err(LdapCodecError::Config(
                "max_filter_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_limits(&self) -> EngineLimits {
        EngineLimits {
            max_element_size: self.max_pdu_size,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ldapwire-dump")]
#[command(about = "Decode a stream of BER-encoded LDAP messages and print them")]
#[command(version)]
pub struct CliArgs {
    /// File containing concatenated LDAP PDUs
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Input is hex text instead of raw bytes
    #[arg(long)]
    pub hex: bool,

    /// Re-encode every message and check it decodes back unchanged
    #[arg(long)]
    pub verify: bool,

    /// YAML file with codec limits
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Set log level: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub hex: bool,
    pub verify: bool,
    pub log_level: tracing::Level,
    pub codec: CodecConfig,
}

impl Config {
    pub fn from_cli_args(args: CliArgs) -> crate::Result<Self> {
        let codec = match &args.config {
            Some(path) => CodecConfig::from_yaml_file(path)?,
            None => CodecConfig::default(),
        };

        let log_level = if args.verbose {
            tracing::Level::DEBUG
        } else {
            parse_log_level(&args.log_level)
        };

        Ok(Config {
            input: args.file,
            hex: args.hex,
            verify: args.verify,
            log_level,
            codec,
        })
    }
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_args_default_values() {
        let args = CliArgs::parse_from(["ldapwire-dump", "capture.ber"]);
        assert_eq!(args.file, PathBuf::from("capture.ber"));
        assert!(!args.hex);
        assert!(!args.verify);
        assert_eq!(args.config, None);
        assert!(!args.verbose);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_cli_args_custom_values() {
        let args = CliArgs::parse_from([
            "ldapwire-dump",
            "capture.hex",
            "--hex",
            "--verify",
            "-c",
            "codec.yaml",
            "-v",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.file, PathBuf::from("capture.hex"));
        assert!(args.hex);
        assert!(args.verify);
        assert_eq!(args.config, Some(PathBuf::from("codec.yaml")));
        assert!(args.verbose);
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn test_config_log_level_parsing() {
        let test_cases = vec![
            ("trace", tracing::Level::TRACE),
            ("debug", tracing::Level::DEBUG),
            ("info", tracing::Level::INFO),
            ("warn", tracing::Level::WARN),
            ("error", tracing::Level::ERROR),
            ("DEBUG", tracing::Level::DEBUG),
            ("WARN", tracing::Level::WARN),
            ("invalid", tracing::Level::INFO), // default
            ("", tracing::Level::INFO),        // default
        ];

        for (log_level_str, expected_level) in test_cases {
            let args = CliArgs {
                file: PathBuf::from("capture.ber"),
                hex: false,
                verify: false,
                config: None,
                verbose: false,
                log_level: log_level_str.to_string(),
            };

            let config = Config::from_cli_args(args).unwrap();
            assert_eq!(config.log_level, expected_level);
        }
    }

    #[test]
    fn test_verbose_overrides_log_level() {
        let args = CliArgs::parse_from(["ldapwire-dump", "x", "-v", "--log-level", "error"]);
        let config = Config::from_cli_args(args).unwrap();
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_codec_config_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.max_pdu_size, 16 * 1024 * 1024);
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.max_filter_depth, 32);
        assert_eq!(config.empty_filter_sets, EmptyFilterSets::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_codec_config_partial_yaml() {
        let config = CodecConfig::from_yaml_str(
            "max_pdu_size: 4096\nempty_filter_sets: absolute\n",
        )
        .unwrap();
        assert_eq!(config.max_pdu_size, 4096);
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.empty_filter_sets, EmptyFilterSets::Absolute);
    }

    #[test]
    fn test_codec_config_rejects_bad_values() {
        let err = CodecConfig::from_yaml_str("max_depth: 2\n").unwrap_err();
        assert!(matches!(err, LdapCodecError::Config(_)));

        let err = CodecConfig::from_yaml_str("max_pdu_size: 0\n").unwrap_err();
        assert!(matches!(err, LdapCodecError::Config(_)));

        let err = CodecConfig::from_yaml_str("empty_filter_sets: maybe\n").unwrap_err();
        assert!(matches!(err, LdapCodecError::Config(_)));
    }

    #[test]
    fn test_config_loads_codec_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_filter_depth: 8").unwrap();

        let args = CliArgs {
            file: PathBuf::from("capture.ber"),
            hex: true,
            verify: true,
            config: Some(file.path().to_path_buf()),
            verbose: false,
            log_level: "info".to_string(),
        };
        let config = Config::from_cli_args(args).unwrap();
        assert!(config.hex);
        assert!(config.verify);
        assert_eq!(config.codec.max_filter_depth, 8);
    }

    #[test]
    fn test_config_missing_codec_file() {
        let args = CliArgs {
            file: PathBuf::from("capture.ber"),
            hex: false,
            verify: false,
            config: Some(PathBuf::from("/nonexistent/codec.yaml")),
            verbose: false,
            log_level: "info".to_string(),
        };
        assert!(matches!(
            Config::from_cli_args(args),
            Err(LdapCodecError::Io(_))
        ));
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete options bundle for the assembler and the
//! service configuration read by the binary. All types derive Serde traits
//! for deserialization from config files; unknown keys are rejected.

use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::size::ByteSize;

/// Root configuration for the `api-assembler` binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Path to the OpenAPI document (YAML or JSON).
    pub definition_path: PathBuf,

    /// Listener configuration.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Tracing subscriber settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Options handed to the assembler.
    #[serde(default)]
    pub options: AppOptions,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Options bundle for the assembled application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppOptions {
    /// Body parser settings.
    pub parser: ParserConfig,

    /// Request validation settings.
    pub validator: ValidatorConfig,

    /// Access log settings.
    pub logging: LoggingConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Documentation UI settings.
    pub docs: DocsConfig,

    /// Route dispatch settings.
    pub routing: RoutingConfig,
}

/// Body parser configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    /// Maximum accepted body size (default: "100kb").
    pub limit: ByteSize,

    /// Media range parsed as JSON (default: "application/json").
    pub content_type: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            limit: ByteSize::default(),
            content_type: "application/json".to_string(),
        }
    }
}

/// Request validation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Document to validate against. Defaults to the definition path.
    pub api_spec: Option<PathBuf>,

    /// Validate incoming requests.
    pub validate_requests: bool,

    /// Coerce string parameters to their schema types before validating.
    pub coerce_types: bool,

    /// Accept query parameters the operation does not declare.
    pub allow_unknown_query_parameters: bool,

    /// Path prefixes excluded from validation.
    pub ignore_paths: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            api_spec: None,
            validate_requests: true,
            coerce_types: true,
            allow_unknown_query_parameters: false,
            ignore_paths: Vec::new(),
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Preset name or token template. Defaults to `dev`.
    pub format: Option<String>,

    /// Only responses with a status at or above this value are logged.
    pub error_threshold: Option<StatusThreshold>,
}

/// A status code threshold, written either as a number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusThreshold(pub u16);

impl Serialize for StatusThreshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for StatusThreshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ThresholdVisitor;

        impl Visitor<'_> for ThresholdVisitor {
            type Value = StatusThreshold;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a status code as a number or a numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StatusThreshold, E> {
                u16::try_from(v)
                    .map(StatusThreshold)
                    .map_err(|_| E::custom(format!("status threshold {v} out of range")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StatusThreshold, E> {
                u16::try_from(v)
                    .map(StatusThreshold)
                    .map_err(|_| E::custom(format!("status threshold {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StatusThreshold, E> {
                v.trim()
                    .parse::<u16>()
                    .map(StatusThreshold)
                    .map_err(|_| E::custom(format!("status threshold `{v}` is not a number")))
            }
        }

        deserializer.deserialize_any(ThresholdVisitor)
    }
}

/// Cross-origin policy configuration.
///
/// Empty lists mean "any" for origins, methods and headers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

/// Documentation UI configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocsConfig {
    /// Serve the documentation UI.
    pub enabled: bool,

    /// Mount point of the UI.
    pub path: String,

    /// Where the document itself is served as JSON.
    pub spec_url: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/docs".to_string(),
            spec_url: "/api-docs/openapi.json".to_string(),
        }
    }
}

/// Route dispatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Prefix for every documented path. Defaults to the path of the
    /// document's first server URL.
    pub base_path: Option<String>,

    /// Fail construction when an operation has no registered handler.
    pub require_handlers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AppOptions::default();
        assert_eq!(options.parser.limit.as_bytes(), 100 * 1024);
        assert_eq!(options.parser.content_type, "application/json");
        assert!(options.validator.validate_requests);
        assert!(options.validator.coerce_types);
        assert!(options.logging.format.is_none());
        assert!(options.logging.error_threshold.is_none());
        assert!(options.docs.enabled);
        assert_eq!(options.docs.path, "/docs");
    }

    #[test]
    fn test_threshold_accepts_number_or_string() {
        let logging: LoggingConfig = toml::from_str("error_threshold = 400").unwrap();
        assert_eq!(logging.error_threshold, Some(StatusThreshold(400)));

        let logging: LoggingConfig = toml::from_str("error_threshold = \"500\"").unwrap();
        assert_eq!(logging.error_threshold, Some(StatusThreshold(500)));

        assert!(toml::from_str::<LoggingConfig>("error_threshold = \"high\"").is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = toml::from_str::<AppOptions>("[parser]\nlimitt = \"1kb\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_app_config_minimal() {
        let config: AppConfig = toml::from_str("definition_path = \"api.yaml\"").unwrap();
        assert_eq!(config.definition_path, PathBuf::from("api.yaml"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.options, AppOptions::default());
    }
}

//! Runtime configuration
//!
//! Settings are read once at startup from the process environment the host
//! injects. Anything missing or malformed here is fatal: the invocation loop
//! is never entered.

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_FUNCTION_VERSION: &str = "$LATEST";
const DEFAULT_MEMORY_SIZE_MB: u32 = 128;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid handler selector {0:?}: expected <module>.<name>")]
    InvalidHandler(String),

    #[error("Invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Raw settings as they appear in the environment.
///
/// Every field is optional here; [`RuntimeConfig::from_settings`] decides
/// which ones are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvSettings {
    #[serde(default, rename = "aws_lambda_runtime_api", alias = "AWS_LAMBDA_RUNTIME_API")]
    pub runtime_api: Option<String>,

    #[serde(default, rename = "_handler", alias = "_HANDLER")]
    pub handler: Option<String>,

    #[serde(default, rename = "aws_lambda_function_name", alias = "AWS_LAMBDA_FUNCTION_NAME")]
    pub function_name: Option<String>,

    #[serde(
        default,
        rename = "aws_lambda_function_version",
        alias = "AWS_LAMBDA_FUNCTION_VERSION"
    )]
    pub function_version: Option<String>,

    #[serde(
        default,
        rename = "aws_lambda_function_memory_size",
        alias = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE"
    )]
    pub memory_size: Option<String>,

    #[serde(default, rename = "aws_lambda_log_group_name", alias = "AWS_LAMBDA_LOG_GROUP_NAME")]
    pub log_group_name: Option<String>,

    #[serde(default, rename = "aws_lambda_log_stream_name", alias = "AWS_LAMBDA_LOG_STREAM_NAME")]
    pub log_stream_name: Option<String>,

    #[serde(
        default,
        rename = "bootstrap_propagate_trace_env",
        alias = "BOOTSTRAP_PROPAGATE_TRACE_ENV"
    )]
    pub propagate_trace_env: Option<String>,
}

impl EnvSettings {
    /// Load settings from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::default())
    }

    /// Load settings from an explicit variable map instead of the environment
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self::from_source(config::Environment::default().source(Some(map)))
    }

    fn from_source(source: config::Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder().add_source(source).build()?;
        Ok(config.try_deserialize::<EnvSettings>()?)
    }
}

/// Static per-process function metadata merged into every invocation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: u32,
    pub log_group_name: String,
    pub log_stream_name: String,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            function_name: String::new(),
            function_version: DEFAULT_FUNCTION_VERSION.to_string(),
            memory_limit_in_mb: DEFAULT_MEMORY_SIZE_MB,
            log_group_name: String::new(),
            log_stream_name: String::new(),
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Control endpoint as `host:port`
    pub runtime_api: String,
    /// Full handler selector, e.g. `file.myHandler`
    pub handler: String,
    /// Name the registry is queried with
    pub handler_name: String,
    pub function: FunctionSettings,
    /// Mirror each invocation's trace id into `_X_AMZN_TRACE_ID`
    pub propagate_trace_env: bool,
}

impl RuntimeConfig {
    /// Build a configuration from an endpoint and handler selector alone
    pub fn new(runtime_api: impl Into<String>, handler: impl Into<String>) -> Result<Self, ConfigError> {
        let handler = handler.into();
        let handler_name = parse_handler_name(&handler)?.to_string();

        Ok(Self {
            runtime_api: runtime_api.into(),
            handler,
            handler_name,
            function: FunctionSettings::default(),
            propagate_trace_env: false,
        })
    }

    /// Load and validate configuration from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_settings(EnvSettings::load()?)
    }

    pub fn from_settings(settings: EnvSettings) -> Result<Self, ConfigError> {
        let runtime_api = non_empty(settings.runtime_api)
            .ok_or(ConfigError::MissingSetting("AWS_LAMBDA_RUNTIME_API"))?;
        let handler = non_empty(settings.handler).ok_or(ConfigError::MissingSetting("_HANDLER"))?;

        let mut config = Self::new(runtime_api, handler)?;

        let memory_limit_in_mb = match non_empty(settings.memory_size) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                name: "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
                value,
            })?,
            None => DEFAULT_MEMORY_SIZE_MB,
        };

        config.function = FunctionSettings {
            function_name: settings.function_name.unwrap_or_default(),
            function_version: non_empty(settings.function_version)
                .unwrap_or_else(|| DEFAULT_FUNCTION_VERSION.to_string()),
            memory_limit_in_mb,
            log_group_name: settings.log_group_name.unwrap_or_default(),
            log_stream_name: settings.log_stream_name.unwrap_or_default(),
        };

        config.propagate_trace_env = match non_empty(settings.propagate_trace_env) {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidSetting {
                name: "BOOTSTRAP_PROPAGATE_TRACE_ENV",
                value,
            })?,
            None => false,
        };

        Ok(config)
    }
}

/// Extract the handler name from a `<module>.<name>` selector.
///
/// Only the part after the final `.` is used.
pub fn parse_handler_name(selector: &str) -> Result<&str, ConfigError> {
    match selector.rsplit_once('.') {
        Some((_, name)) if !name.is_empty() => Ok(name),
        _ => Err(ConfigError::InvalidHandler(selector.to_string())),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_name_after_final_separator() {
        assert_eq!(parse_handler_name("file.myHandler").unwrap(), "myHandler");
        assert_eq!(parse_handler_name("pkg.module.run").unwrap(), "run");
    }

    #[test]
    fn test_handler_name_requires_separator() {
        assert!(matches!(
            parse_handler_name("myHandler"),
            Err(ConfigError::InvalidHandler(_))
        ));
        assert!(matches!(
            parse_handler_name("file."),
            Err(ConfigError::InvalidHandler(_))
        ));
    }

    #[test]
    fn test_config_from_vars() {
        let settings = EnvSettings::from_vars([
            ("AWS_LAMBDA_RUNTIME_API", "h:1"),
            ("_HANDLER", "file.myHandler"),
            ("AWS_LAMBDA_FUNCTION_NAME", "my-function"),
            ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "512"),
            ("AWS_LAMBDA_LOG_GROUP_NAME", "/aws/lambda/my-function"),
        ])
        .unwrap();

        let config = RuntimeConfig::from_settings(settings).unwrap();
        assert_eq!(config.runtime_api, "h:1");
        assert_eq!(config.handler, "file.myHandler");
        assert_eq!(config.handler_name, "myHandler");
        assert_eq!(config.function.function_name, "my-function");
        assert_eq!(config.function.function_version, "$LATEST");
        assert_eq!(config.function.memory_limit_in_mb, 512);
        assert_eq!(config.function.log_group_name, "/aws/lambda/my-function");
        assert!(!config.propagate_trace_env);
    }

    #[test]
    fn test_missing_runtime_api() {
        let settings = EnvSettings {
            handler: Some("file.myHandler".to_string()),
            ..Default::default()
        };

        let result = RuntimeConfig::from_settings(settings);
        assert!(matches!(
            result,
            Err(ConfigError::MissingSetting("AWS_LAMBDA_RUNTIME_API"))
        ));
    }

    #[test]
    fn test_missing_handler() {
        let settings = EnvSettings {
            runtime_api: Some("h:1".to_string()),
            ..Default::default()
        };

        let result = RuntimeConfig::from_settings(settings);
        assert!(matches!(result, Err(ConfigError::MissingSetting("_HANDLER"))));
    }

    #[test]
    fn test_invalid_memory_size() {
        let settings = EnvSettings {
            runtime_api: Some("h:1".to_string()),
            handler: Some("file.myHandler".to_string()),
            memory_size: Some("lots".to_string()),
            ..Default::default()
        };

        let result = RuntimeConfig::from_settings(settings);
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_propagate_trace_env_flag() {
        let settings = EnvSettings {
            runtime_api: Some("h:1".to_string()),
            handler: Some("file.myHandler".to_string()),
            propagate_trace_env: Some("true".to_string()),
            ..Default::default()
        };

        let config = RuntimeConfig::from_settings(settings).unwrap();
        assert!(config.propagate_trace_env);
    }
}

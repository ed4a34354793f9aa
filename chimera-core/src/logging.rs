//! 日志初始化
//!
//! 除了基础级别，配置类处理（`chimera_core::config_class`）和 AOP（`chimera_aop`）
//! 可以单独设置级别。切点匹配在 trace 级别逐个方法输出，量很大。

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};

const CONFIG_CLASS_TARGET: &str = "chimera_core::config_class";
const AOP_TARGET: &str = "chimera_aop";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ContainerError::IllegalState(format!("Invalid log level: {}", s))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// 带时间、级别、目标
    Full,
    Json,
    /// 多行，适合开发时阅读
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ContainerError::IllegalState(format!("Invalid log format: {}", s))),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub show_target: bool,
    pub show_thread_ids: bool,

    /// 配置类解析、导入和 Bean 方法注册
    pub config_class_level: Option<LogLevel>,

    /// 通知器链、代理创建与切点匹配
    pub aop_level: Option<LogLevel>,

    /// 完整的过滤指令，设置后忽略上面的级别，例如 "chimera_aop=trace,warn"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            config_class_level: None,
            aop_level: None,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn config_class_level(mut self, level: LogLevel) -> Self {
        self.config_class_level = Some(level);
        self
    }

    pub fn aop_level(mut self, level: LogLevel) -> Self {
        self.aop_level = Some(level);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从进程环境变量读取：`RUST_LOG` 作为过滤指令，`LOG_LEVEL`、`LOG_FORMAT`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.filter = std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty());
        if let Some(level) = std::env::var("LOG_LEVEL").ok().and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT").ok().and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 从 Environment 读取 `logging.*` 属性，无法解析的值保持默认并给出警告
    pub fn from_environment(env: &Environment) -> Self {
        fn parsed<T: FromStr<Err = ContainerError>>(env: &Environment, key: &str) -> Option<T> {
            let raw = env.get_string(key)?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", key, e);
                    None
                }
            }
        }

        let defaults = Self::default();
        Self {
            level: parsed(env, "logging.level").unwrap_or(defaults.level),
            format: parsed(env, "logging.format").unwrap_or(defaults.format),
            show_target: env.get_bool_or("logging.show-target", defaults.show_target),
            show_thread_ids: env.get_bool_or("logging.show-thread-ids", defaults.show_thread_ids),
            config_class_level: parsed(env, "logging.level.config-class"),
            aop_level: parsed(env, "logging.level.aop"),
            filter: env.get_string("logging.filter"),
        }
    }

    /// 生成 `EnvFilter` 指令
    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let mut directives = vec![self.level.to_string()];
        if let Some(level) = self.config_class_level {
            directives.push(format!("{}={}", CONFIG_CLASS_TARGET, level));
        }
        if let Some(level) = self.aop_level {
            directives.push(format!("{}={}", AOP_TARGET, level));
        }
        directives.join(",")
    }

    /// 安装全局 subscriber；已经安装过时返回错误
    pub fn init(self) -> ContainerResult<()> {
        let directives = self.directives();
        let env_filter = EnvFilter::try_new(&directives)
            .map_err(|e| ContainerError::LoggingInitFailed(format!("{}: {}", directives, e)))?;
        let builder = subscriber_fmt()
            .with_env_filter(env_filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        installed.map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapPropertySource;

    #[test]
    fn test_parse_level_and_format() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" json ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_subsystem_directives() {
        let config = LoggingConfig::new()
            .level(LogLevel::Warn)
            .config_class_level(LogLevel::Debug)
            .aop_level(LogLevel::Trace);
        assert_eq!(
            config.directives(),
            "warn,chimera_core::config_class=debug,chimera_aop=trace"
        );

        let config = config.filter("chimera_aop::aspectj=trace");
        assert_eq!(config.directives(), "chimera_aop::aspectj=trace");
    }

    #[test]
    fn test_from_environment() {
        let env = Environment::new();
        env.add_property_source(
            MapPropertySource::new("test")
                .with_property("logging.level", "debug")
                .with_property("logging.format", "bogus")
                .with_property("logging.level.aop", "trace"),
        );

        let config = LoggingConfig::from_environment(&env);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.aop_level, Some(LogLevel::Trace));
        assert_eq!(config.directives(), "debug,chimera_aop=trace");
    }
}

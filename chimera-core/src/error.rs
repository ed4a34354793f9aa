//! 统一的错误处理类型
//!
//! 框架内部使用 `ContainerError` 描述容器级别的失败，
//! 通过 `anyhow::Error` 承载用户代码（条件、选择器、注册器）返回的任意错误。

use thiserror::Error;

use crate::config_class::problem::Problem;

/// 对外暴露 anyhow::Result，便于用户代码通过 `.context()` 添加上下文
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::{Context, Result};
///
/// fn load(path: &str) -> Result<String> {
///     std::fs::read_to_string(path).context(format!("Failed to read '{}'", path))
/// }
/// ```
pub use anyhow::Result;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 找不到 Bean（定义或实例）
    #[error("No bean named '{0}' available")]
    BeanNotFound(String),

    /// Bean 定义覆盖被禁止
    #[error("Invalid bean definition with name '{name}': cannot register [{new}] since there is already [{existing}] bound")]
    BeanDefinitionOverride {
        name: String,
        existing: String,
        new: String,
    },

    /// Bean 定义无效（例如名称冲突）
    #[error("Invalid bean definition with name '{name}': {message}")]
    BeanDefinitionStore { name: String, message: String },

    /// 扫描得到的 Bean 与已有的不兼容定义冲突
    #[error("Annotation-specified bean name '{name}' for bean class [{new_class}] conflicts with existing, non-compatible bean definition of same name and class [{existing_class}]")]
    ConflictingBeanDefinition {
        name: String,
        new_class: String,
        existing_class: String,
    },

    /// Bean 创建失败（包含 Bean 名称）
    #[error("Error creating bean with name '{name}': {source}")]
    BeanCreation {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// 创建过程中出现循环引用
    #[error("Requested bean is currently in creation: {0}")]
    CurrentlyInCreation(String),

    /// Bean 类型不匹配
    #[error("Bean named '{name}' is expected to be of type '{expected}'")]
    TypeMismatch { name: String, expected: String },

    /// 找不到类的元数据
    #[error("Class '{0}' cannot be found in any metadata source")]
    ClassNotFound(String),

    /// 元数据文档解析失败
    #[error("Failed to read class metadata from {resource}: {message}")]
    Metadata { resource: String, message: String },

    /// 配置问题（循环导入、校验失败）
    #[error("Configuration problem: {0}")]
    Problem(Problem),

    /// 占位符无法解析
    #[error("Could not resolve placeholder '{placeholder}' in value \"{value}\"")]
    UnresolvablePlaceholder { placeholder: String, value: String },

    /// 资源加载失败
    #[error("Failed to load resource '{location}': {message}")]
    Resource { location: String, message: String },

    /// 配置已冻结或其他非法状态
    #[error("{0}")]
    IllegalState(String),

    /// 日志系统初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 用户代码返回的其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

impl ContainerError {
    /// 快捷构造 BeanDefinitionStore 错误
    pub fn store(name: impl Into<String>, message: impl Into<String>) -> Self {
        ContainerError::BeanDefinitionStore {
            name: name.into(),
            message: message.into(),
        }
    }

    /// 把任意错误包装为 Bean 创建失败
    pub fn creation(name: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ContainerError::BeanCreation {
            name: name.into(),
            source: source.into(),
        }
    }
}

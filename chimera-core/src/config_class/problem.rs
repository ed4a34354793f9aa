//! 配置问题的报告通道
//!
//! 循环导入与校验失败不会直接作为错误抛出，而是以结构化的 `Problem`
//! 发送给 `ProblemReporter`，由报告器决定立即失败还是收集。

use std::fmt;

use parking_lot::Mutex;

use crate::error::{ContainerError, ContainerResult};

/// 问题的类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    /// 循环导入，链条以出现重复的类结尾（A -> B -> A）
    CircularImport { chain: Vec<String> },
    /// @Configuration 类不能是 final（需要代理 @Bean 方法时）
    FinalConfigurationClass,
    /// @Bean 方法需要可以被覆盖
    NonOverridableBeanMethod { method: String },
    /// 其他校验失败
    Invalid,
}

/// 结构化的配置问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub message: String,
    /// 问题所在的资源（通常是配置类名）
    pub location: Option<String>,
}

impl Problem {
    pub fn new(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// 循环导入问题
    pub fn circular_import(chain: Vec<String>, location: impl Into<String>) -> Self {
        let imported = chain.last().cloned().unwrap_or_default();
        let importer = chain.iter().rev().nth(1).cloned().unwrap_or_default();
        let message = format!(
            "A circular @Import has been detected: Illegal attempt by @Configuration class '{}' to import class '{}' as '{}' is already present in the current import stack [{}]",
            importer,
            imported,
            imported,
            chain.join("->")
        );
        Self::new(ProblemKind::CircularImport { chain }, message).at(location)
    }

    /// 循环链条（仅循环导入问题）
    pub fn import_chain(&self) -> Option<String> {
        match &self.kind {
            ProblemKind::CircularImport { chain } => Some(chain.join("->")),
            _ => None,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(location) = &self.location {
            write!(f, "\nOffending resource: {}", location)?;
        }
        Ok(())
    }
}

/// 问题报告器
pub trait ProblemReporter: Send + Sync {
    fn error(&self, problem: Problem) -> ContainerResult<()>;

    fn warning(&self, problem: Problem) {
        tracing::warn!("{}", problem);
    }
}

/// 遇到错误立即失败
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFastProblemReporter;

impl ProblemReporter for FailFastProblemReporter {
    fn error(&self, problem: Problem) -> ContainerResult<()> {
        Err(ContainerError::Problem(problem))
    }
}

/// 收集所有问题，由调用方统一检查
#[derive(Debug, Default)]
pub struct CollectingProblemReporter {
    errors: Mutex<Vec<Problem>>,
    warnings: Mutex<Vec<Problem>>,
}

impl CollectingProblemReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<Problem> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<Problem> {
        self.warnings.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }
}

impl ProblemReporter for CollectingProblemReporter {
    fn error(&self, problem: Problem) -> ContainerResult<()> {
        self.errors.lock().push(problem);
        Ok(())
    }

    fn warning(&self, problem: Problem) {
        self.warnings.lock().push(problem);
    }
}

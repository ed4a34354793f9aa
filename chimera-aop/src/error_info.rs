//! 错误信息结构
//!
//! 异常通知（after-throwing）绑定的不是错误本身，而是它的结构化快照：
//! 错误本身要原样传回调用方。

use std::fmt;

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 最外层错误的类型名称（无法得知时为 "anyhow::Error"）
    pub error_type: String,

    /// 错误源链（cause chain），不含最外层
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从 anyhow 错误创建
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let mut chain = error.chain();
        let message = chain
            .next()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let source_chain = chain.map(|e| e.to_string()).collect();
        Self {
            message,
            error_type: "anyhow::Error".to_string(),
            source_chain,
        }
    }

    /// 从具体错误类型创建
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let mut source_chain = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            source_chain.push(source.to_string());
            current = source.source();
        }
        Self {
            message: error.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            source_chain,
        }
    }

    /// 只包含消息
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    /// 完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_anyhow_keeps_cause_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("disk full"))
            .context("write failed")
            .unwrap_err();
        let info = ErrorInfo::from_anyhow(&error);
        assert_eq!(info.message, "write failed");
        assert_eq!(info.source_chain, vec!["disk full".to_string()]);
        assert_eq!(info.full_description(), "write failed\nCaused by:\n  disk full");
    }
}

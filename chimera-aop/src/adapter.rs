//! 通知适配器
//!
//! 调用链只执行 `MethodInterceptor`。前置、返回后、异常通知由适配器转换，
//! 注册表在组装时创建一次，通过 `AdvisedSupport` 共享，不使用全局状态。

use std::collections::HashMap;
use std::sync::Arc;

use crate::advice::{
    Advice, AfterReturningAdviceInterceptor, IntroductionInterceptorAdapter, MethodBeforeAdviceInterceptor,
    MethodInterceptor, ThrowsAdviceInterceptor,
};
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{AopError, AopResult};

/// 把某一类通知转换为拦截器
pub trait AdvisorAdapter: Send + Sync {
    /// 处理的通知类型，与 `Advice::kind()` 对应
    fn advice_kind(&self) -> &str;

    fn supports_advice(&self, advice: &Advice) -> bool {
        advice.kind() == self.advice_kind()
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>>;
}

pub struct MethodBeforeAdviceAdapter;

impl AdvisorAdapter for MethodBeforeAdviceAdapter {
    fn advice_kind(&self) -> &str {
        "before"
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Before(before) => Ok(Arc::new(MethodBeforeAdviceInterceptor::new(Arc::clone(before)))),
            other => Err(AopError::UnknownAdviceType(other.kind().to_string())),
        }
    }
}

pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn advice_kind(&self) -> &str {
        "after-returning"
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterReturning(after) => Ok(Arc::new(AfterReturningAdviceInterceptor::new(Arc::clone(after)))),
            other => Err(AopError::UnknownAdviceType(other.kind().to_string())),
        }
    }
}

pub struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn advice_kind(&self) -> &str {
        "throws"
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Throws(throws) => Ok(Arc::new(ThrowsAdviceInterceptor::new(Arc::clone(throws)))),
            other => Err(AopError::UnknownAdviceType(other.kind().to_string())),
        }
    }
}

/// 适配器注册表
///
/// 每种通知类型只能有一个适配器，重复注册是配置错误
pub struct DefaultAdvisorAdapterRegistry {
    adapters: Vec<Arc<dyn AdvisorAdapter>>,
    kinds: HashMap<String, usize>,
}

impl Default for DefaultAdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultAdvisorAdapterRegistry {
    /// 带有前置、返回后、异常三个内置适配器
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let builtins: [Arc<dyn AdvisorAdapter>; 3] = [
            Arc::new(MethodBeforeAdviceAdapter),
            Arc::new(AfterReturningAdviceAdapter),
            Arc::new(ThrowsAdviceAdapter),
        ];
        for adapter in builtins {
            let kind = adapter.advice_kind().to_string();
            registry.kinds.insert(kind, registry.adapters.len());
            registry.adapters.push(adapter);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
            kinds: HashMap::new(),
        }
    }

    pub fn register_adapter(&mut self, adapter: Arc<dyn AdvisorAdapter>) -> AopResult<()> {
        let kind = adapter.advice_kind().to_string();
        if kind == "interceptor" || kind == "introduction" || self.kinds.contains_key(&kind) {
            return Err(AopError::DuplicateAdapter(kind));
        }
        tracing::debug!("Registered advisor adapter for advice kind '{}'", kind);
        self.kinds.insert(kind, self.adapters.len());
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Interceptor(_) | Advice::Introduction(_))
            || self.adapters.iter().any(|a| a.supports_advice(advice))
    }

    /// 通知器对应的拦截器
    pub fn interceptors(&self, advisor: &dyn Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::new();
        match advice {
            Advice::Interceptor(interceptor) => interceptors.push(Arc::clone(interceptor)),
            Advice::Introduction(introduction) => {
                interceptors.push(Arc::new(IntroductionInterceptorAdapter::new(Arc::clone(introduction))))
            }
            _ => {}
        }
        for adapter in &self.adapters {
            if adapter.supports_advice(advice) {
                interceptors.push(adapter.interceptor(advice)?);
            }
        }
        if interceptors.is_empty() {
            return Err(AopError::UnknownAdviceType(advice.kind().to_string()));
        }
        Ok(interceptors)
    }

    /// 把单独的通知包装成匹配所有方法的通知器
    pub fn wrap(&self, advice: Advice) -> AopResult<Arc<dyn Advisor>> {
        if !self.supports(&advice) {
            return Err(AopError::UnknownAdviceType(advice.kind().to_string()));
        }
        Ok(Arc::new(DefaultPointcutAdvisor::for_advice(advice)))
    }
}

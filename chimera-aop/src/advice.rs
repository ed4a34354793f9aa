//! 通知（Advice）
//!
//! 通知是横切逻辑的单元。调用链只认识 `MethodInterceptor`，
//! 其他形式的通知（前置、返回后、异常）由适配器转换为拦截器。

use std::fmt;
use std::sync::Arc;

use crate::invocation::MethodInvocation;
use crate::joinpoint::JoinPoint;
use crate::target::{DynValue, InvocationResult};

/// 环绕方法调用的拦截器
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult;
}

impl<F> MethodInterceptor for F
where
    F: Fn(&mut MethodInvocation) -> InvocationResult + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self(invocation)
    }
}

/// 前置通知：返回错误时不再调用目标方法
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 返回后通知：只在方法正常返回时执行
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, return_value: Option<&DynValue>, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 异常通知
///
/// 错误执行完通知后原样返回给调用方；通知自身返回错误时以通知的错误为准
pub trait ThrowsAdvice: Send + Sync {
    /// 是否处理该错误
    fn handles(&self, _error: &anyhow::Error) -> bool {
        true
    }

    fn after_throwing(&self, error: &anyhow::Error, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 引入拦截器：让代理额外实现一组接口
pub trait IntroductionInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult;

    /// 引入的接口
    fn interfaces(&self) -> Vec<String>;

    fn implements_interface(&self, interface: &str) -> bool {
        self.interfaces().iter().any(|i| i == interface)
    }
}

/// 通知的各种形式
#[derive(Clone)]
pub enum Advice {
    Interceptor(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    Throws(Arc<dyn ThrowsAdvice>),
    Introduction(Arc<dyn IntroductionInterceptor>),
    /// 由自定义适配器处理
    Custom { kind: String, advice: DynValue },
}

impl Advice {
    pub fn interceptor(interceptor: impl MethodInterceptor + 'static) -> Self {
        Advice::Interceptor(Arc::new(interceptor))
    }

    /// 以闭包作为环绕拦截器
    pub fn around<F>(interceptor: F) -> Self
    where
        F: Fn(&mut MethodInvocation) -> InvocationResult + Send + Sync + 'static,
    {
        Advice::Interceptor(Arc::new(interceptor))
    }

    pub fn before(advice: impl MethodBeforeAdvice + 'static) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn throws(advice: impl ThrowsAdvice + 'static) -> Self {
        Advice::Throws(Arc::new(advice))
    }

    /// 通知类型，适配器按它查找
    pub fn kind(&self) -> &str {
        match self {
            Advice::Interceptor(_) => "interceptor",
            Advice::Before(_) => "before",
            Advice::AfterReturning(_) => "after-returning",
            Advice::Throws(_) => "throws",
            Advice::Introduction(_) => "introduction",
            Advice::Custom { kind, .. } => kind,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.kind())
    }
}

/// 前置通知 -> 拦截器
pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodBeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn MethodBeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.advice.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

/// 返回后通知 -> 拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let result = invocation.proceed()?;
        self.advice
            .after_returning(result.as_ref(), &invocation.join_point())?;
        Ok(result)
    }
}

/// 异常通知 -> 拦截器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<dyn ThrowsAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        match invocation.proceed() {
            Ok(result) => Ok(result),
            Err(error) => {
                if self.advice.handles(&error) {
                    self.advice
                        .after_throwing(&error, &invocation.join_point())?;
                }
                Err(error)
            }
        }
    }
}

/// 引入拦截器放进调用链
pub struct IntroductionInterceptorAdapter {
    interceptor: Arc<dyn IntroductionInterceptor>,
}

impl IntroductionInterceptorAdapter {
    pub fn new(interceptor: Arc<dyn IntroductionInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl MethodInterceptor for IntroductionInterceptorAdapter {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.interceptor.invoke(invocation)
    }
}

//! Chimera AOP - 面向切面编程支持
//!
//! 基于代理的 AOP：
//! - 切点（类型过滤 + 方法匹配）、通知、通知器
//! - 通知器适配为拦截器链，按 (方法, 目标类型, 配置版本) 缓存
//! - 接口代理与子类代理，代理创建后仍可增删通知器
//! - `@Aspect` 注解切面与切点表达式
//! - 通过 BeanPostProcessor 自动为匹配的 Bean 创建代理
//!
//! Rust 没有运行时反射，类型结构来自 `ClassRegistry` 中的 `ClassDef`，
//! 方法体由 `Target`（通常是 `MethodTable`）提供。

pub mod adapter;
pub mod advice;
pub mod advisor;
pub mod aspectj;
pub mod auto_proxy;
pub mod chain;
pub mod error;
pub mod error_info;
pub mod invocation;
pub mod joinpoint;
pub mod pointcut;
pub mod proxy;
pub mod scoped_proxy;
pub mod target;

// 重新导出核心类型
pub use adapter::{AdvisorAdapter, DefaultAdvisorAdapterRegistry};
pub use advice::{
    Advice, AfterReturningAdvice, IntroductionInterceptor, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
pub use advisor::{
    Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor, DelegatePerTargetObjectIntroductionInterceptor,
    DelegatingIntroductionInterceptor, IntroductionAdvisor,
};
pub use aspectj::{
    AspectInstanceFactory, AspectJExpressionPointcut, AspectMetadata, PerClauseKind, ReflectiveAspectJAdvisorFactory,
};
pub use auto_proxy::{AnnotationAwareAspectJAutoProxyCreator, AopUtils, AspectJAutoProxyRegistrar};
pub use chain::{AdvisorChainFactory, CachingAdvisorChainFactory, DefaultAdvisorChainFactory};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use invocation::{ChainElement, MethodInvocation};
pub use joinpoint::{JoinPoint, ProceedingJoinPoint};
pub use pointcut::{ClassFilter, ClassView, ComposablePointcut, MethodMatcher, Pointcut};
pub use proxy::{AdvisedSupport, AopContext, DefaultAopProxyFactory, Proxy, ProxyConfig, ProxyFactory, ProxyStrategy};
pub use scoped_proxy::ScopedProxyFactoryBean;
pub use target::{DynValue, InvocationResult, MethodTable, Target, TargetSource};

// 导出 inventory 供注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{Advice, MethodInterceptor};
    pub use crate::advisor::{Advisor, DefaultPointcutAdvisor};
    pub use crate::aspectj::annotations::*;
    pub use crate::error::{AopError, AopResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::invocation::MethodInvocation;
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::pointcut::{ClassView, Pointcut};
    pub use crate::proxy::{AopContext, Proxy, ProxyFactory};
    pub use crate::target::{as_target, into_bean, DynValue, InvocationResult, MethodTable, Target};
}

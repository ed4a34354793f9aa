//! 通知器（Advisor）= 切点 + 通知
//!
//! 三种通知器：
//! - 切点通知器：类型过滤器和方法匹配器都通过时生效
//! - 引入通知器：只看类型过滤器，与方法无关
//! - 其他通知器：无条件生效
//!
//! 通知器加入代理配置后不再修改，需要变化时整体替换。

use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::ClassSource;
use chimera_core::order::LOWEST_PRECEDENCE;
use dashmap::DashMap;

use crate::advice::{Advice, IntroductionInterceptor};
use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;
use crate::pointcut::{ClassFilter, Pointcut, TrueClassFilter, TruePointcut};
use crate::target::{target_identity, InstantiationRegistry, InvocationResult, Target};

pub trait Advisor: Send + Sync {
    fn advice(&self) -> &Advice;

    /// 切点通知器返回切点
    fn pointcut(&self) -> Option<Arc<dyn Pointcut>> {
        None
    }

    /// 引入通知器返回自身
    fn introduction(&self) -> Option<&dyn IntroductionAdvisor> {
        None
    }

    /// 每个被通知对象是否需要单独的通知实例
    fn is_per_instance(&self) -> bool {
        true
    }

    /// 多个通知器作用于同一连接点时的顺序，值越小越靠外
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    fn description(&self) -> String {
        format!("Advisor [{}]", self.advice().kind())
    }
}

impl fmt::Debug for dyn Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

pub trait IntroductionAdvisor: Send + Sync {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn interfaces(&self) -> Vec<String>;

    /// 引入的类型必须是接口（未知的类型不检查）
    fn validate_interfaces(&self, source: &dyn ClassSource) -> AopResult<()> {
        for interface in self.interfaces() {
            if let Some(def) = source.find_class(&interface) {
                if !def.is_interface() {
                    return Err(AopError::NotAnInterface(interface));
                }
            }
        }
        Ok(())
    }
}

/// 切点 + 通知
#[derive(Clone)]
pub struct DefaultPointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: i32,
}

impl DefaultPointcutAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: LOWEST_PRECEDENCE,
        }
    }

    /// 匹配所有方法
    pub fn for_advice(advice: Advice) -> Self {
        Self::new(Arc::new(TruePointcut), advice)
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn pointcut(&self) -> Option<Arc<dyn Pointcut>> {
        Some(Arc::clone(&self.pointcut))
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn description(&self) -> String {
        format!("DefaultPointcutAdvisor: advice [{}]", self.advice.kind())
    }
}

/// 引入通知器
#[derive(Clone)]
pub struct DefaultIntroductionAdvisor {
    advice: Advice,
    interfaces: Vec<String>,
    class_filter: Arc<dyn ClassFilter>,
    order: i32,
}

impl DefaultIntroductionAdvisor {
    /// 引入拦截器声明的所有接口
    pub fn new(interceptor: Arc<dyn IntroductionInterceptor>) -> Self {
        let interfaces = interceptor.interfaces();
        Self {
            advice: Advice::Introduction(interceptor),
            interfaces,
            class_filter: Arc::new(TrueClassFilter),
            order: LOWEST_PRECEDENCE,
        }
    }

    /// 只引入指定的接口
    pub fn with_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl Advisor for DefaultIntroductionAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn introduction(&self) -> Option<&dyn IntroductionAdvisor> {
        Some(self)
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn description(&self) -> String {
        format!("DefaultIntroductionAdvisor: interfaces {:?}", self.interfaces)
    }
}

impl IntroductionAdvisor for DefaultIntroductionAdvisor {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }
}

fn is_introduced(interfaces: &[String], invocation: &MethodInvocation) -> bool {
    interfaces
        .iter()
        .any(|i| *i == invocation.method().declaring_class)
}

/// 所有被通知对象共享同一个委托对象
pub struct DelegatingIntroductionInterceptor {
    delegate: Arc<dyn Target>,
    interfaces: Vec<String>,
}

impl DelegatingIntroductionInterceptor {
    pub fn new(delegate: Arc<dyn Target>, interfaces: Vec<String>) -> Self {
        Self { delegate, interfaces }
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        if is_introduced(&self.interfaces, invocation) {
            return self
                .delegate
                .invoke(invocation.method(), invocation.arguments());
        }
        invocation.proceed()
    }

    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }
}

type DelegateFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Target>> + Send + Sync>;

/// 每个被通知对象拥有自己的委托对象
///
/// 委托对象在该对象第一次调用引入的方法时创建
pub struct DelegatePerTargetObjectIntroductionInterceptor {
    interfaces: Vec<String>,
    factory: DelegateFactory,
    delegates: DashMap<usize, Arc<dyn Target>>,
}

impl DelegatePerTargetObjectIntroductionInterceptor {
    pub fn new<F>(interfaces: Vec<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Target>> + Send + Sync + 'static,
    {
        Self {
            interfaces,
            factory: Arc::new(factory),
            delegates: DashMap::new(),
        }
    }

    /// 委托对象由实现类型的实例化函数创建
    pub fn for_implementation(
        implementation: impl Into<String>,
        interfaces: Vec<String>,
        instantiations: Arc<InstantiationRegistry>,
    ) -> Self {
        let implementation = implementation.into();
        Self::new(interfaces, move || {
            instantiations
                .instantiate(&implementation)
                .map_err(anyhow::Error::from)
        })
    }

    fn delegate_for(&self, key: usize) -> anyhow::Result<Arc<dyn Target>> {
        if let Some(delegate) = self.delegates.get(&key) {
            return Ok(Arc::clone(delegate.value()));
        }
        let created = (self.factory)()?;
        let delegate = self.delegates.entry(key).or_insert(created);
        Ok(Arc::clone(delegate.value()))
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }
}

impl IntroductionInterceptor for DelegatePerTargetObjectIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        if !is_introduced(&self.interfaces, invocation) {
            return invocation.proceed();
        }
        let key = invocation.target().map(target_identity).unwrap_or(0);
        let delegate = self.delegate_for(key)?;
        delegate.invoke(invocation.method(), invocation.arguments())
    }

    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }
}

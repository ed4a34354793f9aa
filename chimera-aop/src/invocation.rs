//! 方法调用
//!
//! `MethodInvocation` 是调用链上的游标：每次 `proceed()` 执行下一个拦截器，
//! 走到链尾时调用目标方法。动态匹配单元在轮到它时才按实际参数决定是否执行。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::ClassSource;
use chimera_core::{ClassDef, MethodDef};

use crate::advice::MethodInterceptor;
use crate::error::AopError;
use crate::joinpoint::JoinPoint;
use crate::pointcut::{ClassView, MethodMatcher};
use crate::target::{DynValue, InvocationResult, Target};

/// 拦截器 + 动态方法匹配器
///
/// 匹配决定推迟到调用时，每次调用都重新计算，从不缓存
pub struct InterceptorAndDynamicMethodMatcher {
    pub interceptor: Arc<dyn MethodInterceptor>,
    pub matcher: Arc<dyn MethodMatcher>,
}

impl InterceptorAndDynamicMethodMatcher {
    pub fn new(interceptor: Arc<dyn MethodInterceptor>, matcher: Arc<dyn MethodMatcher>) -> Self {
        Self { interceptor, matcher }
    }
}

/// 调用链中的一个单元
#[derive(Clone)]
pub enum ChainElement {
    Interceptor(Arc<dyn MethodInterceptor>),
    Dynamic(Arc<InterceptorAndDynamicMethodMatcher>),
}

impl ChainElement {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic(_))
    }

    /// 被包装的拦截器
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor(interceptor) => interceptor,
            ChainElement::Dynamic(dynamic) => &dynamic.interceptor,
        }
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor(_) => f.write_str("Interceptor"),
            ChainElement::Dynamic(_) => f.write_str("InterceptorAndDynamicMethodMatcher"),
        }
    }
}

/// 某个方法的完整调用链
pub type InterceptorChain = Arc<Vec<ChainElement>>;

#[derive(Clone)]
pub struct MethodInvocation {
    proxy_class: String,
    target: Option<Arc<dyn Target>>,
    method: Arc<MethodDef>,
    args: Vec<DynValue>,
    target_class: Arc<ClassDef>,
    class_source: Arc<dyn ClassSource>,
    chain: InterceptorChain,
    index: usize,
    attributes: HashMap<String, DynValue>,
}

impl MethodInvocation {
    pub fn new(
        target: Option<Arc<dyn Target>>,
        method: Arc<MethodDef>,
        args: Vec<DynValue>,
        target_class: Arc<ClassDef>,
        class_source: Arc<dyn ClassSource>,
        chain: InterceptorChain,
    ) -> Self {
        Self {
            proxy_class: target_class.name.clone(),
            target,
            method,
            args,
            target_class,
            class_source,
            chain,
            index: 0,
            attributes: HashMap::new(),
        }
    }

    pub fn with_proxy_class(mut self, proxy_class: impl Into<String>) -> Self {
        self.proxy_class = proxy_class.into();
        self
    }

    pub fn method(&self) -> &MethodDef {
        &self.method
    }

    pub fn method_arc(&self) -> &Arc<MethodDef> {
        &self.method
    }

    pub fn arguments(&self) -> &[DynValue] {
        &self.args
    }

    /// 替换参数，后续的拦截器和目标方法看到新参数
    pub fn set_arguments(&mut self, args: Vec<DynValue>) {
        self.args = args;
    }

    pub fn target(&self) -> Option<&Arc<dyn Target>> {
        self.target.as_ref()
    }

    pub fn target_class(&self) -> &ClassDef {
        &self.target_class
    }

    pub fn proxy_class(&self) -> &str {
        &self.proxy_class
    }

    pub fn class_view(&self) -> ClassView<'_> {
        ClassView::new(&self.target_class, &*self.class_source)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: DynValue) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&DynValue> {
        self.attributes.get(key)
    }

    /// 当前位置（已经进入的链单元数量）
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// 执行链上的下一个单元，链尾调用目标方法
    pub fn proceed(&mut self) -> InvocationResult {
        let Some(element) = self.chain.get(self.index).cloned() else {
            return self.invoke_join_point();
        };
        self.index += 1;

        match element {
            ChainElement::Interceptor(interceptor) => interceptor.invoke(self),
            ChainElement::Dynamic(dynamic) => {
                let matched = dynamic
                    .matcher
                    .matches_runtime(&self.method, self.class_view(), &self.args);
                if matched {
                    dynamic.interceptor.invoke(self)
                } else {
                    tracing::trace!(
                        "Dynamic match failed for {} at chain position {}, skipping interceptor",
                        self.method.name,
                        self.index - 1
                    );
                    self.proceed()
                }
            }
        }
    }

    /// 从当前位置继续的独立副本（环绕通知可以多次 proceed）
    pub fn invocable_clone(&self) -> Self {
        self.clone()
    }

    /// 当前状态的连接点快照
    pub fn join_point(&self) -> JoinPoint {
        JoinPoint::new(
            self.target_class.name.clone(),
            self.proxy_class.clone(),
            Arc::clone(&self.method),
            self.args.clone(),
            self.target.clone(),
        )
    }

    fn invoke_join_point(&self) -> InvocationResult {
        match &self.target {
            Some(target) => target.invoke(&self.method, &self.args),
            None => Err(AopError::NoTarget(self.method.to_string()).into()),
        }
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.to_string())
            .field("target_class", &self.target_class.name)
            .field("args", &self.args.len())
            .field("index", &self.index)
            .field("chain", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::DynamicMethodMatcherPointcut;
    use crate::pointcut::Pointcut;
    use crate::target::MethodTable;
    use chimera_core::ClassRegistry;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn MethodInterceptor> {
        let log = Arc::clone(log);
        Arc::new(move |invocation: &mut MethodInvocation| {
            log.lock().push(format!("{}>", name));
            let result = invocation.proceed();
            log.lock().push(format!("<{}", name));
            result
        })
    }

    fn invocation(chain: Vec<ChainElement>, args: Vec<DynValue>) -> MethodInvocation {
        let target: Arc<dyn Target> = Arc::new(
            MethodTable::new("app::Echo").method("echo", |args| Ok(args.first().cloned())),
        );
        MethodInvocation::new(
            Some(target),
            Arc::new(MethodDef::new("echo").declared_by("app::Echo")),
            args,
            Arc::new(ClassDef::new("app::Echo")),
            Arc::new(ClassRegistry::new()),
            Arc::new(chain),
        )
    }

    #[test]
    fn test_chain_runs_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            ChainElement::Interceptor(recording(&log, "a")),
            ChainElement::Interceptor(recording(&log, "b")),
        ];
        let result = invocation(chain, vec![Arc::new(7_i32)]).proceed().unwrap().unwrap();
        assert_eq!(*result.downcast_ref::<i32>().unwrap(), 7);
        assert_eq!(*log.lock(), vec!["a>", "b>", "<b", "<a"]);
    }

    #[test]
    fn test_argument_replacement_reaches_target() {
        let replace: Arc<dyn MethodInterceptor> = Arc::new(|invocation: &mut MethodInvocation| {
            invocation.set_arguments(vec![Arc::new(99_i32)]);
            invocation.proceed()
        });
        let result = invocation(vec![ChainElement::Interceptor(replace)], vec![Arc::new(1_i32)])
            .proceed()
            .unwrap()
            .unwrap();
        assert_eq!(*result.downcast_ref::<i32>().unwrap(), 99);
    }

    #[test]
    fn test_dynamic_element_evaluated_per_invocation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pointcut = DynamicMethodMatcherPointcut::new(|_, _, args| {
            args.first()
                .and_then(|a| a.downcast_ref::<i32>())
                .is_some_and(|v| *v > 0)
        });
        let chain = vec![ChainElement::Dynamic(Arc::new(InterceptorAndDynamicMethodMatcher::new(
            recording(&log, "dyn"),
            pointcut.method_matcher(),
        )))];

        invocation(chain.clone(), vec![Arc::new(1_i32)]).proceed().unwrap();
        invocation(chain, vec![Arc::new(-1_i32)]).proceed().unwrap();
        assert_eq!(*log.lock(), vec!["dyn>", "<dyn"]);
    }

    #[test]
    fn test_target_error_passes_through_unchanged() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let target: Arc<dyn Target> =
            Arc::new(MethodTable::new("app::Bomb").method("explode", |_| Err(Boom.into())));
        let passthrough: Arc<dyn MethodInterceptor> =
            Arc::new(|invocation: &mut MethodInvocation| invocation.proceed());
        let mut invocation = MethodInvocation::new(
            Some(target),
            Arc::new(MethodDef::new("explode")),
            Vec::new(),
            Arc::new(ClassDef::new("app::Bomb")),
            Arc::new(ClassRegistry::new()),
            Arc::new(vec![ChainElement::Interceptor(passthrough)]),
        );
        let error = invocation.proceed().unwrap_err();
        assert!(error.downcast_ref::<Boom>().is_some());
    }
}

//! 通知器调用链工厂
//!
//! 对一个方法和目标类型计算需要执行的拦截器列表，顺序与通知器声明顺序一致，
//! 先声明的在最外层。

use std::sync::Arc;

use chimera_core::metadata::MethodKey;
use chimera_core::{ClassDef, MethodDef};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::advice::MethodInterceptor;
use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::invocation::{ChainElement, InterceptorAndDynamicMethodMatcher, InterceptorChain};
use crate::pointcut::ClassView;
use crate::proxy::AdvisedSupport;

pub trait AdvisorChainFactory: Send + Sync {
    /// `target_class` 为 `None` 时使用方法的声明类型
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &MethodDef,
        target_class: Option<&str>,
    ) -> AopResult<InterceptorChain>;
}

/// 每次调用都重新计算，不做缓存
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAdvisorChainFactory;

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &MethodDef,
        target_class: Option<&str>,
    ) -> AopResult<InterceptorChain> {
        let registry = config.adapter_registry();
        let source = config.class_source();
        let class_name = target_class.unwrap_or(&method.declaring_class);
        let class_def = source
            .find_class(class_name)
            .unwrap_or_else(|| Arc::new(ClassDef::new(class_name)));
        let class = ClassView::new(&class_def, &**source);

        let advisors = config.advisors();
        let mut chain: Vec<ChainElement> = Vec::with_capacity(advisors.len());
        // 只在本次计算内缓存
        let mut has_introductions: Option<bool> = None;

        for advisor in advisors {
            if let Some(pointcut) = advisor.pointcut() {
                if !config.is_pre_filtered() && !pointcut.class_filter().matches(class) {
                    continue;
                }
                let matcher = pointcut.method_matcher();
                let matched = if matcher.is_introduction_aware() {
                    let has = *has_introductions
                        .get_or_insert_with(|| has_matching_introductions(advisors, class));
                    matcher.matches_with_introductions(method, class, has)
                } else {
                    matcher.matches(method, class)
                };
                if !matched {
                    continue;
                }
                let interceptors = registry.interceptors(&**advisor)?;
                if matcher.is_runtime() {
                    chain.extend(interceptors.into_iter().map(|interceptor| {
                        ChainElement::Dynamic(Arc::new(InterceptorAndDynamicMethodMatcher::new(
                            interceptor,
                            Arc::clone(&matcher),
                        )))
                    }));
                } else {
                    chain.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                }
            } else if let Some(introduction) = advisor.introduction() {
                if config.is_pre_filtered() || introduction.class_filter().matches(class) {
                    let interceptors = registry.interceptors(&**advisor)?;
                    chain.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                }
            } else {
                let interceptors: Vec<Arc<dyn MethodInterceptor>> = registry.interceptors(&**advisor)?;
                chain.extend(interceptors.into_iter().map(ChainElement::Interceptor));
            }
        }

        tracing::trace!(
            "Computed chain of {} element(s) for {} on '{}'",
            chain.len(),
            method,
            class_name
        );
        Ok(Arc::new(chain))
    }
}

fn has_matching_introductions(advisors: &[Arc<dyn Advisor>], class: ClassView<'_>) -> bool {
    advisors
        .iter()
        .filter_map(|advisor| advisor.introduction())
        .any(|introduction| introduction.class_filter().matches(class))
}

type ChainKey = (MethodKey, String, u64);

/// 按 (方法, 目标类型, 配置版本) 缓存调用链
///
/// 配置每次修改都会产生新版本，旧版本的条目在下次填充时清除。
/// 动态匹配单元本身仍然每次调用都重新判断。
pub struct CachingAdvisorChainFactory {
    delegate: Arc<dyn AdvisorChainFactory>,
    cache: DashMap<ChainKey, InterceptorChain>,
    populate: Mutex<()>,
}

impl Default for CachingAdvisorChainFactory {
    fn default() -> Self {
        Self::new(Arc::new(DefaultAdvisorChainFactory))
    }
}

impl CachingAdvisorChainFactory {
    pub fn new(delegate: Arc<dyn AdvisorChainFactory>) -> Self {
        Self {
            delegate,
            cache: DashMap::new(),
            populate: Mutex::new(()),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl AdvisorChainFactory for CachingAdvisorChainFactory {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &MethodDef,
        target_class: Option<&str>,
    ) -> AopResult<InterceptorChain> {
        let version = config.version();
        let key: ChainKey = (
            method.key(),
            target_class.unwrap_or(&method.declaring_class).to_string(),
            version,
        );
        if let Some(chain) = self.cache.get(&key) {
            return Ok(Arc::clone(chain.value()));
        }

        let _guard = self.populate.lock();
        if let Some(chain) = self.cache.get(&key) {
            return Ok(Arc::clone(chain.value()));
        }
        let chain = self
            .delegate
            .interceptors_and_dynamic_advice(config, method, target_class)?;
        self.cache.retain(|(_, _, v), _| *v == version);
        self.cache.insert(key, Arc::clone(&chain));
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor, DelegatingIntroductionInterceptor};
    use crate::invocation::MethodInvocation;
    use crate::pointcut::{DynamicMethodMatcherPointcut, NameMatchMethodPointcut, TypePattern, TypePatternClassFilter};
    use crate::target::{MethodTable, Target};
    use chimera_core::metadata::ClassSource;
    use chimera_core::ClassRegistry;

    fn passthrough() -> Advice {
        Advice::around(|invocation| invocation.proceed())
    }

    fn config(advisors: Vec<Arc<dyn Advisor>>) -> AdvisedSupport {
        let registry = ClassRegistry::new();
        registry.register(
            ClassDef::new("app::OrderService")
                .method(MethodDef::new("place"))
                .method(MethodDef::new("cancel")),
        );
        let source: Arc<dyn ClassSource> = Arc::new(registry);
        let mut config = AdvisedSupport::new(source);
        for advisor in advisors {
            config.add_advisor(advisor).unwrap();
        }
        config
    }

    fn place() -> MethodDef {
        MethodDef::new("place").declared_by("app::OrderService")
    }

    #[test]
    fn test_static_and_dynamic_elements() {
        let static_advisor = DefaultPointcutAdvisor::new(
            Arc::new(NameMatchMethodPointcut::with_names(["place"])),
            passthrough(),
        );
        let dynamic_advisor = DefaultPointcutAdvisor::new(
            Arc::new(DynamicMethodMatcherPointcut::new(|_, _, args| !args.is_empty())),
            passthrough(),
        );
        let config = config(vec![Arc::new(static_advisor), Arc::new(dynamic_advisor)]);

        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&config, &place(), Some("app::OrderService"))
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert!(!chain[0].is_dynamic());
        assert!(chain[1].is_dynamic());

        let cancel = MethodDef::new("cancel").declared_by("app::OrderService");
        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&config, &cancel, None)
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_dynamic());
    }

    #[test]
    fn test_class_filter_and_pre_filtered() {
        let advisor = DefaultPointcutAdvisor::new(
            Arc::new(
                crate::pointcut::ComposablePointcut::from_class_filter(Arc::new(TypePatternClassFilter::new(
                    TypePattern::new("other::*").unwrap(),
                ))),
            ),
            passthrough(),
        );
        let mut config = config(vec![Arc::new(advisor)]);
        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        assert!(chain.is_empty());

        config.set_pre_filtered(true);
        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_introductions_and_generic_advisors_included() {
        struct GenericAdvisor(Advice);

        impl Advisor for GenericAdvisor {
            fn advice(&self) -> &Advice {
                &self.0
            }
        }

        let delegate: Arc<dyn Target> = Arc::new(MethodTable::new("app::AuditImpl"));
        let introduction = DefaultIntroductionAdvisor::new(Arc::new(DelegatingIntroductionInterceptor::new(
            delegate,
            vec!["app::Auditable".to_string()],
        )));
        let config = config(vec![
            Arc::new(introduction),
            Arc::new(GenericAdvisor(passthrough())),
        ]);
        let chain = DefaultAdvisorChainFactory
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_caching_factory_prunes_stale_versions() {
        let caching = CachingAdvisorChainFactory::default();
        let mut config = config(vec![Arc::new(DefaultPointcutAdvisor::for_advice(passthrough()))]);

        let first = caching
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        let again = caching
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        config
            .add_advisor(Arc::new(DefaultPointcutAdvisor::for_advice(passthrough())))
            .unwrap();
        let updated = caching
            .interceptors_and_dynamic_advice(&config, &place(), None)
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert_eq!(caching.cached_entries(), 1);
    }
}

//! 自动代理
//!
//! `@EnableAspectJAutoProxy` 导入 `AspectJAutoProxyRegistrar`，后者注册
//! `AnnotationAwareAspectJAutoProxyCreator`。这个后置处理器在 Bean 初始化之后
//! 查找容器中的 `@Aspect` Bean，为切点匹配的 Bean 创建代理。

use std::fmt;
use std::sync::{Arc, Weak};

use chimera_core::config_class::{
    ImportBeanDefinitionRegistrar, ImportComponent, ImportComponentRegistration, ImportContext,
};
use chimera_core::metadata::class_registry::all_interfaces_in;
use chimera_core::metadata::{AnnotationMetadata, ClassSource};
use chimera_core::order::HIGHEST_PRECEDENCE;
use chimera_core::{
    BeanDefinition, BeanDefinitionRegistry, BeanFactory, BeanPostProcessor, ClassDef, ClassRegistry,
    ContainerError, ContainerResult, ContainerSettings, CreationContext, DefaultListableBeanFactory, DynBean,
    PostProcessorBean, Role, SupplierRegistration, BEAN_POST_PROCESSOR_ATTRIBUTE,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;

use crate::advisor::Advisor;
use crate::aspectj::annotations::{attributes, ASPECTJ_AUTO_PROXY_REGISTRAR, ENABLE_ASPECTJ_AUTO_PROXY};
use crate::aspectj::{
    AspectInstanceFactory, AspectMetadata, BeanFactoryAspectInstanceFactory, PerClauseKind, ProxyCreationContext,
    ReflectiveAspectJAdvisorFactory,
};
use crate::error::{AopError, AopResult};
use crate::pointcut::{ClassView, Pointcut};
use crate::proxy::{DefaultAopProxyFactory, Proxy, ProxyConfig, ProxyFactory, ADVISED, FRAMEWORK_PROXY};
use crate::target::{as_target, Target};

/// 自动代理创建器的 Bean 名称
pub const AUTO_PROXY_CREATOR_BEAN_NAME: &str = "chimera.aop.internalAutoProxyCreator";

/// 自动代理创建器的类型名称
pub const AUTO_PROXY_CREATOR_CLASS: &str = "chimera::aop::AnnotationAwareAspectJAutoProxyCreator";

/// 定义属性：逗号分隔的切面 Bean 名称正则
pub const INCLUDE_PATTERNS_ATTRIBUTE: &str = "includePatterns";

/// 框架自身的类型不会被自动代理
const INFRASTRUCTURE_PREFIX: &str = "chimera::aop::";

/// 通知器与目标类型的匹配
pub struct AopUtils;

impl AopUtils {
    /// 通知器能否作用于类型的某个方法
    pub fn can_apply(advisor: &dyn Advisor, class: ClassView<'_>, has_introductions: bool) -> bool {
        if let Some(introduction) = advisor.introduction() {
            return introduction.class_filter().matches(class);
        }
        match advisor.pointcut() {
            Some(pointcut) => Self::can_apply_pointcut(&*pointcut, class, has_introductions),
            None => true,
        }
    }

    pub fn can_apply_pointcut(pointcut: &dyn Pointcut, class: ClassView<'_>, has_introductions: bool) -> bool {
        if !pointcut.class_filter().matches(class) {
            return false;
        }
        let matcher = pointcut.method_matcher();
        if matcher.matches_all() {
            return true;
        }
        let introduction_aware = matcher.is_introduction_aware();
        class.all_methods().iter().any(|method| {
            if introduction_aware {
                matcher.matches_with_introductions(method, class, has_introductions)
            } else {
                matcher.matches(method, class)
            }
        })
    }

    /// 筛选出能作用于类型的通知器，保持候选顺序
    ///
    /// 先判断引入，再带着"是否有引入"判断其余通知器
    pub fn find_advisors_that_can_apply(
        candidates: &[Arc<dyn Advisor>],
        class: ClassView<'_>,
    ) -> Vec<Arc<dyn Advisor>> {
        let mut eligible: Vec<Arc<dyn Advisor>> = candidates
            .iter()
            .filter(|advisor| advisor.introduction().is_some() && Self::can_apply(advisor.as_ref(), class, false))
            .cloned()
            .collect();
        let has_introductions = !eligible.is_empty();
        for advisor in candidates {
            if advisor.introduction().is_some() {
                continue;
            }
            if Self::can_apply(advisor.as_ref(), class, has_introductions) {
                eligible.push(Arc::clone(advisor));
            }
        }
        eligible
    }

    pub fn is_aop_proxy(bean: &DynBean) -> bool {
        bean.is::<Proxy>()
    }
}

/// 通过 Bean 工厂查找类型描述
pub struct BeanFactoryClassSource {
    factory: Weak<dyn BeanFactory>,
}

impl BeanFactoryClassSource {
    pub fn new(factory: &Arc<dyn BeanFactory>) -> Self {
        Self {
            factory: Arc::downgrade(factory),
        }
    }
}

impl ClassSource for BeanFactoryClassSource {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.factory.upgrade().and_then(|factory| factory.find_class(name))
    }
}

/// 从容器中的 `@Aspect` Bean 构建通知器
///
/// 单例切面 Bean 的通知器只构建一次；原型切面 Bean 缓存实例工厂，
/// 每次构建新的通知器（每个代理各自持有切面实例）。
pub struct BeanFactoryAspectJAdvisorsBuilder {
    factory: Weak<dyn BeanFactory>,
    advisor_factory: Arc<ReflectiveAspectJAdvisorFactory>,
    include_patterns: RwLock<Vec<Regex>>,
    aspect_bean_names: RwLock<Option<Vec<String>>>,
    discovery: Mutex<()>,
    advisors_cache: DashMap<String, Vec<Arc<dyn Advisor>>>,
    factory_cache: DashMap<String, Arc<dyn AspectInstanceFactory>>,
}

impl BeanFactoryAspectJAdvisorsBuilder {
    pub fn new(factory: &Arc<dyn BeanFactory>, advisor_factory: Arc<ReflectiveAspectJAdvisorFactory>) -> Self {
        Self {
            factory: Arc::downgrade(factory),
            advisor_factory,
            include_patterns: RwLock::new(Vec::new()),
            aspect_bean_names: RwLock::new(None),
            discovery: Mutex::new(()),
            advisors_cache: DashMap::new(),
            factory_cache: DashMap::new(),
        }
    }

    /// 只有名称完整匹配其中一个正则的切面 Bean 才参与，空列表表示全部
    pub fn set_include_patterns<I, S>(&self, patterns: I) -> AopResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| AopError::IllegalState(format!("Invalid include pattern '{}': {}", pattern, e)))?;
            compiled.push(regex);
        }
        *self.include_patterns.write() = compiled;
        Ok(())
    }

    pub fn is_eligible_bean(&self, bean_name: &str) -> bool {
        let patterns = self.include_patterns.read();
        patterns.is_empty() || patterns.iter().any(|p| p.is_match(bean_name))
    }

    /// 已发现的切面 Bean 名称（尚未发现时为 `None`）
    pub fn aspect_bean_names(&self) -> Option<Vec<String>> {
        self.aspect_bean_names.read().clone()
    }

    fn bean_factory(&self) -> AopResult<Arc<dyn BeanFactory>> {
        self.factory
            .upgrade()
            .ok_or_else(|| AopError::IllegalState("Bean factory is no longer available".to_string()))
    }

    /// 所有切面 Bean 贡献的通知器
    pub fn build_aspectj_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let names = match self.aspect_bean_names() {
            Some(names) => names,
            None => {
                let _discovery = self.discovery.lock();
                if self.aspect_bean_names.read().is_none() {
                    let (names, advisors) = self.discover()?;
                    *self.aspect_bean_names.write() = Some(names);
                    return Ok(advisors);
                }
                self.aspect_bean_names().unwrap_or_default()
            }
        };

        let mut advisors = Vec::new();
        for name in names {
            if let Some(cached) = self.advisors_cache.get(&name) {
                advisors.extend(cached.iter().cloned());
                continue;
            }
            let aspect_factory = self.factory_cache.get(&name).map(|f| Arc::clone(f.value()));
            if let Some(aspect_factory) = aspect_factory {
                advisors.extend(self.advisor_factory.advisors(aspect_factory)?);
            }
        }
        Ok(advisors)
    }

    fn discover(&self) -> AopResult<(Vec<String>, Vec<Arc<dyn Advisor>>)> {
        let factory = self.bean_factory()?;
        let mut names = Vec::new();
        let mut advisors = Vec::new();

        for bean_name in factory.bean_names() {
            if !self.is_eligible_bean(&bean_name) {
                continue;
            }
            let Some(class_name) = factory.get_type(&bean_name) else {
                continue;
            };
            if !self.advisor_factory.is_aspect(&class_name) {
                continue;
            }

            let metadata = AspectMetadata::new(&class_name, &bean_name, &**self.advisor_factory.class_source())?;
            if metadata.per_clause_kind() == PerClauseKind::Singleton {
                let aspect_factory: Arc<dyn AspectInstanceFactory> =
                    Arc::new(BeanFactoryAspectInstanceFactory::new(&factory, &bean_name, metadata));
                let contributed = self.advisor_factory.advisors(Arc::clone(&aspect_factory))?;
                if factory.is_singleton(&bean_name)? {
                    self.advisors_cache.insert(bean_name.clone(), contributed.clone());
                } else {
                    self.factory_cache.insert(bean_name.clone(), aspect_factory);
                }
                advisors.extend(contributed);
            } else {
                if factory.is_singleton(&bean_name)? {
                    return Err(AopError::AspectInstantiationModel(bean_name));
                }
                let aspect_factory: Arc<dyn AspectInstanceFactory> =
                    Arc::new(BeanFactoryAspectInstanceFactory::prototype(&factory, &bean_name, metadata)?);
                self.factory_cache.insert(bean_name.clone(), Arc::clone(&aspect_factory));
                advisors.extend(self.advisor_factory.advisors(aspect_factory)?);
            }
            tracing::debug!("Found aspect bean '{}' ({})", bean_name, class_name);
            names.push(bean_name);
        }

        tracing::info!("Discovered {} aspect bean(s) contributing {} advisor(s)", names.len(), advisors.len());
        Ok((names, advisors))
    }
}

/// 按 `@Aspect` Bean 自动创建代理的后置处理器
pub struct AnnotationAwareAspectJAutoProxyCreator {
    class_source: Arc<dyn ClassSource>,
    class_registry: Option<Arc<ClassRegistry>>,
    advisor_factory: Arc<ReflectiveAspectJAdvisorFactory>,
    advisors_builder: BeanFactoryAspectJAdvisorsBuilder,
    advisors: RwLock<Vec<Arc<dyn Advisor>>>,
    config: RwLock<ProxyConfig>,
    proxied_beans: DashMap<String, bool>,
}

impl AnnotationAwareAspectJAutoProxyCreator {
    pub fn new(factory: &Arc<dyn BeanFactory>) -> Self {
        let class_source: Arc<dyn ClassSource> = Arc::new(BeanFactoryClassSource::new(factory));
        let class_registry = factory
            .class_metadata()
            .map(|metadata| Arc::clone(metadata.class_registry()));
        let advisor_factory = Arc::new(ReflectiveAspectJAdvisorFactory::new(Arc::clone(&class_source)));
        let advisors_builder = BeanFactoryAspectJAdvisorsBuilder::new(factory, Arc::clone(&advisor_factory));
        Self {
            class_source,
            class_registry,
            advisor_factory,
            advisors_builder,
            advisors: RwLock::new(Vec::new()),
            config: RwLock::new(ProxyConfig::default()),
            proxied_beans: DashMap::new(),
        }
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.config.write().proxy_target_class = value;
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.config.write().expose_proxy = value;
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        *self.config.read()
    }

    pub fn set_include_patterns<I, S>(&self, patterns: I) -> AopResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.advisors_builder.set_include_patterns(patterns)
    }

    /// 除切面之外额外参与匹配的通知器
    pub fn add_advisor(&self, advisor: Arc<dyn Advisor>) {
        self.advisors.write().push(advisor);
    }

    pub fn advisors_builder(&self) -> &BeanFactoryAspectJAdvisorsBuilder {
        &self.advisors_builder
    }

    /// 是否已经为该 Bean 创建过代理
    pub fn is_proxied(&self, bean_name: &str) -> bool {
        self.proxied_beans.get(bean_name).is_some_and(|v| *v)
    }

    fn is_infrastructure_class(&self, class_name: &str) -> bool {
        class_name.starts_with(INFRASTRUCTURE_PREFIX) || self.advisor_factory.is_aspect(class_name)
    }

    /// 候选通知器：手动添加的在前，切面的在后
    pub fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let mut candidates = self.advisors.read().clone();
        candidates.extend(self.advisors_builder.build_aspectj_advisors()?);
        Ok(candidates)
    }

    /// 作用于该 Bean 的通知器，按 order 稳定排序
    pub fn find_eligible_advisors(&self, bean_name: &str, class: &ClassDef) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let candidates = self.find_candidate_advisors()?;
        let mut eligible = {
            let _context = ProxyCreationContext::enter(bean_name);
            AopUtils::find_advisors_that_can_apply(&candidates, ClassView::new(class, &*self.class_source))
        };
        eligible.sort_by_key(|advisor| advisor.order());
        Ok(eligible)
    }

    fn create_proxy(
        &self,
        bean_name: &str,
        target: Arc<dyn Target>,
        advisors: Vec<Arc<dyn Advisor>>,
    ) -> AopResult<Arc<Proxy>> {
        let config = self.proxy_config();
        let mut proxy_factory = ProxyFactory::new(Arc::clone(&self.class_source));
        if let Some(registry) = &self.class_registry {
            proxy_factory =
                proxy_factory.with_aop_proxy_factory(DefaultAopProxyFactory::new().with_class_registry(Arc::clone(registry)));
        }
        proxy_factory.set_expose_proxy(config.expose_proxy);

        if config.proxy_target_class {
            proxy_factory.set_proxy_target_class(true);
        } else {
            let interfaces: Vec<String> = all_interfaces_in(&*self.class_source, target.target_class())
                .into_iter()
                .filter(|i| i != FRAMEWORK_PROXY && i != ADVISED)
                .collect();
            if interfaces.is_empty() {
                proxy_factory.set_proxy_target_class(true);
            }
            for interface in interfaces {
                proxy_factory.add_interface(interface);
            }
        }

        proxy_factory.set_target(target);
        proxy_factory.advised_mut().set_pre_filtered(true);
        for advisor in advisors {
            proxy_factory.add_advisor(advisor)?;
        }
        let proxy = proxy_factory.get_proxy()?;
        tracing::debug!("Created {:?} proxy for bean '{}'", proxy.strategy(), bean_name);
        Ok(proxy)
    }

    fn wrap_if_necessary(&self, bean: DynBean, bean_name: &str) -> AopResult<DynBean> {
        if AopUtils::is_aop_proxy(&bean) {
            return Ok(bean);
        }
        let Some(target) = as_target(&bean) else {
            return Ok(bean);
        };
        let class_name = target.target_class().to_string();
        if self.is_infrastructure_class(&class_name) {
            tracing::trace!("Skipping infrastructure bean '{}' ({})", bean_name, class_name);
            self.proxied_beans.insert(bean_name.to_string(), false);
            return Ok(bean);
        }
        let Some(class) = self.class_source.find_class(&class_name) else {
            tracing::trace!("No type description for bean '{}' ({})", bean_name, class_name);
            return Ok(bean);
        };

        let advisors = self.find_eligible_advisors(bean_name, &class)?;
        if advisors.is_empty() {
            self.proxied_beans.insert(bean_name.to_string(), false);
            return Ok(bean);
        }
        let proxy = self.create_proxy(bean_name, target, advisors)?;
        self.proxied_beans.insert(bean_name.to_string(), true);
        Ok(proxy as DynBean)
    }
}

impl fmt::Debug for AnnotationAwareAspectJAutoProxyCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationAwareAspectJAutoProxyCreator")
            .field("config", &self.proxy_config())
            .field("aspect_beans", &self.advisors_builder.aspect_bean_names())
            .finish()
    }
}

impl BeanPostProcessor for AnnotationAwareAspectJAutoProxyCreator {
    fn post_process_after_initialization(&self, bean: DynBean, bean_name: &str) -> ContainerResult<DynBean> {
        self.wrap_if_necessary(bean, bean_name)
            .map_err(|e| ContainerError::creation(bean_name, e))
    }

    fn name(&self) -> &str {
        "AnnotationAwareAspectJAutoProxyCreator"
    }

    fn order(&self) -> i32 {
        HIGHEST_PRECEDENCE
    }
}

/// 注册自动代理创建器的定义，已存在时不做修改
pub fn register_auto_proxy_creator_if_necessary(registry: &DefaultListableBeanFactory) -> ContainerResult<bool> {
    if registry.contains_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME) {
        return Ok(false);
    }
    let definition = BeanDefinition::for_class(AUTO_PROXY_CREATOR_CLASS)
        .with_role(Role::Infrastructure)
        .with_attribute(BEAN_POST_PROCESSOR_ATTRIBUTE, "true");
    registry.register_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, definition)?;
    tracing::debug!("Registered auto proxy creator '{}'", AUTO_PROXY_CREATOR_BEAN_NAME);
    Ok(true)
}

/// 自动代理一律使用子类代理
pub fn force_auto_proxy_creator_to_use_class_proxying(registry: &DefaultListableBeanFactory) -> ContainerResult<()> {
    registry.modify_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, |definition| {
        definition
            .attributes
            .insert(attributes::PROXY_TARGET_CLASS.to_string(), "true".to_string());
    })
}

pub fn force_auto_proxy_creator_to_expose_proxy(registry: &DefaultListableBeanFactory) -> ContainerResult<()> {
    registry.modify_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, |definition| {
        definition
            .attributes
            .insert(attributes::EXPOSE_PROXY.to_string(), "true".to_string());
    })
}

/// `@EnableAspectJAutoProxy` 导入的注册器
#[derive(Debug, Default, Clone, Copy)]
pub struct AspectJAutoProxyRegistrar;

impl ImportBeanDefinitionRegistrar for AspectJAutoProxyRegistrar {
    fn register_bean_definitions(
        &self,
        importing: &dyn AnnotationMetadata,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()> {
        register_auto_proxy_creator_if_necessary(context.registry)?;

        let settings = ContainerSettings::from_environment(context.environment);
        let enable = importing.annotation_attributes(ENABLE_ASPECTJ_AUTO_PROXY);
        let flag = |name: &str| enable.as_ref().and_then(|a| a.get_bool(name)).unwrap_or(false);

        if flag(attributes::PROXY_TARGET_CLASS) || settings.proxy_target_class {
            force_auto_proxy_creator_to_use_class_proxying(context.registry)?;
        }
        if flag(attributes::EXPOSE_PROXY) {
            force_auto_proxy_creator_to_expose_proxy(context.registry)?;
        }
        Ok(())
    }
}

fn create_auto_proxy_registrar() -> ImportComponent {
    ImportComponent::Registrar(Arc::new(AspectJAutoProxyRegistrar))
}

inventory::submit! {
    ImportComponentRegistration {
        class_name: ASPECTJ_AUTO_PROXY_REGISTRAR,
        create: create_auto_proxy_registrar,
    }
}

fn supply_auto_proxy_creator(ctx: &CreationContext<'_>) -> anyhow::Result<DynBean> {
    let factory = ctx.shared_factory().ok_or_else(|| {
        AopError::IllegalState(format!(
            "Bean '{}' requires a shared bean factory",
            ctx.bean_name
        ))
    })?;
    let creator = AnnotationAwareAspectJAutoProxyCreator::new(&factory);
    let definition = ctx.definition;
    creator.set_proxy_target_class(definition.attribute(attributes::PROXY_TARGET_CLASS) == Some("true"));
    creator.set_expose_proxy(definition.attribute(attributes::EXPOSE_PROXY) == Some("true"));
    if let Some(patterns) = definition.attribute(INCLUDE_PATTERNS_ATTRIBUTE) {
        creator.set_include_patterns(patterns.split(','))?;
    }
    Ok(Arc::new(PostProcessorBean::new(Arc::new(creator))) as DynBean)
}

inventory::submit! {
    SupplierRegistration {
        class_name: AUTO_PROXY_CREATOR_CLASS,
        method: None,
        supply: supply_auto_proxy_creator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor, DelegatingIntroductionInterceptor};
    use crate::aspectj::annotations::{ASPECT, BEFORE};
    use crate::pointcut::{NameMatchMethodPointcut, TypePattern, TypePatternClassFilter};
    use crate::target::MethodTable;
    use chimera_core::{Annotation, MetadataSources, MethodDef, Scope, SupplierKey};
    use pretty_assertions::assert_eq;

    fn registry() -> Arc<ClassRegistry> {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::interface("app::Greeter").method(MethodDef::new("greet")));
        registry.register(ClassDef::interface("app::Audited").method(MethodDef::new("audit")));
        registry.register(
            ClassDef::new("app::EnglishGreeter")
                .implements("app::Greeter")
                .method(MethodDef::new("greet")),
        );
        registry.register(ClassDef::new("app::Clock").method(MethodDef::new("now")));
        registry.register(
            ClassDef::new("app::PerTargetAspect")
                .annotated(Annotation::new(ASPECT).value("pertarget(within(app::*))"))
                .method(MethodDef::new("before").annotated(Annotation::new(BEFORE).value("execution(* greet(..))"))),
        );
        registry
    }

    fn passthrough() -> Advice {
        Advice::around(|inv| inv.proceed())
    }

    #[test]
    fn test_can_apply_checks_class_filter_and_methods() {
        let registry = registry();
        let greeter = registry.find_class("app::EnglishGreeter").unwrap();
        let clock = registry.find_class("app::Clock").unwrap();

        let greet: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::new(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            passthrough(),
        ));
        assert!(AopUtils::can_apply(&*greet, ClassView::new(&greeter, &*registry), false));
        assert!(!AopUtils::can_apply(&*greet, ClassView::new(&clock, &*registry), false));

        let everything: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::for_advice(passthrough()));
        assert!(AopUtils::can_apply(&*everything, ClassView::new(&clock, &*registry), false));
    }

    #[test]
    fn test_find_advisors_puts_introductions_first() {
        let registry = registry();
        let greeter = registry.find_class("app::EnglishGreeter").unwrap();
        let delegate = Arc::new(MethodTable::new("app::DefaultAudited").method("audit", |_| Ok(None)));
        let introduction: Arc<dyn Advisor> = Arc::new(
            DefaultIntroductionAdvisor::new(Arc::new(DelegatingIntroductionInterceptor::new(
                delegate,
                vec!["app::Audited".to_string()],
            )))
            .with_class_filter(Arc::new(TypePatternClassFilter::new(TypePattern::new("app::*").unwrap()))),
        );
        let greet: Arc<dyn Advisor> = Arc::new(DefaultPointcutAdvisor::new(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            passthrough(),
        ));

        let eligible = AopUtils::find_advisors_that_can_apply(
            &[Arc::clone(&greet), Arc::clone(&introduction)],
            ClassView::new(&greeter, &*registry),
        );
        assert_eq!(eligible.len(), 2);
        assert!(eligible[0].introduction().is_some());
        assert!(eligible[1].introduction().is_none());
    }

    #[test]
    fn test_include_patterns_match_whole_name() {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(registry()));
        let shared: Arc<dyn BeanFactory> = factory.clone();
        let advisor_factory = Arc::new(ReflectiveAspectJAdvisorFactory::new(Arc::new(BeanFactoryClassSource::new(
            &shared,
        ))));
        let builder = BeanFactoryAspectJAdvisorsBuilder::new(&shared, advisor_factory);
        assert!(builder.is_eligible_bean("anything"));

        builder.set_include_patterns(["audit.*", "timing"]).unwrap();
        assert!(builder.is_eligible_bean("auditAspect"));
        assert!(builder.is_eligible_bean("timing"));
        assert!(!builder.is_eligible_bean("timingAspect"));
        assert!(builder.set_include_patterns(["("]).is_err());
    }

    #[test]
    fn test_singleton_bean_with_per_target_aspect_is_rejected() {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(registry()));
        factory
            .register_bean_definition("perTargetAspect", BeanDefinition::for_class("app::PerTargetAspect"))
            .unwrap();
        let shared: Arc<dyn BeanFactory> = factory.clone();
        let creator = AnnotationAwareAspectJAutoProxyCreator::new(&shared);
        assert!(matches!(
            creator.find_candidate_advisors(),
            Err(AopError::AspectInstantiationModel(name)) if name == "perTargetAspect"
        ));
    }

    #[test]
    fn test_prototype_per_target_aspect_rebuilds_advisors() {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(registry()));
        factory
            .register_bean_definition(
                "perTargetAspect",
                BeanDefinition::for_class("app::PerTargetAspect").with_scope(Scope::Prototype),
            )
            .unwrap();
        factory.register_supplier(SupplierKey::Bean("perTargetAspect".into()), |_| {
            Ok(Arc::new(MethodTable::new("app::PerTargetAspect").method("before", |_| Ok(None))) as DynBean)
        });
        let shared: Arc<dyn BeanFactory> = factory.clone();
        let creator = AnnotationAwareAspectJAutoProxyCreator::new(&shared);

        let first = creator.find_candidate_advisors().unwrap();
        let second = creator.find_candidate_advisors().unwrap();
        // 合成的实例化通知器 + before 通知
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(!Arc::ptr_eq(&first[1], &second[1]));
        assert_eq!(
            creator.advisors_builder().aspect_bean_names(),
            Some(vec!["perTargetAspect".to_string()])
        );
    }

    #[test]
    fn test_creator_proxies_matching_beans_only() {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(registry()));
        let shared: Arc<dyn BeanFactory> = factory.clone();
        let creator = AnnotationAwareAspectJAutoProxyCreator::new(&shared);
        creator.add_advisor(Arc::new(DefaultPointcutAdvisor::new(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            passthrough(),
        )));

        let greeter: DynBean = Arc::new(MethodTable::new("app::EnglishGreeter").method("greet", |_| Ok(None)));
        let wrapped = creator.post_process_after_initialization(greeter, "greeter").unwrap();
        let proxy = wrapped.downcast::<Proxy>().unwrap();
        assert!(proxy.implements("app::Greeter"));
        assert!(creator.is_proxied("greeter"));

        let clock: DynBean = Arc::new(MethodTable::new("app::Clock").method("now", |_| Ok(None)));
        let unwrapped = creator.post_process_after_initialization(clock, "clock").unwrap();
        assert!(!AopUtils::is_aop_proxy(&unwrapped));
        assert!(!creator.is_proxied("clock"));

        let plain: DynBean = Arc::new(42_u32);
        let untouched = creator.post_process_after_initialization(plain, "answer").unwrap();
        assert!(untouched.is::<u32>());
    }
}

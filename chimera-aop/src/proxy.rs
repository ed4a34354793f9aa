//! 代理
//!
//! - `AdvisedSupport`：代理配置（目标、接口、通知器列表、策略标志），每次修改产生新版本
//! - `DefaultAopProxyFactory`：选择接口代理或子类代理
//! - `Proxy`：按调用链执行方法；向已创建的代理添加通知器时重新绑定到新的配置快照
//! - `ProxyFactory`：编程方式创建代理的入口

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chimera_core::metadata::class_registry::{all_interfaces_in, all_methods_in};
use chimera_core::metadata::ClassSource;
use chimera_core::{ClassDef, ClassRegistry, MethodDef};
use parking_lot::RwLock;

use crate::adapter::DefaultAdvisorAdapterRegistry;
use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::chain::{AdvisorChainFactory, CachingAdvisorChainFactory};
use crate::error::{AopError, AopResult};
use crate::invocation::{InterceptorChain, MethodInvocation};
use crate::pointcut::ClassView;
use crate::target::{DynValue, EmptyTargetSource, InvocationResult, SingletonTargetSource, Target, TargetSource};

/// 所有框架生成的代理都实现的标记接口
pub const FRAMEWORK_PROXY: &str = "chimera::aop::FrameworkProxy";

/// 可以查询代理配置的接口（`opaque` 时不添加）
pub const ADVISED: &str = "chimera::aop::Advised";

/// 接口代理类名前缀
pub const INTERFACE_PROXY_PREFIX: &str = "chimera::aop::proxy::$Proxy";

/// 子类代理类名分隔符
pub const SUBCLASS_PROXY_SEPARATOR: &str = "$$ChimeraProxy$$";

static PROXY_CLASS_COUNTER: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    CONFIG_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// 代理策略标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// 代理目标类型本身，而不是它的接口
    pub proxy_target_class: bool,
    /// 激进优化，目前只影响策略选择
    pub optimize: bool,
    /// 代理不实现 `Advised`
    pub opaque: bool,
    /// 调用期间可以通过 `AopContext::current_proxy()` 取得代理
    pub expose_proxy: bool,
    /// 冻结后不能再修改通知器
    pub frozen: bool,
}

/// 代理配置
///
/// 可以克隆；每次修改通知器都会得到一个全局唯一的新版本号，
/// 调用链缓存按版本号区分配置快照。
#[derive(Clone)]
pub struct AdvisedSupport {
    config: ProxyConfig,
    target_source: Arc<dyn TargetSource>,
    interfaces: Vec<String>,
    advisors: Vec<Arc<dyn Advisor>>,
    pre_filtered: bool,
    version: u64,
    adapter_registry: Arc<DefaultAdvisorAdapterRegistry>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
    class_source: Arc<dyn ClassSource>,
}

impl AdvisedSupport {
    pub fn new(class_source: Arc<dyn ClassSource>) -> Self {
        Self {
            config: ProxyConfig::default(),
            target_source: Arc::new(EmptyTargetSource::new()),
            interfaces: Vec::new(),
            advisors: Vec::new(),
            pre_filtered: false,
            version: next_version(),
            adapter_registry: Arc::new(DefaultAdvisorAdapterRegistry::new()),
            chain_factory: Arc::new(CachingAdvisorChainFactory::default()),
            class_source,
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        self.config
    }

    pub fn set_proxy_config(&mut self, config: ProxyConfig) {
        self.config = config;
    }

    pub fn set_proxy_target_class(&mut self, value: bool) {
        self.config.proxy_target_class = value;
    }

    pub fn set_optimize(&mut self, value: bool) {
        self.config.optimize = value;
    }

    pub fn set_opaque(&mut self, value: bool) {
        self.config.opaque = value;
    }

    pub fn set_expose_proxy(&mut self, value: bool) {
        self.config.expose_proxy = value;
    }

    pub fn set_frozen(&mut self, value: bool) {
        self.config.frozen = value;
    }

    pub fn is_frozen(&self) -> bool {
        self.config.frozen
    }

    pub fn set_target(&mut self, target: Arc<dyn Target>) {
        self.set_target_source(Arc::new(SingletonTargetSource::new(target)));
    }

    pub fn set_target_source(&mut self, target_source: Arc<dyn TargetSource>) {
        self.target_source = target_source;
        self.version = next_version();
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    pub fn target_class(&self) -> Option<String> {
        self.target_source.target_class()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn add_interface(&mut self, interface: impl Into<String>) {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
            self.version = next_version();
        }
    }

    pub fn remove_interface(&mut self, interface: &str) -> bool {
        let before = self.interfaces.len();
        self.interfaces.retain(|i| i != interface);
        let removed = self.interfaces.len() != before;
        if removed {
            self.version = next_version();
        }
        removed
    }

    pub fn is_interface_proxied(&self, interface: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| i == interface || self.is_assignable(i, interface))
    }

    fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        chimera_core::metadata::class_registry::is_assignable_in(&*self.class_source, sub, sup)
    }

    pub fn advisors(&self) -> &[Arc<dyn Advisor>] {
        &self.advisors
    }

    pub fn advisor_count(&self) -> usize {
        self.advisors.len()
    }

    pub fn index_of(&self, advisor: &Arc<dyn Advisor>) -> Option<usize> {
        self.advisors.iter().position(|a| Arc::ptr_eq(a, advisor))
    }

    /// 追加到列表末尾（最内层）
    pub fn add_advisor(&mut self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        let position = self.advisors.len();
        self.add_advisor_at(position, advisor)
    }

    /// 插入到指定位置，0 表示最外层
    pub fn add_advisor_at(&mut self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        if self.config.frozen {
            return Err(AopError::ConfigFrozen);
        }
        if position > self.advisors.len() {
            return Err(AopError::AdvisorIndexOutOfBounds {
                index: position,
                count: self.advisors.len(),
            });
        }
        if let Some(introduction) = advisor.introduction() {
            introduction.validate_interfaces(&*self.class_source)?;
            for interface in introduction.interfaces() {
                if !self.interfaces.contains(&interface) {
                    self.interfaces.push(interface);
                }
            }
        }
        tracing::debug!("Adding advisor at position {}: {}", position, advisor.description());
        self.advisors.insert(position, advisor);
        self.version = next_version();
        Ok(())
    }

    pub fn add_advisors(&mut self, advisors: impl IntoIterator<Item = Arc<dyn Advisor>>) -> AopResult<()> {
        for advisor in advisors {
            self.add_advisor(advisor)?;
        }
        Ok(())
    }

    pub fn remove_advisor(&mut self, index: usize) -> AopResult<Arc<dyn Advisor>> {
        if self.config.frozen {
            return Err(AopError::ConfigFrozen);
        }
        if index >= self.advisors.len() {
            return Err(AopError::AdvisorIndexOutOfBounds {
                index,
                count: self.advisors.len(),
            });
        }
        let removed = self.advisors.remove(index);
        self.version = next_version();
        Ok(removed)
    }

    /// 把通知包装成匹配所有方法的通知器后追加
    pub fn add_advice(&mut self, advice: Advice) -> AopResult<()> {
        let advisor = self.adapter_registry.wrap(advice)?;
        self.add_advisor(advisor)
    }

    pub fn is_pre_filtered(&self) -> bool {
        self.pre_filtered
    }

    /// 通知器已经按目标类型筛选过，计算调用链时跳过类型过滤器
    pub fn set_pre_filtered(&mut self, pre_filtered: bool) {
        self.pre_filtered = pre_filtered;
        self.version = next_version();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn adapter_registry(&self) -> &Arc<DefaultAdvisorAdapterRegistry> {
        &self.adapter_registry
    }

    pub fn set_adapter_registry(&mut self, registry: Arc<DefaultAdvisorAdapterRegistry>) {
        self.adapter_registry = registry;
        self.version = next_version();
    }

    pub fn chain_factory(&self) -> &Arc<dyn AdvisorChainFactory> {
        &self.chain_factory
    }

    pub fn set_chain_factory(&mut self, factory: Arc<dyn AdvisorChainFactory>) {
        self.chain_factory = factory;
    }

    pub fn class_source(&self) -> &Arc<dyn ClassSource> {
        &self.class_source
    }

    pub fn interceptors_and_dynamic_advice(
        &self,
        method: &MethodDef,
        target_class: Option<&str>,
    ) -> AopResult<InterceptorChain> {
        self.chain_factory
            .interceptors_and_dynamic_advice(self, method, target_class)
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("config", &self.config)
            .field("target_class", &self.target_class())
            .field("interfaces", &self.interfaces)
            .field("advisors", &self.advisors.len())
            .field("version", &self.version)
            .finish()
    }
}

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStrategy {
    /// 实现被代理的接口，只能调用接口方法
    Interface,
    /// 继承目标类型，可以调用所有可覆盖的方法
    Subclass,
}

/// 选择代理策略并创建代理
#[derive(Clone, Default)]
pub struct DefaultAopProxyFactory {
    class_registry: Option<Arc<ClassRegistry>>,
}

impl DefaultAopProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成的代理类型同时注册到这个注册表
    pub fn with_class_registry(mut self, registry: Arc<ClassRegistry>) -> Self {
        self.class_registry = Some(registry);
        self
    }

    pub fn select_strategy(&self, config: &AdvisedSupport) -> AopResult<ProxyStrategy> {
        let flags = config.proxy_config();
        let user_interfaces = has_user_supplied_interfaces(config);
        if !(flags.optimize || flags.proxy_target_class || !user_interfaces) {
            return Ok(ProxyStrategy::Interface);
        }

        let Some(target_class) = config.target_class() else {
            if user_interfaces {
                return Ok(ProxyStrategy::Interface);
            }
            return Err(AopError::NoTargetOrInterfaces);
        };

        // 接口和接口代理类不能再被继承
        let def = config.class_source().find_class(&target_class);
        let is_interface = def.as_ref().is_some_and(|d| d.is_interface());
        let is_interface_proxy = def.as_ref().is_some_and(|d| d.dynamic_proxy)
            || target_class.starts_with(INTERFACE_PROXY_PREFIX);
        if is_interface || is_interface_proxy {
            return Ok(ProxyStrategy::Interface);
        }
        Ok(ProxyStrategy::Subclass)
    }

    pub fn create_aop_proxy(&self, config: AdvisedSupport) -> AopResult<Arc<Proxy>> {
        let strategy = self.select_strategy(&config)?;
        let interfaces = complete_proxied_interfaces(&config);
        let sequence = PROXY_CLASS_COUNTER.fetch_add(1, Ordering::Relaxed);

        let proxy_class = match strategy {
            ProxyStrategy::Interface => {
                let mut def = ClassDef::new(format!("{}{}", INTERFACE_PROXY_PREFIX, sequence)).final_();
                def.dynamic_proxy = true;
                def.interfaces = interfaces;
                def
            }
            ProxyStrategy::Subclass => {
                let target_class = config.target_class().ok_or(AopError::NoTargetOrInterfaces)?;
                let mut def =
                    ClassDef::new(format!("{}{}{}", target_class, SUBCLASS_PROXY_SEPARATOR, sequence))
                        .extends(target_class);
                def.interfaces = interfaces;
                def
            }
        };

        let proxy_class = match &self.class_registry {
            Some(registry) => registry.register(proxy_class),
            None => Arc::new(proxy_class),
        };
        tracing::debug!(
            "Creating {:?} proxy '{}' with {} advisor(s)",
            strategy,
            proxy_class.name,
            config.advisor_count()
        );
        Ok(Proxy::new(strategy, proxy_class, config))
    }
}

/// 没有接口，或者唯一的接口只是框架代理标记
fn has_user_supplied_interfaces(config: &AdvisedSupport) -> bool {
    let interfaces = config.interfaces();
    !(interfaces.is_empty() || (interfaces.len() == 1 && interfaces[0] == FRAMEWORK_PROXY))
}

/// 用户接口 + 框架标记接口
fn complete_proxied_interfaces(config: &AdvisedSupport) -> Vec<String> {
    let mut interfaces = config.interfaces().to_vec();
    if !config.is_interface_proxied(FRAMEWORK_PROXY) {
        interfaces.push(FRAMEWORK_PROXY.to_string());
    }
    if !config.proxy_config().opaque && !config.is_interface_proxied(ADVISED) {
        interfaces.push(ADVISED.to_string());
    }
    interfaces
}

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Arc<Proxy>>> = const { RefCell::new(None) };
}

/// 当前线程正在执行的代理（需要 `expose_proxy`）
pub struct AopContext;

impl AopContext {
    pub fn current_proxy() -> AopResult<Arc<Proxy>> {
        CURRENT_PROXY.with(|current| current.borrow().clone()).ok_or_else(|| {
            AopError::IllegalState(
                "Cannot find current proxy: set 'expose_proxy' to true to make it available".to_string(),
            )
        })
    }

    fn set(proxy: Option<Arc<Proxy>>) -> Option<Arc<Proxy>> {
        CURRENT_PROXY.with(|current| current.replace(proxy))
    }
}

struct ExposedProxyGuard {
    previous: Option<Arc<Proxy>>,
}

impl Drop for ExposedProxyGuard {
    fn drop(&mut self) {
        AopContext::set(self.previous.take());
    }
}

/// 代理对象
///
/// 持有当前绑定的配置快照。`add_advisor` 等操作在副本上修改后重新绑定，
/// 正在执行的调用继续使用旧快照。
pub struct Proxy {
    strategy: ProxyStrategy,
    proxy_class: Arc<ClassDef>,
    advised: RwLock<Arc<AdvisedSupport>>,
    /// 接口代理可以分派的方法
    interface_methods: Vec<MethodDef>,
    self_ref: Weak<Proxy>,
}

impl Proxy {
    fn new(strategy: ProxyStrategy, proxy_class: Arc<ClassDef>, config: AdvisedSupport) -> Arc<Self> {
        let source = Arc::clone(config.class_source());
        let mut interface_methods: Vec<MethodDef> = Vec::new();
        for interface in &proxy_class.interfaces {
            for method in all_methods_in(&*source, interface) {
                if !interface_methods.iter().any(|m| m.same_signature(&method)) {
                    interface_methods.push(method);
                }
            }
        }
        Arc::new_cyclic(|weak| Self {
            strategy,
            proxy_class,
            advised: RwLock::new(Arc::new(config)),
            interface_methods,
            self_ref: weak.clone(),
        })
    }

    pub fn strategy(&self) -> ProxyStrategy {
        self.strategy
    }

    pub fn proxy_class(&self) -> &ClassDef {
        &self.proxy_class
    }

    /// 当前绑定的配置快照
    pub fn advised(&self) -> Arc<AdvisedSupport> {
        Arc::clone(&self.advised.read())
    }

    pub fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.rebind(|config| config.add_advisor(advisor))
    }

    pub fn add_advisor_at(&self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.rebind(|config| config.add_advisor_at(position, advisor))
    }

    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        self.rebind(|config| config.add_advice(advice))
    }

    pub fn remove_advisor(&self, index: usize) -> AopResult<Arc<dyn Advisor>> {
        let mut removed = None;
        self.rebind(|config| {
            removed = Some(config.remove_advisor(index)?);
            Ok(())
        })?;
        removed.ok_or_else(|| AopError::IllegalState("advisor removal produced no advisor".to_string()))
    }

    fn rebind(&self, change: impl FnOnce(&mut AdvisedSupport) -> AopResult<()>) -> AopResult<()> {
        let mut advised = self.advised.write();
        if advised.is_frozen() {
            return Err(AopError::ConfigFrozen);
        }
        let mut next = AdvisedSupport::clone(&advised);
        change(&mut next)?;
        tracing::debug!(
            "Rebinding proxy '{}' to configuration version {}",
            self.proxy_class.name,
            next.version()
        );
        *advised = Arc::new(next);
        Ok(())
    }

    /// 按方法名调用（同名方法优先选参数个数一致的）
    pub fn invoke(&self, method_name: &str, args: Vec<DynValue>) -> InvocationResult {
        let method = self.resolve_method(method_name, args.len())?;
        self.invoke_method(&method, args)
    }

    fn resolve_method(&self, method_name: &str, arity: usize) -> AopResult<MethodDef> {
        let candidates: Vec<MethodDef> = match self.strategy {
            ProxyStrategy::Interface => self.interface_methods.clone(),
            ProxyStrategy::Subclass => {
                let advised = self.advised();
                let source = advised.class_source();
                let target_known = self
                    .proxy_class
                    .superclass
                    .as_deref()
                    .is_some_and(|t| source.find_class(t).is_some());
                let methods = ClassView::new(&self.proxy_class, &**source).all_methods();
                if !target_known && !methods.iter().any(|m| m.name == method_name) {
                    // 目标类型没有描述时按名称分派
                    let target_class = self.proxy_class.superclass.clone().unwrap_or_default();
                    return Ok(MethodDef::new(method_name).declared_by(target_class));
                }
                methods
            }
        };
        candidates
            .iter()
            .find(|m| m.name == method_name && m.parameter_types.len() == arity)
            .or_else(|| candidates.iter().find(|m| m.name == method_name))
            .cloned()
            .ok_or_else(|| AopError::NoSuchMethod {
                proxy: self.proxy_class.name.clone(),
                method: method_name.to_string(),
            })
    }

    fn admits_interface_method(&self, method: &MethodDef) -> bool {
        self.proxy_class.interfaces.contains(&method.declaring_class)
            || self.interface_methods.iter().any(|m| m.same_signature(method))
    }

    pub fn invoke_method(&self, method: &MethodDef, args: Vec<DynValue>) -> InvocationResult {
        let advised = self.advised();
        let target_source = Arc::clone(advised.target_source());

        match self.strategy {
            ProxyStrategy::Interface if !self.admits_interface_method(method) => {
                return Err(AopError::NoSuchMethod {
                    proxy: self.proxy_class.name.clone(),
                    method: method.to_string(),
                }
                .into());
            }
            ProxyStrategy::Subclass if !method.is_overridable() => {
                // 不可覆盖的方法不经过代理逻辑
                let target = target_source
                    .get_target()?
                    .ok_or_else(|| AopError::NoTarget(method.to_string()))?;
                let result = target.invoke(method, &args);
                if !target_source.is_static() {
                    target_source.release_target(target);
                }
                return result;
            }
            _ => {}
        }

        let _exposed = if advised.proxy_config().expose_proxy {
            let previous = AopContext::set(self.self_ref.upgrade());
            Some(ExposedProxyGuard { previous })
        } else {
            None
        };

        let target = target_source.get_target()?;
        let target_class = target
            .as_ref()
            .map(|t| t.target_class().to_string())
            .or_else(|| advised.target_class());
        let chain = advised.interceptors_and_dynamic_advice(method, target_class.as_deref())?;

        let result = if chain.is_empty() {
            match &target {
                Some(target) => target.invoke(method, &args),
                None => Err(AopError::NoTarget(method.to_string()).into()),
            }
        } else {
            let class_name = target_class.unwrap_or_else(|| method.declaring_class.clone());
            let source = Arc::clone(advised.class_source());
            let target_def = source
                .find_class(&class_name)
                .unwrap_or_else(|| Arc::new(ClassDef::new(class_name)));
            MethodInvocation::new(target.clone(), Arc::new(method.clone()), args, target_def, source, chain)
                .with_proxy_class(self.proxy_class.name.clone())
                .proceed()
        };

        if let Some(target) = target {
            if !target_source.is_static() {
                target_source.release_target(target);
            }
        }
        result
    }

    /// 代理实现的所有接口（包含框架标记接口）
    pub fn proxied_interfaces(&self) -> &[String] {
        &self.proxy_class.interfaces
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.proxy_class.interfaces.iter().any(|i| i == interface)
    }
}

impl Target for Proxy {
    fn target_class(&self) -> &str {
        &self.proxy_class.name
    }

    fn invoke(&self, method: &MethodDef, args: &[DynValue]) -> InvocationResult {
        self.invoke_method(method, args.to_vec())
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("strategy", &self.strategy)
            .field("proxy_class", &self.proxy_class.name)
            .field("advised", &*self.advised.read())
            .finish()
    }
}

/// 编程方式创建代理
///
/// ```rust,ignore
/// let mut factory = ProxyFactory::for_target(target, class_source);
/// factory.add_advice(Advice::around(|inv| inv.proceed()))?;
/// let proxy = factory.get_proxy()?;
/// ```
pub struct ProxyFactory {
    advised: AdvisedSupport,
    aop_proxy_factory: DefaultAopProxyFactory,
}

impl ProxyFactory {
    pub fn new(class_source: Arc<dyn ClassSource>) -> Self {
        Self {
            advised: AdvisedSupport::new(class_source),
            aop_proxy_factory: DefaultAopProxyFactory::new(),
        }
    }

    /// 以目标对象创建，代理目标类型实现的所有接口
    pub fn for_target(target: Arc<dyn Target>, class_source: Arc<dyn ClassSource>) -> Self {
        let interfaces = all_interfaces_in(&*class_source, target.target_class());
        let mut factory = Self::new(class_source);
        factory.advised.set_target(target);
        for interface in interfaces {
            factory.advised.add_interface(interface);
        }
        factory
    }

    pub fn with_aop_proxy_factory(mut self, factory: DefaultAopProxyFactory) -> Self {
        self.aop_proxy_factory = factory;
        self
    }

    pub fn advised(&self) -> &AdvisedSupport {
        &self.advised
    }

    pub fn advised_mut(&mut self) -> &mut AdvisedSupport {
        &mut self.advised
    }

    pub fn set_target(&mut self, target: Arc<dyn Target>) {
        self.advised.set_target(target);
    }

    pub fn set_target_source(&mut self, target_source: Arc<dyn TargetSource>) {
        self.advised.set_target_source(target_source);
    }

    pub fn add_interface(&mut self, interface: impl Into<String>) {
        self.advised.add_interface(interface);
    }

    pub fn add_advisor(&mut self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.advised.add_advisor(advisor)
    }

    pub fn add_advice(&mut self, advice: Advice) -> AopResult<()> {
        self.advised.add_advice(advice)
    }

    pub fn set_proxy_target_class(&mut self, value: bool) {
        self.advised.set_proxy_target_class(value);
    }

    pub fn set_optimize(&mut self, value: bool) {
        self.advised.set_optimize(value);
    }

    pub fn set_opaque(&mut self, value: bool) {
        self.advised.set_opaque(value);
    }

    pub fn set_expose_proxy(&mut self, value: bool) {
        self.advised.set_expose_proxy(value);
    }

    pub fn set_frozen(&mut self, value: bool) {
        self.advised.set_frozen(value);
    }

    /// 配置保持独立，之后修改工厂不影响已创建的代理
    pub fn get_proxy(&self) -> AopResult<Arc<Proxy>> {
        self.aop_proxy_factory.create_aop_proxy(self.advised.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::DefaultPointcutAdvisor;
    use crate::target::MethodTable;
    use pretty_assertions::assert_eq;

    fn source() -> Arc<dyn ClassSource> {
        let registry = ClassRegistry::new();
        registry.register(ClassDef::interface("app::Greeter").method(MethodDef::new("greet")));
        registry.register(
            ClassDef::new("app::EnglishGreeter")
                .implements("app::Greeter")
                .method(MethodDef::new("greet"))
                .method(MethodDef::new("internal").final_()),
        );
        Arc::new(registry)
    }

    fn greeter() -> Arc<dyn Target> {
        Arc::new(
            MethodTable::new("app::EnglishGreeter")
                .method("greet", |_| Ok(Some(Arc::new("hello".to_string()) as DynValue)))
                .method("internal", |_| Ok(Some(Arc::new("internal".to_string()) as DynValue))),
        )
    }

    fn shout() -> Advice {
        Advice::around(|invocation| {
            let result = invocation.proceed()?;
            Ok(result
                .and_then(|v| v.downcast_ref::<String>().map(|s| s.to_uppercase()))
                .map(|s| Arc::new(s) as DynValue))
        })
    }

    fn text(result: InvocationResult) -> String {
        result
            .unwrap()
            .and_then(|v| v.downcast_ref::<String>().cloned())
            .unwrap()
    }

    #[test]
    fn test_interface_proxy_dispatches_interface_methods_only() {
        let mut factory = ProxyFactory::for_target(greeter(), source());
        factory.add_advice(shout()).unwrap();
        let proxy = factory.get_proxy().unwrap();

        assert_eq!(proxy.strategy(), ProxyStrategy::Interface);
        assert!(proxy.proxy_class().dynamic_proxy);
        assert!(proxy.implements(FRAMEWORK_PROXY));
        assert!(proxy.implements(ADVISED));
        assert_eq!(text(proxy.invoke("greet", vec![])), "HELLO");
        assert!(proxy.invoke("internal", vec![]).is_err());
    }

    #[test]
    fn test_subclass_proxy_calls_final_methods_directly() {
        let mut factory = ProxyFactory::for_target(greeter(), source());
        factory.set_proxy_target_class(true);
        factory.set_opaque(true);
        factory.add_advice(shout()).unwrap();
        let proxy = factory.get_proxy().unwrap();

        assert_eq!(proxy.strategy(), ProxyStrategy::Subclass);
        assert!(proxy.proxy_class().name.starts_with("app::EnglishGreeter$$ChimeraProxy$$"));
        assert!(!proxy.implements(ADVISED));
        assert_eq!(text(proxy.invoke("greet", vec![])), "HELLO");
        assert_eq!(text(proxy.invoke("internal", vec![])), "internal");
    }

    #[test]
    fn test_no_target_and_no_interfaces_is_fatal() {
        let factory = ProxyFactory::new(source());
        assert!(matches!(factory.get_proxy(), Err(AopError::NoTargetOrInterfaces)));
    }

    #[test]
    fn test_rebinding_and_frozen() {
        let factory = ProxyFactory::for_target(greeter(), source());
        let proxy = factory.get_proxy().unwrap();
        assert_eq!(text(proxy.invoke("greet", vec![])), "hello");

        let before = proxy.advised().version();
        proxy
            .add_advisor(Arc::new(DefaultPointcutAdvisor::for_advice(shout())))
            .unwrap();
        assert!(proxy.advised().version() > before);
        assert_eq!(text(proxy.invoke("greet", vec![])), "HELLO");

        proxy.remove_advisor(0).unwrap();
        assert_eq!(text(proxy.invoke("greet", vec![])), "hello");

        let mut frozen = ProxyFactory::for_target(greeter(), source());
        frozen.set_frozen(true);
        let proxy = frozen.get_proxy().unwrap();
        assert!(matches!(
            proxy.add_advice(shout()),
            Err(AopError::ConfigFrozen)
        ));
    }

    #[test]
    fn test_expose_proxy() {
        let mut factory = ProxyFactory::for_target(greeter(), source());
        factory.set_expose_proxy(true);
        factory
            .add_advice(Advice::around(|invocation| {
                let current = AopContext::current_proxy()?;
                assert_eq!(current.proxy_class().name, invocation.proxy_class());
                invocation.proceed()
            }))
            .unwrap();
        let proxy = factory.get_proxy().unwrap();
        proxy.invoke("greet", vec![]).unwrap();
        assert!(AopContext::current_proxy().is_err());
    }
}

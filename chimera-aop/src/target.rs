//! 代理目标
//!
//! 容器里的 Bean 是 `dyn Any`，代理需要的是可以按方法调用的对象。
//! `Target` 是这个调用面：给定方法描述和参数，执行真正的方法体。
//! 没有运行时反射，方法体由 `MethodTable` 里的闭包提供。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chimera_core::{BeanFactory, DynBean, MethodDef};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::error::{AopError, AopResult};
use crate::proxy::Proxy;

/// 方法参数与返回值
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// 一次方法调用的结果，`None` 表示没有返回值
pub type InvocationResult = anyhow::Result<Option<DynValue>>;

/// 可以被代理调用的对象
pub trait Target: Send + Sync {
    /// 对象的类型名称
    fn target_class(&self) -> &str;

    fn invoke(&self, method: &MethodDef, args: &[DynValue]) -> InvocationResult;
}

/// 方法体
pub type MethodHandler = Arc<dyn Fn(&[DynValue]) -> InvocationResult + Send + Sync>;

/// 以方法名索引闭包的目标对象
///
/// ```rust,ignore
/// let counter = Arc::new(AtomicUsize::new(0));
/// let table = MethodTable::new("app::Counter").method("increment", move |_| {
///     Ok(Some(Arc::new(counter.fetch_add(1, Ordering::SeqCst)) as DynValue))
/// });
/// ```
pub struct MethodTable {
    class_name: String,
    handlers: HashMap<String, MethodHandler>,
}

impl MethodTable {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[DynValue]) -> InvocationResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("class_name", &self.class_name)
            .field("methods", &self.method_names())
            .finish()
    }
}

impl Target for MethodTable {
    fn target_class(&self) -> &str {
        &self.class_name
    }

    fn invoke(&self, method: &MethodDef, args: &[DynValue]) -> InvocationResult {
        let handler = self.handlers.get(&method.name).ok_or_else(|| {
            AopError::NoSuchMethod {
                proxy: self.class_name.clone(),
                method: method.name.clone(),
            }
        })?;
        handler(args)
    }
}

/// 把任意 `Target` 实现放进容器
pub struct TargetBean {
    target: Arc<dyn Target>,
}

impl TargetBean {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Arc<dyn Target> {
        Arc::clone(&self.target)
    }
}

/// 容器中的 Bean 作为 `DynBean` 保存
pub fn into_bean(target: Arc<dyn Target>) -> DynBean {
    Arc::new(TargetBean::new(target))
}

/// 取出 Bean 的调用面：`TargetBean`、`MethodTable` 或已有的代理
pub fn as_target(bean: &DynBean) -> Option<Arc<dyn Target>> {
    if let Some(holder) = bean.downcast_ref::<TargetBean>() {
        return Some(holder.target());
    }
    if let Ok(table) = Arc::clone(bean).downcast::<MethodTable>() {
        return Some(table);
    }
    if let Ok(proxy) = Arc::clone(bean).downcast::<Proxy>() {
        return Some(proxy);
    }
    None
}

/// 目标对象的身份（按地址）
pub fn target_identity(target: &Arc<dyn Target>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

/// 代理每次调用时从这里取目标
pub trait TargetSource: Send + Sync {
    /// 目标类型，无法确定时为 `None`
    fn target_class(&self) -> Option<String>;

    /// 每次返回同一个目标
    fn is_static(&self) -> bool;

    fn get_target(&self) -> anyhow::Result<Option<Arc<dyn Target>>>;

    fn release_target(&self, _target: Arc<dyn Target>) {}
}

/// 固定目标
pub struct SingletonTargetSource {
    target: Arc<dyn Target>,
}

impl SingletonTargetSource {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self { target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<String> {
        Some(self.target.target_class().to_string())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Arc<dyn Target>>> {
        Ok(Some(Arc::clone(&self.target)))
    }
}

/// 没有目标，只有（可选的）目标类型
///
/// 全部逻辑由拦截器或引入实现时使用
#[derive(Debug, Default, Clone)]
pub struct EmptyTargetSource {
    target_class: Option<String>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            target_class: Some(class_name.into()),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<String> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Arc<dyn Target>>> {
        Ok(None)
    }
}

fn lookup_target(factory: &Weak<dyn BeanFactory>, bean_name: &str) -> anyhow::Result<Arc<dyn Target>> {
    let factory = factory.upgrade().ok_or_else(|| {
        AopError::IllegalState(format!(
            "Bean factory for target bean '{}' is no longer available",
            bean_name
        ))
    })?;
    let bean = factory.get_bean(bean_name)?;
    as_target(&bean).ok_or_else(|| {
        chimera_core::ContainerError::TypeMismatch {
            name: bean_name.to_string(),
            expected: "Target".to_string(),
        }
        .into()
    })
}

/// 第一次调用时才从容器取目标，之后一直使用它
pub struct LazyInitTargetSource {
    factory: Weak<dyn BeanFactory>,
    bean_name: String,
    target_class: Option<String>,
    target: OnceCell<Arc<dyn Target>>,
}

impl LazyInitTargetSource {
    pub fn new(factory: &Arc<dyn BeanFactory>, bean_name: impl Into<String>) -> Self {
        let bean_name = bean_name.into();
        let target_class = factory.get_type(&bean_name);
        Self {
            factory: Arc::downgrade(factory),
            bean_name,
            target_class,
            target: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.target.get().is_some()
    }
}

impl TargetSource for LazyInitTargetSource {
    fn target_class(&self) -> Option<String> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Arc<dyn Target>>> {
        let target = self.target.get_or_try_init(|| {
            tracing::debug!("Initializing lazy target bean '{}'", self.bean_name);
            lookup_target(&self.factory, &self.bean_name)
        })?;
        Ok(Some(Arc::clone(target)))
    }
}

/// 每次调用都从容器取目标（作用域代理）
pub struct SimpleBeanTargetSource {
    factory: Weak<dyn BeanFactory>,
    bean_name: String,
    target_class: Option<String>,
}

impl SimpleBeanTargetSource {
    pub fn new(factory: &Arc<dyn BeanFactory>, bean_name: impl Into<String>) -> Self {
        let bean_name = bean_name.into();
        let target_class = factory.get_type(&bean_name);
        Self {
            factory: Arc::downgrade(factory),
            bean_name,
            target_class,
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }
}

impl TargetSource for SimpleBeanTargetSource {
    fn target_class(&self) -> Option<String> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Arc<dyn Target>>> {
        lookup_target(&self.factory, &self.bean_name).map(Some)
    }
}

/// 通过 inventory 在链接期注册的实现类型
///
/// 引入（@DeclareParents）的默认实现按类型名称在这里实例化：
///
/// ```rust,ignore
/// fn new_usage_tracked() -> Arc<dyn Target> {
///     Arc::new(MethodTable::new("app::DefaultUsageTracked").method("increment", |_| Ok(None)))
/// }
///
/// inventory::submit! {
///     InstantiationRegistration { class_name: "app::DefaultUsageTracked", create: new_usage_tracked }
/// }
/// ```
pub struct InstantiationRegistration {
    pub class_name: &'static str,
    pub create: fn() -> Arc<dyn Target>,
}

inventory::collect!(InstantiationRegistration);

type Instantiator = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Target>> + Send + Sync>;

/// 类型名称 -> 实例化函数
pub struct InstantiationRegistry {
    instantiators: RwLock<HashMap<String, Instantiator>>,
}

impl fmt::Debug for InstantiationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.instantiators.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("InstantiationRegistry")
            .field("classes", &names)
            .finish()
    }
}

impl InstantiationRegistry {
    /// 包含链接期注册的类型
    pub fn new() -> Self {
        let registry = Self::empty();
        for registration in inventory::iter::<InstantiationRegistration> {
            let create = registration.create;
            registry.register(registration.class_name, move || Ok(create()));
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            instantiators: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(&self, class_name: impl Into<String>, create: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Target>> + Send + Sync + 'static,
    {
        self.instantiators
            .write()
            .insert(class_name.into(), Arc::new(create));
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.instantiators.read().contains_key(class_name)
    }

    pub fn instantiate(&self, class_name: &str) -> AopResult<Arc<dyn Target>> {
        let create = self
            .instantiators
            .read()
            .get(class_name)
            .cloned()
            .ok_or_else(|| AopError::UnknownImplementation(class_name.to_string()))?;
        create().map_err(|e| chimera_core::ContainerError::creation(class_name, e).into())
    }
}

impl Default for InstantiationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{BeanDefinition, BeanDefinitionRegistry, DefaultListableBeanFactory, MetadataSources, SupplierKey};
    use chimera_core::metadata::ClassRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn greeter() -> MethodTable {
        MethodTable::new("app::Greeter").method("greet", |args| {
            let name = args
                .first()
                .and_then(|a| a.downcast_ref::<String>())
                .cloned()
                .unwrap_or_default();
            Ok(Some(Arc::new(format!("hello {}", name)) as DynValue))
        })
    }

    #[test]
    fn test_method_table_dispatch() {
        let table = greeter();
        let result = table
            .invoke(&MethodDef::new("greet"), &[Arc::new("bob".to_string())])
            .unwrap()
            .unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "hello bob");

        let missing = table.invoke(&MethodDef::new("wave"), &[]).unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<AopError>(),
            Some(AopError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_as_target_unwraps_known_beans() {
        let table: DynBean = Arc::new(greeter());
        assert_eq!(as_target(&table).unwrap().target_class(), "app::Greeter");

        let wrapped = into_bean(Arc::new(greeter()));
        assert!(as_target(&wrapped).is_some());

        let plain: DynBean = Arc::new(42_u32);
        assert!(as_target(&plain).is_none());
    }

    #[test]
    fn test_lazy_target_source_initializes_once() {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(Arc::new(
            ClassRegistry::new(),
        )));
        factory
            .register_bean_definition(
                "greeter",
                BeanDefinition::for_class("app::Greeter").with_scope(chimera_core::Scope::Prototype),
            )
            .unwrap();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        factory.register_supplier(SupplierKey::Bean("greeter".into()), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(greeter()) as DynBean)
        });

        let shared: Arc<dyn BeanFactory> = factory.clone();
        let lazy = LazyInitTargetSource::new(&shared, "greeter");
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.target_class().as_deref(), Some("app::Greeter"));
        lazy.get_target().unwrap();
        lazy.get_target().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let per_call = SimpleBeanTargetSource::new(&shared, "greeter");
        per_call.get_target().unwrap();
        per_call.get_target().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_instantiation_registry() {
        let registry = InstantiationRegistry::empty();
        registry.register("app::Greeter", || Ok(Arc::new(greeter()) as Arc<dyn Target>));
        assert!(registry.contains("app::Greeter"));
        assert_eq!(
            registry.instantiate("app::Greeter").unwrap().target_class(),
            "app::Greeter"
        );
        assert!(matches!(
            registry.instantiate("app::Nope"),
            Err(AopError::UnknownImplementation(_))
        ));
    }
}

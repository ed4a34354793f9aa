//! Bean Factory - 核心容器接口
//!
//! 参考 Spring 的 BeanFactory 架构设计：
//! - `BeanFactory` 按名称访问 Bean 实例，可以作为 trait object 使用
//! - `BeanDefinitionRegistry` 管理有序的 Bean 定义与别名
//! - `DefaultListableBeanFactory` 同时实现两者

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::bean_definition::{BeanDefinition, BeanDefinitionHolder};
use crate::bean_post_processor::{BeanPostProcessor, PostProcessorBean, BEAN_POST_PROCESSOR_ATTRIBUTE};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{ClassDef, ClassRegistry, ClassSource, MetadataSources};
use crate::scope::Scope;
use crate::utils::dependency::{CreationGuard, CreationTracker};

/// 容器中的 Bean 实例
pub type DynBean = Arc<dyn Any + Send + Sync>;

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称（或别名）获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<DynBean>;

    /// 检查是否包含指定名称的 Bean（定义或已注册的单例）
    fn contains_bean(&self, name: &str) -> bool;

    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;

    fn is_prototype(&self, name: &str) -> ContainerResult<bool>;

    /// Bean 实例的类型名称
    fn get_type(&self, name: &str) -> Option<String>;

    /// 所有 Bean 名称（注册顺序）
    fn bean_names(&self) -> Vec<String>;

    /// 类型可以赋值给 `type_name` 的 Bean 名称
    fn bean_names_for_type(&self, type_name: &str) -> Vec<String>;

    /// 查找类型描述
    fn find_class(&self, _class_name: &str) -> Option<Arc<ClassDef>> {
        None
    }

    /// 类型描述的来源，运行期生成的类型（例如代理类）也注册到这里
    fn class_metadata(&self) -> Option<MetadataSources> {
        None
    }
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 获取 Bean 并转换为具体类型
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.get_bean(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// Bean 定义注册表
pub trait BeanDefinitionRegistry: Send + Sync {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()>;

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 定义名称（注册顺序）
    fn bean_definition_names(&self) -> Vec<String>;

    fn bean_definition_count(&self) -> usize {
        self.bean_definition_names().len()
    }

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()>;

    fn aliases(&self, name: &str) -> Vec<String>;

    fn is_alias(&self, name: &str) -> bool;

    /// 名称是否已作为定义名或别名使用
    fn is_bean_name_in_use(&self, name: &str) -> bool {
        self.contains_bean_definition(name) || self.is_alias(name)
    }

    fn is_allow_bean_definition_overriding(&self) -> bool;
}

/// 注册定义及其别名
pub fn register_bean_definition_holder(
    holder: &BeanDefinitionHolder,
    registry: &dyn BeanDefinitionRegistry,
) -> ContainerResult<()> {
    registry.register_bean_definition(&holder.name, holder.definition.clone())?;
    for alias in &holder.aliases {
        registry.register_alias(&holder.name, alias)?;
    }
    Ok(())
}

/// 实例化上下文
pub struct CreationContext<'a> {
    pub factory: &'a dyn BeanFactory,
    pub bean_name: &'a str,
    pub definition: &'a BeanDefinition,
    /// 实例工厂方法所在的 Bean
    pub factory_instance: Option<DynBean>,
    shared: Option<Arc<dyn BeanFactory>>,
}

impl CreationContext<'_> {
    /// 可被长期持有的工厂句柄（例如懒加载的目标源）
    pub fn shared_factory(&self) -> Option<Arc<dyn BeanFactory>> {
        self.shared.clone()
    }
}

/// 实例提供函数
pub type InstanceSupplier =
    Arc<dyn Fn(&CreationContext<'_>) -> anyhow::Result<DynBean> + Send + Sync>;

/// 实例提供函数的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SupplierKey {
    /// 指定 Bean 名称
    Bean(String),
    /// 指定类型
    Class(String),
    /// 指定配置类上的工厂方法
    FactoryMethod { class_name: String, method: String },
}

/// 通过 inventory 在链接期注册的实例提供函数
///
/// `method` 为 `None` 时按类型注册，否则按工厂方法注册
pub struct SupplierRegistration {
    pub class_name: &'static str,
    pub method: Option<&'static str>,
    pub supply: fn(&CreationContext<'_>) -> anyhow::Result<DynBean>,
}

inventory::collect!(SupplierRegistration);

/// 自定义作用域（request、session 等）
pub trait BeanScope: Send + Sync {
    fn get(
        &self,
        name: &str,
        create: &dyn Fn() -> ContainerResult<DynBean>,
    ) -> ContainerResult<DynBean>;

    fn remove(&self, name: &str) -> Option<DynBean>;
}

/// DefaultListableBeanFactory - Bean 定义注册表与 Bean 工厂的默认实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储（保持注册顺序）
    definitions: RwLock<IndexMap<String, BeanDefinition>>,

    /// 别名 -> 名称
    aliases: RwLock<IndexMap<String, String>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, DynBean>>,

    suppliers: RwLock<HashMap<SupplierKey, InstanceSupplier>>,

    scopes: RwLock<HashMap<String, Arc<dyn BeanScope>>>,

    /// 循环引用检测
    creation_tracker: CreationTracker,

    /// Bean 后置处理器列表（按优先级排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    /// 已注册为后置处理器的 Bean 名称
    processor_bean_names: RwLock<HashSet<String>>,

    allow_bean_definition_overriding: AtomicBool,

    /// 配置是否已冻结
    configuration_frozen: AtomicBool,

    metadata: MetadataSources,

    self_ref: Weak<DefaultListableBeanFactory>,
}

impl std::fmt::Debug for DefaultListableBeanFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultListableBeanFactory")
            .field("definitions", &self.bean_definition_names())
            .field("singletons_count", &self.singletons.read().len())
            .finish()
    }
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Self {
        Self::build(
            MetadataSources::with_registry(Arc::new(ClassRegistry::new())),
            Weak::new(),
        )
    }

    /// 创建可共享的 Bean 工厂
    pub fn new_shared(metadata: MetadataSources) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self::build(metadata, weak.clone()))
    }

    fn build(metadata: MetadataSources, self_ref: Weak<DefaultListableBeanFactory>) -> Self {
        let mut suppliers: HashMap<SupplierKey, InstanceSupplier> = HashMap::new();
        for registration in inventory::iter::<SupplierRegistration> {
            let key = match registration.method {
                Some(method) => SupplierKey::FactoryMethod {
                    class_name: registration.class_name.to_string(),
                    method: method.to_string(),
                },
                None => SupplierKey::Class(registration.class_name.to_string()),
            };
            let supply = registration.supply;
            suppliers.insert(key, Arc::new(move |ctx: &CreationContext<'_>| supply(ctx)));
        }

        Self {
            definitions: RwLock::new(IndexMap::new()),
            aliases: RwLock::new(IndexMap::new()),
            singletons: RwLock::new(HashMap::new()),
            suppliers: RwLock::new(suppliers),
            scopes: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::new(),
            bean_post_processors: RwLock::new(Vec::new()),
            processor_bean_names: RwLock::new(HashSet::new()),
            allow_bean_definition_overriding: AtomicBool::new(true),
            configuration_frozen: AtomicBool::new(false),
            metadata,
            self_ref,
        }
    }

    pub fn metadata_sources(&self) -> &MetadataSources {
        &self.metadata
    }

    pub fn class_registry(&self) -> &Arc<ClassRegistry> {
        self.metadata.class_registry()
    }

    pub fn set_allow_bean_definition_overriding(&self, allow: bool) {
        self.allow_bean_definition_overriding
            .store(allow, Ordering::SeqCst);
    }

    /// 注册实例提供函数
    pub fn register_supplier<F>(&self, key: SupplierKey, supplier: F)
    where
        F: Fn(&CreationContext<'_>) -> anyhow::Result<DynBean> + Send + Sync + 'static,
    {
        self.suppliers.write().insert(key, Arc::new(supplier));
    }

    /// 注册已创建好的单例
    pub fn register_singleton(&self, name: &str, bean: DynBean) -> ContainerResult<()> {
        let mut singletons = self.singletons.write();
        if singletons.contains_key(name) {
            return Err(ContainerError::IllegalState(format!(
                "Could not register object under bean name '{}': there is already an object bound",
                name
            )));
        }
        singletons.insert(name.to_string(), bean);
        Ok(())
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.read().contains_key(&self.canonical_name(name))
    }

    pub fn register_scope(&self, name: &str, scope: Arc<dyn BeanScope>) {
        self.scopes.write().insert(name.to_string(), scope);
    }

    /// 添加 BeanPostProcessor
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);

        // 按优先级排序（order 值越小优先级越高）
        processors.sort_by_key(|p| p.order());
    }

    pub fn bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    /// 冻结配置（不再允许修改 Bean 定义）
    pub fn freeze_configuration(&self) {
        self.configuration_frozen.store(true, Ordering::SeqCst);
        tracing::debug!("Bean factory configuration frozen");
    }

    pub fn is_configuration_frozen(&self) -> bool {
        self.configuration_frozen.load(Ordering::SeqCst)
    }

    /// 预实例化所有非延迟单例 Bean
    pub fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let bean_names: Vec<String> = self
            .definitions
            .read()
            .iter()
            .filter(|(_, def)| def.is_singleton() && !def.lazy_init)
            .map(|(name, _)| name.clone())
            .collect();

        tracing::debug!("Pre-instantiating {} singleton beans", bean_names.len());
        for name in bean_names {
            self.get_bean(&name)?;
        }
        Ok(())
    }

    /// 清空单例缓存
    pub fn destroy_singletons(&self) {
        let count = {
            let mut singletons = self.singletons.write();
            let count = singletons.len();
            singletons.clear();
            count
        };
        tracing::info!("Destroyed {} singleton bean(s)", count);
    }

    /// 就地修改已注册的定义（不经过覆盖检查）
    pub fn modify_bean_definition<F>(&self, name: &str, modify: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition),
    {
        let mut definitions = self.definitions.write();
        let definition = definitions
            .get_mut(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        modify(definition);
        Ok(())
    }

    /// 实例化标记为后置处理器的定义并注册到工厂
    pub fn register_bean_post_processors(&self) -> ContainerResult<usize> {
        let names: Vec<String> = self
            .definitions
            .read()
            .iter()
            .filter(|(_, def)| def.attribute(BEAN_POST_PROCESSOR_ATTRIBUTE) == Some("true"))
            .map(|(name, _)| name.clone())
            .collect();

        let mut registered = 0;
        for name in names {
            if self.processor_bean_names.read().contains(&name) {
                continue;
            }
            let bean = self.get_bean(&name)?;
            let processor = bean.downcast::<PostProcessorBean>().map_err(|_| {
                ContainerError::TypeMismatch {
                    name: name.clone(),
                    expected: "PostProcessorBean".to_string(),
                }
            })?;
            tracing::debug!("Registering bean post processor '{}'", name);
            self.add_bean_post_processor(processor.processor());
            self.processor_bean_names.write().insert(name);
            registered += 1;
        }
        Ok(registered)
    }

    /// 解析别名
    pub fn canonical_name(&self, name: &str) -> String {
        let aliases = self.aliases.read();
        let mut current = name.to_string();
        let mut hops = 0;
        while let Some(target) = aliases.get(&current) {
            current = target.clone();
            hops += 1;
            if hops > aliases.len() {
                break;
            }
        }
        current
    }

    fn ensure_not_frozen(&self, action: &str) -> ContainerResult<()> {
        if self.is_configuration_frozen() {
            return Err(ContainerError::IllegalState(format!(
                "Cannot {} bean definition: configuration is frozen",
                action
            )));
        }
        Ok(())
    }

    fn find_supplier(&self, name: &str, definition: &BeanDefinition) -> Option<InstanceSupplier> {
        let suppliers = self.suppliers.read();
        if let Some(supplier) = suppliers.get(&SupplierKey::Bean(name.to_string())) {
            return Some(Arc::clone(supplier));
        }
        if let Some(method) = &definition.factory_method_name {
            let class_name = match &definition.factory_bean_name {
                Some(factory_bean) => self
                    .definitions
                    .read()
                    .get(&self.canonical_name(factory_bean))
                    .and_then(|d| d.bean_class_name.clone()),
                None => definition.bean_class_name.clone(),
            };
            let key = SupplierKey::FactoryMethod {
                class_name: class_name.unwrap_or_default(),
                method: method.clone(),
            };
            return suppliers.get(&key).cloned();
        }
        definition
            .bean_class_name
            .as_ref()
            .and_then(|class| suppliers.get(&SupplierKey::Class(class.clone())).cloned())
    }

    /// 创建 Bean 实例并调用后置处理器
    ///
    /// 1. 初始化 depends-on 的 Bean
    /// 2. 实例化（实例提供函数 / 工厂方法）
    /// 3. BeanPostProcessor.postProcessBeforeInitialization
    /// 4. BeanPostProcessor.postProcessAfterInitialization
    fn create_bean(&self, name: &str, definition: &BeanDefinition) -> ContainerResult<DynBean> {
        for dependency in &definition.depends_on {
            if self.creation_tracker.is_creating(dependency) {
                return Err(ContainerError::CurrentlyInCreation(format!(
                    "Circular depends-on relationship between '{}' and '{}'",
                    name, dependency
                )));
            }
            self.get_bean(dependency)?;
        }

        if !self.creation_tracker.start_creating(name) {
            let mut chain = self.creation_tracker.current_creating();
            chain.push(name.to_string());
            return Err(ContainerError::CurrentlyInCreation(chain.join(" -> ")));
        }
        let _guard = CreationGuard::new(&self.creation_tracker, name);

        let factory_instance = match (&definition.factory_bean_name, &definition.factory_method_name) {
            (Some(factory_bean), Some(_)) => Some(self.get_bean(factory_bean)?),
            _ => None,
        };

        let supplier = self.find_supplier(name, definition).ok_or_else(|| {
            ContainerError::creation(
                name,
                anyhow::anyhow!("No instance supplier registered for {}", definition.summary()),
            )
        })?;

        let context = CreationContext {
            factory: self,
            bean_name: name,
            definition,
            factory_instance,
            shared: self
                .self_ref
                .upgrade()
                .map(|f| f as Arc<dyn BeanFactory>),
        };
        let mut bean = supplier(&context).map_err(|e| match e.downcast::<ContainerError>() {
            Ok(ContainerError::CurrentlyInCreation(chain)) => {
                ContainerError::CurrentlyInCreation(chain)
            }
            Ok(other) => ContainerError::creation(name, other),
            Err(e) => ContainerError::creation(name, e),
        })?;

        for processor in self.bean_post_processors() {
            bean = processor.post_process_before_initialization(bean, name)?;
        }
        for processor in self.bean_post_processors() {
            bean = processor.post_process_after_initialization(bean, name)?;
        }
        Ok(bean)
    }
}

impl Default for DefaultListableBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<DynBean> {
        let name = self.canonical_name(name);
        tracing::trace!("Requesting bean: '{}'", name);

        if let Some(bean) = self.singletons.read().get(&name) {
            tracing::trace!("Returning cached instance of singleton bean '{}'", name);
            return Ok(Arc::clone(bean));
        }

        let definition = self.definitions.read().get(&name).cloned().ok_or_else(|| {
            tracing::debug!("Bean '{}' not found in container", name);
            ContainerError::BeanNotFound(name.clone())
        })?;

        match &definition.scope {
            Scope::Singleton => {
                tracing::debug!("Creating shared instance of singleton bean '{}'", name);
                let bean = self.create_bean(&name, &definition)?;
                let mut singletons = self.singletons.write();
                let bean = singletons
                    .entry(name.clone())
                    .or_insert_with(|| Arc::clone(&bean));
                Ok(Arc::clone(bean))
            }
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                self.create_bean(&name, &definition)
            }
            Scope::Custom(scope_name) => {
                let scope = self.scopes.read().get(scope_name).cloned().ok_or_else(|| {
                    ContainerError::IllegalState(format!(
                        "No Scope registered for scope name '{}'",
                        scope_name
                    ))
                })?;
                scope.get(&name, &|| self.create_bean(&name, &definition))
            }
        }
    }

    fn contains_bean(&self, name: &str) -> bool {
        let name = self.canonical_name(name);
        self.definitions.read().contains_key(&name) || self.singletons.read().contains_key(&name)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        let name = self.canonical_name(name);
        if let Some(definition) = self.definitions.read().get(&name) {
            return Ok(definition.is_singleton());
        }
        if self.singletons.read().contains_key(&name) {
            return Ok(true);
        }
        Err(ContainerError::BeanNotFound(name))
    }

    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        let name = self.canonical_name(name);
        if let Some(definition) = self.definitions.read().get(&name) {
            return Ok(definition.is_prototype());
        }
        if self.singletons.read().contains_key(&name) {
            return Ok(false);
        }
        Err(ContainerError::BeanNotFound(name))
    }

    fn get_type(&self, name: &str) -> Option<String> {
        let name = self.canonical_name(name);
        self.definitions
            .read()
            .get(&name)
            .and_then(|d| d.bean_type_name().map(String::from))
    }

    fn bean_names(&self) -> Vec<String> {
        let mut names = self.bean_definition_names();
        let mut manual: Vec<String> = self
            .singletons
            .read()
            .keys()
            .filter(|n| !names.contains(n))
            .cloned()
            .collect();
        manual.sort();
        names.extend(manual);
        names
    }

    fn bean_names_for_type(&self, type_name: &str) -> Vec<String> {
        self.definitions
            .read()
            .iter()
            .filter(|(_, def)| {
                def.bean_type_name()
                    .map(|t| self.metadata.is_assignable(t, type_name))
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn find_class(&self, class_name: &str) -> Option<Arc<ClassDef>> {
        self.metadata.find_class(class_name)
    }

    fn class_metadata(&self) -> Option<MetadataSources> {
        Some(self.metadata.clone())
    }
}

impl BeanDefinitionRegistry for DefaultListableBeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()> {
        self.ensure_not_frozen("register")?;
        if name.is_empty() {
            return Err(ContainerError::store(name, "Bean name must not be empty"));
        }

        tracing::trace!("Registering bean definition '{}': {}", name, definition);

        let mut definitions = self.definitions.write();
        if let Some(existing) = definitions.get(name) {
            if !self.is_allow_bean_definition_overriding() {
                return Err(ContainerError::BeanDefinitionOverride {
                    name: name.to_string(),
                    existing: existing.summary(),
                    new: definition.summary(),
                });
            }
            if existing.role < definition.role {
                tracing::info!(
                    "Overriding user-defined bean definition for bean '{}' with a framework-generated bean definition",
                    name
                );
            } else if *existing != definition {
                tracing::debug!(
                    "Overriding bean definition for bean '{}' with a different definition: replacing [{}] with [{}]",
                    name,
                    existing,
                    definition
                );
            }
            definitions.insert(name.to_string(), definition);
            drop(definitions);
            self.singletons.write().remove(name);
            return Ok(());
        }

        if self.aliases.read().contains_key(name) {
            if !self.is_allow_bean_definition_overriding() {
                return Err(ContainerError::store(
                    name,
                    format!("Cannot register bean definition under alias '{}'", name),
                ));
            }
            self.aliases.write().shift_remove(name);
        }
        definitions.insert(name.to_string(), definition);
        tracing::debug!("Bean definition registered: '{}'", name);
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.ensure_not_frozen("remove")?;
        let removed = self
            .definitions
            .write()
            .shift_remove(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        self.singletons.write().remove(name);
        tracing::debug!("Bean definition removed: '{}'", name);
        Ok(removed)
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()> {
        let mut aliases = self.aliases.write();
        if alias == name {
            aliases.shift_remove(alias);
            return Ok(());
        }
        if let Some(existing) = aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.is_allow_bean_definition_overriding() {
                return Err(ContainerError::IllegalState(format!(
                    "Cannot define alias '{}' for name '{}': it is already registered for name '{}'",
                    alias, name, existing
                )));
            }
        }
        // 别名不能形成环
        let mut current = name.to_string();
        while let Some(target) = aliases.get(&current) {
            if target == alias {
                return Err(ContainerError::IllegalState(format!(
                    "Cannot register alias '{}' for name '{}': circular reference",
                    alias, name
                )));
            }
            current = target.clone();
        }
        aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        self.aliases
            .read()
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    fn is_alias(&self, name: &str) -> bool {
        self.aliases.read().contains_key(name)
    }

    fn is_allow_bean_definition_overriding(&self) -> bool {
        self.allow_bean_definition_overriding.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    fn factory() -> Arc<DefaultListableBeanFactory> {
        let factory = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(
            Arc::new(ClassRegistry::new()),
        ));
        factory.register_supplier(SupplierKey::Class("app::Counter".to_string()), |_| {
            Ok(Arc::new(Counter(1)) as DynBean)
        });
        factory
    }

    #[test]
    fn test_singleton_and_prototype() {
        let factory = factory();
        factory
            .register_bean_definition("single", BeanDefinition::for_class("app::Counter"))
            .unwrap();
        factory
            .register_bean_definition(
                "proto",
                BeanDefinition::for_class("app::Counter").with_scope(Scope::Prototype),
            )
            .unwrap();

        let a = factory.get_bean("single").unwrap();
        let b = factory.get_bean("single").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = factory.get_bean("proto").unwrap();
        let d = factory.get_bean("proto").unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(factory.get_bean_typed::<Counter>("proto").unwrap().0, 1);
    }

    #[test]
    fn test_override_disallowed() {
        let factory = factory();
        factory.set_allow_bean_definition_overriding(false);
        factory
            .register_bean_definition("a", BeanDefinition::for_class("app::Counter"))
            .unwrap();
        let err = factory
            .register_bean_definition("a", BeanDefinition::for_class("app::Other"))
            .unwrap_err();
        assert!(matches!(err, ContainerError::BeanDefinitionOverride { .. }));
    }

    #[test]
    fn test_registration_order_and_aliases() {
        let factory = factory();
        for name in ["c", "a", "b"] {
            factory
                .register_bean_definition(name, BeanDefinition::for_class("app::Counter"))
                .unwrap();
        }
        assert_eq!(factory.bean_definition_names(), vec!["c", "a", "b"]);

        factory.register_alias("a", "alpha").unwrap();
        assert!(factory.is_alias("alpha"));
        assert!(factory.contains_bean("alpha"));
        assert_eq!(factory.aliases("a"), vec!["alpha"]);
        assert!(factory.register_alias("alpha", "a").is_err());

        factory.remove_bean_definition("a").unwrap();
        assert_eq!(factory.bean_definition_names(), vec!["c", "b"]);
    }

    #[test]
    fn test_circular_creation_detected() {
        let factory = factory();
        factory.register_supplier(SupplierKey::Bean("loop".to_string()), |ctx| {
            ctx.factory.get_bean("loop")?;
            Ok(Arc::new(Counter(0)) as DynBean)
        });
        factory
            .register_bean_definition("loop", BeanDefinition::for_class("app::Loop"))
            .unwrap();
        assert!(matches!(
            factory.get_bean("loop"),
            Err(ContainerError::CurrentlyInCreation(_))
        ));
    }

    #[test]
    fn test_missing_supplier_is_creation_failure() {
        let factory = factory();
        factory
            .register_bean_definition("x", BeanDefinition::for_class("app::Unknown"))
            .unwrap();
        match factory.get_bean("x") {
            Err(ContainerError::BeanCreation { name, .. }) => assert_eq!(name, "x"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_frozen_configuration() {
        let factory = factory();
        factory.freeze_configuration();
        assert!(factory
            .register_bean_definition("a", BeanDefinition::new())
            .is_err());
    }
}

//! @Import 的三种目标
//!
//! - `ImportSelector`：返回需要导入的类名，在当前解析过程中立即处理
//! - `DeferredImportSelector`：所有非延迟解析完成后再处理，可以按组合并
//! - `ImportBeanDefinitionRegistrar`：在读取阶段直接注册 Bean 定义
//!
//! 其他类名都按嵌套配置类处理。选择器与注册器通过类名在
//! `ImportComponentRegistry` 中查找。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{AnnotationMetadata, MetadataSources};
use crate::order::LOWEST_PRECEDENCE;
use crate::registry::DefaultListableBeanFactory;
use crate::resource::ResourceLoader;

/// 选择器与注册器可以访问的上下文
pub struct ImportContext<'a> {
    pub environment: &'a Environment,
    pub registry: &'a DefaultListableBeanFactory,
    pub metadata_sources: &'a MetadataSources,
    pub resource_loader: &'a dyn ResourceLoader,
}

/// 类名过滤器，返回 true 表示排除
pub type ClassNameFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 合并两个排除过滤器
pub fn or_filter(first: &ClassNameFilter, second: Option<ClassNameFilter>) -> ClassNameFilter {
    match second {
        Some(second) => {
            let first = Arc::clone(first);
            Arc::new(move |name: &str| first(name) || second(name))
        }
        None => Arc::clone(first),
    }
}

pub trait ImportSelector: Send + Sync {
    /// 根据导入类的元数据选择需要导入的类
    fn select_imports(
        &self,
        importing: &dyn AnnotationMetadata,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<Vec<String>>;

    fn exclusion_filter(&self) -> Option<ClassNameFilter> {
        None
    }
}

pub trait DeferredImportSelector: Send + Sync {
    fn select_imports(
        &self,
        importing: &dyn AnnotationMetadata,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<Vec<String>>;

    /// 分组名称，相同分组的选择器一起处理
    fn import_group(&self) -> Option<String> {
        None
    }

    fn exclusion_filter(&self) -> Option<ClassNameFilter> {
        None
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

/// 分组的一条导入结果
#[derive(Debug, Clone)]
pub struct GroupEntry {
    /// 发起导入的配置类
    pub metadata: Arc<dyn AnnotationMetadata>,
    pub import_class_name: String,
}

/// 延迟导入分组
///
/// 先对组内每个选择器调用 `process`，最后由 `select_imports` 给出最终顺序
pub trait ImportGroup: Send {
    fn process(
        &mut self,
        metadata: &Arc<dyn AnnotationMetadata>,
        selector: &dyn DeferredImportSelector,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()>;

    fn select_imports(&mut self) -> anyhow::Result<Vec<GroupEntry>>;
}

/// 没有声明分组的选择器使用的默认分组：按到达顺序返回
#[derive(Default)]
pub struct DefaultDeferredImportSelectorGroup {
    imports: Vec<GroupEntry>,
}

impl ImportGroup for DefaultDeferredImportSelectorGroup {
    fn process(
        &mut self,
        metadata: &Arc<dyn AnnotationMetadata>,
        selector: &dyn DeferredImportSelector,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()> {
        for import_class_name in selector.select_imports(&**metadata, context)? {
            self.imports.push(GroupEntry {
                metadata: Arc::clone(metadata),
                import_class_name,
            });
        }
        Ok(())
    }

    fn select_imports(&mut self) -> anyhow::Result<Vec<GroupEntry>> {
        Ok(std::mem::take(&mut self.imports))
    }
}

pub trait ImportBeanDefinitionRegistrar: Send + Sync {
    fn register_bean_definitions(
        &self,
        importing: &dyn AnnotationMetadata,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()>;
}

/// 已注册的导入组件
#[derive(Clone)]
pub enum ImportComponent {
    Selector(Arc<dyn ImportSelector>),
    Deferred(Arc<dyn DeferredImportSelector>),
    Registrar(Arc<dyn ImportBeanDefinitionRegistrar>),
}

impl fmt::Debug for ImportComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportComponent::Selector(_) => f.write_str("ImportSelector"),
            ImportComponent::Deferred(_) => f.write_str("DeferredImportSelector"),
            ImportComponent::Registrar(_) => f.write_str("ImportBeanDefinitionRegistrar"),
        }
    }
}

/// 链接期注册的导入组件
///
/// ```rust,ignore
/// inventory::submit! {
///     ImportComponentRegistration {
///         class_name: "chimera::aop::AspectJAutoProxyRegistrar",
///         create: || ImportComponent::Registrar(Arc::new(AspectJAutoProxyRegistrar)),
///     }
/// }
/// ```
pub struct ImportComponentRegistration {
    pub class_name: &'static str,
    pub create: fn() -> ImportComponent,
}

inventory::collect!(ImportComponentRegistration);

/// 链接期注册的导入分组
pub struct ImportGroupRegistration {
    pub name: &'static str,
    pub create: fn() -> Box<dyn ImportGroup>,
}

inventory::collect!(ImportGroupRegistration);

type GroupFactory = Arc<dyn Fn() -> Box<dyn ImportGroup> + Send + Sync>;

/// 类名 -> 导入组件，分组名 -> 分组工厂
pub struct ImportComponentRegistry {
    components: RwLock<HashMap<String, ImportComponent>>,
    groups: RwLock<HashMap<String, GroupFactory>>,
}

impl fmt::Debug for ImportComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportComponentRegistry")
            .field("components", &self.components.read().len())
            .field("groups", &self.groups.read().len())
            .finish()
    }
}

impl ImportComponentRegistry {
    /// 包含链接期注册的组件
    pub fn new() -> Self {
        let registry = Self::empty();
        for registration in inventory::iter::<ImportComponentRegistration> {
            registry.register(registration.class_name, (registration.create)());
        }
        for registration in inventory::iter::<ImportGroupRegistration> {
            let create = registration.create;
            registry.register_group(registration.name, move || create());
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, class_name: impl Into<String>, component: ImportComponent) {
        let class_name = class_name.into();
        tracing::trace!("Registering import component '{}': {:?}", class_name, component);
        self.components.write().insert(class_name, component);
    }

    pub fn register_selector(&self, class_name: impl Into<String>, selector: Arc<dyn ImportSelector>) {
        self.register(class_name, ImportComponent::Selector(selector));
    }

    pub fn register_deferred_selector(
        &self,
        class_name: impl Into<String>,
        selector: Arc<dyn DeferredImportSelector>,
    ) {
        self.register(class_name, ImportComponent::Deferred(selector));
    }

    pub fn register_registrar(
        &self,
        class_name: impl Into<String>,
        registrar: Arc<dyn ImportBeanDefinitionRegistrar>,
    ) {
        self.register(class_name, ImportComponent::Registrar(registrar));
    }

    pub fn register_group<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ImportGroup> + Send + Sync + 'static,
    {
        self.groups.write().insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, class_name: &str) -> Option<ImportComponent> {
        self.components.read().get(class_name).cloned()
    }

    /// 创建分组实例
    pub fn create_group(&self, name: &str) -> ContainerResult<Box<dyn ImportGroup>> {
        let factory = self.groups.read().get(name).cloned().ok_or_else(|| {
            ContainerError::IllegalState(format!("No import group registered under name '{}'", name))
        })?;
        Ok(factory())
    }
}

impl Default for ImportComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 正在处理的导入路径，用于循环检测
#[derive(Debug, Default, Clone)]
pub struct ImportStack {
    stack: Vec<String>,
}

impl ImportStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class_name: impl Into<String>) {
        self.stack.push(class_name.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.stack.iter().any(|c| c == class_name)
    }

    /// 自栈底到栈顶
    pub fn entries(&self) -> &[String] {
        &self.stack
    }

    /// 以 `next` 结尾的导入链
    pub fn chain_to(&self, next: &str) -> Vec<String> {
        let mut chain = self.stack.clone();
        chain.push(next.to_string());
        chain
    }
}

impl fmt::Display for ImportStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stack.join("->"))
    }
}

/// 被导入类 -> 导入它的类（按导入顺序）
#[derive(Debug, Default, Clone)]
pub struct ImportRegistry {
    imports: HashMap<String, Vec<Arc<dyn AnnotationMetadata>>>,
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_import(&mut self, importing: Arc<dyn AnnotationMetadata>, imported: &str) {
        self.imports
            .entry(imported.to_string())
            .or_default()
            .push(importing);
    }

    /// 最近一次导入给定类的类
    pub fn importing_class_for(&self, imported: &str) -> Option<&Arc<dyn AnnotationMetadata>> {
        self.imports.get(imported).and_then(|importers| importers.last())
    }

    /// 移除由给定类发起的所有导入记录
    pub fn remove_importing_class(&mut self, importing: &str) {
        for importers in self.imports.values_mut() {
            importers.retain(|m| m.class_name() != importing);
        }
        self.imports.retain(|_, importers| !importers.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ClassDef, ClassRegistry};

    #[test]
    fn test_import_stack_chain() {
        let mut stack = ImportStack::new();
        stack.push("app::A");
        stack.push("app::B");
        assert!(stack.contains("app::A"));
        assert_eq!(stack.chain_to("app::A"), vec!["app::A", "app::B", "app::A"]);
        assert_eq!(stack.to_string(), "[app::A->app::B]");
        assert_eq!(stack.pop().as_deref(), Some("app::B"));
    }

    #[test]
    fn test_import_registry() {
        let classes = Arc::new(ClassRegistry::new());
        classes.register(ClassDef::new("app::A"));
        classes.register(ClassDef::new("app::B"));
        let a = classes.annotation_metadata("app::A").unwrap() as Arc<dyn AnnotationMetadata>;
        let b = classes.annotation_metadata("app::B").unwrap() as Arc<dyn AnnotationMetadata>;

        let mut registry = ImportRegistry::new();
        registry.register_import(Arc::clone(&a), "app::C");
        registry.register_import(b, "app::C");
        assert_eq!(
            registry.importing_class_for("app::C").map(|m| m.class_name().to_string()),
            Some("app::B".to_string())
        );
        registry.remove_importing_class("app::B");
        assert_eq!(
            registry.importing_class_for("app::C").map(|m| m.class_name().to_string()),
            Some("app::A".to_string())
        );
    }

    #[test]
    fn test_unknown_group_is_error() {
        let registry = ImportComponentRegistry::empty();
        assert!(registry.create_group("missing").is_err());
        registry.register_group("known", || Box::new(DefaultDeferredImportSelectorGroup::default()));
        assert!(registry.create_group("known").is_ok());
    }
}

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{DEPENDS_ON, DESCRIPTION, LAZY, PRIMARY, ROLE};
use crate::metadata::AnnotatedTypeMetadata;
use crate::scope::Scope;

/// Bean 的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Role {
    /// 用户定义的 Bean
    #[default]
    Application,
    /// 较大配置的一部分
    Support,
    /// 框架内部基础设施
    Infrastructure,
}

impl Role {
    pub fn from_value(value: i64) -> Self {
        match value {
            1 => Role::Support,
            2 => Role::Infrastructure,
            _ => Role::Application,
        }
    }
}

/// Bean 定义的来源
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BeanOrigin {
    /// 手动注册
    #[default]
    Generic,
    /// 组件扫描得到
    Scanned,
    /// 以注解类型直接注册（例如被导入的配置类）
    Annotated,
    /// 配置类中的 @Bean 方法
    ConfigurationClass {
        config_class: String,
        method: String,
        is_static: bool,
    },
    /// 从导入的资源文件中读取
    ImportedResource { resource: String },
}

impl BeanOrigin {
    pub fn is_scanned(&self) -> bool {
        matches!(self, BeanOrigin::Scanned)
    }

    /// 来自配置类的 @Bean 方法时返回配置类名
    pub fn config_class(&self) -> Option<&str> {
        match self {
            BeanOrigin::ConfigurationClass { config_class, .. } => Some(config_class),
            _ => None,
        }
    }
}

/// Bean 定义 - 描述如何创建和管理 Bean
///
/// 纯数据记录，实例化逻辑由 `InstanceSupplier` 提供
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeanDefinition {
    /// Bean 的类型
    pub bean_class_name: Option<String>,

    /// Bean 的作用域
    pub scope: Scope,

    pub role: Role,

    pub origin: BeanOrigin,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy_init: bool,

    pub primary: bool,

    pub autowire_candidate: bool,

    /// 需要先初始化的 Bean
    pub depends_on: Vec<String>,

    /// 实例工厂方法所在的 Bean
    pub factory_bean_name: Option<String>,

    pub factory_method_name: Option<String>,

    /// 工厂方法没有重载
    pub unique_factory_method: bool,

    pub init_method: Option<String>,

    pub destroy_method: Option<String>,

    pub description: Option<String>,

    /// 定义来源的描述（类名或资源路径）
    pub resource_description: Option<String>,

    /// 工厂方法的返回类型
    pub target_type: Option<String>,

    pub attributes: BTreeMap<String, String>,

    /// 被作用域代理包装的原始定义
    pub decorated_definition: Option<Box<BeanDefinitionHolder>>,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义
    pub fn new() -> Self {
        Self {
            autowire_candidate: true,
            ..Default::default()
        }
    }

    /// 指定类型的 Bean 定义
    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            bean_class_name: Some(class_name.into()),
            resource_description: None,
            ..Self::new()
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_origin(mut self, origin: BeanOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// 设置依赖列表
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.scope.is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.scope.is_prototype()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Bean 实例的类型：工厂方法的返回类型优先
    pub fn bean_type_name(&self) -> Option<&str> {
        self.target_type
            .as_deref()
            .or(self.bean_class_name.as_deref())
    }

    /// 简短描述，用于错误信息
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(class) = &self.bean_class_name {
            parts.push(format!("class [{}]", class));
        }
        parts.push(format!("scope={}", self.scope));
        if let Some(factory_bean) = &self.factory_bean_name {
            parts.push(format!("factoryBeanName={}", factory_bean));
        }
        if let Some(method) = &self.factory_method_name {
            parts.push(format!("factoryMethodName={}", method));
        }
        if let Some(resource) = &self.resource_description {
            parts.push(format!("defined in {}", resource));
        }
        parts.join("; ")
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// 名称 + 别名 + 定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanDefinitionHolder {
    pub name: String,
    pub aliases: Vec<String>,
    pub definition: BeanDefinition,
}

impl BeanDefinitionHolder {
    pub fn new(name: impl Into<String>, definition: BeanDefinition) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            definition,
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }
}

/// 把 @Lazy、@Primary、@DependsOn、@Role、@Description 应用到定义上
pub fn apply_common_annotations<M: AnnotatedTypeMetadata + ?Sized>(
    definition: &mut BeanDefinition,
    metadata: &M,
) {
    if let Some(lazy) = metadata.annotation_attributes(LAZY) {
        definition.lazy_init = lazy.get_bool("value").unwrap_or(true);
    }
    if metadata.is_annotated(PRIMARY) {
        definition.primary = true;
    }
    if let Some(depends_on) = metadata.annotation_attributes(DEPENDS_ON) {
        definition.depends_on = depends_on.get_string_array("value");
    }
    if let Some(role) = metadata.annotation_attributes(ROLE) {
        definition.role = Role::from_value(role.get_int("value").unwrap_or(0));
    }
    if let Some(description) = metadata.annotation_attributes(DESCRIPTION) {
        definition.description = description.get_str("value").map(String::from);
    }
}

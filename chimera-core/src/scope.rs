use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bean_definition::{BeanDefinition, BeanDefinitionHolder};
use crate::constants::{SCOPE, SCOPED_PROXY_FACTORY_BEAN, SCOPED_TARGET_NAME_PREFIX};
use crate::error::ContainerResult;
use crate::metadata::AnnotatedTypeMetadata;
use crate::registry::BeanDefinitionRegistry;

/// Bean 的作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 自定义作用域（例如 request、session）
    Custom(String),
}

impl Scope {
    /// 从作用域名称解析，空字符串视为单例
    pub fn from_name(name: &str) -> Self {
        match name {
            "" | "singleton" => Scope::Singleton,
            "prototype" => Scope::Prototype,
            other => Scope::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
            Scope::Custom(name) => name,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, Scope::Prototype)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 作用域代理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopedProxyMode {
    /// 未指定（等同于 No，除非扫描器给出了默认值）
    #[default]
    Default,
    /// 不创建作用域代理
    No,
    /// 基于接口的代理
    Interfaces,
    /// 基于子类的代理
    TargetClass,
}

impl ScopedProxyMode {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "NO" => ScopedProxyMode::No,
            "INTERFACES" => ScopedProxyMode::Interfaces,
            "TARGET_CLASS" | "TARGETCLASS" => ScopedProxyMode::TargetClass,
            _ => ScopedProxyMode::Default,
        }
    }

    /// 是否需要创建代理
    pub fn requires_proxy(&self) -> bool {
        matches!(self, ScopedProxyMode::Interfaces | ScopedProxyMode::TargetClass)
    }
}

/// 作用域元数据：作用域名称 + 代理模式
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeMetadata {
    pub scope: Scope,
    pub proxy_mode: ScopedProxyMode,
}

/// 从 @Scope 注解解析作用域元数据
///
/// `default_proxy_mode` 在注解未显式指定代理模式时生效（扫描器可以配置）
#[derive(Debug, Clone, Copy)]
pub struct AnnotationScopeMetadataResolver {
    default_proxy_mode: ScopedProxyMode,
}

impl AnnotationScopeMetadataResolver {
    pub fn new() -> Self {
        Self {
            default_proxy_mode: ScopedProxyMode::No,
        }
    }

    pub fn with_default_proxy_mode(mode: ScopedProxyMode) -> Self {
        Self {
            default_proxy_mode: mode,
        }
    }

    pub fn resolve<M: AnnotatedTypeMetadata + ?Sized>(&self, metadata: &M) -> ScopeMetadata {
        let mut scope_metadata = ScopeMetadata::default();
        if let Some(scope) = metadata.annotation_attributes(SCOPE) {
            let name = scope
                .get_str("value")
                .or_else(|| scope.get_str("scopeName"))
                .unwrap_or_default();
            scope_metadata.scope = Scope::from_name(name);
            let mut mode = scope
                .get_str("proxyMode")
                .map(ScopedProxyMode::from_name)
                .unwrap_or_default();
            if mode == ScopedProxyMode::Default {
                mode = self.default_proxy_mode;
            }
            scope_metadata.proxy_mode = mode;
        }
        scope_metadata
    }
}

impl Default for AnnotationScopeMetadataResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 作用域代理的目标 Bean 名称
pub fn scoped_target_name(original_bean_name: &str) -> String {
    format!("{}{}", SCOPED_TARGET_NAME_PREFIX, original_bean_name)
}

pub fn is_scoped_target(bean_name: &str) -> bool {
    bean_name.starts_with(SCOPED_TARGET_NAME_PREFIX)
}

/// 按作用域元数据决定是否包装为作用域代理
pub fn apply_scoped_proxy_mode(
    scope_metadata: &ScopeMetadata,
    holder: BeanDefinitionHolder,
    registry: &dyn BeanDefinitionRegistry,
) -> ContainerResult<BeanDefinitionHolder> {
    if !scope_metadata.proxy_mode.requires_proxy() {
        return Ok(holder);
    }
    let proxy_target_class = scope_metadata.proxy_mode == ScopedProxyMode::TargetClass;
    create_scoped_proxy(holder, registry, proxy_target_class)
}

/// 创建作用域代理定义
///
/// 原始定义以 `scopedTarget.` 前缀注册，不参与自动装配；
/// 原名称和别名指向代理定义，代理每次调用时从容器取目标
pub fn create_scoped_proxy(
    holder: BeanDefinitionHolder,
    registry: &dyn BeanDefinitionRegistry,
    proxy_target_class: bool,
) -> ContainerResult<BeanDefinitionHolder> {
    let original_name = holder.name.clone();
    let target_name = scoped_target_name(&original_name);
    let target = holder.definition.clone();

    let mut proxy = BeanDefinition::for_class(SCOPED_PROXY_FACTORY_BEAN)
        .with_role(target.role)
        .with_origin(target.origin.clone())
        .with_primary(target.primary)
        .with_attribute("targetBeanName", target_name.clone())
        .with_attribute("proxyTargetClass", proxy_target_class.to_string());
    proxy.target_type = target.bean_type_name().map(String::from);
    proxy.autowire_candidate = target.autowire_candidate;
    proxy.resource_description = target.resource_description.clone();
    proxy.decorated_definition = Some(Box::new(BeanDefinitionHolder::new(
        target_name.clone(),
        target.clone(),
    )));

    let mut hidden_target = target;
    hidden_target.autowire_candidate = false;
    hidden_target.primary = false;

    tracing::debug!(
        "Registering scoped target '{}' behind proxy '{}'",
        target_name,
        original_name
    );
    registry.register_bean_definition(&target_name, hidden_target)?;

    Ok(BeanDefinitionHolder::new(original_name, proxy).with_aliases(holder.aliases))
}

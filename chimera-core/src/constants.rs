/// 核心注解与基础设施名称常量
///
/// 这个模块定义了所有内置注解类型和基础设施 Bean 的名称，
/// 确保解析器、读取器和扫描器使用相同的标识符，避免硬编码和不一致的问题
///
/// 当添加新的内置注解时，只需要在这里添加相应的常量，并在
/// `metadata::builtin` 中声明其元注解即可

/// 构造型注解
pub const COMPONENT: &str = "chimera::Component";
pub const SERVICE: &str = "chimera::Service";
pub const REPOSITORY: &str = "chimera::Repository";
pub const CONTROLLER: &str = "chimera::Controller";
pub const CONFIGURATION: &str = "chimera::Configuration";

/// 配置类相关注解
pub const BEAN: &str = "chimera::Bean";
pub const IMPORT: &str = "chimera::Import";
pub const IMPORT_RESOURCE: &str = "chimera::ImportResource";
pub const PROPERTY_SOURCE: &str = "chimera::PropertySource";
pub const COMPONENT_SCAN: &str = "chimera::ComponentScan";
pub const COMPONENT_SCAN_FILTER: &str = "chimera::ComponentScan::Filter";

/// 通用定义注解
pub const SCOPE: &str = "chimera::Scope";
pub const LAZY: &str = "chimera::Lazy";
pub const PRIMARY: &str = "chimera::Primary";
pub const DEPENDS_ON: &str = "chimera::DependsOn";
pub const ROLE: &str = "chimera::Role";
pub const DESCRIPTION: &str = "chimera::Description";
pub const ORDER: &str = "chimera::Order";

/// 条件注解
pub const CONDITIONAL: &str = "chimera::Conditional";
pub const PROFILE: &str = "chimera::Profile";
pub const CONDITIONAL_ON_EXPRESSION: &str = "chimera::ConditionalOnExpression";

/// 内置条件的名称（用于 @Conditional 的 value）
pub const PROFILE_CONDITION: &str = "chimera::ProfileCondition";
pub const EXPRESSION_CONDITION: &str = "chimera::ExpressionCondition";

/// 平台包前缀，这些包中的类型不会被当作配置类的父类继续处理
pub const PLATFORM_PACKAGE_PREFIXES: &[&str] = &["std::", "core::", "alloc::"];

/// 配置类模式属性（full / lite）
pub const CONFIGURATION_CLASS_ATTRIBUTE: &str = "chimera.configurationClass";
pub const CONFIGURATION_CLASS_FULL: &str = "full";
pub const CONFIGURATION_CLASS_LITE: &str = "lite";

/// 配置类顺序属性
pub const ORDER_ATTRIBUTE: &str = "chimera.order";

/// 作用域代理目标 Bean 名称前缀
pub const SCOPED_TARGET_NAME_PREFIX: &str = "scopedTarget.";

/// 作用域代理工厂 Bean 的类型名
pub const SCOPED_PROXY_FACTORY_BEAN: &str = "chimera::aop::ScopedProxyFactoryBean";

/// 默认推断的销毁方法
pub const INFER_METHOD: &str = "(inferred)";

/// 检查给定的类型名称是否属于平台包
///
/// # Example
/// ```
/// use chimera_core::constants::is_platform_type;
///
/// assert!(is_platform_type("std::string::String"));
/// assert!(!is_platform_type("app::config::AppConfig"));
/// ```
pub fn is_platform_type(type_name: &str) -> bool {
    PLATFORM_PACKAGE_PREFIXES
        .iter()
        .any(|prefix| type_name.starts_with(prefix))
}

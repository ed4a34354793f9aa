//! 配置类候选判断
//!
//! - full：带 @Configuration 且 proxyBeanMethods 不为 false
//! - lite：带 @Component / @ComponentScan / @Import / @ImportResource，或有 @Bean 方法

use crate::bean_definition::BeanDefinition;
use crate::constants::{
    BEAN, COMPONENT, COMPONENT_SCAN, CONFIGURATION, CONFIGURATION_CLASS_ATTRIBUTE,
    CONFIGURATION_CLASS_FULL, CONFIGURATION_CLASS_LITE, IMPORT, IMPORT_RESOURCE, ORDER_ATTRIBUTE,
};
use crate::metadata::{AnnotationMetadata, MetadataSources};
use crate::order::{order_from_metadata, LOWEST_PRECEDENCE};

const CANDIDATE_INDICATORS: &[&str] = &[COMPONENT, COMPONENT_SCAN, IMPORT, IMPORT_RESOURCE];

/// 配置类模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationClassMode {
    Full,
    Lite,
}

impl ConfigurationClassMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigurationClassMode::Full => CONFIGURATION_CLASS_FULL,
            ConfigurationClassMode::Lite => CONFIGURATION_CLASS_LITE,
        }
    }
}

/// 是否可以作为 lite 配置类处理
pub fn is_configuration_candidate(metadata: &dyn AnnotationMetadata) -> bool {
    if metadata.is_interface() {
        return false;
    }
    if CANDIDATE_INDICATORS
        .iter()
        .any(|indicator| metadata.is_annotated(indicator))
    {
        return true;
    }
    metadata.has_annotated_methods(BEAN)
}

/// 配置类的模式，不是配置类时返回 None
pub fn configuration_class_mode(metadata: &dyn AnnotationMetadata) -> Option<ConfigurationClassMode> {
    match metadata.annotation_attributes(CONFIGURATION) {
        Some(config) if config.get_bool("proxyBeanMethods").unwrap_or(true) => {
            Some(ConfigurationClassMode::Full)
        }
        Some(_) => Some(ConfigurationClassMode::Lite),
        None if is_configuration_candidate(metadata) => Some(ConfigurationClassMode::Lite),
        None => None,
    }
}

/// 检查定义是否为配置类候选，是的话在定义上记录模式与顺序
pub fn check_configuration_class_candidate(
    definition: &mut BeanDefinition,
    sources: &MetadataSources,
) -> bool {
    let Some(class_name) = definition.bean_class_name.clone() else {
        return false;
    };
    if definition.factory_method_name.is_some() {
        return false;
    }
    let metadata = match sources.annotation_metadata(&class_name) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!("Could not find class file for introspecting configuration annotations: {}", e);
            return false;
        }
    };
    let Some(mode) = configuration_class_mode(&*metadata) else {
        return false;
    };
    definition
        .attributes
        .insert(CONFIGURATION_CLASS_ATTRIBUTE.to_string(), mode.as_str().to_string());
    if let Some(order) = order_from_metadata(&*metadata) {
        definition
            .attributes
            .insert(ORDER_ATTRIBUTE.to_string(), order.to_string());
    }
    true
}

/// 定义上记录的配置类模式
pub fn is_full_configuration(definition: &BeanDefinition) -> bool {
    definition.attribute(CONFIGURATION_CLASS_ATTRIBUTE) == Some(CONFIGURATION_CLASS_FULL)
}

/// 定义上记录的顺序
pub fn order_of(definition: &BeanDefinition) -> i32 {
    definition
        .attribute(ORDER_ATTRIBUTE)
        .and_then(|v| v.parse().ok())
        .unwrap_or(LOWEST_PRECEDENCE)
}

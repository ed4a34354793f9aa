//! Bean 名称生成
//!
//! - `AnnotationBeanNameGenerator`：组件注解上显式的 value，否则使用首字母小写的短类名
//! - `FullyQualifiedAnnotationBeanNameGenerator`：被导入的配置类使用完整类名
//! - `DefaultBeanNameGenerator`：没有注解信息的定义（例如从资源文件读取）

use crate::bean_definition::BeanDefinition;
use crate::constants::COMPONENT;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{short_name, AnnotationMetadata, ClassSource, MergedAnnotations};
use crate::registry::BeanDefinitionRegistry;
use crate::utils::naming::decapitalize;

/// Bean 名称生成策略
pub trait BeanNameGenerator: Send + Sync {
    fn generate_bean_name(
        &self,
        metadata: &dyn AnnotationMetadata,
        source: &dyn ClassSource,
    ) -> ContainerResult<String>;
}

/// 注解类型是否为组件注解（@Component 本身或以它为元注解）
pub fn is_stereotype(annotation_type: &str, source: &dyn ClassSource) -> bool {
    if annotation_type == COMPONENT {
        return true;
    }
    source
        .find_class(annotation_type)
        .map(|def| MergedAnnotations::from_annotations(&def.annotations, source).is_present(COMPONENT))
        .unwrap_or(false)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotationBeanNameGenerator;

impl AnnotationBeanNameGenerator {
    /// 从直接声明的组件注解中读取显式名称
    ///
    /// 多个组件注解给出不同名称时报错
    pub fn determine_from_annotation(
        metadata: &dyn AnnotationMetadata,
        source: &dyn ClassSource,
    ) -> ContainerResult<Option<String>> {
        let mut bean_name: Option<String> = None;
        for annotation in metadata.merged_annotations().direct() {
            if !is_stereotype(annotation.type_name(), source) {
                continue;
            }
            let attributes = annotation.attributes();
            let Some(value) = attributes.get_str("value") else {
                continue;
            };
            match &bean_name {
                Some(existing) if existing != value => {
                    return Err(ContainerError::IllegalState(format!(
                        "Stereotype annotations suggest inconsistent component names: '{}' versus '{}'",
                        existing, value
                    )));
                }
                _ => bean_name = Some(value.to_string()),
            }
        }
        Ok(bean_name)
    }

    /// 默认名称：首字母小写的短类名
    pub fn build_default_bean_name(class_name: &str) -> String {
        decapitalize(short_name(class_name))
    }
}

impl BeanNameGenerator for AnnotationBeanNameGenerator {
    fn generate_bean_name(
        &self,
        metadata: &dyn AnnotationMetadata,
        source: &dyn ClassSource,
    ) -> ContainerResult<String> {
        if let Some(name) = Self::determine_from_annotation(metadata, source)? {
            return Ok(name);
        }
        Ok(Self::build_default_bean_name(metadata.class_name()))
    }
}

/// 以完整类名作为默认名称
#[derive(Debug, Default, Clone, Copy)]
pub struct FullyQualifiedAnnotationBeanNameGenerator;

impl BeanNameGenerator for FullyQualifiedAnnotationBeanNameGenerator {
    fn generate_bean_name(
        &self,
        metadata: &dyn AnnotationMetadata,
        source: &dyn ClassSource,
    ) -> ContainerResult<String> {
        if let Some(name) = AnnotationBeanNameGenerator::determine_from_annotation(metadata, source)? {
            return Ok(name);
        }
        Ok(metadata.class_name().to_string())
    }
}

/// 类名 + `#` + 序号，序号取第一个未被占用的值
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBeanNameGenerator;

impl DefaultBeanNameGenerator {
    pub fn generate(
        definition: &BeanDefinition,
        registry: &dyn BeanDefinitionRegistry,
    ) -> ContainerResult<String> {
        let base = match (&definition.bean_class_name, &definition.factory_bean_name) {
            (Some(class), _) => class.clone(),
            (None, Some(factory_bean)) => format!("{}$created", factory_bean),
            (None, None) => {
                return Err(ContainerError::store(
                    "",
                    "Unnamed bean definition specifies neither 'class' nor 'factory-bean'",
                ))
            }
        };
        let mut counter = 0;
        loop {
            let candidate = format!("{}#{}", base, counter);
            if !registry.is_bean_name_in_use(&candidate) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }
}

//! 元数据抽象
//!
//! 统一的只读视图，描述类型的注解、方法、接口与成员类型。
//! 运行时视图来自 `ClassRegistry`，离线视图来自 `MetadataReaderFactory`。

pub mod annotations;
pub mod builtin;
pub mod class_def;
pub mod class_registry;
pub mod reader;
pub mod type_metadata;

use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};

pub use annotations::{AnnotationAttributes, ClassSource, MergedAnnotation, MergedAnnotations};
pub use builtin::ClassRegistration;
pub use class_def::{
    package_name, short_name, Annotation, AttributeValue, ClassDef, ClassKind, FieldDef,
    MethodDef, MethodKey,
};
pub use class_registry::ClassRegistry;
pub use reader::{DescriptorFormat, MetadataReader, MetadataReaderFactory, SimpleMetadataReaderFactory};
pub use type_metadata::{
    AnnotatedTypeMetadata, AnnotationMetadata, ClassMetadata, MethodMetadata,
    SimpleAnnotationMetadata, StandardAnnotationMetadata,
};

/// 运行时注册表 + 离线读取器的组合
///
/// 查找时优先使用运行时视图，找不到时回退到离线描述
#[derive(Clone)]
pub struct MetadataSources {
    registry: Arc<ClassRegistry>,
    reader_factory: Arc<dyn MetadataReaderFactory>,
}

impl std::fmt::Debug for MetadataSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataSources")
            .field("registry", &self.registry)
            .finish()
    }
}

impl MetadataSources {
    pub fn new(registry: Arc<ClassRegistry>, reader_factory: Arc<dyn MetadataReaderFactory>) -> Self {
        Self {
            registry,
            reader_factory,
        }
    }

    /// 只有运行时注册表（离线读取器仅包含内置类型）
    pub fn with_registry(registry: Arc<ClassRegistry>) -> Self {
        Self::new(registry, Arc::new(SimpleMetadataReaderFactory::new()))
    }

    pub fn class_registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn reader_factory(&self) -> &Arc<dyn MetadataReaderFactory> {
        &self.reader_factory
    }

    /// 给定类型的注解元数据
    pub fn annotation_metadata(&self, class_name: &str) -> ContainerResult<Arc<dyn AnnotationMetadata>> {
        if let Some(metadata) = self.registry.annotation_metadata(class_name) {
            return Ok(metadata as Arc<dyn AnnotationMetadata>);
        }
        match self.reader_factory.metadata_reader(class_name) {
            Ok(reader) => Ok(Arc::clone(reader.annotation_metadata()) as Arc<dyn AnnotationMetadata>),
            Err(ContainerError::ClassNotFound(_)) => {
                Err(ContainerError::ClassNotFound(class_name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// 只查离线描述
    pub fn resolve_offline(&self, class_name: &str) -> Option<Arc<SimpleAnnotationMetadata>> {
        self.reader_factory
            .metadata_reader(class_name)
            .ok()
            .map(|reader| Arc::clone(reader.annotation_metadata()))
    }

    /// 两个来源中给定包内的类型名称（排序、去重）
    pub fn class_names_in_package(&self, package: &str) -> Vec<String> {
        let mut names = self.registry.class_names_in_package(package);
        names.extend(self.reader_factory.class_names_in_package(package));
        names.sort();
        names.dedup();
        names
    }

    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        class_registry::is_assignable_in(self, sub, sup)
    }
}

impl ClassSource for MetadataSources {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.registry
            .get(name)
            .or_else(|| self.reader_factory.find_descriptor(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONFIGURATION;

    #[test]
    fn test_live_first_then_offline() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::new("app::Live"));
        let factory = Arc::new(SimpleMetadataReaderFactory::new());
        factory.add_descriptor(
            "app.toml",
            ClassDef::new("app::Offline").annotated(Annotation::new(CONFIGURATION)),
        );
        let sources = MetadataSources::new(registry, factory);

        assert!(sources
            .annotation_metadata("app::Live")
            .unwrap()
            .introspected_class()
            .is_some());
        let offline = sources.annotation_metadata("app::Offline").unwrap();
        assert!(offline.introspected_class().is_none());
        assert!(offline.has_annotation(CONFIGURATION));
        assert!(sources.resolve_offline("app::Live").is_none());
        assert_eq!(sources.class_names_in_package("app").len(), 2);
        assert!(matches!(
            sources.annotation_metadata("app::Nope"),
            Err(ContainerError::ClassNotFound(_))
        ));
    }
}

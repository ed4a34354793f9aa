//! 离线元数据读取
//!
//! 类型描述文档（TOML 或 JSON）中的 `[[class]]` 条目被解析为 `ClassDef`，
//! 但不会注册到运行时的 `ClassRegistry`。
//!
//! ```toml
//! [[class]]
//! name = "app::AppConfig"
//! annotations = [{ type = "chimera::Configuration" }]
//!
//! [[class.methods]]
//! name = "data_source"
//! return_type = "app::DataSource"
//! annotations = [{ type = "chimera::Bean" }]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};

use super::annotations::ClassSource;
use super::builtin::well_known_classes;
use super::class_def::ClassDef;
use super::type_metadata::SimpleAnnotationMetadata;

/// 描述文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Toml,
    Json,
}

impl DescriptorFormat {
    /// 根据文件扩展名判断格式
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Some(DescriptorFormat::Toml),
            Some("json") => Some(DescriptorFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorDocument {
    #[serde(default, rename = "class")]
    classes: Vec<ClassDef>,
}

/// 离线读取结果：来源资源 + 元数据
#[derive(Debug, Clone)]
pub struct MetadataReader {
    resource: String,
    metadata: Arc<SimpleAnnotationMetadata>,
}

impl MetadataReader {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn annotation_metadata(&self) -> &Arc<SimpleAnnotationMetadata> {
        &self.metadata
    }
}

/// 可插拔的离线元数据读取工厂
pub trait MetadataReaderFactory: Send + Sync {
    fn metadata_reader(&self, class_name: &str) -> ContainerResult<MetadataReader>;

    /// 原始描述（用于可赋值性判断等结构查询）
    fn find_descriptor(&self, class_name: &str) -> Option<Arc<ClassDef>>;

    /// 给定包（含子包）中的类型名称（排序）
    fn class_names_in_package(&self, package: &str) -> Vec<String>;
}

#[derive(Debug)]
struct Descriptor {
    resource: String,
    def: Arc<ClassDef>,
}

#[derive(Debug, Default)]
struct DescriptorStore {
    classes: RwLock<HashMap<String, Descriptor>>,
}

impl ClassSource for DescriptorStore {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.read().get(name).map(|d| Arc::clone(&d.def))
    }
}

/// 基于描述文档的读取工厂
#[derive(Debug)]
pub struct SimpleMetadataReaderFactory {
    store: Arc<DescriptorStore>,
}

impl SimpleMetadataReaderFactory {
    /// 预先加载内置类型
    pub fn new() -> Self {
        let factory = Self {
            store: Arc::new(DescriptorStore::default()),
        };
        for def in well_known_classes() {
            factory.add_descriptor("builtin", def);
        }
        factory
    }

    pub fn add_descriptor(&self, resource: impl Into<String>, mut def: ClassDef) {
        def.normalize();
        self.store.classes.write().insert(
            def.name.clone(),
            Descriptor {
                resource: resource.into(),
                def: Arc::new(def),
            },
        );
    }

    /// 解析一个描述文档，返回其中的类型名称
    pub fn load_str(
        &self,
        content: &str,
        resource: &str,
        format: DescriptorFormat,
    ) -> ContainerResult<Vec<String>> {
        let document: DescriptorDocument = match format {
            DescriptorFormat::Toml => toml::from_str(content).map_err(|e| {
                ContainerError::Metadata {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }
            })?,
            DescriptorFormat::Json => serde_json::from_str(content).map_err(|e| {
                ContainerError::Metadata {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }
            })?,
        };

        let names: Vec<String> = document.classes.iter().map(|c| c.name.clone()).collect();
        for def in document.classes {
            self.add_descriptor(resource, def);
        }
        tracing::debug!("Loaded {} class descriptor(s) from {}", names.len(), resource);
        Ok(names)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> ContainerResult<Vec<String>> {
        let path = path.as_ref();
        let resource = path.display().to_string();
        let format = DescriptorFormat::from_path(path).ok_or_else(|| ContainerError::Metadata {
            resource: resource.clone(),
            message: "unsupported descriptor format (expected .toml or .json)".to_string(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| ContainerError::Resource {
            location: resource.clone(),
            message: e.to_string(),
        })?;
        self.load_str(&content, &resource, format)
    }

    /// 加载目录下的所有描述文档（按文件名排序）
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> ContainerResult<Vec<String>> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| ContainerError::Resource {
            location: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| DescriptorFormat::from_path(p).is_some())
            .collect();
        paths.sort();

        let mut names = Vec::new();
        for path in paths {
            names.extend(self.load_file(&path)?);
        }
        Ok(names)
    }
}

impl Default for SimpleMetadataReaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataReaderFactory for SimpleMetadataReaderFactory {
    fn metadata_reader(&self, class_name: &str) -> ContainerResult<MetadataReader> {
        let (resource, def) = {
            let classes = self.store.classes.read();
            let descriptor = classes
                .get(class_name)
                .ok_or_else(|| ContainerError::ClassNotFound(class_name.to_string()))?;
            (descriptor.resource.clone(), Arc::clone(&descriptor.def))
        };
        let source: Arc<dyn ClassSource> = Arc::clone(&self.store) as Arc<dyn ClassSource>;
        Ok(MetadataReader {
            resource,
            metadata: Arc::new(SimpleAnnotationMetadata::new(def, source)),
        })
    }

    fn find_descriptor(&self, class_name: &str) -> Option<Arc<ClassDef>> {
        self.store.find_class(class_name)
    }

    fn class_names_in_package(&self, package: &str) -> Vec<String> {
        let prefix = format!("{}::", package);
        let mut names: Vec<String> = self
            .store
            .classes
            .read()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BEAN, COMPONENT, CONFIGURATION};
    use crate::metadata::type_metadata::{AnnotatedTypeMetadata, AnnotationMetadata, ClassMetadata};

    const DOC: &str = r#"
        [[class]]
        name = "app::AppConfig"
        annotations = [{ type = "chimera::Configuration" }]

        [[class.methods]]
        name = "b"
        annotations = [{ type = "chimera::Bean" }]

        [[class.methods]]
        name = "a"
        annotations = [{ type = "chimera::Bean" }]

        [[class.methods]]
        name = "a"
        bridge = true
        annotations = [{ type = "chimera::Bean" }]
    "#;

    #[test]
    fn test_load_toml_descriptor() {
        let factory = SimpleMetadataReaderFactory::new();
        let names = factory
            .load_str(DOC, "app.toml", DescriptorFormat::Toml)
            .unwrap();
        assert_eq!(names, vec!["app::AppConfig".to_string()]);

        let reader = factory.metadata_reader("app::AppConfig").unwrap();
        let metadata = reader.annotation_metadata();
        assert_eq!(reader.resource(), "app.toml");
        assert_eq!(metadata.class_name(), "app::AppConfig");
        assert!(metadata.has_annotation(CONFIGURATION));
        assert!(metadata.is_annotated(COMPONENT));

        let methods: Vec<String> = metadata
            .annotated_methods(BEAN)
            .iter()
            .map(|m| m.method_name().to_string())
            .collect();
        assert_eq!(methods, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(metadata.annotated_methods(BEAN)[0].declaring_class_name(), "app::AppConfig");
    }

    #[test]
    fn test_json_descriptor_and_errors() {
        let factory = SimpleMetadataReaderFactory::new();
        factory
            .load_str(
                r#"{ "class": [ { "name": "app::Json", "kind": "interface" } ] }"#,
                "app.json",
                DescriptorFormat::Json,
            )
            .unwrap();
        assert!(factory.metadata_reader("app::Json").unwrap().annotation_metadata().is_interface());

        assert!(matches!(
            factory.metadata_reader("app::Missing"),
            Err(ContainerError::ClassNotFound(_))
        ));
        assert!(matches!(
            factory.load_str("[[class]]\nnope", "bad.toml", DescriptorFormat::Toml),
            Err(ContainerError::Metadata { .. })
        ));
    }
}

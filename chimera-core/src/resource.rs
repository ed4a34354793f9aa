//! 资源加载
//!
//! `@PropertySource` 与 `@ImportResource` 通过 `ResourceLoader` 读取文本内容。
//! 支持 `file:` 与 `classpath:` 前缀，`classpath:` 相对于加载器的根目录解析。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};

pub const FILE_URL_PREFIX: &str = "file:";
pub const CLASSPATH_URL_PREFIX: &str = "classpath:";

/// 已读取的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// 原始位置（含前缀）
    pub location: String,
    pub content: String,
}

impl Resource {
    /// 文件扩展名（小写）
    pub fn extension(&self) -> Option<String> {
        resource_extension(&self.location)
    }

    /// 资源名称：位置去掉前缀后的文件名
    pub fn filename(&self) -> &str {
        let path = strip_prefix(&self.location);
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }
}

/// 位置的扩展名（小写）
pub fn resource_extension(location: &str) -> Option<String> {
    Path::new(strip_prefix(location))
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn strip_prefix(location: &str) -> &str {
    location
        .strip_prefix(FILE_URL_PREFIX)
        .or_else(|| location.strip_prefix(CLASSPATH_URL_PREFIX))
        .unwrap_or(location)
}

/// 资源加载器
pub trait ResourceLoader: Send + Sync {
    /// 读取资源；资源不存在时返回 `ContainerError::Resource`
    fn load(&self, location: &str) -> ContainerResult<Resource>;

    fn exists(&self, location: &str) -> bool {
        self.load(location).is_ok()
    }
}

/// 文件系统资源加载器
#[derive(Debug, Clone)]
pub struct FileSystemResourceLoader {
    root: PathBuf,
}

impl FileSystemResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        if let Some(path) = location.strip_prefix(FILE_URL_PREFIX) {
            return PathBuf::from(path);
        }
        let relative = location
            .strip_prefix(CLASSPATH_URL_PREFIX)
            .unwrap_or(location)
            .trim_start_matches('/');
        self.root.join(relative)
    }
}

impl Default for FileSystemResourceLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ResourceLoader for FileSystemResourceLoader {
    fn load(&self, location: &str) -> ContainerResult<Resource> {
        let path = self.resolve(location);
        tracing::trace!("Loading resource '{}' from {:?}", location, path);
        let content = std::fs::read_to_string(&path).map_err(|e| ContainerError::Resource {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        Ok(Resource {
            location: location.to_string(),
            content,
        })
    }

    fn exists(&self, location: &str) -> bool {
        self.resolve(location).is_file()
    }
}

/// 内存中的资源（测试与嵌入式配置）
#[derive(Debug, Default)]
pub struct InMemoryResourceLoader {
    resources: RwLock<HashMap<String, String>>,
}

impl InMemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.add(location, content);
        self
    }

    pub fn add(&self, location: impl Into<String>, content: impl Into<String>) {
        let location = location.into();
        self.resources
            .write()
            .insert(strip_prefix(&location).to_string(), content.into());
    }
}

impl ResourceLoader for InMemoryResourceLoader {
    fn load(&self, location: &str) -> ContainerResult<Resource> {
        self.resources
            .read()
            .get(strip_prefix(location))
            .map(|content| Resource {
                location: location.to_string(),
                content: content.clone(),
            })
            .ok_or_else(|| ContainerError::Resource {
                location: location.to_string(),
                message: "resource does not exist".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_prefixes() {
        let loader = InMemoryResourceLoader::new().with_resource("app.toml", "a = 1");
        assert_eq!(loader.load("classpath:app.toml").unwrap().content, "a = 1");
        assert!(loader.exists("file:app.toml"));
        assert!(matches!(
            loader.load("missing.toml"),
            Err(ContainerError::Resource { .. })
        ));
    }

    #[test]
    fn test_file_system_loader() {
        let dir = std::env::temp_dir().join(format!("chimera-resource-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("beans.properties"), "x=1").unwrap();

        let loader = FileSystemResourceLoader::new(&dir);
        let resource = loader.load("classpath:/beans.properties").unwrap();
        assert_eq!(resource.content, "x=1");
        assert_eq!(resource.extension().as_deref(), Some("properties"));
        assert_eq!(resource.filename(), "beans.properties");
        assert!(!loader.exists("nope.properties"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

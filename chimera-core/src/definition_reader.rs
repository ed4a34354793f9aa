//! 从资源文件读取 Bean 定义（@ImportResource）
//!
//! ```toml
//! [[bean]]
//! name = "dataSource"
//! class = "app::PooledDataSource"
//! scope = "prototype"
//! depends-on = ["config"]
//!
//! [bean.attributes]
//! pool = "hikari"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::bean_definition::{BeanDefinition, BeanDefinitionHolder, BeanOrigin};
use crate::error::{ContainerError, ContainerResult};
use crate::naming::DefaultBeanNameGenerator;
use crate::registry::{register_bean_definition_holder, BeanDefinitionRegistry};
use crate::resource::Resource;
use crate::scope::Scope;

/// 资源格式对应的读取器
pub trait BeanDefinitionReader: Send + Sync {
    /// 读取资源中的定义并注册，返回注册数量
    fn load_bean_definitions(
        &self,
        resource: &Resource,
        registry: &dyn BeanDefinitionRegistry,
    ) -> ContainerResult<usize>;
}

#[derive(Debug, Default, Deserialize)]
struct BeansDocument {
    #[serde(default, rename = "bean")]
    beans: Vec<BeanEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BeanEntry {
    name: Option<String>,
    class: Option<String>,
    scope: Option<String>,
    #[serde(default)]
    lazy_init: bool,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
    factory_bean: Option<String>,
    factory_method: Option<String>,
    init_method: Option<String>,
    destroy_method: Option<String>,
    description: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl BeanEntry {
    fn into_definition(self, location: &str) -> (Option<String>, Vec<String>, BeanDefinition) {
        let mut definition = BeanDefinition::new().with_origin(BeanOrigin::ImportedResource {
            resource: location.to_string(),
        });
        definition.bean_class_name = self.class;
        definition.scope = self.scope.as_deref().map(Scope::from_name).unwrap_or_default();
        definition.lazy_init = self.lazy_init;
        definition.primary = self.primary;
        definition.depends_on = self.depends_on;
        definition.factory_bean_name = self.factory_bean;
        definition.factory_method_name = self.factory_method;
        definition.init_method = self.init_method;
        definition.destroy_method = self.destroy_method;
        definition.description = self.description;
        definition.attributes = self.attributes;
        definition.resource_description = Some(location.to_string());
        (self.name, self.aliases, definition)
    }
}

/// TOML 格式的 Bean 定义
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlBeanDefinitionReader;

impl BeanDefinitionReader for TomlBeanDefinitionReader {
    fn load_bean_definitions(
        &self,
        resource: &Resource,
        registry: &dyn BeanDefinitionRegistry,
    ) -> ContainerResult<usize> {
        let document: BeansDocument =
            toml::from_str(&resource.content).map_err(|e| ContainerError::Resource {
                location: resource.location.clone(),
                message: format!("Invalid bean definition document: {}", e),
            })?;

        let mut count = 0;
        for entry in document.beans {
            let (name, mut aliases, definition) = entry.into_definition(&resource.location);
            // 没有名称时第一个别名作为名称
            let name = match name {
                Some(name) => name,
                None if !aliases.is_empty() => aliases.remove(0),
                None => DefaultBeanNameGenerator::generate(&definition, registry)?,
            };
            tracing::debug!("Loaded bean definition '{}' from {}", name, resource.location);
            let holder = BeanDefinitionHolder::new(name, definition).with_aliases(aliases);
            register_bean_definition_holder(&holder, registry)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefaultListableBeanFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_toml_definitions() {
        let content = r#"
            [[bean]]
            name = "dataSource"
            class = "app::PooledDataSource"
            scope = "prototype"
            depends-on = ["settings"]
            aliases = ["ds"]

            [bean.attributes]
            pool = "small"

            [[bean]]
            class = "app::Clock"
        "#;
        let resource = Resource {
            location: "beans.toml".to_string(),
            content: content.to_string(),
        };
        let registry = DefaultListableBeanFactory::new();
        let count = TomlBeanDefinitionReader
            .load_bean_definitions(&resource, &registry)
            .unwrap();
        assert_eq!(count, 2);

        let data_source = registry.get_bean_definition("dataSource").unwrap();
        assert_eq!(data_source.scope, Scope::Prototype);
        assert_eq!(data_source.depends_on, vec!["settings".to_string()]);
        assert_eq!(data_source.attribute("pool"), Some("small"));
        assert_eq!(
            data_source.origin,
            BeanOrigin::ImportedResource {
                resource: "beans.toml".to_string()
            }
        );
        assert!(registry.is_alias("ds"));
        assert!(registry.contains_bean_definition("app::Clock#0"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let resource = Resource {
            location: "bad.toml".to_string(),
            content: "[[bean]]\nname = \"a\"\nklass = \"x\"\n".to_string(),
        };
        let registry = DefaultListableBeanFactory::new();
        let result = TomlBeanDefinitionReader.load_bean_definitions(&resource, &registry);
        assert!(matches!(result, Err(ContainerError::Resource { .. })));
    }
}

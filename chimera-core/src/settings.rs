//! 容器级别的开关
//!
//! 通过 serde 从 Environment 中 `chimera` 前缀下的属性读取：
//!
//! ```toml
//! [chimera.main]
//! allow-bean-definition-overriding = false
//!
//! [chimera.aop]
//! proxy-target-class = true
//! ```

use serde::{Deserialize, Serialize};

use crate::config::Environment;

pub const ALLOW_BEAN_DEFINITION_OVERRIDING_PROPERTY: &str =
    "chimera.main.allow-bean-definition-overriding";
pub const PROXY_TARGET_CLASS_PROPERTY: &str = "chimera.aop.proxy-target-class";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ContainerSettings {
    /// 是否允许同名 Bean 定义覆盖
    pub allow_bean_definition_overriding: bool,

    /// 自动代理默认使用子类代理
    pub proxy_target_class: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_bean_definition_overriding: true,
            proxy_target_class: false,
        }
    }
}

impl ContainerSettings {
    /// 从 Environment 读取，缺失的属性使用默认值
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            allow_bean_definition_overriding: env.get_bool_or(
                ALLOW_BEAN_DEFINITION_OVERRIDING_PROPERTY,
                defaults.allow_bean_definition_overriding,
            ),
            proxy_target_class: env
                .get_bool_or(PROXY_TARGET_CLASS_PROPERTY, defaults.proxy_target_class),
        }
    }

    /// 从 JSON 文档读取
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapPropertySource;

    #[test]
    fn test_defaults_and_environment() {
        let env = Environment::new();
        assert_eq!(ContainerSettings::from_environment(&env), ContainerSettings::default());

        env.add_property_source(
            MapPropertySource::new("test")
                .with_property(ALLOW_BEAN_DEFINITION_OVERRIDING_PROPERTY, false)
                .with_property(PROXY_TARGET_CLASS_PROPERTY, "true"),
        );
        let settings = ContainerSettings::from_environment(&env);
        assert!(!settings.allow_bean_definition_overriding);
        assert!(settings.proxy_target_class);
    }

    #[test]
    fn test_from_json() {
        let settings = ContainerSettings::from_json(r#"{"proxy-target-class": true}"#).unwrap();
        assert!(settings.allow_bean_definition_overriding);
        assert!(settings.proxy_target_class);
    }
}

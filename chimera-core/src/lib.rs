// chimera-core: 配置类驱动的 Bean 定义注册容器
//
// 提供：
// - 类元数据（运行时注册 + 离线描述）与注解合并
// - @Configuration / @Import / @ComponentScan / @Bean 的解析与注册
// - 条件评估、作用域代理、属性源
// - 单例/原型实例化与 BeanPostProcessor 链

pub mod bean_definition;
pub mod bean_post_processor;
pub mod condition;
pub mod config;
pub mod config_class;
pub mod constants;
pub mod definition_reader;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod order;
pub mod registry;
pub mod resource;
pub mod scope;
pub mod settings;
pub mod utils;

// 重新导出常用类型
pub use bean_definition::{BeanDefinition, BeanDefinitionHolder, BeanOrigin, Role};
pub use bean_post_processor::{
    BeanDefinitionRegistryPostProcessor, BeanPostProcessor, PostProcessorBean,
    BEAN_POST_PROCESSOR_ATTRIBUTE,
};
pub use condition::{
    AnnotatedElement, Condition, ConditionContext, ConditionEvaluator, ConditionRegistration,
    ConfigurationPhase,
};
pub use config::{
    CompositePropertySource, ConfigValue, Environment, EnvironmentPropertySource,
    MapPropertySource, PropertiesPropertySource, PropertySource, TomlPropertySource,
};
pub use config_class::{ConfigurationClassParser, ConfigurationClassPostProcessor};
pub use constants::*;
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metadata::{
    Annotation, AnnotationMetadata, ClassDef, ClassRegistration, ClassRegistry, MetadataSources,
    MethodDef, MethodMetadata,
};
pub use registry::{
    BeanDefinitionRegistry, BeanFactory, BeanFactoryExt, CreationContext,
    DefaultListableBeanFactory, DynBean, SupplierKey, SupplierRegistration,
};
pub use scope::{Scope, ScopedProxyMode};
pub use settings::ContainerSettings;

// 导出 inventory，供组件注册使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean_definition::{BeanDefinition, BeanDefinitionHolder, BeanOrigin, Role};
    pub use crate::bean_post_processor::{BeanDefinitionRegistryPostProcessor, BeanPostProcessor};
    pub use crate::config::{self, ConfigValue, Environment, MapPropertySource, PropertySource};
    pub use crate::config_class::{
        ConfigurationClassPostProcessor, ImportBeanDefinitionRegistrar, ImportContext,
        ImportSelector,
    };
    pub use crate::error::{ContainerError, ContainerResult, Result};
    pub use crate::metadata::{
        AnnotatedTypeMetadata, Annotation, AnnotationMetadata, ClassDef, ClassMetadata,
        ClassRegistry, MetadataSources, MethodDef,
    };
    pub use crate::registry::{
        BeanDefinitionRegistry, BeanFactory, BeanFactoryExt, DefaultListableBeanFactory, DynBean,
        SupplierKey,
    };
    pub use crate::scope::Scope;
    pub use crate::utils;
    pub use anyhow::{anyhow, Context};
}

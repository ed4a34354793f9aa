use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::constants::CONFIGURATION;
use crate::error::ContainerResult;
use crate::metadata::{AnnotationMetadata, MethodMetadata};

use super::import::ImportBeanDefinitionRegistrar;
use super::problem::{Problem, ProblemKind, ProblemReporter};

/// 配置类中的一个 @Bean 方法
#[derive(Debug, Clone)]
pub struct BeanMethod {
    metadata: MethodMetadata,
    configuration_class: String,
}

impl BeanMethod {
    pub fn new(metadata: MethodMetadata, configuration_class: impl Into<String>) -> Self {
        Self {
            metadata,
            configuration_class: configuration_class.into(),
        }
    }

    pub fn metadata(&self) -> &MethodMetadata {
        &self.metadata
    }

    pub fn method_name(&self) -> &str {
        self.metadata.method_name()
    }

    /// 所属配置类（方法可能声明在父类或接口上）
    pub fn configuration_class(&self) -> &str {
        &self.configuration_class
    }

    /// full 模式下实例 @Bean 方法需要可以被代理覆盖
    pub fn validate(&self, full_mode: bool, reporter: &dyn ProblemReporter) -> ContainerResult<()> {
        if self.metadata.is_static() || !full_mode {
            return Ok(());
        }
        if !self.metadata.is_overridable() {
            let method = self.metadata.method_def().to_string();
            reporter.error(
                Problem::new(
                    ProblemKind::NonOverridableBeanMethod {
                        method: method.clone(),
                    },
                    format!(
                        "@Bean method '{}' must not be private or final; change the method's modifiers to continue",
                        self.method_name()
                    ),
                )
                .at(self.configuration_class.clone()),
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for BeanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeanMethod: {}", self.metadata.method_def())
    }
}

/// 注册器 + 导入它的类
#[derive(Clone)]
pub struct RegistrarEntry {
    pub registrar: Arc<dyn ImportBeanDefinitionRegistrar>,
    pub importing: Arc<dyn AnnotationMetadata>,
}

impl fmt::Debug for RegistrarEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarEntry")
            .field("importing", &self.importing.class_name())
            .finish()
    }
}

/// 解析得到的配置类
#[derive(Debug, Clone)]
pub struct ConfigurationClass {
    metadata: Arc<dyn AnnotationMetadata>,
    bean_name: Option<String>,
    /// 导入它的配置类（按首次导入顺序）
    imported_by: IndexSet<String>,
    bean_methods: Vec<BeanMethod>,
    /// 资源位置 -> 读取器名称
    imported_resources: IndexMap<String, Option<String>>,
    registrars: Vec<RegistrarEntry>,
    skipped_bean_methods: HashSet<String>,
}

impl ConfigurationClass {
    /// 直接声明为 Bean 的配置类
    pub fn new(metadata: Arc<dyn AnnotationMetadata>, bean_name: impl Into<String>) -> Self {
        Self {
            bean_name: Some(bean_name.into()),
            ..Self::bare(metadata)
        }
    }

    /// 被其他配置类导入（或作为成员类）的配置类
    pub fn imported(metadata: Arc<dyn AnnotationMetadata>, imported_by: impl Into<String>) -> Self {
        let mut config_class = Self::bare(metadata);
        config_class.imported_by.insert(imported_by.into());
        config_class
    }

    fn bare(metadata: Arc<dyn AnnotationMetadata>) -> Self {
        Self {
            metadata,
            bean_name: None,
            imported_by: IndexSet::new(),
            bean_methods: Vec::new(),
            imported_resources: IndexMap::new(),
            registrars: Vec::new(),
            skipped_bean_methods: HashSet::new(),
        }
    }

    pub fn metadata(&self) -> &Arc<dyn AnnotationMetadata> {
        &self.metadata
    }

    pub fn class_name(&self) -> &str {
        self.metadata.class_name()
    }

    pub fn bean_name(&self) -> Option<&str> {
        self.bean_name.as_deref()
    }

    pub fn set_bean_name(&mut self, bean_name: impl Into<String>) {
        self.bean_name = Some(bean_name.into());
    }

    /// 是否通过 @Import 或成员类被发现
    pub fn is_imported(&self) -> bool {
        !self.imported_by.is_empty()
    }

    pub fn imported_by(&self) -> impl Iterator<Item = &str> {
        self.imported_by.iter().map(String::as_str)
    }

    /// 合并另一次导入的来源
    pub fn merge_imported_by(&mut self, other: &ConfigurationClass) {
        self.imported_by.extend(other.imported_by.iter().cloned());
    }

    pub fn add_bean_method(&mut self, method: BeanMethod) {
        self.bean_methods.push(method);
    }

    pub fn bean_methods(&self) -> &[BeanMethod] {
        &self.bean_methods
    }

    pub fn add_imported_resource(&mut self, location: impl Into<String>, reader: Option<String>) {
        self.imported_resources.insert(location.into(), reader);
    }

    pub fn imported_resources(&self) -> &IndexMap<String, Option<String>> {
        &self.imported_resources
    }

    pub fn add_registrar(
        &mut self,
        registrar: Arc<dyn ImportBeanDefinitionRegistrar>,
        importing: Arc<dyn AnnotationMetadata>,
    ) {
        self.registrars.push(RegistrarEntry {
            registrar,
            importing,
        });
    }

    pub fn registrars(&self) -> &[RegistrarEntry] {
        &self.registrars
    }

    pub fn skip_bean_method(&mut self, method_name: impl Into<String>) {
        self.skipped_bean_methods.insert(method_name.into());
    }

    pub fn is_bean_method_skipped(&self, method_name: &str) -> bool {
        self.skipped_bean_methods.contains(method_name)
    }

    /// 需要代理 @Bean 方法（full 模式）时的校验
    pub fn validate(&self, reporter: &dyn ProblemReporter) -> ContainerResult<()> {
        let full_mode = self
            .metadata
            .annotation_attributes(CONFIGURATION)
            .map(|attrs| attrs.get_bool("proxyBeanMethods").unwrap_or(true))
            .unwrap_or(false);

        if full_mode && self.metadata.is_final() {
            reporter.error(
                Problem::new(
                    ProblemKind::FinalConfigurationClass,
                    format!(
                        "@Configuration class '{}' may not be final; remove the final modifier or set proxyBeanMethods to false",
                        self.metadata.class_name()
                    ),
                )
                .at(self.class_name().to_string()),
            )?;
        }

        for bean_method in &self.bean_methods {
            bean_method.validate(full_mode, reporter)?;
        }
        Ok(())
    }
}

impl PartialEq for ConfigurationClass {
    fn eq(&self, other: &Self) -> bool {
        self.class_name() == other.class_name()
    }
}

impl Eq for ConfigurationClass {}

impl fmt::Display for ConfigurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigurationClass: beanName '{}', {}", self.bean_name.as_deref().unwrap_or("null"), self.class_name())
    }
}

//! 把解析得到的配置类转换为 Bean 定义
//!
//! 对每个配置类：
//! - 被导入的配置类本身注册为 Bean（完整类名）
//! - 每个 @Bean 方法注册一个工厂方法定义
//! - @ImportResource 交给对应格式的读取器
//! - 调用导入的 `ImportBeanDefinitionRegistrar`
//!
//! 只被跳过的配置类导入的配置类同样被跳过。

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bean_definition::{
    apply_common_annotations, BeanDefinition, BeanDefinitionHolder, BeanOrigin, Role,
};
use crate::condition::{AnnotatedElement, ConditionEvaluator, ConfigurationPhase};
use crate::config::Environment;
use crate::constants::{BEAN, INFER_METHOD};
use crate::definition_reader::{BeanDefinitionReader, TomlBeanDefinitionReader};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{AnnotatedTypeMetadata, MetadataSources};
use crate::naming::{BeanNameGenerator, FullyQualifiedAnnotationBeanNameGenerator};
use crate::registry::{register_bean_definition_holder, BeanDefinitionRegistry, DefaultListableBeanFactory};
use crate::resource::{resource_extension, ResourceLoader};
use crate::scope::{create_scoped_proxy, apply_scoped_proxy_mode, AnnotationScopeMetadataResolver, ScopedProxyMode};

use super::configuration_class::{BeanMethod, ConfigurationClass};
use super::import::{ImportContext, ImportRegistry};
use super::utils::check_configuration_class_candidate;

/// 已存在同名定义时的处理结果
enum ExistingDefinition {
    /// 保留已有定义，不注册新的
    Keep,
    /// 注册新的定义
    Register,
}

pub struct ConfigurationClassBeanDefinitionReader {
    registry: Arc<DefaultListableBeanFactory>,
    environment: Arc<Environment>,
    resource_loader: Arc<dyn ResourceLoader>,
    condition_evaluator: Arc<ConditionEvaluator>,
    import_bean_name_generator: Arc<dyn BeanNameGenerator>,
    scope_resolver: AnnotationScopeMetadataResolver,
    readers: IndexMap<String, Arc<dyn BeanDefinitionReader>>,
}

impl ConfigurationClassBeanDefinitionReader {
    pub fn new(
        registry: Arc<DefaultListableBeanFactory>,
        environment: Arc<Environment>,
        resource_loader: Arc<dyn ResourceLoader>,
        condition_evaluator: Arc<ConditionEvaluator>,
    ) -> Self {
        let mut readers: IndexMap<String, Arc<dyn BeanDefinitionReader>> = IndexMap::new();
        readers.insert("toml".to_string(), Arc::new(TomlBeanDefinitionReader));
        Self {
            registry,
            environment,
            resource_loader,
            condition_evaluator,
            import_bean_name_generator: Arc::new(FullyQualifiedAnnotationBeanNameGenerator),
            scope_resolver: AnnotationScopeMetadataResolver::new(),
            readers,
        }
    }

    pub fn with_import_bean_name_generator(mut self, generator: Arc<dyn BeanNameGenerator>) -> Self {
        self.import_bean_name_generator = generator;
        self
    }

    /// 注册命名读取器；@ImportResource(reader = "...") 以名称引用
    pub fn register_reader(&mut self, name: impl Into<String>, reader: Arc<dyn BeanDefinitionReader>) {
        self.readers.insert(name.into(), reader);
    }

    fn metadata_sources(&self) -> &MetadataSources {
        self.registry.metadata_sources()
    }

    /// 读取所有配置类
    pub fn load_bean_definitions(
        &self,
        configuration_classes: &mut IndexMap<String, ConfigurationClass>,
        import_registry: &mut ImportRegistry,
    ) -> ContainerResult<()> {
        let skipped = self.evaluate_skips(configuration_classes)?;
        for (class_name, config_class) in configuration_classes.iter_mut() {
            let skip = skipped.get(class_name).copied().unwrap_or(false);
            self.load_for_configuration_class(config_class, skip, import_registry)?;
        }
        Ok(())
    }

    /// 预先计算每个配置类是否被跳过
    fn evaluate_skips(
        &self,
        configuration_classes: &IndexMap<String, ConfigurationClass>,
    ) -> ContainerResult<HashMap<String, bool>> {
        let mut skipped = HashMap::new();
        for class_name in configuration_classes.keys() {
            self.should_skip_tracked(class_name, configuration_classes, &mut skipped)?;
        }
        Ok(skipped)
    }

    fn should_skip_tracked(
        &self,
        class_name: &str,
        configuration_classes: &IndexMap<String, ConfigurationClass>,
        skipped: &mut HashMap<String, bool>,
    ) -> ContainerResult<bool> {
        if let Some(skip) = skipped.get(class_name) {
            return Ok(*skip);
        }
        let Some(config_class) = configuration_classes.get(class_name) else {
            return Ok(false);
        };
        // 导入链成环时按未跳过处理
        skipped.insert(class_name.to_string(), false);

        let mut skip = false;
        if config_class.is_imported() {
            let mut all_skipped = true;
            for importer in config_class.imported_by() {
                if !self.should_skip_tracked(importer, configuration_classes, skipped)? {
                    all_skipped = false;
                    break;
                }
            }
            skip = all_skipped;
        }
        if !skip {
            skip = self.condition_evaluator.should_skip(
                AnnotatedElement::Class(&**config_class.metadata()),
                Some(ConfigurationPhase::RegisterBean),
            )?;
        }
        skipped.insert(class_name.to_string(), skip);
        Ok(skip)
    }

    fn load_for_configuration_class(
        &self,
        config_class: &mut ConfigurationClass,
        skip: bool,
        import_registry: &mut ImportRegistry,
    ) -> ContainerResult<()> {
        if skip {
            if let Some(bean_name) = config_class.bean_name() {
                if self.registry.contains_bean_definition(bean_name) {
                    self.registry.remove_bean_definition(bean_name)?;
                }
            }
            import_registry.remove_importing_class(config_class.class_name());
            tracing::debug!("Skipped configuration class '{}'", config_class.class_name());
            return Ok(());
        }

        if config_class.is_imported() {
            self.register_imported_configuration_class(config_class)?;
        }
        for bean_method in config_class.bean_methods().to_vec() {
            self.load_bean_method(config_class, &bean_method)?;
        }
        self.load_from_imported_resources(config_class)?;
        self.load_from_registrars(config_class)
    }

    fn register_imported_configuration_class(&self, config_class: &mut ConfigurationClass) -> ContainerResult<()> {
        let metadata = config_class.metadata();
        let scope_metadata = self.scope_resolver.resolve(&**metadata);
        let mut definition = BeanDefinition::for_class(config_class.class_name())
            .with_scope(scope_metadata.scope.clone())
            .with_origin(BeanOrigin::Annotated);
        definition.resource_description = Some(config_class.class_name().to_string());
        apply_common_annotations(&mut definition, &**metadata);
        check_configuration_class_candidate(&mut definition, self.metadata_sources());

        let bean_name = self
            .import_bean_name_generator
            .generate_bean_name(&**metadata, self.metadata_sources())?;
        let holder = BeanDefinitionHolder::new(bean_name.clone(), definition);
        let holder = apply_scoped_proxy_mode(&scope_metadata, holder, &*self.registry)?;
        register_bean_definition_holder(&holder, &*self.registry)?;
        config_class.set_bean_name(bean_name.clone());

        tracing::trace!("Registered bean definition for imported class '{}'", bean_name);
        Ok(())
    }

    fn load_bean_method(&self, config_class: &mut ConfigurationClass, bean_method: &BeanMethod) -> ContainerResult<()> {
        let metadata = bean_method.metadata();
        let method_name = metadata.method_name().to_string();

        if self.condition_evaluator.should_skip(
            AnnotatedElement::Method(metadata),
            Some(ConfigurationPhase::RegisterBean),
        )? {
            config_class.skip_bean_method(&method_name);
            return Ok(());
        }
        if config_class.is_bean_method_skipped(&method_name) {
            return Ok(());
        }

        let bean = metadata.annotation_attributes(BEAN).ok_or_else(|| {
            ContainerError::IllegalState(format!("No @Bean annotation on method '{}'", method_name))
        })?;

        let mut names = bean.get_string_array("name");
        if names.is_empty() {
            names = bean.get_string_array("value");
        }
        let bean_name = if names.is_empty() {
            method_name.clone()
        } else {
            names.remove(0)
        };

        for alias in &names {
            self.registry.register_alias(&bean_name, alias)?;
        }

        if let ExistingDefinition::Keep = self.check_existing(config_class, bean_method, &bean_name)? {
            if config_class.bean_name() == Some(bean_name.as_str()) {
                return Err(ContainerError::store(
                    &bean_name,
                    format!(
                        "@Bean definition illegally overridden by existing bean definition: {}",
                        self.registry.get_bean_definition(&bean_name)?
                    ),
                ));
            }
            return Ok(());
        }

        let mut definition = BeanDefinition::new().with_origin(BeanOrigin::ConfigurationClass {
            config_class: config_class.class_name().to_string(),
            method: method_name.clone(),
            is_static: metadata.is_static(),
        });
        definition.resource_description = Some(config_class.class_name().to_string());

        if metadata.is_static() {
            definition.bean_class_name = Some(config_class.class_name().to_string());
        } else {
            let factory_bean = config_class.bean_name().ok_or_else(|| {
                ContainerError::store(
                    &bean_name,
                    format!(
                        "Configuration class '{}' has no bean name for instance @Bean method '{}'",
                        config_class.class_name(),
                        method_name
                    ),
                )
            })?;
            definition.factory_bean_name = Some(factory_bean.to_string());
        }
        definition.factory_method_name = Some(method_name.clone());
        definition.unique_factory_method = true;
        definition.target_type = Some(metadata.return_type_name().to_string());

        apply_common_annotations(&mut definition, metadata);
        definition.autowire_candidate = bean.get_bool("autowireCandidate").unwrap_or(true);
        definition.init_method = bean
            .get_str("initMethod")
            .filter(|name| !name.is_empty())
            .map(String::from);
        definition.destroy_method = match bean.get_str("destroyMethod") {
            Some("") => None,
            Some(name) => Some(name.to_string()),
            None => Some(INFER_METHOD.to_string()),
        };

        let scope_metadata = self.scope_resolver.resolve(metadata);
        definition.scope = scope_metadata.scope.clone();

        let mut holder = BeanDefinitionHolder::new(bean_name.clone(), definition);
        if scope_metadata.proxy_mode.requires_proxy() {
            holder = create_scoped_proxy(
                holder,
                &*self.registry,
                scope_metadata.proxy_mode == ScopedProxyMode::TargetClass,
            )?;
        }

        tracing::trace!(
            "Registering bean definition for @Bean method {}.{}()",
            config_class.class_name(),
            method_name
        );
        self.registry.register_bean_definition(&holder.name, holder.definition)
    }

    /// 同名定义已存在时的处理
    fn check_existing(
        &self,
        config_class: &ConfigurationClass,
        bean_method: &BeanMethod,
        bean_name: &str,
    ) -> ContainerResult<ExistingDefinition> {
        if !self.registry.contains_bean_definition(bean_name) {
            return Ok(ExistingDefinition::Register);
        }
        if config_class.bean_name() == Some(bean_name) {
            return Ok(ExistingDefinition::Keep);
        }
        let existing = self.registry.get_bean_definition(bean_name)?;
        let allow_overriding = self.registry.is_allow_bean_definition_overriding();

        if let BeanOrigin::ConfigurationClass {
            config_class: existing_class,
            method,
            ..
        } = &existing.origin
        {
            if existing_class == config_class.class_name() {
                // 同一配置类中的重载方法
                if method == bean_method.method_name() {
                    self.registry
                        .modify_bean_definition(bean_name, |definition| definition.unique_factory_method = false)?;
                }
                return Ok(ExistingDefinition::Keep);
            }
            if !allow_overriding {
                // 交给注册表报告覆盖错误
                return Ok(ExistingDefinition::Register);
            }
            tracing::debug!(
                "Skipping bean definition for {}: a definition for bean '{}' already exists from '{}'",
                bean_method,
                bean_name,
                existing_class
            );
            return Ok(ExistingDefinition::Keep);
        }

        if existing.origin.is_scanned() || existing.role > Role::Application {
            tracing::debug!(
                "Bean definition for {} supersedes existing definition of bean '{}'",
                bean_method,
                bean_name
            );
            self.registry.remove_bean_definition(bean_name)?;
            return Ok(ExistingDefinition::Register);
        }

        if !allow_overriding {
            return Err(ContainerError::BeanDefinitionOverride {
                name: bean_name.to_string(),
                existing: existing.summary(),
                new: format!("@Bean method {}.{}()", config_class.class_name(), bean_method.method_name()),
            });
        }
        tracing::debug!(
            "Skipping bean definition for {}: a definition for bean '{}' already exists",
            bean_method,
            bean_name
        );
        Ok(ExistingDefinition::Keep)
    }

    fn load_from_imported_resources(&self, config_class: &ConfigurationClass) -> ContainerResult<()> {
        for (location, reader_name) in config_class.imported_resources() {
            let reader_key = match reader_name {
                Some(name) => name.clone(),
                None => resource_extension(location).unwrap_or_default(),
            };
            let reader = self.readers.get(&reader_key).ok_or_else(|| {
                ContainerError::store(
                    config_class.bean_name().unwrap_or(config_class.class_name()),
                    format!("No bean definition reader available for resource '{}'", location),
                )
            })?;
            let resource = self.resource_loader.load(location)?;
            let count = reader.load_bean_definitions(&resource, &*self.registry)?;
            tracing::debug!("Loaded {} bean definition(s) from '{}'", count, location);
        }
        Ok(())
    }

    fn load_from_registrars(&self, config_class: &ConfigurationClass) -> ContainerResult<()> {
        if config_class.registrars().is_empty() {
            return Ok(());
        }
        let context = ImportContext {
            environment: &self.environment,
            registry: &self.registry,
            metadata_sources: self.metadata_sources(),
            resource_loader: &*self.resource_loader,
        };
        for entry in config_class.registrars() {
            entry
                .registrar
                .register_bean_definitions(&*entry.importing, &context)
                .map_err(|e| {
                    ContainerError::store(
                        config_class.bean_name().unwrap_or(config_class.class_name()),
                        format!(
                            "Registrar imported by '{}' failed: {:#}",
                            entry.importing.class_name(),
                            e
                        ),
                    )
                })?;
        }
        Ok(())
    }
}

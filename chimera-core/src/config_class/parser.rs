//! 配置类解析
//!
//! 对每个候选配置类依次处理（顺序不能改变）：
//! 1. 成员类（配置类候选，按 @Order 排序）
//! 2. @PropertySource
//! 3. @ComponentScan（立即扫描，扫描到的配置类递归解析）
//! 4. @Import（选择器 / 延迟选择器 / 注册器 / 普通配置类），经由元注解收集
//! 5. @ImportResource
//! 6. @Bean 方法
//! 7. 接口上的默认 @Bean 方法
//! 8. 父类（非平台类型）继续循环
//!
//! 全部候选解析完成后处理延迟导入选择器（按分组合并）。

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bean_definition::BeanDefinitionHolder;
use crate::condition::{AnnotatedElement, ConditionEvaluator, ConfigurationPhase};
use crate::config::{
    CompositePropertySource, Environment, PropertiesPropertySource, PropertySource, TomlPropertySource,
};
use crate::constants::{is_platform_type, BEAN, COMPONENT, COMPONENT_SCAN, IMPORT, IMPORT_RESOURCE, PROPERTY_SOURCE};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{AnnotationAttributes, AnnotationMetadata, MetadataSources, MethodMetadata};
use crate::order::order_or_lowest;
use crate::registry::DefaultListableBeanFactory;
use crate::resource::{resource_extension, ResourceLoader};

use super::configuration_class::{BeanMethod, ConfigurationClass};
use super::import::{
    or_filter, ClassNameFilter, DefaultDeferredImportSelectorGroup, DeferredImportSelector,
    ImportComponent, ImportComponentRegistry, ImportContext, ImportGroup, ImportRegistry,
    ImportStack,
};
use super::problem::{Problem, ProblemReporter};
use super::scanner::ComponentScanAnnotationParser;
use super::utils::{check_configuration_class_candidate, is_configuration_candidate};

/// 默认排除平台类型
pub fn default_exclusion_filter() -> ClassNameFilter {
    Arc::new(is_platform_type)
}

struct DeferredImportSelectorHolder {
    config_class: String,
    metadata: Arc<dyn AnnotationMetadata>,
    selector: Arc<dyn DeferredImportSelector>,
}

struct DeferredImportGrouping {
    group: Box<dyn ImportGroup>,
    holders: Vec<DeferredImportSelectorHolder>,
}

/// 解析器的协作者
#[derive(Clone)]
pub struct ParserContext {
    pub registry: Arc<DefaultListableBeanFactory>,
    pub environment: Arc<Environment>,
    pub resource_loader: Arc<dyn ResourceLoader>,
    pub problem_reporter: Arc<dyn ProblemReporter>,
    pub condition_evaluator: Arc<ConditionEvaluator>,
    pub import_components: Arc<ImportComponentRegistry>,
}

pub struct ConfigurationClassParser {
    context: ParserContext,
    sources: MetadataSources,
    component_scan_parser: ComponentScanAnnotationParser,
    configuration_classes: IndexMap<String, ConfigurationClass>,
    /// 已处理的父类 -> 第一个以它为父类的配置类
    known_superclasses: HashMap<String, String>,
    property_source_names: Vec<String>,
    import_stack: ImportStack,
    import_registry: ImportRegistry,
    /// None 表示正在处理延迟选择器，新发现的延迟选择器立即处理
    deferred_import_selectors: Option<Vec<DeferredImportSelectorHolder>>,
}

impl ConfigurationClassParser {
    pub fn new(context: ParserContext) -> Self {
        let sources = context.registry.metadata_sources().clone();
        let component_scan_parser = ComponentScanAnnotationParser::new(
            Arc::clone(&context.registry),
            Arc::clone(&context.environment),
            Arc::clone(&context.condition_evaluator),
        );
        Self {
            context,
            sources,
            component_scan_parser,
            configuration_classes: IndexMap::new(),
            known_superclasses: HashMap::new(),
            property_source_names: Vec::new(),
            import_stack: ImportStack::new(),
            import_registry: ImportRegistry::new(),
            deferred_import_selectors: Some(Vec::new()),
        }
    }

    /// 解析一组候选定义
    pub fn parse(&mut self, candidates: &[BeanDefinitionHolder]) -> ContainerResult<()> {
        for holder in candidates {
            let class_name = holder.definition.bean_class_name.as_deref().ok_or_else(|| {
                ContainerError::store(&holder.name, "Configuration class candidate has no class name")
            })?;
            let metadata = self.sources.annotation_metadata(class_name)?;
            self.process_configuration_class(
                ConfigurationClass::new(metadata, holder.name.clone()),
                &default_exclusion_filter(),
            )
            .map_err(|e| match e {
                ContainerError::Problem(_)
                | ContainerError::BeanDefinitionStore { .. }
                | ContainerError::Resource { .. } => e,
                other => ContainerError::store(
                    &holder.name,
                    format!("Failed to parse configuration class [{}]: {}", class_name, other),
                ),
            })?;
        }
        self.process_deferred_import_selectors()
    }

    /// 解析单个类（不经过 Bean 定义）
    pub fn parse_class(&mut self, class_name: &str, bean_name: &str) -> ContainerResult<()> {
        let holder = BeanDefinitionHolder::new(
            bean_name,
            crate::bean_definition::BeanDefinition::for_class(class_name),
        );
        self.parse(&[holder])
    }

    /// 校验所有配置类
    pub fn validate(&self) -> ContainerResult<()> {
        for config_class in self.configuration_classes.values() {
            config_class.validate(&*self.context.problem_reporter)?;
        }
        Ok(())
    }

    /// 解析得到的配置类（按完成顺序）
    pub fn configuration_classes(&self) -> &IndexMap<String, ConfigurationClass> {
        &self.configuration_classes
    }

    /// 写回读取阶段更新过的配置类（例如新分配的 Bean 名称）
    pub fn store_configuration_class(&mut self, config_class: ConfigurationClass) {
        if let Some(slot) = self.configuration_classes.get_mut(config_class.class_name()) {
            *slot = config_class;
        }
    }

    pub fn import_registry(&self) -> &ImportRegistry {
        &self.import_registry
    }

    pub fn import_registry_mut(&mut self) -> &mut ImportRegistry {
        &mut self.import_registry
    }

    fn import_context(&self) -> ImportContext<'_> {
        ImportContext {
            environment: &self.context.environment,
            registry: &self.context.registry,
            metadata_sources: &self.sources,
            resource_loader: &*self.context.resource_loader,
        }
    }

    fn process_configuration_class(
        &mut self,
        mut config_class: ConfigurationClass,
        filter: &ClassNameFilter,
    ) -> ContainerResult<()> {
        if self.context.condition_evaluator.should_skip(
            AnnotatedElement::Class(&**config_class.metadata()),
            Some(ConfigurationPhase::ParseConfiguration),
        )? {
            return Ok(());
        }

        let class_name = config_class.class_name().to_string();
        if let Some(existing) = self.configuration_classes.get_mut(&class_name) {
            if config_class.is_imported() {
                if existing.is_imported() {
                    existing.merge_imported_by(&config_class);
                }
                // 已经显式声明的配置类优先于导入
                return Ok(());
            }
            // 显式声明替换之前的导入
            tracing::debug!(
                "Explicit bean definition for '{}' replaces a previous import",
                class_name
            );
            self.configuration_classes.shift_remove(&class_name);
            self.known_superclasses.retain(|_, owner| owner != &class_name);
        }

        let mut source = Some(Arc::clone(config_class.metadata()));
        while let Some(current) = source {
            source = self.do_process_configuration_class(&mut config_class, current, filter)?;
        }

        tracing::debug!("Parsed configuration class '{}'", class_name);
        self.configuration_classes.insert(class_name, config_class);
        Ok(())
    }

    /// 返回需要继续处理的父类
    fn do_process_configuration_class(
        &mut self,
        config_class: &mut ConfigurationClass,
        source: Arc<dyn AnnotationMetadata>,
        filter: &ClassNameFilter,
    ) -> ContainerResult<Option<Arc<dyn AnnotationMetadata>>> {
        if source.is_annotated(COMPONENT) {
            self.process_member_classes(config_class, &source, filter)?;
        }

        for property_source in source.all_annotation_attributes(PROPERTY_SOURCE) {
            self.process_property_source(&property_source)?;
        }

        let scans = source.all_annotation_attributes(COMPONENT_SCAN);
        if !scans.is_empty()
            && !self.context.condition_evaluator.should_skip(
                AnnotatedElement::Class(&*source),
                Some(ConfigurationPhase::RegisterBean),
            )?
        {
            for scan in scans {
                let scanned = self.component_scan_parser.parse(&scan, source.class_name())?;
                for holder in scanned {
                    let mut definition = holder.definition.clone();
                    if let Some(original) = definition.decorated_definition.take() {
                        definition = original.definition;
                    }
                    if check_configuration_class_candidate(&mut definition, &self.sources) {
                        let class_name = definition.bean_class_name.clone().unwrap_or_default();
                        let metadata = self.sources.annotation_metadata(&class_name)?;
                        self.process_configuration_class(
                            ConfigurationClass::new(metadata, holder.name.clone()),
                            filter,
                        )?;
                    }
                }
            }
        }

        let imports = collect_imports(&*source);
        self.process_imports(config_class, &source, imports, filter, true)?;

        if let Some(import_resource) = source.annotation_attributes(IMPORT_RESOURCE) {
            let mut locations = import_resource.get_string_array("locations");
            locations.extend(import_resource.get_string_array("value"));
            let reader = import_resource.get_str("reader").map(String::from);
            for location in locations {
                let resolved = self
                    .context
                    .environment
                    .resolve_required_placeholders(&location)?;
                config_class.add_imported_resource(resolved, reader.clone());
            }
        }

        for method in self.retrieve_bean_methods(&*source) {
            config_class.add_bean_method(BeanMethod::new(method, config_class.class_name()));
        }

        self.process_interfaces(config_class, &*source)?;

        if let Some(superclass) = source.super_class_name() {
            if !is_platform_type(superclass) && !self.known_superclasses.contains_key(superclass) {
                self.known_superclasses
                    .insert(superclass.to_string(), config_class.class_name().to_string());
                return Ok(Some(self.sources.annotation_metadata(superclass)?));
            }
        }
        Ok(None)
    }

    fn process_member_classes(
        &mut self,
        config_class: &mut ConfigurationClass,
        source: &Arc<dyn AnnotationMetadata>,
        filter: &ClassNameFilter,
    ) -> ContainerResult<()> {
        let mut candidates = Vec::new();
        for member in source.member_class_names() {
            let metadata = self.sources.annotation_metadata(member)?;
            if is_configuration_candidate(&*metadata)
                && metadata.class_name() != config_class.class_name()
            {
                candidates.push(metadata);
            }
        }
        candidates.sort_by_key(|metadata| order_or_lowest(&**metadata));

        for candidate in candidates {
            if self.import_stack.contains(config_class.class_name()) {
                let chain = self.import_stack.chain_to(config_class.class_name());
                self.context.problem_reporter.error(Problem::circular_import(
                    chain,
                    config_class.class_name(),
                ))?;
                continue;
            }
            self.import_stack.push(config_class.class_name());
            let result = self.process_configuration_class(
                ConfigurationClass::imported(candidate, config_class.class_name()),
                filter,
            );
            self.import_stack.pop();
            result?;
        }
        Ok(())
    }

    fn process_property_source(&mut self, attributes: &AnnotationAttributes) -> ContainerResult<()> {
        let name = attributes.get_str("name").map(String::from);
        let locations = attributes.get_string_array("value");
        if locations.is_empty() {
            return Err(ContainerError::IllegalState(
                "At least one @PropertySource(value) location is required".to_string(),
            ));
        }
        let ignore_not_found = attributes.get_bool("ignoreResourceNotFound").unwrap_or(false);

        for location in locations {
            let resolved = match self.context.environment.resolve_required_placeholders(&location) {
                Ok(resolved) => resolved,
                Err(e) if ignore_not_found => {
                    tracing::info!("Properties location [{}] not resolvable: {}", location, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let resource = match self.context.resource_loader.load(&resolved) {
                Ok(resource) => resource,
                Err(ContainerError::Resource { message, .. }) if ignore_not_found => {
                    tracing::info!("Properties location [{}] not resolvable: {}", resolved, message);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let source_name = name.clone().unwrap_or_else(|| resolved.clone());
            let property_source: Arc<dyn PropertySource> =
                match resource_extension(&resolved).as_deref() {
                    Some("toml") => Arc::new(TomlPropertySource::parse(&resource.content, source_name)?),
                    _ => Arc::new(PropertiesPropertySource::parse(&resource.content, source_name)),
                };
            self.add_property_source(property_source)?;
        }
        Ok(())
    }

    /// 同名来源合并为组合来源，先注册的保持优先
    fn add_property_source(&mut self, property_source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        let name = property_source.name().to_string();
        let sources = self.context.environment.property_sources();

        if self.property_source_names.contains(&name) {
            if let Some(existing) = sources.get(&name) {
                match existing.as_composite() {
                    Some(composite) => composite.add_property_source(property_source),
                    None => {
                        let composite = CompositePropertySource::new(name.clone());
                        composite.add_property_source(existing);
                        composite.add_property_source(property_source);
                        sources.replace(&name, Arc::new(composite))?;
                    }
                }
                tracing::debug!("Extended property source '{}'", name);
                return Ok(());
            }
        }

        sources.add_last(property_source);
        self.property_source_names.push(name.clone());
        tracing::debug!("Added property source '{}'", name);
        Ok(())
    }

    fn process_imports(
        &mut self,
        config_class: &mut ConfigurationClass,
        current_source: &Arc<dyn AnnotationMetadata>,
        import_candidates: Vec<String>,
        filter: &ClassNameFilter,
        check_for_circular_imports: bool,
    ) -> ContainerResult<()> {
        if import_candidates.is_empty() {
            return Ok(());
        }

        if check_for_circular_imports && self.is_chained_import_on_stack(config_class.class_name()) {
            let chain = self.import_stack.chain_to(config_class.class_name());
            return self.context.problem_reporter.error(Problem::circular_import(
                chain,
                config_class.class_name(),
            ));
        }

        self.import_stack.push(config_class.class_name());
        let result = self.process_import_candidates(config_class, current_source, import_candidates, filter);
        self.import_stack.pop();

        result.map_err(|e| match e {
            ContainerError::Other(source) => ContainerError::store(
                config_class.bean_name().unwrap_or(config_class.class_name()),
                format!(
                    "Failed to process import candidates for configuration class [{}]: {:#}",
                    config_class.class_name(),
                    source
                ),
            ),
            other => other,
        })
    }

    fn process_import_candidates(
        &mut self,
        config_class: &mut ConfigurationClass,
        current_source: &Arc<dyn AnnotationMetadata>,
        import_candidates: Vec<String>,
        filter: &ClassNameFilter,
    ) -> ContainerResult<()> {
        for candidate in import_candidates {
            if filter(&candidate) {
                tracing::trace!("Import candidate '{}' excluded by filter", candidate);
                continue;
            }
            match self.context.import_components.get(&candidate) {
                Some(ImportComponent::Selector(selector)) => {
                    let selector_filter = or_filter(filter, selector.exclusion_filter());
                    let imports = selector.select_imports(&**current_source, &self.import_context())?;
                    tracing::debug!("ImportSelector '{}' selected {:?}", candidate, imports);
                    self.process_imports(config_class, current_source, imports, &selector_filter, false)?;
                }
                Some(ImportComponent::Deferred(selector)) => {
                    self.handle_deferred_import_selector(config_class, selector)?;
                }
                Some(ImportComponent::Registrar(registrar)) => {
                    config_class.add_registrar(registrar, Arc::clone(current_source));
                }
                None => {
                    self.import_registry
                        .register_import(Arc::clone(current_source), &candidate);
                    let metadata = self.sources.annotation_metadata(&candidate)?;
                    self.process_configuration_class(
                        ConfigurationClass::imported(metadata, config_class.class_name()),
                        filter,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// 类已在栈中，且沿导入记录回溯能回到它自己
    fn is_chained_import_on_stack(&self, class_name: &str) -> bool {
        if !self.import_stack.contains(class_name) {
            return false;
        }
        let mut visited = Vec::new();
        let mut importing = self.import_registry.importing_class_for(class_name);
        while let Some(metadata) = importing {
            let importing_name = metadata.class_name();
            if importing_name == class_name {
                return true;
            }
            if visited.iter().any(|v| v == importing_name) {
                break;
            }
            visited.push(importing_name.to_string());
            importing = self.import_registry.importing_class_for(importing_name);
        }
        false
    }

    fn handle_deferred_import_selector(
        &mut self,
        config_class: &mut ConfigurationClass,
        selector: Arc<dyn DeferredImportSelector>,
    ) -> ContainerResult<()> {
        let holder = DeferredImportSelectorHolder {
            config_class: config_class.class_name().to_string(),
            metadata: Arc::clone(config_class.metadata()),
            selector,
        };
        match self.deferred_import_selectors.as_mut() {
            Some(pending) => {
                pending.push(holder);
                Ok(())
            }
            None => {
                let groupings = self.group_deferred(vec![holder])?;
                self.process_group_imports(groupings, Some(config_class))
            }
        }
    }

    fn process_deferred_import_selectors(&mut self) -> ContainerResult<()> {
        let Some(mut holders) = self.deferred_import_selectors.take() else {
            return Ok(());
        };
        holders.sort_by_key(|holder| holder.selector.order());
        let result = self
            .group_deferred(holders)
            .and_then(|groupings| self.process_group_imports(groupings, None));
        self.deferred_import_selectors = Some(Vec::new());
        result
    }

    /// 相同分组的选择器合并，没有分组的各自一组
    fn group_deferred(
        &self,
        holders: Vec<DeferredImportSelectorHolder>,
    ) -> ContainerResult<Vec<DeferredImportGrouping>> {
        let mut groupings: IndexMap<String, DeferredImportGrouping> = IndexMap::new();
        for (index, holder) in holders.into_iter().enumerate() {
            let group_name = holder.selector.import_group();
            let key = match &group_name {
                Some(name) => format!("group:{}", name),
                None => format!("selector:{}", index),
            };
            if !groupings.contains_key(&key) {
                let group: Box<dyn ImportGroup> = match &group_name {
                    Some(name) => self.context.import_components.create_group(name)?,
                    None => Box::new(DefaultDeferredImportSelectorGroup::default()),
                };
                groupings.insert(
                    key.clone(),
                    DeferredImportGrouping {
                        group,
                        holders: Vec::new(),
                    },
                );
            }
            if let Some(grouping) = groupings.get_mut(&key) {
                grouping.holders.push(holder);
            }
        }
        Ok(groupings.into_values().collect())
    }

    fn process_group_imports(
        &mut self,
        groupings: Vec<DeferredImportGrouping>,
        mut current: Option<&mut ConfigurationClass>,
    ) -> ContainerResult<()> {
        for mut grouping in groupings {
            let mut filter = default_exclusion_filter();
            for holder in &grouping.holders {
                filter = or_filter(&filter, holder.selector.exclusion_filter());
            }

            let entries = {
                let context = self.import_context();
                for holder in &grouping.holders {
                    grouping
                        .group
                        .process(&holder.metadata, &*holder.selector, &context)
                        .map_err(|e| {
                            ContainerError::store(
                                &holder.config_class,
                                format!(
                                    "Failed to process import candidates for configuration class [{}]: {:#}",
                                    holder.config_class, e
                                ),
                            )
                        })?;
                }
                grouping.group.select_imports().map_err(|e| {
                    ContainerError::store("", format!("Failed to select deferred imports: {:#}", e))
                })?
            };

            for entry in entries {
                let owner = entry.metadata.class_name().to_string();
                let imports = vec![entry.import_class_name];
                match current.as_deref_mut() {
                    Some(config_class) if config_class.class_name() == owner => {
                        self.process_imports(config_class, &entry.metadata, imports, &filter, false)?;
                    }
                    _ => {
                        let Some(mut config_class) = self.configuration_classes.get(&owner).cloned()
                        else {
                            tracing::warn!(
                                "Deferred import for unknown configuration class '{}' ignored",
                                owner
                            );
                            continue;
                        };
                        self.process_imports(&mut config_class, &entry.metadata, imports, &filter, false)?;
                        if let Some(slot) = self.configuration_classes.get_mut(&owner) {
                            *slot = config_class;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// @Bean 方法；运行时视图的方法顺序不稳定时以离线描述的顺序为准
    fn retrieve_bean_methods(&self, source: &dyn AnnotationMetadata) -> Vec<MethodMetadata> {
        let bean_methods = source.annotated_methods(BEAN);
        if bean_methods.len() <= 1 || source.introspected_class().is_none() {
            return bean_methods;
        }
        let Some(offline) = self.sources.resolve_offline(source.class_name()) else {
            return bean_methods;
        };
        let offline_methods = offline.annotated_methods(BEAN);
        if offline_methods.len() < bean_methods.len() {
            return bean_methods;
        }

        let mut remaining = bean_methods.clone();
        let mut selected = Vec::with_capacity(bean_methods.len());
        for offline_method in &offline_methods {
            if let Some(position) = remaining
                .iter()
                .position(|m| m.method_name() == offline_method.method_name())
            {
                selected.push(remaining.remove(position));
            }
        }
        if selected.len() == bean_methods.len() {
            selected
        } else {
            bean_methods
        }
    }

    /// 接口上的非抽象 @Bean 方法，递归处理父接口
    fn process_interfaces(
        &mut self,
        config_class: &mut ConfigurationClass,
        source: &dyn AnnotationMetadata,
    ) -> ContainerResult<()> {
        for interface in source.interface_names() {
            if is_platform_type(interface) {
                continue;
            }
            let metadata = self.sources.annotation_metadata(interface)?;
            for method in metadata.annotated_methods(BEAN) {
                if !method.is_abstract() {
                    config_class.add_bean_method(BeanMethod::new(method, config_class.class_name()));
                }
            }
            self.process_interfaces(config_class, &*metadata)?;
        }
        Ok(())
    }
}

/// 收集 @Import，包括通过元注解声明的（按广度优先顺序，去重）
fn collect_imports(source: &dyn AnnotationMetadata) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    for import in source.all_annotation_attributes(IMPORT) {
        for class_name in import.get_string_array("value") {
            if !imports.contains(&class_name) {
                imports.push(class_name);
            }
        }
    }
    imports
}

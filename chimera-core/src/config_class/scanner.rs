//! 组件扫描
//!
//! 在元数据来源中按包查找候选组件，通过 include / exclude 过滤器筛选，
//! 注册为 Scanned 来源的 Bean 定义。

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bean_definition::{apply_common_annotations, BeanDefinition, BeanDefinitionHolder, BeanOrigin};
use crate::condition::{AnnotatedElement, ConditionEvaluator};
use crate::config::Environment;
use crate::constants::{COMPONENT, COMPONENT_SCAN_FILTER};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{package_name, AnnotationAttributes, AnnotationMetadata, MetadataSources};
use crate::naming::{AnnotationBeanNameGenerator, BeanNameGenerator};
use crate::registry::{register_bean_definition_holder, BeanDefinitionRegistry, DefaultListableBeanFactory};
use crate::scope::{apply_scoped_proxy_mode, AnnotationScopeMetadataResolver, ScopedProxyMode};

/// 类型过滤器
#[derive(Clone)]
pub enum TypeFilter {
    /// 带有给定注解（包含元注解）
    Annotation(String),
    /// 可以赋值给给定类型
    AssignableType(String),
    /// 类名匹配正则
    Regex(Regex),
    /// 精确类名
    ClassName(String),
    Custom(Arc<dyn Fn(&dyn AnnotationMetadata) -> bool + Send + Sync>),
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::Annotation(name) => write!(f, "Annotation({})", name),
            TypeFilter::AssignableType(name) => write!(f, "AssignableType({})", name),
            TypeFilter::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
            TypeFilter::ClassName(name) => write!(f, "ClassName({})", name),
            TypeFilter::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl TypeFilter {
    pub fn matches(&self, metadata: &dyn AnnotationMetadata, sources: &MetadataSources) -> bool {
        match self {
            TypeFilter::Annotation(annotation) => metadata.is_annotated(annotation),
            TypeFilter::AssignableType(type_name) => {
                sources.is_assignable(metadata.class_name(), type_name)
            }
            TypeFilter::Regex(regex) => regex.is_match(metadata.class_name()),
            TypeFilter::ClassName(name) => metadata.class_name() == name,
            TypeFilter::Custom(predicate) => predicate(metadata),
        }
    }

    /// 从 @ComponentScan.Filter 注解构造过滤器
    pub fn from_attributes(attributes: &AnnotationAttributes) -> ContainerResult<Vec<TypeFilter>> {
        let filter_type = attributes.get_str("type").unwrap_or("ANNOTATION").to_ascii_uppercase();
        let mut classes = attributes.get_string_array("classes");
        classes.extend(attributes.get_string_array("value"));

        let mut filters = Vec::new();
        match filter_type.as_str() {
            "ANNOTATION" => filters.extend(classes.into_iter().map(TypeFilter::Annotation)),
            "ASSIGNABLE_TYPE" => filters.extend(classes.into_iter().map(TypeFilter::AssignableType)),
            "REGEX" => {
                for pattern in attributes.get_string_array("pattern") {
                    let regex = Regex::new(&pattern).map_err(|e| {
                        ContainerError::IllegalState(format!(
                            "Invalid {} pattern '{}': {}",
                            COMPONENT_SCAN_FILTER, pattern, e
                        ))
                    })?;
                    filters.push(TypeFilter::Regex(regex));
                }
            }
            other => {
                return Err(ContainerError::IllegalState(format!(
                    "Filter type not supported with String pattern: {}",
                    other
                )))
            }
        }
        Ok(filters)
    }
}

/// 组件扫描器
pub struct ClassPathBeanDefinitionScanner {
    registry: Arc<DefaultListableBeanFactory>,
    sources: MetadataSources,
    condition_evaluator: Arc<ConditionEvaluator>,
    include_filters: Vec<TypeFilter>,
    exclude_filters: Vec<TypeFilter>,
    scope_resolver: AnnotationScopeMetadataResolver,
    name_generator: Arc<dyn BeanNameGenerator>,
    lazy_init: bool,
}

impl ClassPathBeanDefinitionScanner {
    pub fn new(
        registry: Arc<DefaultListableBeanFactory>,
        condition_evaluator: Arc<ConditionEvaluator>,
        use_default_filters: bool,
    ) -> Self {
        let sources = registry.metadata_sources().clone();
        let mut scanner = Self {
            registry,
            sources,
            condition_evaluator,
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
            scope_resolver: AnnotationScopeMetadataResolver::new(),
            name_generator: Arc::new(AnnotationBeanNameGenerator),
            lazy_init: false,
        };
        if use_default_filters {
            scanner.add_include_filter(TypeFilter::Annotation(COMPONENT.to_string()));
        }
        scanner
    }

    pub fn add_include_filter(&mut self, filter: TypeFilter) {
        self.include_filters.push(filter);
    }

    pub fn add_exclude_filter(&mut self, filter: TypeFilter) {
        self.exclude_filters.push(filter);
    }

    pub fn set_scoped_proxy_mode(&mut self, mode: ScopedProxyMode) {
        self.scope_resolver = AnnotationScopeMetadataResolver::with_default_proxy_mode(mode);
    }

    pub fn set_lazy_init(&mut self, lazy_init: bool) {
        self.lazy_init = lazy_init;
    }

    pub fn set_name_generator(&mut self, generator: Arc<dyn BeanNameGenerator>) {
        self.name_generator = generator;
    }

    /// 包内通过过滤器的候选组件
    pub fn find_candidate_components(
        &self,
        base_package: &str,
    ) -> ContainerResult<Vec<Arc<dyn AnnotationMetadata>>> {
        let mut candidates = Vec::new();
        for class_name in self.sources.class_names_in_package(base_package) {
            let metadata = self.sources.annotation_metadata(&class_name)?;
            if !self.is_candidate_component(&*metadata)? {
                tracing::trace!("Ignored because not matching any filter: {}", class_name);
                continue;
            }
            if !is_candidate_component_type(&*metadata) {
                tracing::debug!("Ignored because not a concrete top-level class: {}", class_name);
                continue;
            }
            tracing::debug!("Identified candidate component class: {}", class_name);
            candidates.push(metadata);
        }
        Ok(candidates)
    }

    fn is_candidate_component(&self, metadata: &dyn AnnotationMetadata) -> ContainerResult<bool> {
        if self
            .exclude_filters
            .iter()
            .any(|filter| filter.matches(metadata, &self.sources))
        {
            return Ok(false);
        }
        for filter in &self.include_filters {
            if filter.matches(metadata, &self.sources) {
                let skip = self
                    .condition_evaluator
                    .should_skip(AnnotatedElement::Class(metadata), None)?;
                return Ok(!skip);
            }
        }
        Ok(false)
    }

    /// 扫描并注册，返回注册的定义
    pub fn scan(&self, base_packages: &[String]) -> ContainerResult<Vec<BeanDefinitionHolder>> {
        let mut holders = Vec::new();
        for base_package in base_packages {
            for metadata in self.find_candidate_components(base_package)? {
                let scope_metadata = self.scope_resolver.resolve(&*metadata);
                let mut definition = BeanDefinition::for_class(metadata.class_name())
                    .with_scope(scope_metadata.scope.clone())
                    .with_origin(BeanOrigin::Scanned)
                    .with_lazy(self.lazy_init);
                definition.resource_description = Some(metadata.class_name().to_string());
                apply_common_annotations(&mut definition, &*metadata);

                let bean_name = self
                    .name_generator
                    .generate_bean_name(&*metadata, &self.sources)?;
                if !self.check_candidate(&bean_name, &definition)? {
                    continue;
                }
                let holder = BeanDefinitionHolder::new(bean_name, definition);
                let holder = apply_scoped_proxy_mode(&scope_metadata, holder, &*self.registry)?;
                register_bean_definition_holder(&holder, &*self.registry)?;
                holders.push(holder);
            }
        }
        tracing::info!(
            "Component scan of {:?} registered {} bean definition(s)",
            base_packages,
            holders.len()
        );
        Ok(holders)
    }

    /// 名称已被占用时：兼容的定义跳过，不兼容的报错
    fn check_candidate(&self, bean_name: &str, definition: &BeanDefinition) -> ContainerResult<bool> {
        if !self.registry.contains_bean_definition(bean_name) {
            return Ok(true);
        }
        let mut existing = self.registry.get_bean_definition(bean_name)?;
        if let Some(original) = existing.decorated_definition.take() {
            existing = original.definition;
        }
        if is_compatible(definition, &existing) {
            tracing::debug!("Skipping compatible duplicate scanned bean '{}'", bean_name);
            return Ok(false);
        }
        Err(ContainerError::ConflictingBeanDefinition {
            name: bean_name.to_string(),
            new_class: definition.bean_class_name.clone().unwrap_or_default(),
            existing_class: existing.bean_class_name.unwrap_or_default(),
        })
    }
}

/// 显式注册的定义优先；同一来源被扫描两次也视为兼容
fn is_compatible(new: &BeanDefinition, existing: &BeanDefinition) -> bool {
    !existing.origin.is_scanned()
        || (new.resource_description.is_some()
            && new.resource_description == existing.resource_description)
        || new == existing
}

/// 独立且具体的类型才能成为组件
fn is_candidate_component_type(metadata: &dyn AnnotationMetadata) -> bool {
    metadata.is_independent() && metadata.is_concrete() && !metadata.is_annotation()
}

/// 解析 @ComponentScan 并执行扫描
pub struct ComponentScanAnnotationParser {
    registry: Arc<DefaultListableBeanFactory>,
    environment: Arc<Environment>,
    condition_evaluator: Arc<ConditionEvaluator>,
}

impl ComponentScanAnnotationParser {
    pub fn new(
        registry: Arc<DefaultListableBeanFactory>,
        environment: Arc<Environment>,
        condition_evaluator: Arc<ConditionEvaluator>,
    ) -> Self {
        Self {
            registry,
            environment,
            condition_evaluator,
        }
    }

    pub fn parse(
        &self,
        scan: &AnnotationAttributes,
        declaring_class: &str,
    ) -> ContainerResult<Vec<BeanDefinitionHolder>> {
        let use_default_filters = scan.get_bool("useDefaultFilters").unwrap_or(true);
        let mut scanner = ClassPathBeanDefinitionScanner::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.condition_evaluator),
            use_default_filters,
        );

        if let Some(mode) = scan.get_str("scopedProxy") {
            let mode = ScopedProxyMode::from_name(mode);
            if mode != ScopedProxyMode::Default {
                scanner.set_scoped_proxy_mode(mode);
            }
        }
        for filter in scan.get_annotations("includeFilters") {
            for type_filter in TypeFilter::from_attributes(&filter)? {
                scanner.add_include_filter(type_filter);
            }
        }
        for filter in scan.get_annotations("excludeFilters") {
            for type_filter in TypeFilter::from_attributes(&filter)? {
                scanner.add_exclude_filter(type_filter);
            }
        }
        if scan.get_bool("lazyInit").unwrap_or(false) {
            scanner.set_lazy_init(true);
        }

        let mut base_packages: Vec<String> = Vec::new();
        let mut declared = scan.get_string_array("basePackages");
        declared.extend(scan.get_string_array("value"));
        for package in declared {
            let resolved = self.environment.resolve_placeholders(&package);
            base_packages.extend(
                resolved
                    .split([',', ';', ' ', '\t', '\n'])
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        }
        for class_name in scan.get_string_array("basePackageClasses") {
            base_packages.push(package_name(&class_name).to_string());
        }
        if base_packages.is_empty() {
            base_packages.push(package_name(declaring_class).to_string());
        }
        base_packages.dedup();

        // 声明扫描的类本身已经被处理
        scanner.add_exclude_filter(TypeFilter::ClassName(declaring_class.to_string()));
        scanner.scan(&base_packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::PlaceholderExpressionEvaluator;
    use crate::constants::{COMPONENT_SCAN, SERVICE};
    use crate::metadata::{Annotation, ClassDef, ClassRegistry};
    use crate::resource::InMemoryResourceLoader;

    fn fixture() -> (Arc<DefaultListableBeanFactory>, ComponentScanAnnotationParser) {
        let classes = Arc::new(ClassRegistry::new());
        classes.register(ClassDef::new("app::AppConfig").annotated(Annotation::new(COMPONENT)));
        classes.register(ClassDef::new("app::UserService").annotated(Annotation::new(SERVICE)));
        classes.register(ClassDef::new("app::Helper"));
        classes.register(ClassDef::new("app::AbstractBase").annotated(Annotation::new(COMPONENT)).abstract_());
        classes.register(ClassDef::new("app::web::Handler").annotated(Annotation::new(COMPONENT).value("handler")));
        let registry = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(classes));
        let environment = Arc::new(Environment::new());
        let evaluator = Arc::new(ConditionEvaluator::new(
            Arc::clone(&registry),
            Arc::clone(&environment),
            Arc::new(InMemoryResourceLoader::new()),
            Arc::new(PlaceholderExpressionEvaluator),
        ));
        let parser = ComponentScanAnnotationParser::new(Arc::clone(&registry), environment, evaluator);
        (registry, parser)
    }

    #[test]
    fn test_scan_declaring_package() {
        let (registry, parser) = fixture();
        let scan = AnnotationAttributes::from_annotation(&Annotation::new(COMPONENT_SCAN));
        let holders = parser.parse(&scan, "app::AppConfig").unwrap();
        let names: Vec<&str> = holders.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["userService", "handler"]);
        assert!(registry.get_bean_definition("userService").unwrap().origin.is_scanned());
    }

    #[test]
    fn test_filters() {
        let (_, parser) = fixture();
        let scan = AnnotationAttributes::from_annotation(
            &Annotation::new(COMPONENT_SCAN)
                .with("basePackages", vec!["app::web"])
                .with("useDefaultFilters", false)
                .with(
                    "includeFilters",
                    vec![Annotation::new(COMPONENT_SCAN_FILTER)
                        .with("type", "REGEX")
                        .with("pattern", vec![".*Handler$"])],
                ),
        );
        let holders = parser.parse(&scan, "app::AppConfig").unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].name, "handler");
    }

    #[test]
    fn test_conflicting_scanned_names() {
        let (registry, parser) = fixture();
        registry
            .register_bean_definition(
                "userService",
                BeanDefinition::for_class("other::UserService").with_origin(BeanOrigin::Scanned),
            )
            .unwrap();
        let scan = AnnotationAttributes::from_annotation(&Annotation::new(COMPONENT_SCAN));
        assert!(matches!(
            parser.parse(&scan, "app::AppConfig"),
            Err(ContainerError::ConflictingBeanDefinition { .. })
        ));
    }
}

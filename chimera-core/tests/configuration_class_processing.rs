use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chimera_core::condition::{Condition, ConditionContext, ConditionRegistry};
use chimera_core::config_class::{
    CollectingProblemReporter, ConfigurationClassPostProcessor, DeferredImportSelector, GroupEntry,
    ImportBeanDefinitionRegistrar, ImportComponentRegistry, ImportContext, ImportGroup,
    ImportSelector, ProblemKind,
};
use chimera_core::prelude::*;
use chimera_core::resource::InMemoryResourceLoader;
use chimera_core::{
    AnnotatedElement, ConfigurationPhase, BEAN, COMPONENT_SCAN, CONDITIONAL, CONFIGURATION,
    IMPORT, IMPORT_RESOURCE, PROPERTY_SOURCE, SCOPE, SCOPED_PROXY_FACTORY_BEAN, SERVICE,
};
use pretty_assertions::assert_eq;

fn container(classes: Vec<ClassDef>) -> Arc<DefaultListableBeanFactory> {
    let registry = Arc::new(ClassRegistry::new());
    registry.register_all(classes);
    DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(registry))
}

fn config(name: &str) -> ClassDef {
    ClassDef::new(name).annotated(Annotation::new(CONFIGURATION))
}

fn import(classes: &[&str]) -> Annotation {
    Annotation::new(IMPORT).value(classes.to_vec())
}

fn bean(name: &str, returns: &str) -> MethodDef {
    MethodDef::new(name).returns(returns).annotated(Annotation::new(BEAN))
}

fn processor(environment: Arc<Environment>) -> ConfigurationClassPostProcessor {
    ConfigurationClassPostProcessor::new(environment)
        .with_resource_loader(Arc::new(InMemoryResourceLoader::new()))
}

fn disallow_overriding() -> Arc<Environment> {
    let environment = Environment::new();
    environment.add_property_source(
        MapPropertySource::new("test").with_property("chimera.main.allow-bean-definition-overriding", false),
    );
    Arc::new(environment)
}

#[test]
fn test_circular_import_is_reported() {
    let factory = container(vec![
        config("app::A").annotated(import(&["app::B"])),
        config("app::B").annotated(import(&["app::A"])),
    ]);
    factory
        .register_bean_definition("a", BeanDefinition::for_class("app::A"))
        .unwrap();

    let error = processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap_err();
    match error {
        ContainerError::Problem(problem) => {
            assert_eq!(problem.import_chain().as_deref(), Some("app::A->app::B->app::A"));
        }
        other => panic!("expected circular import problem, got {other}"),
    }
}

#[test]
fn test_circular_import_collected() {
    let factory = container(vec![
        config("app::A").annotated(import(&["app::B"])),
        config("app::B").annotated(import(&["app::A"])),
    ]);
    factory
        .register_bean_definition("a", BeanDefinition::for_class("app::A"))
        .unwrap();

    let reporter = Arc::new(CollectingProblemReporter::new());
    processor(Arc::new(Environment::new()))
        .with_problem_reporter(reporter.clone())
        .process_config_bean_definitions(&factory)
        .unwrap();
    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].kind, ProblemKind::CircularImport { .. }));
}

#[test]
fn test_linear_and_diamond_imports() {
    let factory = container(vec![
        config("app::A").annotated(import(&["app::B", "app::C"])),
        config("app::B").annotated(import(&["app::C"])),
        config("app::C").method(bean("clock", "app::Clock")),
    ]);
    factory
        .register_bean_definition("a", BeanDefinition::for_class("app::A"))
        .unwrap();

    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    assert_eq!(
        factory.bean_definition_names(),
        vec!["a", "app::C", "clock", "app::B"]
    );
    let clock = factory.get_bean_definition("clock").unwrap();
    assert_eq!(clock.factory_bean_name.as_deref(), Some("app::C"));
    assert_eq!(clock.factory_method_name.as_deref(), Some("clock"));
    assert_eq!(clock.target_type.as_deref(), Some("app::Clock"));
}

#[test]
fn test_bean_method_override_disallowed_is_fatal() {
    let factory = container(vec![config("app::Cfg").method(bean("dataSource", "app::DataSource"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    factory
        .register_bean_definition("dataSource", BeanDefinition::for_class("app::Legacy"))
        .unwrap();

    let result = processor(disallow_overriding()).process_config_bean_definitions(&factory);
    assert!(matches!(result, Err(ContainerError::BeanDefinitionOverride { .. })));
}

#[test]
fn test_bean_method_override_allowed_keeps_first() {
    let factory = container(vec![config("app::Cfg").method(bean("dataSource", "app::DataSource"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    factory
        .register_bean_definition("dataSource", BeanDefinition::for_class("app::Legacy"))
        .unwrap();

    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();
    let definition = factory.get_bean_definition("dataSource").unwrap();
    assert_eq!(definition.bean_class_name.as_deref(), Some("app::Legacy"));
}

#[test]
fn test_scanned_definition_superseded_by_bean_method() {
    let factory = container(vec![config("app::Cfg").method(bean("dataSource", "app::DataSource"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    factory
        .register_bean_definition(
            "dataSource",
            BeanDefinition::for_class("app::Legacy").with_origin(BeanOrigin::Scanned),
        )
        .unwrap();

    processor(disallow_overriding())
        .process_config_bean_definitions(&factory)
        .unwrap();
    let definition = factory.get_bean_definition("dataSource").unwrap();
    assert_eq!(definition.origin.config_class(), Some("app::Cfg"));
    assert_eq!(definition.factory_bean_name.as_deref(), Some("cfg"));
}

#[test]
fn test_infrastructure_definition_superseded_by_bean_method() {
    let factory = container(vec![config("app::Cfg").method(bean("eventBus", "app::EventBus"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    factory
        .register_bean_definition(
            "eventBus",
            BeanDefinition::for_class("app::InternalEventBus").with_role(Role::Infrastructure),
        )
        .unwrap();

    processor(disallow_overriding())
        .process_config_bean_definitions(&factory)
        .unwrap();
    let definition = factory.get_bean_definition("eventBus").unwrap();
    assert_eq!(definition.origin.config_class(), Some("app::Cfg"));
    assert_eq!(definition.role, Role::Application);
    assert_eq!(definition.factory_method_name.as_deref(), Some("eventBus"));
}

#[test]
fn test_bean_methods_from_two_configuration_classes() {
    let classes = || {
        vec![
            config("app::First").method(bean("clock", "app::Clock")),
            config("app::Second").method(bean("clock", "app::Clock")),
        ]
    };

    let factory = container(classes());
    factory.register_bean_definition("first", BeanDefinition::for_class("app::First")).unwrap();
    factory.register_bean_definition("second", BeanDefinition::for_class("app::Second")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();
    let clock = factory.get_bean_definition("clock").unwrap();
    assert_eq!(clock.factory_bean_name.as_deref(), Some("first"));

    let factory = container(classes());
    factory.register_bean_definition("first", BeanDefinition::for_class("app::First")).unwrap();
    factory.register_bean_definition("second", BeanDefinition::for_class("app::Second")).unwrap();
    let result = processor(disallow_overriding()).process_config_bean_definitions(&factory);
    assert!(matches!(result, Err(ContainerError::BeanDefinitionOverride { .. })));
}

#[test]
fn test_bean_method_named_after_its_configuration_class() {
    let factory = container(vec![config("app::Cfg").method(bean("cfg", "app::Other"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    let result = processor(Arc::new(Environment::new())).process_config_bean_definitions(&factory);
    match result {
        Err(ContainerError::BeanDefinitionStore { message, .. }) => {
            assert!(message.contains("illegally overridden"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
}

#[test]
fn test_overloaded_bean_method_is_not_unique() {
    let factory = container(vec![config("app::Cfg")
        .method(bean("clock", "app::Clock"))
        .method(bean("clock", "app::Clock").param("zone", "app::Zone"))]);
    factory
        .register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg"))
        .unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();
    assert!(!factory.get_bean_definition("clock").unwrap().unique_factory_method);
}

struct GroupedSelector(&'static str);

impl DeferredImportSelector for GroupedSelector {
    fn select_imports(
        &self,
        _importing: &dyn AnnotationMetadata,
        _context: &ImportContext<'_>,
    ) -> anyhow::Result<Vec<String>> {
        Ok(vec![self.0.to_string()])
    }

    fn import_group(&self) -> Option<String> {
        Some("descending".to_string())
    }
}

#[derive(Default)]
struct DescendingGroup {
    entries: Vec<GroupEntry>,
}

impl ImportGroup for DescendingGroup {
    fn process(
        &mut self,
        metadata: &Arc<dyn AnnotationMetadata>,
        selector: &dyn DeferredImportSelector,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()> {
        for import_class_name in selector.select_imports(&**metadata, context)? {
            self.entries.push(GroupEntry {
                metadata: Arc::clone(metadata),
                import_class_name,
            });
        }
        Ok(())
    }

    fn select_imports(&mut self) -> anyhow::Result<Vec<GroupEntry>> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by(|a, b| b.import_class_name.cmp(&a.import_class_name));
        Ok(entries)
    }
}

#[test]
fn test_deferred_selectors_grouped_after_regular_imports() {
    let factory = container(vec![
        config("app::A").annotated(import(&["app::SelectAlpha", "app::Plain"])),
        config("app::B").annotated(import(&["app::SelectBeta"])),
        config("app::Plain"),
        config("app::Alpha"),
        config("app::Beta"),
    ]);
    factory.register_bean_definition("a", BeanDefinition::for_class("app::A")).unwrap();
    factory.register_bean_definition("b", BeanDefinition::for_class("app::B")).unwrap();

    let groups_created = Arc::new(AtomicUsize::new(0));
    let components = ImportComponentRegistry::empty();
    components.register_deferred_selector("app::SelectAlpha", Arc::new(GroupedSelector("app::Alpha")));
    components.register_deferred_selector("app::SelectBeta", Arc::new(GroupedSelector("app::Beta")));
    let counter = Arc::clone(&groups_created);
    components.register_group("descending", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::new(DescendingGroup::default())
    });

    processor(Arc::new(Environment::new()))
        .with_import_components(Arc::new(components))
        .process_config_bean_definitions(&factory)
        .unwrap();

    assert_eq!(groups_created.load(Ordering::SeqCst), 1);
    assert_eq!(
        factory.bean_definition_names(),
        vec!["a", "b", "app::Plain", "app::Beta", "app::Alpha"]
    );
}

struct FixedSelector;

impl ImportSelector for FixedSelector {
    fn select_imports(
        &self,
        importing: &dyn AnnotationMetadata,
        _context: &ImportContext<'_>,
    ) -> anyhow::Result<Vec<String>> {
        assert_eq!(importing.class_name(), "app::Root");
        Ok(vec!["app::Selected".to_string()])
    }
}

struct MarkerRegistrar;

impl ImportBeanDefinitionRegistrar for MarkerRegistrar {
    fn register_bean_definitions(
        &self,
        importing: &dyn AnnotationMetadata,
        context: &ImportContext<'_>,
    ) -> anyhow::Result<()> {
        let definition = BeanDefinition::for_class("app::Marker")
            .with_attribute("importedBy", importing.class_name());
        context.registry.register_bean_definition("marker", definition)?;
        Ok(())
    }
}

#[test]
fn test_selectors_registrars_and_imported_resources() {
    let factory = container(vec![
        config("app::Root")
            .annotated(import(&["app::FixedSelector", "app::MarkerRegistrar"]))
            .annotated(Annotation::new(IMPORT_RESOURCE).with("locations", vec!["classpath:${beans.file}"])),
        config("app::Selected").method(bean("selectedBean", "app::Thing")),
    ]);
    factory
        .register_bean_definition("root", BeanDefinition::for_class("app::Root"))
        .unwrap();

    let components = ImportComponentRegistry::empty();
    components.register_selector("app::FixedSelector", Arc::new(FixedSelector));
    components.register_registrar("app::MarkerRegistrar", Arc::new(MarkerRegistrar));

    let environment = Environment::new();
    environment.add_property_source(MapPropertySource::new("test").with_property("beans.file", "beans.toml"));
    let resources = InMemoryResourceLoader::new().with_resource(
        "classpath:beans.toml",
        "[[bean]]\nname = \"legacyClock\"\nclass = \"app::LegacyClock\"\n",
    );

    ConfigurationClassPostProcessor::new(Arc::new(environment))
        .with_resource_loader(Arc::new(resources))
        .with_import_components(Arc::new(components))
        .process_config_bean_definitions(&factory)
        .unwrap();

    assert!(factory.contains_bean_definition("app::Selected"));
    assert!(factory.contains_bean_definition("selectedBean"));
    assert_eq!(
        factory.get_bean_definition("marker").unwrap().attribute("importedBy"),
        Some("app::Root")
    );
    let legacy = factory.get_bean_definition("legacyClock").unwrap();
    assert_eq!(
        legacy.origin,
        BeanOrigin::ImportedResource {
            resource: "classpath:beans.toml".to_string()
        }
    );
}

#[test]
fn test_property_sources_with_same_name_are_composed() {
    let factory = container(vec![
        config("app::First").annotated(
            Annotation::new(PROPERTY_SOURCE)
                .with("name", "app")
                .value(vec!["classpath:first.properties"]),
        ),
        config("app::Second").annotated(
            Annotation::new(PROPERTY_SOURCE)
                .with("name", "app")
                .value(vec!["classpath:second.toml"]),
        ),
    ]);
    factory.register_bean_definition("first", BeanDefinition::for_class("app::First")).unwrap();
    factory.register_bean_definition("second", BeanDefinition::for_class("app::Second")).unwrap();

    let resources = InMemoryResourceLoader::new()
        .with_resource("classpath:first.properties", "shared.key=first\n")
        .with_resource("classpath:second.toml", "[shared]\nkey = \"second\"\n\n[only]\nsecond = \"yes\"\n");
    let environment = Arc::new(Environment::new());
    ConfigurationClassPostProcessor::new(Arc::clone(&environment))
        .with_resource_loader(Arc::new(resources))
        .process_config_bean_definitions(&factory)
        .unwrap();

    let source = environment.property_sources().get("app").unwrap();
    assert!(source.as_composite().is_some());
    assert_eq!(environment.get_property("shared.key").as_deref(), Some("first"));
    assert_eq!(environment.get_property("only.second").as_deref(), Some("yes"));
}

#[test]
fn test_missing_property_source_ignored_when_requested() {
    let factory = container(vec![config("app::Cfg").annotated(
        Annotation::new(PROPERTY_SOURCE)
            .value(vec!["classpath:missing.properties"])
            .with("ignoreResourceNotFound", true),
    )]);
    factory.register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    let factory = container(vec![config("app::Cfg")
        .annotated(Annotation::new(PROPERTY_SOURCE).value(vec!["classpath:missing.properties"]))]);
    factory.register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg")).unwrap();
    match processor(Arc::new(Environment::new())).process_config_bean_definitions(&factory) {
        Err(ContainerError::Resource { location, .. }) => {
            assert_eq!(location, "classpath:missing.properties");
        }
        other => panic!("expected resource error, got {:?}", other.err()),
    }
}

struct NeverAtRegistration;

impl Condition for NeverAtRegistration {
    fn matches(&self, _context: &ConditionContext<'_>, _metadata: &AnnotatedElement<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn phase(&self) -> Option<ConfigurationPhase> {
        Some(ConfigurationPhase::RegisterBean)
    }
}

#[test]
fn test_classes_imported_only_by_skipped_classes_are_skipped() {
    let factory = container(vec![
        config("app::A")
            .annotated(Annotation::new(CONDITIONAL).value(vec!["app::NeverAtRegistration"]))
            .annotated(import(&["app::B"])),
        config("app::B").method(bean("fromB", "app::Thing")),
    ]);
    factory.register_bean_definition("a", BeanDefinition::for_class("app::A")).unwrap();

    let mut conditions = ConditionRegistry::new();
    conditions.register("app::NeverAtRegistration", Arc::new(NeverAtRegistration));
    let post_processor = processor(Arc::new(Environment::new())).with_conditions(conditions);
    post_processor.process_config_bean_definitions(&factory).unwrap();

    assert!(factory.bean_definition_names().is_empty());
    assert!(post_processor.import_registry().importing_class_for("app::B").is_none());
}

#[test]
fn test_profile_skips_configuration_class() {
    let factory = container(vec![
        config("app::Dev")
            .annotated(Annotation::new(chimera_core::PROFILE).value(vec!["dev"]))
            .method(bean("devOnly", "app::Thing")),
    ]);
    factory.register_bean_definition("dev", BeanDefinition::for_class("app::Dev")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();
    assert!(!factory.contains_bean_definition("devOnly"));

    let factory = container(vec![
        config("app::Dev")
            .annotated(Annotation::new(chimera_core::PROFILE).value(vec!["dev"]))
            .method(bean("devOnly", "app::Thing")),
    ]);
    factory.register_bean_definition("dev", BeanDefinition::for_class("app::Dev")).unwrap();
    let environment = Environment::new();
    environment.set_active_profiles(vec!["dev".to_string()]);
    processor(Arc::new(environment))
        .process_config_bean_definitions(&factory)
        .unwrap();
    assert!(factory.contains_bean_definition("devOnly"));
}

#[test]
fn test_component_scan_parses_nested_configuration() {
    let factory = container(vec![
        config("app::Root").annotated(Annotation::new(COMPONENT_SCAN).with("basePackages", vec!["app::svc"])),
        ClassDef::new("app::svc::Users").annotated(Annotation::new(SERVICE)),
        config("app::svc::Nested").method(bean("nestedBean", "app::Thing")),
    ]);
    factory.register_bean_definition("root", BeanDefinition::for_class("app::Root")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    assert!(factory.get_bean_definition("users").unwrap().origin.is_scanned());
    let nested_bean = factory.get_bean_definition("nestedBean").unwrap();
    assert_eq!(nested_bean.factory_bean_name.as_deref(), Some("nested"));
}

#[test]
fn test_inherited_and_interface_bean_methods() {
    let factory = container(vec![
        ClassDef::interface("app::Defaults").method(bean("fallback", "app::Thing")),
        ClassDef::new("app::Base").method(bean("inherited", "app::Thing")),
        config("app::Cfg")
            .extends("app::Base")
            .implements("app::Defaults")
            .method(bean("own", "app::Thing").static_()),
    ]);
    factory.register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    let own = factory.get_bean_definition("own").unwrap();
    assert_eq!(own.bean_class_name.as_deref(), Some("app::Cfg"));
    assert!(own.factory_bean_name.is_none());
    assert!(factory.contains_bean_definition("fallback"));
    assert_eq!(
        factory.get_bean_definition("inherited").unwrap().factory_bean_name.as_deref(),
        Some("cfg")
    );
}

#[test]
fn test_scoped_bean_method_gets_proxy() {
    let factory = container(vec![config("app::Cfg").method(
        bean("session", "app::Session").annotated(
            Annotation::new(SCOPE)
                .value("request")
                .with("proxyMode", "TARGET_CLASS"),
        ),
    )]);
    factory.register_bean_definition("cfg", BeanDefinition::for_class("app::Cfg")).unwrap();
    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    let proxy = factory.get_bean_definition("session").unwrap();
    assert_eq!(proxy.bean_class_name.as_deref(), Some(SCOPED_PROXY_FACTORY_BEAN));
    assert_eq!(proxy.attribute("targetBeanName"), Some("scopedTarget.session"));
    assert_eq!(proxy.target_type.as_deref(), Some("app::Session"));
    let target = factory.get_bean_definition("scopedTarget.session").unwrap();
    assert!(!target.autowire_candidate);
}

#[test]
fn test_processing_is_deterministic() {
    let build = || {
        let factory = container(vec![
            config("app::A").annotated(import(&["app::B"])).method(bean("one", "app::Thing")),
            config("app::B").method(bean("two", "app::Thing")),
        ]);
        factory.register_bean_definition("a", BeanDefinition::for_class("app::A")).unwrap();
        processor(Arc::new(Environment::new()))
            .process_config_bean_definitions(&factory)
            .unwrap();
        factory
            .bean_definition_names()
            .into_iter()
            .map(|name| {
                let definition = factory.get_bean_definition(&name).unwrap();
                (name, definition)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(build(), build());
}

#[derive(Debug)]
struct Clock(u32);

struct AppConfig;

#[test]
fn test_bean_method_instantiated_through_factory_bean() {
    let factory = container(vec![config("app::AppConfig").method(bean("clock", "app::Clock"))]);
    factory
        .register_bean_definition("appConfig", BeanDefinition::for_class("app::AppConfig"))
        .unwrap();
    factory.register_supplier(SupplierKey::Class("app::AppConfig".to_string()), |_| {
        Ok(Arc::new(AppConfig) as DynBean)
    });
    factory.register_supplier(
        SupplierKey::FactoryMethod {
            class_name: "app::AppConfig".to_string(),
            method: "clock".to_string(),
        },
        |context| {
            let instance = context
                .factory_instance
                .clone()
                .ok_or_else(|| anyhow::anyhow!("missing configuration instance"))?;
            anyhow::ensure!(instance.downcast_ref::<AppConfig>().is_some());
            Ok(Arc::new(Clock(42)) as DynBean)
        },
    );

    processor(Arc::new(Environment::new()))
        .process_config_bean_definitions(&factory)
        .unwrap();

    let clock = factory.get_bean_typed::<Clock>("clock").unwrap();
    assert_eq!(clock.0, 42);
    assert!(Arc::ptr_eq(&clock, &factory.get_bean_typed::<Clock>("clock").unwrap()));
}

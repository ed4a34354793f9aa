//! 配置类后置处理器
//!
//! 在 Bean 实例化之前运行：找出注册表中的配置类候选，解析并把结果转换为
//! Bean 定义；新注册的定义中出现新的配置类时继续下一轮，直到没有新的候选。

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean_definition::BeanDefinitionHolder;
use crate::bean_post_processor::BeanDefinitionRegistryPostProcessor;
use crate::condition::{ConditionEvaluator, ConditionRegistry, ExpressionEvaluator, PlaceholderExpressionEvaluator};
use crate::config::Environment;
use crate::definition_reader::BeanDefinitionReader;
use crate::error::ContainerResult;
use crate::registry::{BeanDefinitionRegistry, DefaultListableBeanFactory};
use crate::resource::{FileSystemResourceLoader, ResourceLoader};
use crate::settings::{ContainerSettings, ALLOW_BEAN_DEFINITION_OVERRIDING_PROPERTY};

use super::import::{ImportComponentRegistry, ImportRegistry};
use super::parser::{ConfigurationClassParser, ParserContext};
use super::problem::{FailFastProblemReporter, ProblemReporter};
use super::reader::ConfigurationClassBeanDefinitionReader;
use super::utils::{check_configuration_class_candidate, order_of};

pub struct ConfigurationClassPostProcessor {
    environment: Arc<Environment>,
    resource_loader: Arc<dyn ResourceLoader>,
    problem_reporter: Arc<dyn ProblemReporter>,
    import_components: Arc<ImportComponentRegistry>,
    expression_evaluator: Arc<dyn ExpressionEvaluator>,
    conditions: Option<ConditionRegistry>,
    readers: Vec<(String, Arc<dyn BeanDefinitionReader>)>,
    import_registry: Mutex<ImportRegistry>,
}

impl ConfigurationClassPostProcessor {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            resource_loader: Arc::new(FileSystemResourceLoader::default()),
            problem_reporter: Arc::new(FailFastProblemReporter),
            import_components: Arc::new(ImportComponentRegistry::new()),
            expression_evaluator: Arc::new(PlaceholderExpressionEvaluator),
            conditions: None,
            readers: Vec::new(),
            import_registry: Mutex::new(ImportRegistry::new()),
        }
    }

    pub fn with_resource_loader(mut self, resource_loader: Arc<dyn ResourceLoader>) -> Self {
        self.resource_loader = resource_loader;
        self
    }

    pub fn with_problem_reporter(mut self, problem_reporter: Arc<dyn ProblemReporter>) -> Self {
        self.problem_reporter = problem_reporter;
        self
    }

    pub fn with_import_components(mut self, import_components: Arc<ImportComponentRegistry>) -> Self {
        self.import_components = import_components;
        self
    }

    pub fn with_expression_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.expression_evaluator = evaluator;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_reader(mut self, name: impl Into<String>, reader: Arc<dyn BeanDefinitionReader>) -> Self {
        self.readers.push((name.into(), reader));
        self
    }

    /// 最近一次处理记录的导入关系
    pub fn import_registry(&self) -> ImportRegistry {
        self.import_registry.lock().clone()
    }

    pub fn process_config_bean_definitions(&self, registry: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        if self.environment.contains_property(ALLOW_BEAN_DEFINITION_OVERRIDING_PROPERTY) {
            let settings = ContainerSettings::from_environment(&self.environment);
            registry.set_allow_bean_definition_overriding(settings.allow_bean_definition_overriding);
        }

        let mut candidate_names = registry.bean_definition_names();
        let mut candidates = self.find_candidates(registry, &candidate_names, &HashSet::new())?;
        if candidates.is_empty() {
            tracing::debug!("No configuration classes found");
            return Ok(());
        }

        let condition_evaluator = {
            let evaluator = ConditionEvaluator::new(
                Arc::clone(registry),
                Arc::clone(&self.environment),
                Arc::clone(&self.resource_loader),
                Arc::clone(&self.expression_evaluator),
            );
            Arc::new(match &self.conditions {
                Some(conditions) => evaluator.with_conditions(conditions.clone()),
                None => evaluator,
            })
        };

        let mut parser = ConfigurationClassParser::new(ParserContext {
            registry: Arc::clone(registry),
            environment: Arc::clone(&self.environment),
            resource_loader: Arc::clone(&self.resource_loader),
            problem_reporter: Arc::clone(&self.problem_reporter),
            condition_evaluator: Arc::clone(&condition_evaluator),
            import_components: Arc::clone(&self.import_components),
        });
        let mut reader = ConfigurationClassBeanDefinitionReader::new(
            Arc::clone(registry),
            Arc::clone(&self.environment),
            Arc::clone(&self.resource_loader),
            condition_evaluator,
        );
        for (name, definition_reader) in &self.readers {
            reader.register_reader(name.clone(), Arc::clone(definition_reader));
        }

        let mut already_parsed: HashSet<String> = HashSet::new();
        let mut round = 0;
        while !candidates.is_empty() {
            round += 1;
            tracing::debug!("Configuration class parsing round {}: {} candidate(s)", round, candidates.len());

            parser.parse(&candidates)?;
            parser.validate()?;

            let mut new_classes = parser.configuration_classes().clone();
            new_classes.retain(|class_name, _| !already_parsed.contains(class_name));
            reader.load_bean_definitions(&mut new_classes, parser.import_registry_mut())?;
            for (class_name, config_class) in new_classes {
                parser.store_configuration_class(config_class);
                already_parsed.insert(class_name);
            }

            candidates.clear();
            let names = registry.bean_definition_names();
            let added: Vec<String> = names
                .iter()
                .filter(|name| !candidate_names.contains(name))
                .cloned()
                .collect();
            if !added.is_empty() {
                candidates = self.find_candidates(registry, &added, &already_parsed)?;
            }
            candidate_names = names;
        }

        *self.import_registry.lock() = parser.import_registry().clone();
        tracing::info!(
            "Processed {} configuration class(es); {} bean definition(s) registered",
            already_parsed.len(),
            registry.bean_definition_count()
        );
        Ok(())
    }

    /// 找出尚未处理的配置类候选，按 @Order 排序
    fn find_candidates(
        &self,
        registry: &DefaultListableBeanFactory,
        names: &[String],
        already_parsed: &HashSet<String>,
    ) -> ContainerResult<Vec<BeanDefinitionHolder>> {
        let mut candidates = Vec::new();
        for name in names {
            let Ok(mut definition) = registry.get_bean_definition(name) else {
                continue;
            };
            let parsed = definition
                .bean_class_name
                .as_deref()
                .map(|class_name| already_parsed.contains(class_name))
                .unwrap_or(false);
            if parsed {
                tracing::trace!("Bean definition '{}' has already been processed as a configuration class", name);
                continue;
            }
            if !check_configuration_class_candidate(&mut definition, registry.metadata_sources()) {
                continue;
            }
            let attributes = definition.attributes.clone();
            registry.modify_bean_definition(name, |existing| existing.attributes = attributes)?;
            candidates.push(BeanDefinitionHolder::new(name.clone(), definition));
        }
        candidates.sort_by_key(|holder| order_of(&holder.definition));
        Ok(candidates)
    }
}

impl BeanDefinitionRegistryPostProcessor for ConfigurationClassPostProcessor {
    fn post_process_bean_definition_registry(&self, registry: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        self.process_config_bean_definitions(registry)
    }

    fn order(&self) -> i32 {
        crate::order::HIGHEST_PRECEDENCE
    }
}

//! 条件评估
//!
//! `@Conditional(value = [条件名称])` 声明的条件在两个阶段被评估：
//! 解析配置类时（ParseConfiguration）与注册 Bean 定义时（RegisterBean）。
//! 条件可以声明自己只在某个阶段生效。
//!
//! 条件按名称查找：内置的 `ProfileCondition`、`ExpressionCondition`，
//! 以及通过 `ConditionRegistration` 在链接期注册的条件。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Environment;
use crate::config_class::utils::is_configuration_candidate;
use crate::constants::{CONDITIONAL, CONDITIONAL_ON_EXPRESSION, EXPRESSION_CONDITION, PROFILE, PROFILE_CONDITION};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{AnnotatedTypeMetadata, AnnotationMetadata, MergedAnnotations, MetadataSources, MethodMetadata};
use crate::order::LOWEST_PRECEDENCE;
use crate::registry::DefaultListableBeanFactory;
use crate::resource::ResourceLoader;

/// 条件评估阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationPhase {
    /// 解析 @Configuration 类时
    ParseConfiguration,
    /// 注册 Bean 定义时
    RegisterBean,
}

/// 被评估的元素：类型或 @Bean 方法
#[derive(Clone, Copy)]
pub enum AnnotatedElement<'a> {
    Class(&'a dyn AnnotationMetadata),
    Method(&'a MethodMetadata),
}

impl AnnotatedElement<'_> {
    pub fn describe(&self) -> String {
        match self {
            AnnotatedElement::Class(metadata) => metadata.class_name().to_string(),
            AnnotatedElement::Method(method) => method.method_def().to_string(),
        }
    }
}

impl AnnotatedTypeMetadata for AnnotatedElement<'_> {
    fn merged_annotations(&self) -> &MergedAnnotations {
        match self {
            AnnotatedElement::Class(metadata) => metadata.merged_annotations(),
            AnnotatedElement::Method(method) => method.merged_annotations(),
        }
    }
}

/// 条件表达式求值器
///
/// 完整的表达式语言不在容器的职责之内，这里只需要一个布尔结果
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, environment: &Environment) -> anyhow::Result<bool>;
}

/// 默认的求值器：解析占位符，去掉 `#{ }`，结果必须是布尔字面量（允许 `!` 取反）
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderExpressionEvaluator;

impl ExpressionEvaluator for PlaceholderExpressionEvaluator {
    fn evaluate(&self, expression: &str, environment: &Environment) -> anyhow::Result<bool> {
        let resolved = environment.resolve_required_placeholders(expression)?;
        let trimmed = resolved.trim();
        let inner = trimmed
            .strip_prefix("#{")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .trim();
        let (negated, literal) = match inner.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, inner),
        };
        let value = match literal.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => anyhow::bail!("Expression '{}' did not evaluate to a boolean: '{}'", expression, other),
        };
        Ok(value != negated)
    }
}

/// 条件评估时可以访问的上下文
pub struct ConditionContext<'a> {
    pub registry: &'a DefaultListableBeanFactory,
    pub environment: &'a Environment,
    pub metadata_sources: &'a MetadataSources,
    pub resource_loader: &'a dyn ResourceLoader,
    pub expression_evaluator: &'a dyn ExpressionEvaluator,
}

/// 条件
pub trait Condition: Send + Sync {
    fn matches(
        &self,
        context: &ConditionContext<'_>,
        metadata: &AnnotatedElement<'_>,
    ) -> anyhow::Result<bool>;

    /// 条件只在给定阶段生效，None 表示两个阶段都生效
    fn phase(&self) -> Option<ConfigurationPhase> {
        None
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

/// @Profile：任意一组 profile 不被接受即不匹配
#[derive(Debug, Default)]
pub struct ProfileCondition;

impl Condition for ProfileCondition {
    fn matches(
        &self,
        context: &ConditionContext<'_>,
        metadata: &AnnotatedElement<'_>,
    ) -> anyhow::Result<bool> {
        for attributes in metadata.all_annotation_attributes(PROFILE) {
            let profiles = attributes.get_string_array("value");
            let profiles: Vec<&str> = profiles.iter().map(String::as_str).collect();
            if !context.environment.accepts_profiles(&profiles) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// @ConditionalOnExpression
#[derive(Debug, Default)]
pub struct ExpressionCondition;

impl Condition for ExpressionCondition {
    fn matches(
        &self,
        context: &ConditionContext<'_>,
        metadata: &AnnotatedElement<'_>,
    ) -> anyhow::Result<bool> {
        let expression = metadata
            .annotation_attributes(CONDITIONAL_ON_EXPRESSION)
            .and_then(|attrs| attrs.get_str("value").map(String::from))
            .unwrap_or_else(|| "true".to_string());
        let result = context
            .expression_evaluator
            .evaluate(&expression, context.environment)?;
        tracing::trace!(
            "Expression '{}' on {} evaluated to {}",
            expression,
            metadata.describe(),
            result
        );
        Ok(result)
    }
}

/// 链接期注册的条件
///
/// ```rust,ignore
/// inventory::submit! {
///     ConditionRegistration { name: "app::OnLinux", create: || Arc::new(OnLinux) }
/// }
/// ```
pub struct ConditionRegistration {
    pub name: &'static str,
    pub create: fn() -> Arc<dyn Condition>,
}

inventory::collect!(ConditionRegistration);

/// 按名称查找条件
#[derive(Clone)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<dyn Condition>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.conditions.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry").field("conditions", &names).finish()
    }
}

impl ConditionRegistry {
    /// 内置条件 + 链接期注册的条件
    pub fn new() -> Self {
        let mut registry = Self {
            conditions: HashMap::new(),
        };
        registry.register(PROFILE_CONDITION, Arc::new(ProfileCondition));
        registry.register(EXPRESSION_CONDITION, Arc::new(ExpressionCondition));
        for registration in inventory::iter::<ConditionRegistration> {
            registry.register(registration.name, (registration.create)());
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, condition: Arc<dyn Condition>) {
        self.conditions.insert(name.into(), condition);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Condition>> {
        self.conditions.get(name).cloned()
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 条件评估器
pub struct ConditionEvaluator {
    registry: Arc<DefaultListableBeanFactory>,
    environment: Arc<Environment>,
    resource_loader: Arc<dyn ResourceLoader>,
    expression_evaluator: Arc<dyn ExpressionEvaluator>,
    conditions: ConditionRegistry,
}

impl ConditionEvaluator {
    pub fn new(
        registry: Arc<DefaultListableBeanFactory>,
        environment: Arc<Environment>,
        resource_loader: Arc<dyn ResourceLoader>,
        expression_evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            registry,
            environment,
            resource_loader,
            expression_evaluator,
            conditions: ConditionRegistry::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 是否应跳过该元素
    ///
    /// 未指定阶段时：配置类候选按解析阶段评估，其他按注册阶段评估
    pub fn should_skip(
        &self,
        metadata: AnnotatedElement<'_>,
        phase: Option<ConfigurationPhase>,
    ) -> ContainerResult<bool> {
        if !metadata.is_annotated(CONDITIONAL) {
            return Ok(false);
        }

        let phase = match phase {
            Some(phase) => phase,
            None => match metadata {
                AnnotatedElement::Class(class) if is_configuration_candidate(class) => {
                    ConfigurationPhase::ParseConfiguration
                }
                _ => ConfigurationPhase::RegisterBean,
            },
        };

        let mut conditions = Vec::new();
        for attributes in metadata.all_annotation_attributes(CONDITIONAL) {
            for name in attributes.get_string_array("value") {
                let condition = self.conditions.get(&name).ok_or_else(|| {
                    ContainerError::IllegalState(format!(
                        "Unknown condition '{}' declared on {}",
                        name,
                        metadata.describe()
                    ))
                })?;
                conditions.push((name, condition));
            }
        }
        conditions.sort_by_key(|(_, condition)| condition.order());

        let context = ConditionContext {
            registry: &self.registry,
            environment: &self.environment,
            metadata_sources: self.registry.metadata_sources(),
            resource_loader: &*self.resource_loader,
            expression_evaluator: &*self.expression_evaluator,
        };

        for (name, condition) in conditions {
            let applies = condition.phase().map_or(true, |required| required == phase);
            if !applies {
                continue;
            }
            let matched = condition.matches(&context, &metadata).map_err(|e| {
                ContainerError::IllegalState(format!(
                    "Failed to evaluate condition '{}' on {}: {:#}",
                    name,
                    metadata.describe(),
                    e
                ))
            })?;
            if !matched {
                tracing::debug!(
                    "Condition '{}' did not match {} ({:?})",
                    name,
                    metadata.describe(),
                    phase
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}

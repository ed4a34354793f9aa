//! 切面元数据：切面类型和实例化模型

use std::fmt;
use std::sync::Arc;

use chimera_core::constants::ORDER;
use chimera_core::metadata::{ClassSource, MergedAnnotations};
use chimera_core::order::LOWEST_PRECEDENCE;
use chimera_core::ClassDef;

use super::annotations::{attributes, ASPECT};
use super::expression::AspectJExpressionPointcut;
use crate::error::{AopError, AopResult};
use crate::pointcut::{ComposablePointcut, Pointcut, TruePointcut, TypePattern, TypePatternClassFilter};

/// 切面实例化模型（`@Aspect` 的 value）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerClauseKind {
    /// 整个容器只有一个切面实例
    Singleton,
    /// `perthis(...)`：每个代理一个实例
    PerThis,
    /// `pertarget(...)`：每个目标对象一个实例
    PerTarget,
    /// `pertypewithin(...)`：每个匹配的类型一个实例
    PerTypeWithin,
}

impl PerClauseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerClauseKind::Singleton => "singleton",
            PerClauseKind::PerThis => "perthis",
            PerClauseKind::PerTarget => "pertarget",
            PerClauseKind::PerTypeWithin => "pertypewithin",
        }
    }
}

impl fmt::Display for PerClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct AspectMetadata {
    aspect_name: String,
    aspect_class: Arc<ClassDef>,
    per_clause_kind: PerClauseKind,
    per_clause_pointcut: Arc<dyn Pointcut>,
    order: i32,
}

impl AspectMetadata {
    /// 读取 `@Aspect` 声明
    ///
    /// 不支持 `percflow`/`percflowbelow`，也不允许继承具体切面
    pub fn new(aspect_class: &str, aspect_name: &str, source: &dyn ClassSource) -> AopResult<Self> {
        let def = source
            .find_class(aspect_class)
            .ok_or_else(|| AopError::IllegalState(format!("Unknown aspect class [{}]", aspect_class)))?;
        let aspect = def
            .annotations
            .iter()
            .find(|a| a.type_name == ASPECT)
            .ok_or_else(|| AopError::IllegalState(format!("[{}] is not an @Aspect type", aspect_class)))?;

        if let Some(parent) = def.superclass.as_deref().and_then(|p| source.find_class(p)) {
            if parent.has_annotation(ASPECT) && !parent.is_abstract {
                return Err(AopError::ConcreteAspectInheritance {
                    aspect: aspect_class.to_string(),
                    parent: parent.name.clone(),
                });
            }
        }

        let clause = aspect
            .attributes
            .get(attributes::VALUE)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let (per_clause_kind, per_clause_pointcut) = parse_per_clause(&clause, aspect_class, source)?;
        let order = MergedAnnotations::from_annotations(&def.annotations, source)
            .get(ORDER)
            .and_then(|order| order.attributes().get_int("value"))
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(LOWEST_PRECEDENCE);

        Ok(Self {
            aspect_name: aspect_name.to_string(),
            aspect_class: def,
            per_clause_kind,
            per_clause_pointcut,
            order,
        })
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    pub fn aspect_class(&self) -> &Arc<ClassDef> {
        &self.aspect_class
    }

    pub fn aspect_class_name(&self) -> &str {
        &self.aspect_class.name
    }

    /// 切面类型上 @Order 的值
    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn per_clause_kind(&self) -> PerClauseKind {
        self.per_clause_kind
    }

    /// 单例切面是匹配一切的切点
    pub fn per_clause_pointcut(&self) -> Arc<dyn Pointcut> {
        Arc::clone(&self.per_clause_pointcut)
    }

    pub fn is_per_this_or_per_target(&self) -> bool {
        matches!(self.per_clause_kind, PerClauseKind::PerThis | PerClauseKind::PerTarget)
    }

    pub fn is_per_type_within(&self) -> bool {
        self.per_clause_kind == PerClauseKind::PerTypeWithin
    }

    /// 切面实例是否要等到第一次匹配时才创建
    pub fn is_lazily_instantiated(&self) -> bool {
        self.per_clause_kind != PerClauseKind::Singleton
    }
}

impl fmt::Debug for AspectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectMetadata")
            .field("aspect_name", &self.aspect_name)
            .field("aspect_class", &self.aspect_class.name)
            .field("per_clause_kind", &self.per_clause_kind)
            .finish()
    }
}

fn parse_per_clause(
    clause: &str,
    aspect_class: &str,
    source: &dyn ClassSource,
) -> AopResult<(PerClauseKind, Arc<dyn Pointcut>)> {
    if clause.is_empty() {
        return Ok((PerClauseKind::Singleton, Arc::new(TruePointcut)));
    }
    let unsupported = || AopError::UnsupportedPerClause {
        aspect: aspect_class.to_string(),
        clause: clause.to_string(),
    };

    let open = clause.find('(').ok_or_else(unsupported)?;
    let body = clause[open + 1..].strip_suffix(')').ok_or_else(unsupported)?.trim();
    match clause[..open].trim() {
        "perthis" => {
            let pointcut = AspectJExpressionPointcut::new(body, Some(aspect_class), source)?;
            Ok((PerClauseKind::PerThis, Arc::new(pointcut)))
        }
        "pertarget" => {
            let pointcut = AspectJExpressionPointcut::new(body, Some(aspect_class), source)?;
            Ok((PerClauseKind::PerTarget, Arc::new(pointcut)))
        }
        "pertypewithin" => {
            let pattern = TypePattern::new(body).ok_or_else(unsupported)?;
            let pointcut = ComposablePointcut::from_class_filter(Arc::new(TypePatternClassFilter::new(pattern)));
            Ok((PerClauseKind::PerTypeWithin, Arc::new(pointcut)))
        }
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{Annotation, ClassRegistry};

    fn registry() -> ClassRegistry {
        let registry = ClassRegistry::new();
        registry.register(ClassDef::new("app::LoggingAspect").annotated(Annotation::new(ASPECT)));
        registry.register(
            ClassDef::new("app::PerTargetAspect")
                .annotated(Annotation::new(ASPECT).value("pertarget(within(app::service::*))")),
        );
        registry.register(
            ClassDef::new("app::PerTypeAspect").annotated(Annotation::new(ASPECT).value("pertypewithin(app::*)")),
        );
        registry.register(
            ClassDef::new("app::FlowAspect").annotated(Annotation::new(ASPECT).value("percflow(execution(* *(..)))")),
        );
        registry.register(
            ClassDef::new("app::DerivedAspect")
                .extends("app::LoggingAspect")
                .annotated(Annotation::new(ASPECT)),
        );
        registry
    }

    #[test]
    fn test_per_clause_kinds() {
        let registry = registry();
        let singleton = AspectMetadata::new("app::LoggingAspect", "loggingAspect", &registry).unwrap();
        assert_eq!(singleton.per_clause_kind(), PerClauseKind::Singleton);
        assert!(!singleton.is_lazily_instantiated());

        let per_target = AspectMetadata::new("app::PerTargetAspect", "perTargetAspect", &registry).unwrap();
        assert!(per_target.is_per_this_or_per_target());
        assert!(per_target.is_lazily_instantiated());

        let per_type = AspectMetadata::new("app::PerTypeAspect", "perTypeAspect", &registry).unwrap();
        assert!(per_type.is_per_type_within());
    }

    #[test]
    fn test_rejected_declarations() {
        let registry = registry();
        assert!(matches!(
            AspectMetadata::new("app::FlowAspect", "flowAspect", &registry),
            Err(AopError::UnsupportedPerClause { .. })
        ));
        assert!(matches!(
            AspectMetadata::new("app::DerivedAspect", "derivedAspect", &registry),
            Err(AopError::ConcreteAspectInheritance { .. })
        ));
    }
}

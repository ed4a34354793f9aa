//! 从切面类型创建通知器
//!
//! 切面在这里不会被实例化：通知器持有切面实例工厂，第一次执行通知时才取得切面实例。

use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::class_registry::all_methods_in;
use chimera_core::metadata::ClassSource;
use chimera_core::{ClassDef, MethodDef};

use super::advice::{build_advice, AspectJAdviceKind, AspectJAdviceMethod, AspectJAnnotation};
use super::annotations::{attributes, ASPECT, DECLARE_PARENTS, POINTCUT};
use super::expression::{default_arg_types, AspectJExpressionPointcut, ArgTypeRegistry};
use super::instance_factory::{AspectInstanceFactory, LazySingletonAspectInstanceFactoryDecorator};
use super::metadata::AspectMetadata;
use crate::advice::{Advice, MethodBeforeAdvice};
use crate::advisor::{
    Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor, DelegatePerTargetObjectIntroductionInterceptor,
    IntroductionAdvisor,
};
use crate::error::{AopError, AopResult};
use crate::joinpoint::JoinPoint;
use crate::pointcut::{
    ClassFilter, ClassView, IntersectionClassFilter, MethodMatcher, NegateClassFilter, Pointcut, TrueClassFilter,
    TypePattern, TypePatternClassFilter,
};
use crate::target::{DynValue, InstantiationRegistry};

/// 由切面方法产生的通知器
///
/// 非单例切面使用 `PerTargetInstantiationModelPointcut`：切面实例创建前只按实例化模型匹配
pub struct InstantiationModelAwarePointcutAdvisor {
    declared_pointcut: AspectJExpressionPointcut,
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    advice_method: Arc<AspectJAdviceMethod>,
    aspect_factory: Arc<dyn AspectInstanceFactory>,
    lazy: bool,
}

impl InstantiationModelAwarePointcutAdvisor {
    pub fn declared_pointcut(&self) -> &AspectJExpressionPointcut {
        &self.declared_pointcut
    }

    pub fn advice_kind(&self) -> &AspectJAdviceKind {
        self.advice_method.kind()
    }

    pub fn advice_method(&self) -> &MethodDef {
        self.advice_method.method()
    }

    pub fn aspect_name(&self) -> &str {
        self.advice_method.aspect_name()
    }

    pub fn declaration_order(&self) -> usize {
        self.advice_method.declaration_order()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_advice_instantiated(&self) -> bool {
        !self.lazy || self.aspect_factory.is_materialized()
    }
}

impl Advisor for InstantiationModelAwarePointcutAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn pointcut(&self) -> Option<Arc<dyn Pointcut>> {
        Some(Arc::clone(&self.pointcut))
    }

    fn order(&self) -> i32 {
        self.aspect_factory.order()
    }

    fn description(&self) -> String {
        format!(
            "InstantiationModelAwarePointcutAdvisor: expression [{}]; advice method [{}]; perClauseKind={}",
            self.declared_pointcut.expression(),
            self.advice_method.method(),
            self.aspect_factory.aspect_metadata().per_clause_kind()
        )
    }
}

impl fmt::Debug for InstantiationModelAwarePointcutAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// 非单例切面的切点
///
/// 切面实例创建前，实例化模型或声明的切点匹配即可；创建后还要在调用时按声明的切点判断
pub struct PerTargetInstantiationModelPointcut {
    matcher: Arc<PerTargetMatcher>,
}

struct PerTargetMatcher {
    declared: AspectJExpressionPointcut,
    per_clause: Arc<dyn Pointcut>,
    aspect_factory: Arc<dyn AspectInstanceFactory>,
}

impl PerTargetMatcher {
    fn declared_matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.declared.could_match_class(class) && self.declared.matches_method(method, class)
    }

    fn per_clause_matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.per_clause.class_filter().matches(class) && self.per_clause.method_matcher().matches(method, class)
    }
}

impl MethodMatcher for PerTargetMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        (self.aspect_factory.is_materialized() && self.declared_matches(method, class))
            || self.per_clause_matches(method, class)
            || self.declared_matches(method, class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &MethodDef, class: ClassView<'_>, args: &[DynValue]) -> bool {
        if !self.aspect_factory.is_materialized() || !self.declared_matches(method, class) {
            return false;
        }
        let declared = self.declared.method_matcher();
        !declared.is_runtime() || declared.matches_runtime(method, class, args)
    }
}

impl PerTargetInstantiationModelPointcut {
    pub fn new(
        declared: AspectJExpressionPointcut,
        per_clause: Arc<dyn Pointcut>,
        aspect_factory: Arc<dyn AspectInstanceFactory>,
    ) -> Self {
        Self {
            matcher: Arc::new(PerTargetMatcher {
                declared,
                per_clause,
                aspect_factory,
            }),
        }
    }
}

impl Pointcut for PerTargetInstantiationModelPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.matcher) as Arc<dyn MethodMatcher>
    }
}

/// 合成通知：唯一的作用是触发切面实例化
struct InstantiateAspect(Arc<dyn AspectInstanceFactory>);

impl MethodBeforeAdvice for InstantiateAspect {
    fn before(&self, _join_point: &JoinPoint) -> anyhow::Result<()> {
        self.0.aspect_instance()?;
        Ok(())
    }
}

/// 基于注解的切面通知器工厂
pub struct ReflectiveAspectJAdvisorFactory {
    source: Arc<dyn ClassSource>,
    arg_types: Arc<ArgTypeRegistry>,
    instantiations: Arc<InstantiationRegistry>,
}

impl ReflectiveAspectJAdvisorFactory {
    pub fn new(source: Arc<dyn ClassSource>) -> Self {
        Self {
            source,
            arg_types: default_arg_types(),
            instantiations: Arc::new(InstantiationRegistry::new()),
        }
    }

    pub fn with_arg_types(mut self, arg_types: Arc<ArgTypeRegistry>) -> Self {
        self.arg_types = arg_types;
        self
    }

    /// 引入默认实现的实例化函数
    pub fn with_instantiations(mut self, instantiations: Arc<InstantiationRegistry>) -> Self {
        self.instantiations = instantiations;
        self
    }

    pub fn class_source(&self) -> &Arc<dyn ClassSource> {
        &self.source
    }

    pub fn is_aspect(&self, class_name: &str) -> bool {
        self.source
            .find_class(class_name)
            .is_some_and(|def| def.has_annotation(ASPECT))
    }

    /// 检查切面声明是否可用
    pub fn validate(&self, class_name: &str) -> AopResult<()> {
        AspectMetadata::new(class_name, class_name, &*self.source).map(|_| ())
    }

    /// 切面贡献的全部通知器
    ///
    /// 顺序：合成的实例化通知器（非单例切面）、按通知类型和方法名排序的通知、引入
    pub fn advisors(&self, aspect_factory: Arc<dyn AspectInstanceFactory>) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let metadata = aspect_factory.aspect_metadata().clone();
        let aspect_class = metadata.aspect_class_name().to_string();
        self.validate(&aspect_class)?;

        // 切面只实例化一次
        let lazy_factory: Arc<dyn AspectInstanceFactory> =
            Arc::new(LazySingletonAspectInstanceFactoryDecorator::new(aspect_factory));

        let mut advisors: Vec<Arc<dyn Advisor>> = Vec::new();
        for (order, method) in self.advisor_methods(&aspect_class)?.into_iter().enumerate() {
            if let Some(advisor) = self.advisor(&method, &lazy_factory, order)? {
                advisors.push(advisor);
            }
        }

        if !advisors.is_empty() && metadata.is_lazily_instantiated() {
            let instantiation = DefaultPointcutAdvisor::new(
                metadata.per_clause_pointcut(),
                Advice::before(InstantiateAspect(Arc::clone(&lazy_factory))),
            )
            .with_order(lazy_factory.order());
            advisors.insert(0, Arc::new(instantiation));
        }

        for field in &metadata.aspect_class().fields {
            if let Some(advisor) = self.declare_parents_advisor(metadata.aspect_class(), field, lazy_factory.order())? {
                advisors.push(advisor);
            }
        }

        tracing::debug!(
            "Aspect '{}' ({}) contributes {} advisor(s)",
            metadata.aspect_name(),
            aspect_class,
            advisors.len()
        );
        Ok(advisors)
    }

    /// 通知方法按 (通知类型, 方法名) 排序，与声明顺序无关
    fn advisor_methods(&self, aspect_class: &str) -> AopResult<Vec<MethodDef>> {
        let mut methods = Vec::new();
        for method in all_methods_in(&*self.source, aspect_class) {
            if method.is_bridge || method.is_static || method.has_annotation(POINTCUT) {
                continue;
            }
            let precedence = AspectJAnnotation::find(&method)?
                .map(|annotation| annotation.kind.precedence())
                .unwrap_or(u8::MAX);
            methods.push((precedence, method));
        }
        methods.sort_by(|(a, m1), (b, m2)| a.cmp(b).then_with(|| m1.name.cmp(&m2.name)));
        Ok(methods.into_iter().map(|(_, m)| m).collect())
    }

    /// 单个通知方法的通知器，不是通知方法时返回 `None`
    pub fn advisor(
        &self,
        method: &MethodDef,
        aspect_factory: &Arc<dyn AspectInstanceFactory>,
        declaration_order: usize,
    ) -> AopResult<Option<Arc<dyn Advisor>>> {
        let metadata = aspect_factory.aspect_metadata();
        let Some(annotation) = AspectJAnnotation::find(method)? else {
            return Ok(None);
        };
        let declared = self.declared_pointcut(&annotation, metadata.aspect_class_name())?;
        let Some(advice_method) = self.advice_method(method, annotation.kind, aspect_factory, declaration_order)? else {
            return Ok(None);
        };
        let advice = build_advice(Arc::clone(&advice_method));

        let lazy = metadata.is_lazily_instantiated();
        let pointcut: Arc<dyn Pointcut> = if lazy {
            Arc::new(PerTargetInstantiationModelPointcut::new(
                declared.clone(),
                metadata.per_clause_pointcut(),
                Arc::clone(aspect_factory),
            ))
        } else {
            Arc::new(declared.clone())
        };

        Ok(Some(Arc::new(InstantiationModelAwarePointcutAdvisor {
            declared_pointcut: declared,
            pointcut,
            advice,
            advice_method,
            aspect_factory: Arc::clone(aspect_factory),
            lazy,
        })))
    }

    /// 通知方法对应的通知
    pub fn advice(
        &self,
        method: &MethodDef,
        aspect_factory: &Arc<dyn AspectInstanceFactory>,
        declaration_order: usize,
    ) -> AopResult<Option<Advice>> {
        let Some(annotation) = AspectJAnnotation::find(method)? else {
            return Ok(None);
        };
        Ok(self
            .advice_method(method, annotation.kind, aspect_factory, declaration_order)?
            .map(build_advice))
    }

    fn advice_method(
        &self,
        method: &MethodDef,
        kind: AspectJAdviceKind,
        aspect_factory: &Arc<dyn AspectInstanceFactory>,
        declaration_order: usize,
    ) -> AopResult<Option<Arc<AspectJAdviceMethod>>> {
        let aspect_class = aspect_factory.aspect_metadata().aspect_class_name();
        let declaring_class = if method.declaring_class.is_empty() {
            aspect_class
        } else {
            method.declaring_class.as_str()
        };
        if !self.is_aspect(declaring_class) {
            return Err(AopError::NotAnAspect {
                class: declaring_class.to_string(),
                method: method.name.clone(),
            });
        }
        let advice_method = AspectJAdviceMethod::new(
            kind,
            method.clone(),
            Arc::clone(aspect_factory),
            declaration_order,
            Arc::clone(&self.arg_types),
        )?;
        Ok(Some(Arc::new(advice_method)))
    }

    fn declared_pointcut(&self, annotation: &AspectJAnnotation, aspect_class: &str) -> AopResult<AspectJExpressionPointcut> {
        if annotation.pointcut_expression.trim().is_empty() {
            return Err(AopError::PointcutParse {
                expression: String::new(),
                message: format!("{} advice on [{}] declares no pointcut", annotation.kind, aspect_class),
            });
        }
        AspectJExpressionPointcut::with_arg_types(
            &annotation.pointcut_expression,
            Some(aspect_class),
            &*self.source,
            Arc::clone(&self.arg_types),
        )
    }

    /// `@DeclareParents` 字段 -> 引入通知器
    fn declare_parents_advisor(
        &self,
        aspect: &ClassDef,
        field: &chimera_core::metadata::FieldDef,
        order: i32,
    ) -> AopResult<Option<Arc<dyn Advisor>>> {
        let Some(declaration) = field.annotations.iter().find(|a| a.type_name == DECLARE_PARENTS) else {
            return Ok(None);
        };
        let default_impl = declaration
            .attributes
            .get(attributes::DEFAULT_IMPL)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AopError::MissingDefaultImpl {
                aspect: aspect.name.clone(),
                field: field.name.clone(),
            })?;
        if !self.instantiations.contains(default_impl) {
            return Err(AopError::UnknownImplementation(default_impl.to_string()));
        }

        let type_pattern = declaration
            .attributes
            .get(attributes::VALUE)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let invalid_pattern = |pattern: &str| AopError::PointcutParse {
            expression: pattern.to_string(),
            message: format!("invalid type pattern on @DeclareParents field '{}'", field.name),
        };
        let targets = TypePattern::new(type_pattern).ok_or_else(|| invalid_pattern(type_pattern))?;
        let interface = field.type_name.clone();
        let implementors_pattern = format!("{}+", interface);
        let implementors = TypePattern::new(&implementors_pattern).ok_or_else(|| invalid_pattern(&implementors_pattern))?;

        // 已经实现该接口的类型不再引入
        let class_filter = IntersectionClassFilter(vec![
            Arc::new(TypePatternClassFilter::new(targets)),
            Arc::new(NegateClassFilter(Arc::new(TypePatternClassFilter::new(implementors)))),
        ]);
        let interceptor = DelegatePerTargetObjectIntroductionInterceptor::for_implementation(
            default_impl,
            vec![interface.clone()],
            Arc::clone(&self.instantiations),
        );
        let advisor = DefaultIntroductionAdvisor::new(Arc::new(interceptor))
            .with_class_filter(Arc::new(class_filter))
            .with_order(order);
        advisor.validate_interfaces(&*self.source)?;

        tracing::debug!(
            "Aspect [{}] introduces [{}] into '{}' with default implementation [{}]",
            aspect.name,
            interface,
            type_pattern,
            default_impl
        );
        Ok(Some(Arc::new(advisor)))
    }
}

impl fmt::Debug for ReflectiveAspectJAdvisorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectiveAspectJAdvisorFactory")
            .field("instantiations", &self.instantiations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspectj::annotations::{AFTER, AFTER_RETURNING, AFTER_THROWING, AROUND, BEFORE};
    use crate::aspectj::instance_factory::SingletonMetadataAwareAspectInstanceFactory;
    use crate::target::{MethodTable, Target};
    use chimera_core::metadata::FieldDef;
    use chimera_core::{Annotation, ClassRegistry};
    use pretty_assertions::assert_eq;

    fn advice(kind: &str, name: &str) -> MethodDef {
        MethodDef::new(name).annotated(Annotation::new(kind).value("execution(* app::*Service::*(..))"))
    }

    fn factory_for(registry: &Arc<ClassRegistry>, aspect: &str) -> Arc<dyn AspectInstanceFactory> {
        let metadata = AspectMetadata::new(aspect, "aspect", &**registry).unwrap();
        let instance = Arc::new(MethodTable::new(aspect));
        Arc::new(SingletonMetadataAwareAspectInstanceFactory::new(instance, metadata))
    }

    #[test]
    fn test_advisors_sorted_by_kind_then_name() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(
            ClassDef::new("app::ScrambledAspect")
                .annotated(Annotation::new(ASPECT))
                .method(advice(AFTER_THROWING, "a_on_error"))
                .method(advice(BEFORE, "z_before"))
                .method(MethodDef::new("helper"))
                .method(advice(AFTER_RETURNING, "b_returned"))
                .method(advice(AROUND, "m_around"))
                .method(advice(BEFORE, "a_before"))
                .method(advice(AFTER, "c_after"))
                .method(MethodDef::new("services").annotated(Annotation::new(POINTCUT).value("within(app::*)"))),
        );
        let factory = ReflectiveAspectJAdvisorFactory::new(registry.clone());
        let advisors = factory.advisors(factory_for(&registry, "app::ScrambledAspect")).unwrap();

        let names: Vec<String> = advisors
            .iter()
            .map(|a| {
                let description = a.description();
                let start = description.find("ScrambledAspect::").unwrap() + "ScrambledAspect::".len();
                let end = description[start..].find('(').unwrap() + start;
                description[start..end].to_string()
            })
            .collect();
        assert_eq!(
            names,
            vec!["m_around", "a_before", "z_before", "c_after", "b_returned", "a_on_error"]
        );
    }

    #[test]
    fn test_per_target_aspect_gets_instantiation_advisor() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(
            ClassDef::new("app::PerTargetAspect")
                .annotated(Annotation::new(ASPECT).value("pertarget(within(app::*Service))"))
                .method(advice(BEFORE, "audit")),
        );
        let factory = ReflectiveAspectJAdvisorFactory::new(registry.clone());
        let advisors = factory.advisors(factory_for(&registry, "app::PerTargetAspect")).unwrap();
        assert_eq!(advisors.len(), 2);
        assert!(advisors[0].description().starts_with("DefaultPointcutAdvisor"));
        assert!(advisors[1].pointcut().unwrap().method_matcher().is_runtime());
    }

    #[test]
    fn test_declare_parents() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::interface("app::UsageTracked"));
        registry.register(
            ClassDef::new("app::UsageAspect").annotated(Annotation::new(ASPECT)).field(
                FieldDef::new("mixin", "app::UsageTracked").annotated(
                    Annotation::new(DECLARE_PARENTS)
                        .value("app::*Service")
                        .with(attributes::DEFAULT_IMPL, "app::DefaultUsageTracked"),
                ),
            ),
        );
        registry.register(ClassDef::new("app::OrderService"));
        registry.register(ClassDef::new("app::TrackedService").implements("app::UsageTracked"));

        let instantiations = Arc::new(InstantiationRegistry::empty());
        instantiations.register("app::DefaultUsageTracked", || {
            Ok(Arc::new(MethodTable::new("app::DefaultUsageTracked")) as Arc<dyn Target>)
        });
        let factory = ReflectiveAspectJAdvisorFactory::new(registry.clone()).with_instantiations(instantiations);
        let advisors = factory.advisors(factory_for(&registry, "app::UsageAspect")).unwrap();
        assert_eq!(advisors.len(), 1);

        let introduction = advisors[0].introduction().unwrap();
        assert_eq!(introduction.interfaces(), vec!["app::UsageTracked".to_string()]);
        let filter = introduction.class_filter();
        let order_service = registry.get("app::OrderService").unwrap();
        let tracked = registry.get("app::TrackedService").unwrap();
        assert!(filter.matches(ClassView::new(&order_service, &*registry)));
        assert!(!filter.matches(ClassView::new(&tracked, &*registry)));
    }

    #[test]
    fn test_declare_parents_requires_default_impl() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::interface("app::UsageTracked"));
        registry.register(
            ClassDef::new("app::BrokenAspect").annotated(Annotation::new(ASPECT)).field(
                FieldDef::new("mixin", "app::UsageTracked")
                    .annotated(Annotation::new(DECLARE_PARENTS).value("app::*Service")),
            ),
        );
        let factory = ReflectiveAspectJAdvisorFactory::new(registry.clone());
        let err = factory.advisors(factory_for(&registry, "app::BrokenAspect")).unwrap_err();
        assert!(matches!(err, AopError::MissingDefaultImpl { field, .. } if field == "mixin"));
    }

    #[test]
    fn test_advice_outside_aspect_rejected() {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::new("app::RealAspect").annotated(Annotation::new(ASPECT)));
        registry.register(ClassDef::new("app::Plain").method(advice(BEFORE, "log")));
        let factory = ReflectiveAspectJAdvisorFactory::new(registry.clone());

        let method = registry.get("app::Plain").unwrap().methods[0].clone();
        let err = factory
            .advice(&method, &factory_for(&registry, "app::RealAspect"), 0)
            .unwrap_err();
        assert!(matches!(err, AopError::NotAnAspect { .. }));
    }
}

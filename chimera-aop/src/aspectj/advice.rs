//! 由切面方法实现的通知
//!
//! 通知方法的参数按类型或名称绑定：
//! - `JoinPoint`：当前连接点
//! - `ProceedingJoinPoint`：只允许环绕通知使用
//! - 与 `returning` 同名的参数：返回值（没有返回值时是 `()`）
//! - 与 `throwing` 同名的参数：`ErrorInfo`

use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::short_name;
use chimera_core::{Annotation, MethodDef};

use super::annotations::{
    attributes, AFTER, AFTER_RETURNING, AFTER_THROWING, AROUND, BEFORE, DECLARE_PARENTS, POINTCUT,
};
use super::expression::{is_erased_type, ArgTypeRegistry};
use super::instance_factory::AspectInstanceFactory;
use crate::advice::{Advice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor};
use crate::error::{AopError, AopResult};
use crate::error_info::ErrorInfo;
use crate::invocation::MethodInvocation;
use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
use crate::target::{as_target, DynValue, InvocationResult};

const AOP_ANNOTATION_PREFIX: &str = "chimera::aop::";

/// 通知类型，返回后和异常通知带有可选的绑定参数名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AspectJAdviceKind {
    Around,
    Before,
    After,
    AfterReturning { returning: Option<String> },
    AfterThrowing { throwing: Option<String> },
}

impl AspectJAdviceKind {
    /// 同一切面内的排序：around < before < after < after-returning < after-throwing
    pub fn precedence(&self) -> u8 {
        match self {
            AspectJAdviceKind::Around => 0,
            AspectJAdviceKind::Before => 1,
            AspectJAdviceKind::After => 2,
            AspectJAdviceKind::AfterReturning { .. } => 3,
            AspectJAdviceKind::AfterThrowing { .. } => 4,
        }
    }

    pub fn annotation_type(&self) -> &'static str {
        match self {
            AspectJAdviceKind::Around => AROUND,
            AspectJAdviceKind::Before => BEFORE,
            AspectJAdviceKind::After => AFTER,
            AspectJAdviceKind::AfterReturning { .. } => AFTER_RETURNING,
            AspectJAdviceKind::AfterThrowing { .. } => AFTER_THROWING,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AspectJAdviceKind::Around => "around",
            AspectJAdviceKind::Before => "before",
            AspectJAdviceKind::After => "after",
            AspectJAdviceKind::AfterReturning { .. } => "after-returning",
            AspectJAdviceKind::AfterThrowing { .. } => "after-throwing",
        }
    }

    /// 非通知注解返回 `None`
    pub fn from_annotation(annotation: &Annotation) -> Option<Self> {
        let attribute = |key: &str| {
            annotation
                .attributes
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        match annotation.type_name.as_str() {
            AROUND => Some(AspectJAdviceKind::Around),
            BEFORE => Some(AspectJAdviceKind::Before),
            AFTER => Some(AspectJAdviceKind::After),
            AFTER_RETURNING => Some(AspectJAdviceKind::AfterReturning {
                returning: attribute(attributes::RETURNING),
            }),
            AFTER_THROWING => Some(AspectJAdviceKind::AfterThrowing {
                throwing: attribute(attributes::THROWING),
            }),
            _ => None,
        }
    }

    fn returning(&self) -> Option<&str> {
        match self {
            AspectJAdviceKind::AfterReturning { returning } => returning.as_deref(),
            _ => None,
        }
    }

    fn throwing(&self) -> Option<&str> {
        match self {
            AspectJAdviceKind::AfterThrowing { throwing } => throwing.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for AspectJAdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 通知方法上的通知注解
#[derive(Debug, Clone)]
pub struct AspectJAnnotation {
    pub kind: AspectJAdviceKind,
    pub pointcut_expression: String,
    pub arg_names: Vec<String>,
}

impl AspectJAnnotation {
    /// 没有通知注解时返回 `Ok(None)`，无法识别的 AOP 注解是错误
    pub fn find(method: &MethodDef) -> AopResult<Option<Self>> {
        for annotation in &method.annotations {
            if let Some(kind) = AspectJAdviceKind::from_annotation(annotation) {
                let value = |key: &str| annotation.attributes.get(key).and_then(|v| v.as_str()).unwrap_or("");
                // pointcut 属性优先于 value
                let expression = match value(attributes::POINTCUT) {
                    "" => value(attributes::VALUE),
                    pointcut => pointcut,
                };
                let arg_names = annotation
                    .attributes
                    .get(attributes::ARG_NAMES)
                    .and_then(|v| v.as_str())
                    .map(|names| {
                        names
                            .split(',')
                            .map(str::trim)
                            .filter(|n| !n.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                return Ok(Some(Self {
                    kind,
                    pointcut_expression: expression.to_string(),
                    arg_names,
                }));
            }
            if is_unsupported_advice(annotation) {
                return Err(AopError::UnsupportedAdviceKind {
                    method: method.to_string(),
                    annotation: annotation.type_name.clone(),
                });
            }
        }
        Ok(None)
    }
}

/// 带有切点表达式但不是已知通知类型的 AOP 注解
fn is_unsupported_advice(annotation: &Annotation) -> bool {
    annotation.type_name.starts_with(AOP_ANNOTATION_PREFIX)
        && annotation.type_name != POINTCUT
        && annotation.type_name != DECLARE_PARENTS
        && (annotation.attributes.contains_key(attributes::VALUE)
            || annotation.attributes.contains_key(attributes::POINTCUT))
}

/// 通知方法参数的来源
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamBinding {
    JoinPoint,
    ProceedingJoinPoint,
    /// 声明类型不是擦除类型时，返回值类型不符则跳过通知
    Returning { type_filter: Option<String> },
    Throwing,
}

fn normalize_param_type(type_name: &str) -> &str {
    let trimmed = type_name.trim().trim_start_matches('&').trim();
    trimmed
        .strip_prefix("Arc<")
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(trimmed)
}

fn bind_parameters(method: &MethodDef, kind: &AspectJAdviceKind) -> AopResult<Vec<ParamBinding>> {
    let unbound = |parameter: &str| AopError::UnboundAdviceParameter {
        method: method.to_string(),
        parameter: parameter.to_string(),
    };
    let mut bindings = Vec::with_capacity(method.parameter_types.len());
    for (index, declared) in method.parameter_types.iter().enumerate() {
        let name = method
            .parameter_names
            .get(index)
            .map(String::as_str)
            .unwrap_or("");
        let type_name = normalize_param_type(declared);
        let binding = match short_name(type_name) {
            "JoinPoint" => ParamBinding::JoinPoint,
            "ProceedingJoinPoint" if *kind == AspectJAdviceKind::Around => ParamBinding::ProceedingJoinPoint,
            "ProceedingJoinPoint" => return Err(unbound(name)),
            _ if !name.is_empty() && kind.returning() == Some(name) => ParamBinding::Returning {
                type_filter: (!is_erased_type(type_name)).then(|| type_name.to_string()),
            },
            _ if !name.is_empty() && kind.throwing() == Some(name) => ParamBinding::Throwing,
            _ => return Err(unbound(if name.is_empty() { declared.as_str() } else { name })),
        };
        bindings.push(binding);
    }
    Ok(bindings)
}

/// 通知方法及其调用方式
///
/// 切面实例通过工厂获取，所以通知创建时不需要切面实例
pub struct AspectJAdviceMethod {
    kind: AspectJAdviceKind,
    method: MethodDef,
    aspect_factory: Arc<dyn AspectInstanceFactory>,
    aspect_name: String,
    declaration_order: usize,
    bindings: Vec<ParamBinding>,
    arg_types: Arc<ArgTypeRegistry>,
}

impl AspectJAdviceMethod {
    pub fn new(
        kind: AspectJAdviceKind,
        method: MethodDef,
        aspect_factory: Arc<dyn AspectInstanceFactory>,
        declaration_order: usize,
        arg_types: Arc<ArgTypeRegistry>,
    ) -> AopResult<Self> {
        let bindings = bind_parameters(&method, &kind)?;
        let aspect_name = aspect_factory.aspect_metadata().aspect_name().to_string();
        Ok(Self {
            kind,
            method,
            aspect_factory,
            aspect_name,
            declaration_order,
            bindings,
            arg_types,
        })
    }

    pub fn kind(&self) -> &AspectJAdviceKind {
        &self.kind
    }

    pub fn method(&self) -> &MethodDef {
        &self.method
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    pub fn declaration_order(&self) -> usize {
        self.declaration_order
    }

    pub fn aspect_instance_factory(&self) -> &Arc<dyn AspectInstanceFactory> {
        &self.aspect_factory
    }

    /// 返回值类型与绑定参数的声明类型不符时不执行返回后通知
    fn accepts_return_value(&self, value: &DynValue) -> bool {
        self.bindings.iter().all(|binding| match binding {
            ParamBinding::Returning {
                type_filter: Some(type_name),
            } => self.arg_types.check(type_name, value).unwrap_or(true),
            _ => true,
        })
    }

    fn invoke_advice_method(
        &self,
        join_point: &JoinPoint,
        proceeding: Option<Arc<ProceedingJoinPoint>>,
        return_value: Option<&DynValue>,
        error: Option<&anyhow::Error>,
    ) -> InvocationResult {
        let mut args: Vec<DynValue> = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let value: DynValue = match binding {
                ParamBinding::JoinPoint => Arc::new(join_point.clone()),
                ParamBinding::ProceedingJoinPoint => match &proceeding {
                    Some(pjp) => Arc::clone(pjp) as DynValue,
                    None => {
                        return Err(AopError::IllegalState(format!(
                            "No ProceedingJoinPoint available for advice method {}",
                            self.method
                        ))
                        .into())
                    }
                },
                ParamBinding::Returning { .. } => match return_value {
                    Some(value) => Arc::clone(value),
                    None => Arc::new(()),
                },
                ParamBinding::Throwing => match error {
                    Some(error) => Arc::new(ErrorInfo::from_anyhow(error)),
                    None => Arc::new(ErrorInfo::simple("")),
                },
            };
            args.push(value);
        }

        let aspect = self.aspect_factory.aspect_instance()?;
        let target = as_target(&aspect).ok_or_else(|| {
            AopError::IllegalState(format!(
                "Aspect bean '{}' does not expose its advice methods",
                self.aspect_name
            ))
        })?;
        tracing::trace!("Invoking {} advice {} for {}", self.kind, self.method, join_point);
        target.invoke(&self.method, &args)
    }
}

impl fmt::Debug for AspectJAdviceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectJAdviceMethod")
            .field("kind", &self.kind)
            .field("method", &self.method.to_string())
            .field("aspect_name", &self.aspect_name)
            .field("declaration_order", &self.declaration_order)
            .finish()
    }
}

pub struct AspectJAroundAdvice(Arc<AspectJAdviceMethod>);

impl MethodInterceptor for AspectJAroundAdvice {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let proceeding = Arc::new(ProceedingJoinPoint::new(invocation));
        let join_point = proceeding.join_point().clone();
        self.0.invoke_advice_method(&join_point, Some(proceeding), None, None)
    }
}

pub struct AspectJMethodBeforeAdvice(Arc<AspectJAdviceMethod>);

impl MethodBeforeAdvice for AspectJMethodBeforeAdvice {
    fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()> {
        self.0.invoke_advice_method(join_point, None, None, None)?;
        Ok(())
    }
}

/// 无论正常返回还是出错都执行；通知自身出错时以通知的错误为准
pub struct AspectJAfterAdvice(Arc<AspectJAdviceMethod>);

impl MethodInterceptor for AspectJAfterAdvice {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let join_point = invocation.join_point();
        let result = invocation.proceed();
        self.0.invoke_advice_method(&join_point, None, None, None)?;
        result
    }
}

pub struct AspectJAfterReturningAdvice(Arc<AspectJAdviceMethod>);

impl AfterReturningAdvice for AspectJAfterReturningAdvice {
    fn after_returning(&self, return_value: Option<&DynValue>, join_point: &JoinPoint) -> anyhow::Result<()> {
        let unit: DynValue = Arc::new(());
        if !self.0.accepts_return_value(return_value.unwrap_or(&unit)) {
            return Ok(());
        }
        self.0.invoke_advice_method(join_point, None, return_value, None)?;
        Ok(())
    }
}

/// 目标出错后执行，错误原样返回给调用方
pub struct AspectJAfterThrowingAdvice(Arc<AspectJAdviceMethod>);

impl MethodInterceptor for AspectJAfterThrowingAdvice {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let join_point = invocation.join_point();
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                self.0.invoke_advice_method(&join_point, None, None, Some(&error))?;
                Err(error)
            }
        }
    }
}

/// 按通知类型构造通知
pub fn build_advice(advice_method: Arc<AspectJAdviceMethod>) -> Advice {
    match advice_method.kind() {
        AspectJAdviceKind::Around => Advice::Interceptor(Arc::new(AspectJAroundAdvice(advice_method))),
        AspectJAdviceKind::Before => Advice::Before(Arc::new(AspectJMethodBeforeAdvice(advice_method))),
        AspectJAdviceKind::After => Advice::Interceptor(Arc::new(AspectJAfterAdvice(advice_method))),
        AspectJAdviceKind::AfterReturning { .. } => {
            Advice::AfterReturning(Arc::new(AspectJAfterReturningAdvice(advice_method)))
        }
        AspectJAdviceKind::AfterThrowing { .. } => {
            Advice::Interceptor(Arc::new(AspectJAfterThrowingAdvice(advice_method)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_annotation_prefers_pointcut_attribute() {
        let method = MethodDef::new("log").annotated(
            Annotation::new(AFTER_RETURNING)
                .value("execution(* *(..))")
                .with(attributes::POINTCUT, "within(app::*)")
                .with(attributes::RETURNING, "result"),
        );
        let found = AspectJAnnotation::find(&method).unwrap().unwrap();
        assert_eq!(found.pointcut_expression, "within(app::*)");
        assert_eq!(
            found.kind,
            AspectJAdviceKind::AfterReturning {
                returning: Some("result".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_aop_annotation_rejected() {
        let method = MethodDef::new("log").annotated(Annotation::new("chimera::aop::AfterFinally").value("x()"));
        assert!(matches!(
            AspectJAnnotation::find(&method),
            Err(AopError::UnsupportedAdviceKind { .. })
        ));
        assert!(AspectJAnnotation::find(&MethodDef::new("plain")).unwrap().is_none());
    }

    #[test]
    fn test_parameter_binding() {
        let around = MethodDef::new("time").param("pjp", "ProceedingJoinPoint");
        assert_eq!(
            bind_parameters(&around, &AspectJAdviceKind::Around).unwrap(),
            vec![ParamBinding::ProceedingJoinPoint]
        );
        assert!(matches!(
            bind_parameters(&around, &AspectJAdviceKind::Before),
            Err(AopError::UnboundAdviceParameter { .. })
        ));

        let returning = MethodDef::new("log")
            .param("jp", "&JoinPoint")
            .param("result", "String");
        let kind = AspectJAdviceKind::AfterReturning {
            returning: Some("result".to_string()),
        };
        assert_eq!(
            bind_parameters(&returning, &kind).unwrap(),
            vec![
                ParamBinding::JoinPoint,
                ParamBinding::Returning {
                    type_filter: Some("String".to_string())
                }
            ]
        );

        let stray = MethodDef::new("log").param("other", "i32");
        assert!(bind_parameters(&stray, &AspectJAdviceKind::After).is_err());
    }

    #[test]
    fn test_precedence_order() {
        let mut kinds = vec![
            AspectJAdviceKind::AfterThrowing { throwing: None },
            AspectJAdviceKind::Before,
            AspectJAdviceKind::AfterReturning { returning: None },
            AspectJAdviceKind::Around,
            AspectJAdviceKind::After,
        ];
        kinds.sort_by_key(|k| k.precedence());
        let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["around", "before", "after", "after-returning", "after-throwing"]);
    }
}

//! 基于注解的切面
//!
//! 切面是带有 `@Aspect` 的类型，通知方法带有 `@Around`、`@Before` 等注解，
//! 注解的 value 是切点表达式。切面类型的描述来自 `ClassSource`，
//! 通知方法的方法体由切面 Bean 的 `Target` 调用面提供。

pub mod advice;
pub mod advisor_factory;
pub mod annotations;
pub mod expression;
pub mod instance_factory;
pub mod metadata;

pub use advice::{build_advice, AspectJAdviceKind, AspectJAdviceMethod, AspectJAnnotation};
pub use advisor_factory::{
    InstantiationModelAwarePointcutAdvisor, PerTargetInstantiationModelPointcut, ReflectiveAspectJAdvisorFactory,
};
pub use expression::{
    default_arg_types, ArgTypeRegistration, ArgTypeRegistry, AspectJExpressionPointcut, FuzzyMatch,
    ProxyCreationContext,
};
pub use instance_factory::{
    AspectInstanceFactory, BeanFactoryAspectInstanceFactory, LazySingletonAspectInstanceFactoryDecorator,
    SingletonMetadataAwareAspectInstanceFactory,
};
pub use metadata::{AspectMetadata, PerClauseKind};

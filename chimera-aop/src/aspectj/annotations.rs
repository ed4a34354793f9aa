//! 切面相关的注解类型
//!
//! 这些类型通过 `ClassRegistration` 在链接期注册，运行时注册表和离线读取器都能看到它们。

use chimera_core::constants::IMPORT;
use chimera_core::{Annotation, ClassDef, ClassRegistration, MethodDef};

use crate::proxy::{ADVISED, FRAMEWORK_PROXY};

/// 切面；`value` 为实例化模型（空表示单例），例如 `perthis(execution(* app::*Service::*(..)))`
pub const ASPECT: &str = "chimera::aop::Aspect";

/// 命名切点，方法名即切点名
pub const POINTCUT: &str = "chimera::aop::Pointcut";

pub const AROUND: &str = "chimera::aop::Around";
pub const BEFORE: &str = "chimera::aop::Before";
pub const AFTER: &str = "chimera::aop::After";
pub const AFTER_RETURNING: &str = "chimera::aop::AfterReturning";
pub const AFTER_THROWING: &str = "chimera::aop::AfterThrowing";

/// 在字段上声明引入：`value` 为目标类型模式，`defaultImpl` 为默认实现，字段类型为引入的接口
pub const DECLARE_PARENTS: &str = "chimera::aop::DeclareParents";

/// 启用基于注解的自动代理
pub const ENABLE_ASPECTJ_AUTO_PROXY: &str = "chimera::aop::EnableAspectJAutoProxy";

/// `@EnableAspectJAutoProxy` 导入的注册器
pub const ASPECTJ_AUTO_PROXY_REGISTRAR: &str = "chimera::aop::AspectJAutoProxyRegistrar";

/// 通知方法可以声明的连接点参数类型
pub const JOIN_POINT: &str = "chimera::aop::JoinPoint";
pub const PROCEEDING_JOIN_POINT: &str = "chimera::aop::ProceedingJoinPoint";

/// 异常通知绑定的错误类型
pub const ERROR_INFO: &str = "chimera::aop::ErrorInfo";

/// 通知注解的属性
pub mod attributes {
    pub const VALUE: &str = "value";
    pub const POINTCUT: &str = "pointcut";
    pub const RETURNING: &str = "returning";
    pub const THROWING: &str = "throwing";
    pub const ARG_NAMES: &str = "argNames";
    pub const DEFAULT_IMPL: &str = "defaultImpl";
    pub const PROXY_TARGET_CLASS: &str = "proxyTargetClass";
    pub const EXPOSE_PROXY: &str = "exposeProxy";
}

fn enable_aspectj_auto_proxy() -> ClassDef {
    ClassDef::annotation_type(ENABLE_ASPECTJ_AUTO_PROXY)
        .annotated(Annotation::new(IMPORT).value(vec![ASPECTJ_AUTO_PROXY_REGISTRAR]))
}

fn framework_proxy() -> ClassDef {
    ClassDef::interface(FRAMEWORK_PROXY)
}

fn advised() -> ClassDef {
    ClassDef::interface(ADVISED)
        .method(MethodDef::new("is_frozen").returns("bool"))
        .method(MethodDef::new("is_proxy_target_class").returns("bool"))
}

fn aspect() -> ClassDef {
    ClassDef::annotation_type(ASPECT)
}

fn pointcut() -> ClassDef {
    ClassDef::annotation_type(POINTCUT)
}

fn around() -> ClassDef {
    ClassDef::annotation_type(AROUND)
}

fn before() -> ClassDef {
    ClassDef::annotation_type(BEFORE)
}

fn after() -> ClassDef {
    ClassDef::annotation_type(AFTER)
}

fn after_returning() -> ClassDef {
    ClassDef::annotation_type(AFTER_RETURNING)
}

fn after_throwing() -> ClassDef {
    ClassDef::annotation_type(AFTER_THROWING)
}

fn declare_parents() -> ClassDef {
    ClassDef::annotation_type(DECLARE_PARENTS)
}

inventory::submit! { ClassRegistration { describe: aspect } }
inventory::submit! { ClassRegistration { describe: pointcut } }
inventory::submit! { ClassRegistration { describe: around } }
inventory::submit! { ClassRegistration { describe: before } }
inventory::submit! { ClassRegistration { describe: after } }
inventory::submit! { ClassRegistration { describe: after_returning } }
inventory::submit! { ClassRegistration { describe: after_throwing } }
inventory::submit! { ClassRegistration { describe: declare_parents } }
inventory::submit! { ClassRegistration { describe: enable_aspectj_auto_proxy } }
inventory::submit! { ClassRegistration { describe: framework_proxy } }
inventory::submit! { ClassRegistration { describe: advised } }

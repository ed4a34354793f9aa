//! 内置注解类型
//!
//! 注解之间的元注解关系（例如 `@Service` 带有 `@Component`）在这里声明，
//! 运行时注册表和离线读取器都会预先加载这些类型。

use crate::constants::*;

use super::class_def::{Annotation, ClassDef};

/// 通过 inventory 在链接期收集的类型描述
///
/// 其他 crate（例如 AOP 模块）用它声明自己的注解类型：
///
/// ```rust,ignore
/// fn aspect_annotation() -> ClassDef {
///     ClassDef::annotation_type("chimera::aop::Aspect").annotated(Annotation::new(COMPONENT))
/// }
///
/// inventory::submit! {
///     ClassRegistration { describe: aspect_annotation }
/// }
/// ```
pub struct ClassRegistration {
    pub describe: fn() -> ClassDef,
}

inventory::collect!(ClassRegistration);

fn stereotype(name: &str) -> ClassDef {
    ClassDef::annotation_type(name).annotated(Annotation::new(COMPONENT))
}

fn conditional(name: &str, condition: &str) -> ClassDef {
    ClassDef::annotation_type(name)
        .annotated(Annotation::new(CONDITIONAL).value(vec![condition]))
}

/// 核心注解类型
pub fn builtin_annotation_types() -> Vec<ClassDef> {
    let mut defs = vec![
        ClassDef::annotation_type(COMPONENT),
        stereotype(SERVICE),
        stereotype(REPOSITORY),
        stereotype(CONTROLLER),
        stereotype(CONFIGURATION),
        conditional(PROFILE, PROFILE_CONDITION),
        conditional(CONDITIONAL_ON_EXPRESSION, EXPRESSION_CONDITION),
    ];
    defs.extend(
        [
            BEAN,
            IMPORT,
            IMPORT_RESOURCE,
            PROPERTY_SOURCE,
            COMPONENT_SCAN,
            COMPONENT_SCAN_FILTER,
            SCOPE,
            LAZY,
            PRIMARY,
            DEPENDS_ON,
            ROLE,
            DESCRIPTION,
            ORDER,
            CONDITIONAL,
        ]
        .into_iter()
        .map(ClassDef::annotation_type),
    );
    defs
}

/// 内置类型 + 链接期注册的类型
pub fn well_known_classes() -> Vec<ClassDef> {
    let mut defs = builtin_annotation_types();
    for registration in inventory::iter::<ClassRegistration> {
        defs.push((registration.describe)());
    }
    defs
}

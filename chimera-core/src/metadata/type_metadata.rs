//! 类型元数据的只读视图
//!
//! 两种实现：
//! - `StandardAnnotationMetadata` 来自运行时的 `ClassRegistry`（相当于反射）
//! - `SimpleAnnotationMetadata` 来自离线描述文档，不需要注册类型
//!
//! 两者对同一个 `ClassDef` 的所有查询结果一致，唯一的区别是
//! 只有前者会通过 `introspected_class` 报告被内省的类型。

use std::fmt;
use std::sync::Arc;

use super::annotations::{AnnotationAttributes, ClassSource, MergedAnnotations};
use super::class_def::{ClassDef, MethodDef};

/// 可被注解的元素（类型或方法）
pub trait AnnotatedTypeMetadata {
    fn merged_annotations(&self) -> &MergedAnnotations;

    /// 直接注解或元注解
    fn is_annotated(&self, annotation_type: &str) -> bool {
        self.merged_annotations().is_present(annotation_type)
    }

    /// 最近的注解属性
    fn annotation_attributes(&self, annotation_type: &str) -> Option<AnnotationAttributes> {
        self.merged_annotations()
            .get(annotation_type)
            .map(|m| m.attributes())
    }

    /// 所有同类型注解的属性（可重复注解）
    fn all_annotation_attributes(&self, annotation_type: &str) -> Vec<AnnotationAttributes> {
        self.merged_annotations()
            .get_all(annotation_type)
            .into_iter()
            .map(|m| m.attributes())
            .collect()
    }
}

/// 类型的结构信息
pub trait ClassMetadata {
    fn class_name(&self) -> &str;
    fn is_interface(&self) -> bool;
    fn is_annotation(&self) -> bool;
    fn is_abstract(&self) -> bool;
    fn is_final(&self) -> bool;
    fn is_independent(&self) -> bool;
    fn enclosing_class_name(&self) -> Option<&str>;
    fn super_class_name(&self) -> Option<&str>;
    fn interface_names(&self) -> &[String];
    fn member_class_names(&self) -> &[String];

    fn is_concrete(&self) -> bool {
        !(self.is_interface() || self.is_abstract())
    }

    fn has_super_class(&self) -> bool {
        self.super_class_name().is_some()
    }
}

/// 类型的注解 + 结构信息
pub trait AnnotationMetadata:
    ClassMetadata + AnnotatedTypeMetadata + Send + Sync + fmt::Debug
{
    fn class_def(&self) -> &Arc<ClassDef>;

    /// 直接声明的注解类型
    fn annotation_types(&self) -> Vec<String> {
        self.merged_annotations()
            .direct()
            .map(|m| m.type_name().to_string())
            .collect()
    }

    /// 直接声明了给定注解
    fn has_annotation(&self, annotation_type: &str) -> bool {
        self.merged_annotations().is_directly_present(annotation_type)
    }

    /// 通过其他注解间接声明了给定注解
    fn has_meta_annotation(&self, annotation_type: &str) -> bool {
        self.merged_annotations().is_meta_present(annotation_type)
    }

    fn has_annotated_methods(&self, annotation_type: &str) -> bool {
        !self.annotated_methods(annotation_type).is_empty()
    }

    /// 带给定注解（直接或元注解）的方法，不包含桥接方法
    fn annotated_methods(&self, annotation_type: &str) -> Vec<MethodMetadata> {
        self.declared_methods()
            .into_iter()
            .filter(|m| m.is_annotated(annotation_type))
            .collect()
    }

    /// 用户声明的方法，不包含桥接与合成方法
    fn declared_methods(&self) -> Vec<MethodMetadata>;

    /// 运行时内省的类型（离线视图返回 None）
    fn introspected_class(&self) -> Option<Arc<ClassDef>> {
        None
    }
}

/// 方法元数据
#[derive(Clone)]
pub struct MethodMetadata {
    method: Arc<MethodDef>,
    annotations: MergedAnnotations,
}

impl MethodMetadata {
    pub fn new(method: MethodDef, source: &dyn ClassSource) -> Self {
        let annotations = MergedAnnotations::from_annotations(&method.annotations, source);
        Self {
            method: Arc::new(method),
            annotations,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    pub fn declaring_class_name(&self) -> &str {
        &self.method.declaring_class
    }

    pub fn return_type_name(&self) -> &str {
        &self.method.return_type
    }

    pub fn is_abstract(&self) -> bool {
        self.method.is_abstract
    }

    pub fn is_static(&self) -> bool {
        self.method.is_static
    }

    pub fn is_final(&self) -> bool {
        self.method.is_final
    }

    pub fn is_private(&self) -> bool {
        self.method.is_private
    }

    pub fn is_overridable(&self) -> bool {
        self.method.is_overridable()
    }

    pub fn method_def(&self) -> &Arc<MethodDef> {
        &self.method
    }
}

impl AnnotatedTypeMetadata for MethodMetadata {
    fn merged_annotations(&self) -> &MergedAnnotations {
        &self.annotations
    }
}

impl PartialEq for MethodMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
    }
}

impl fmt::Debug for MethodMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMetadata")
            .field("method", &self.method.to_string())
            .finish()
    }
}

fn user_declared_methods(def: &ClassDef, source: &dyn ClassSource) -> Vec<MethodMetadata> {
    def.methods
        .iter()
        .filter(|m| !m.is_bridge && !m.is_synthetic)
        .map(|m| MethodMetadata::new(m.clone(), source))
        .collect()
}

macro_rules! class_def_metadata {
    ($name:ident, introspected = $introspected:expr) => {
        impl $name {
            pub fn new(def: Arc<ClassDef>, source: Arc<dyn ClassSource>) -> Self {
                let annotations = MergedAnnotations::from_annotations(&def.annotations, &*source);
                Self {
                    def,
                    annotations,
                    source,
                }
            }
        }

        impl ClassMetadata for $name {
            fn class_name(&self) -> &str {
                &self.def.name
            }

            fn is_interface(&self) -> bool {
                self.def.is_interface()
            }

            fn is_annotation(&self) -> bool {
                self.def.is_annotation()
            }

            fn is_abstract(&self) -> bool {
                self.def.is_abstract
            }

            fn is_final(&self) -> bool {
                self.def.is_final
            }

            fn is_independent(&self) -> bool {
                self.def.is_independent()
            }

            fn enclosing_class_name(&self) -> Option<&str> {
                self.def.enclosing_class.as_deref()
            }

            fn super_class_name(&self) -> Option<&str> {
                self.def.superclass.as_deref()
            }

            fn interface_names(&self) -> &[String] {
                &self.def.interfaces
            }

            fn member_class_names(&self) -> &[String] {
                &self.def.member_classes
            }
        }

        impl AnnotatedTypeMetadata for $name {
            fn merged_annotations(&self) -> &MergedAnnotations {
                &self.annotations
            }
        }

        impl AnnotationMetadata for $name {
            fn class_def(&self) -> &Arc<ClassDef> {
                &self.def
            }

            fn declared_methods(&self) -> Vec<MethodMetadata> {
                user_declared_methods(&self.def, &*self.source)
            }

            fn introspected_class(&self) -> Option<Arc<ClassDef>> {
                if $introspected {
                    Some(Arc::clone(&self.def))
                } else {
                    None
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("class", &self.def.name)
                    .finish()
            }
        }
    };
}

/// 运行时注册类型的元数据
pub struct StandardAnnotationMetadata {
    def: Arc<ClassDef>,
    annotations: MergedAnnotations,
    source: Arc<dyn ClassSource>,
}

class_def_metadata!(StandardAnnotationMetadata, introspected = true);

/// 离线描述文档中类型的元数据
pub struct SimpleAnnotationMetadata {
    def: Arc<ClassDef>,
    annotations: MergedAnnotations,
    source: Arc<dyn ClassSource>,
}

class_def_metadata!(SimpleAnnotationMetadata, introspected = false);

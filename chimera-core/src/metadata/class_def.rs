//! 类型描述模型
//!
//! `ClassDef` / `MethodDef` / `FieldDef` 是元数据抽象的原始数据，
//! 既可以在运行时注册到 `ClassRegistry`，也可以写在 TOML/JSON 描述文档中离线读取。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 注解属性值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    String(String),
    Array(Vec<AttributeValue>),
    Annotation(Box<Annotation>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 单个字符串视为只有一个元素的数组
    pub fn as_string_array(&self) -> Vec<String> {
        match self {
            AttributeValue::String(s) => vec![s.clone()],
            AttributeValue::Array(values) => values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 单个注解视为只有一个元素的数组
    pub fn as_annotations(&self) -> Vec<Annotation> {
        match self {
            AttributeValue::Annotation(a) => vec![(**a).clone()],
            AttributeValue::Array(values) => values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Annotation(a) => Some((**a).clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<Annotation> for AttributeValue {
    fn from(value: Annotation) -> Self {
        AttributeValue::Annotation(Box::new(value))
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// 注解实例：注解类型 + 属性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Annotation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 设置 `value` 属性
    pub fn value(self, value: impl Into<AttributeValue>) -> Self {
        self.with("value", value)
    }
}

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Annotation,
}

/// 方法描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub declaring_class: String,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub parameter_names: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default, rename = "private")]
    pub is_private: bool,
    #[serde(default, rename = "bridge")]
    pub is_bridge: bool,
    #[serde(default, rename = "synthetic")]
    pub is_synthetic: bool,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

fn default_return_type() -> String {
    "()".to_string()
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: String::new(),
            return_type: default_return_type(),
            parameter_types: Vec::new(),
            parameter_names: Vec::new(),
            is_abstract: false,
            is_final: false,
            is_static: false,
            is_private: false,
            is_bridge: false,
            is_synthetic: false,
            annotations: Vec::new(),
        }
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// 添加参数（类型 + 名称）
    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.parameter_names.push(name.into());
        self.parameter_types.push(type_name.into());
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    pub fn bridge(mut self) -> Self {
        self.is_bridge = true;
        self.is_synthetic = true;
        self
    }

    pub fn declared_by(mut self, class_name: impl Into<String>) -> Self {
        self.declaring_class = class_name.into();
        self
    }

    /// 可被子类代理覆盖
    pub fn is_overridable(&self) -> bool {
        !self.is_static && !self.is_final && !self.is_private
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        self.annotations.iter().any(|a| a.type_name == type_name)
    }

    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring_class: self.declaring_class.clone(),
            name: self.name.clone(),
            parameter_types: self.parameter_types.clone(),
        }
    }

    /// 签名相同（名称 + 参数类型），不考虑声明类
    pub fn same_signature(&self, other: &MethodDef) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_class,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// 方法的值语义键：声明类 + 名称 + 参数类型
///
/// 方法缓存统一使用这个键，而不是方法描述对象本身的身份
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub declaring_class: String,
    pub name: String,
    pub parameter_types: Vec<String>,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_class,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// 字段描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_static: false,
            annotations: Vec::new(),
        }
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// 类型描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    /// 静态成员类（不依赖外部类实例）
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub member_classes: Vec<String>,
    #[serde(default)]
    pub enclosing_class: Option<String>,
    /// 由接口代理策略生成的代理类
    #[serde(default)]
    pub dynamic_proxy: bool,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Class,
            is_abstract: false,
            is_final: false,
            is_static: false,
            superclass: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            member_classes: Vec::new(),
            enclosing_class: None,
            dynamic_proxy: false,
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut def = Self::new(name);
        def.kind = ClassKind::Interface;
        def.is_abstract = true;
        def
    }

    pub fn annotation_type(name: impl Into<String>) -> Self {
        let mut def = Self::interface(name);
        def.kind = ClassKind::Annotation;
        def
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self.normalize();
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn member(mut self, class_name: impl Into<String>) -> Self {
        self.member_classes.push(class_name.into());
        self
    }

    pub fn enclosed_by(mut self, class_name: impl Into<String>) -> Self {
        self.enclosing_class = Some(class_name.into());
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// 补全方法的声明类
    pub fn normalize(&mut self) {
        for method in &mut self.methods {
            if method.declaring_class.is_empty() {
                method.declaring_class = self.name.clone();
            }
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface | ClassKind::Annotation)
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == ClassKind::Annotation
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_interface() && !self.is_abstract
    }

    /// 顶层类或静态成员类
    pub fn is_independent(&self) -> bool {
        self.enclosing_class.is_none() || self.is_static
    }

    /// 类型的短名称（最后一个路径段）
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// 包路径（去掉最后一个路径段）
    pub fn package_name(&self) -> &str {
        package_name(&self.name)
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        self.annotations.iter().any(|a| a.type_name == type_name)
    }
}

/// 类型名称的最后一个路径段
pub fn short_name(class_name: &str) -> &str {
    class_name.rsplit("::").next().unwrap_or(class_name)
}

/// 类型名称去掉最后一个路径段
pub fn package_name(class_name: &str) -> &str {
    match class_name.rfind("::") {
        Some(idx) => &class_name[..idx],
        None => "",
    }
}

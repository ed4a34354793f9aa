use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::annotations::ClassSource;
use super::builtin::well_known_classes;
use super::class_def::{ClassDef, MethodDef};
use super::type_metadata::StandardAnnotationMetadata;

/// 运行时类型注册表
///
/// 相当于运行时反射：注册进来的类型即视为“已加载”。
/// 默认包含内置注解类型以及通过 inventory 提交的 `ClassRegistration`。
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<ClassDef>>>,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes_count", &self.classes.read().len())
            .finish()
    }
}

impl ClassRegistry {
    /// 包含内置类型的注册表
    pub fn new() -> Self {
        let registry = Self::empty();
        for def in well_known_classes() {
            registry.register(def);
        }
        registry
    }

    /// 完全空的注册表
    pub fn empty() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// 注册（或替换）一个类型
    pub fn register(&self, mut def: ClassDef) -> Arc<ClassDef> {
        def.normalize();
        let def = Arc::new(def);
        tracing::trace!("Registering class '{}'", def.name);
        self.classes
            .write()
            .insert(def.name.clone(), Arc::clone(&def));
        def
    }

    pub fn register_all(&self, defs: impl IntoIterator<Item = ClassDef>) {
        for def in defs {
            self.register(def);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// 所有类型名称（排序）
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 给定包（含子包）中的类型名称（排序）
    pub fn class_names_in_package(&self, package: &str) -> Vec<String> {
        let prefix = format!("{}::", package);
        let mut names: Vec<String> = self
            .classes
            .read()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// 运行时视图的注解元数据
    pub fn annotation_metadata(
        self: &Arc<Self>,
        name: &str,
    ) -> Option<Arc<StandardAnnotationMetadata>> {
        let def = self.get(name)?;
        let source: Arc<dyn ClassSource> = Arc::clone(self) as Arc<dyn ClassSource>;
        Some(Arc::new(StandardAnnotationMetadata::new(def, source)))
    }

    /// `sub` 是否可以赋值给 `sup`（相同类型、父类链或实现的接口）
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        is_assignable_in(self, sub, sup)
    }

    /// 父类链（不含自身）
    pub fn superclass_chain(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.get(name).and_then(|d| d.superclass.clone());
        while let Some(superclass) = current {
            if chain.contains(&superclass) {
                break;
            }
            current = self.get(&superclass).and_then(|d| d.superclass.clone());
            chain.push(superclass);
        }
        chain
    }

    /// 类型实现的所有接口（含父类实现的接口与接口的父接口），按发现顺序
    pub fn all_interfaces(&self, name: &str) -> Vec<String> {
        all_interfaces_in(self, name)
    }

    /// 类型上可调用的所有方法：自身方法优先，然后是父类，最后是接口方法
    ///
    /// 签名相同的方法只保留最具体的一个
    pub fn all_methods(&self, name: &str) -> Vec<MethodDef> {
        all_methods_in(self, name)
    }

    /// 查找最具体的同签名方法
    pub fn find_method(&self, class_name: &str, method: &MethodDef) -> Option<MethodDef> {
        self.all_methods(class_name)
            .into_iter()
            .find(|m| m.same_signature(method))
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassSource for ClassRegistry {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.get(name)
    }
}

/// 任意 `ClassSource` 上的可赋值性判断
pub fn is_assignable_in(source: &dyn ClassSource, sub: &str, sup: &str) -> bool {
    if sub == sup {
        return true;
    }
    let mut visited = HashSet::new();
    let mut pending = vec![sub.to_string()];
    while let Some(current) = pending.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let Some(def) = source.find_class(&current) else {
            continue;
        };
        if def.superclass.as_deref() == Some(sup) || def.interfaces.iter().any(|i| i == sup) {
            return true;
        }
        pending.extend(def.superclass.iter().cloned());
        pending.extend(def.interfaces.iter().cloned());
    }
    false
}

pub fn all_interfaces_in(source: &dyn ClassSource, name: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    let mut current = Some(name.to_string());
    let mut visited_classes = HashSet::new();
    while let Some(class_name) = current.take() {
        if !visited_classes.insert(class_name.clone()) {
            break;
        }
        let Some(def) = source.find_class(&class_name) else {
            break;
        };
        let mut pending: Vec<String> = def.interfaces.iter().rev().cloned().collect();
        while let Some(interface) = pending.pop() {
            if result.contains(&interface) {
                continue;
            }
            if let Some(idef) = source.find_class(&interface) {
                pending.extend(idef.interfaces.iter().rev().cloned());
            }
            result.push(interface);
        }
        current = def.superclass.clone();
    }
    result
}

pub fn all_methods_in(source: &dyn ClassSource, name: &str) -> Vec<MethodDef> {
    fn push(method: &MethodDef, result: &mut Vec<MethodDef>) {
        if !result.iter().any(|m| m.same_signature(method)) {
            result.push(method.clone());
        }
    }

    let mut result: Vec<MethodDef> = Vec::new();

    let mut current = Some(name.to_string());
    let mut visited = HashSet::new();
    while let Some(class_name) = current.take() {
        if !visited.insert(class_name.clone()) {
            break;
        }
        let Some(def) = source.find_class(&class_name) else {
            break;
        };
        for method in def.methods.iter().filter(|m| !m.is_bridge) {
            push(method, &mut result);
        }
        current = def.superclass.clone();
    }

    for interface in all_interfaces_in(source, name) {
        if let Some(def) = source.find_class(&interface) {
            for method in def.methods.iter().filter(|m| !m.is_bridge) {
                push(method, &mut result);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COMPONENT, SERVICE};
    use crate::metadata::class_def::Annotation;
    use crate::metadata::type_metadata::{AnnotatedTypeMetadata, AnnotationMetadata};

    fn registry() -> Arc<ClassRegistry> {
        let registry = Arc::new(ClassRegistry::new());
        registry.register(
            ClassDef::interface("app::Greeter").method(MethodDef::new("greet").abstract_()),
        );
        registry.register(ClassDef::interface("app::Named").implements("app::Greeter"));
        registry.register(
            ClassDef::new("app::Base")
                .implements("app::Named")
                .method(MethodDef::new("greet"))
                .method(MethodDef::new("base_only")),
        );
        registry.register(
            ClassDef::new("app::Impl")
                .extends("app::Base")
                .annotated(Annotation::new(SERVICE))
                .method(MethodDef::new("greet")),
        );
        registry
    }

    #[test]
    fn test_assignability() {
        let registry = registry();
        assert!(registry.is_assignable("app::Impl", "app::Base"));
        assert!(registry.is_assignable("app::Impl", "app::Greeter"));
        assert!(!registry.is_assignable("app::Base", "app::Impl"));
        assert!(registry.is_assignable("unknown::X", "unknown::X"));
    }

    #[test]
    fn test_all_interfaces_and_methods() {
        let registry = registry();
        assert_eq!(
            registry.all_interfaces("app::Impl"),
            vec!["app::Named".to_string(), "app::Greeter".to_string()]
        );
        let methods = registry.all_methods("app::Impl");
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].declaring_class, "app::Impl");
        assert_eq!(methods[1].name, "base_only");
    }

    #[test]
    fn test_stereotype_is_component() {
        let registry = registry();
        let metadata = registry.annotation_metadata("app::Impl").unwrap();
        assert!(metadata.is_annotated(COMPONENT));
        assert!(metadata.has_meta_annotation(COMPONENT));
        assert!(metadata.introspected_class().is_some());
    }

    #[test]
    fn test_class_names_in_package() {
        let registry = registry();
        assert_eq!(registry.class_names_in_package("app").len(), 4);
        assert!(registry.class_names_in_package("other").is_empty());
    }
}

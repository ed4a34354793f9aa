//! 合并注解视图
//!
//! 注解类型本身也是 `ClassDef`，其上的注解就是元注解。
//! `MergedAnnotations` 以广度优先方式展开元注解，距离越近的注解越优先。

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::constants::is_platform_type;

use super::class_def::{Annotation, AttributeValue, ClassDef};

/// 按名称查找类型描述
pub trait ClassSource: Send + Sync {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDef>>;
}

/// 注解属性（只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationAttributes {
    type_name: String,
    values: BTreeMap<String, AttributeValue>,
}

impl AnnotationAttributes {
    pub fn from_annotation(annotation: &Annotation) -> Self {
        Self {
            type_name: annotation.type_name.clone(),
            values: annotation.attributes.clone(),
        }
    }

    pub fn annotation_type(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// 空字符串视为未设置
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(AttributeValue::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(AttributeValue::as_bool)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(AttributeValue::as_i64)
    }

    pub fn get_string_array(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(AttributeValue::as_string_array)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn get_annotations(&self, key: &str) -> Vec<AnnotationAttributes> {
        self.get(key)
            .map(AttributeValue::as_annotations)
            .unwrap_or_default()
            .iter()
            .map(AnnotationAttributes::from_annotation)
            .collect()
    }

    pub fn values(&self) -> &BTreeMap<String, AttributeValue> {
        &self.values
    }
}

/// 一个（直接或元）注解及其到被注解元素的距离
#[derive(Debug, Clone)]
pub struct MergedAnnotation {
    annotation: Annotation,
    distance: usize,
}

impl MergedAnnotation {
    pub fn type_name(&self) -> &str {
        &self.annotation.type_name
    }

    /// 0 表示直接声明
    pub fn distance(&self) -> usize {
        self.distance
    }

    pub fn is_direct(&self) -> bool {
        self.distance == 0
    }

    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    pub fn attributes(&self) -> AnnotationAttributes {
        AnnotationAttributes::from_annotation(&self.annotation)
    }
}

/// 被注解元素上所有直接注解与元注解的集合
#[derive(Debug, Clone, Default)]
pub struct MergedAnnotations {
    entries: Vec<MergedAnnotation>,
}

impl MergedAnnotations {
    pub fn from_annotations(direct: &[Annotation], source: &dyn ClassSource) -> Self {
        let mut entries: Vec<MergedAnnotation> = direct
            .iter()
            .map(|a| MergedAnnotation {
                annotation: a.clone(),
                distance: 0,
            })
            .collect();

        let mut seen: HashSet<String> = direct.iter().map(|a| a.type_name.clone()).collect();
        let mut expanded: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = direct
            .iter()
            .map(|a| (a.type_name.clone(), 0))
            .collect();

        while let Some((type_name, distance)) = queue.pop_front() {
            if is_platform_type(&type_name) || !expanded.insert(type_name.clone()) {
                continue;
            }
            let Some(def) = source.find_class(&type_name) else {
                continue;
            };
            for meta in &def.annotations {
                if !seen.insert(meta.type_name.clone()) {
                    continue;
                }
                entries.push(MergedAnnotation {
                    annotation: meta.clone(),
                    distance: distance + 1,
                });
                queue.push_back((meta.type_name.clone(), distance + 1));
            }
        }

        Self { entries }
    }

    pub fn is_present(&self, type_name: &str) -> bool {
        self.entries.iter().any(|e| e.type_name() == type_name)
    }

    pub fn is_directly_present(&self, type_name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.is_direct() && e.type_name() == type_name)
    }

    pub fn is_meta_present(&self, type_name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| !e.is_direct() && e.type_name() == type_name)
    }

    /// 最近的一个注解（直接注解优先）
    pub fn get(&self, type_name: &str) -> Option<&MergedAnnotation> {
        self.entries
            .iter()
            .filter(|e| e.type_name() == type_name)
            .min_by_key(|e| e.distance)
    }

    /// 给定类型的所有注解，按距离排列
    pub fn get_all(&self, type_name: &str) -> Vec<&MergedAnnotation> {
        let mut found: Vec<&MergedAnnotation> = self
            .entries
            .iter()
            .filter(|e| e.type_name() == type_name)
            .collect();
        found.sort_by_key(|e| e.distance);
        found
    }

    pub fn direct(&self) -> impl Iterator<Item = &MergedAnnotation> {
        self.entries.iter().filter(|e| e.is_direct())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedAnnotation> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, Arc<ClassDef>>);

    impl ClassSource for MapSource {
        fn find_class(&self, name: &str) -> Option<Arc<ClassDef>> {
            self.0.get(name).cloned()
        }
    }

    fn source(defs: Vec<ClassDef>) -> MapSource {
        MapSource(
            defs.into_iter()
                .map(|d| (d.name.clone(), Arc::new(d)))
                .collect(),
        )
    }

    #[test]
    fn test_meta_annotations_resolved_breadth_first() {
        let src = source(vec![
            ClassDef::annotation_type("app::Stereo").annotated(Annotation::new("app::Marker")),
            ClassDef::annotation_type("app::Marker").annotated(Annotation::new("app::Root")),
        ]);
        let merged = MergedAnnotations::from_annotations(&[Annotation::new("app::Stereo")], &src);

        assert!(merged.is_directly_present("app::Stereo"));
        assert!(merged.is_meta_present("app::Marker"));
        assert_eq!(merged.get("app::Root").map(|m| m.distance()), Some(2));
    }

    #[test]
    fn test_cyclic_meta_annotations_terminate() {
        let src = source(vec![
            ClassDef::annotation_type("app::A").annotated(Annotation::new("app::B")),
            ClassDef::annotation_type("app::B").annotated(Annotation::new("app::A")),
        ]);
        let merged = MergedAnnotations::from_annotations(&[Annotation::new("app::A")], &src);
        assert_eq!(merged.iter().count(), 2);
    }

    #[test]
    fn test_attributes_helpers() {
        let ann = Annotation::new("app::Scan")
            .with("basePackages", vec!["app::a", "app::b"])
            .with("lazyInit", true)
            .with("name", "");
        let attrs = AnnotationAttributes::from_annotation(&ann);
        assert_eq!(attrs.get_string_array("basePackages").len(), 2);
        assert_eq!(attrs.get_bool("lazyInit"), Some(true));
        assert_eq!(attrs.get_str("name"), None);
    }
}

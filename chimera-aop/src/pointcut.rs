//! 切点（Pointcut）
//!
//! 切点 = 类型过滤器（`ClassFilter`）+ 方法匹配器（`MethodMatcher`）。
//!
//! 方法匹配器分两种：
//! - 静态匹配器只看方法和类型，结果可以按 (方法, 类型) 缓存
//! - 动态匹配器（`is_runtime() == true`）在静态匹配通过后，每次调用还要看实际参数

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::annotations::{ClassSource, MergedAnnotations};
use chimera_core::metadata::class_registry::{all_interfaces_in, all_methods_in};
use chimera_core::{ClassDef, MethodDef};
use regex::Regex;

use crate::target::DynValue;

/// 匹配时的类型视图：类型描述 + 查找父类型的来源
#[derive(Clone, Copy)]
pub struct ClassView<'a> {
    def: &'a ClassDef,
    source: &'a dyn ClassSource,
}

impl<'a> ClassView<'a> {
    pub fn new(def: &'a ClassDef, source: &'a dyn ClassSource) -> Self {
        Self { def, source }
    }

    pub fn name(&self) -> &'a str {
        &self.def.name
    }

    pub fn def(&self) -> &'a ClassDef {
        self.def
    }

    pub fn source(&self) -> &'a dyn ClassSource {
        self.source
    }

    /// 父类链 + 所有接口（不含自身）
    pub fn all_supertypes(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        let mut classes = Vec::new();
        let mut current = self.def.superclass.clone();
        while let Some(name) = current.take() {
            if result.contains(&name) {
                break;
            }
            result.push(name.clone());
            current = self.source.find_class(&name).and_then(|d| d.superclass.clone());
            classes.push(name);
        }
        for interface in &self.def.interfaces {
            result.push(interface.clone());
            result.extend(all_interfaces_in(self.source, interface));
        }
        for class_name in classes {
            result.extend(all_interfaces_in(self.source, &class_name));
        }
        let mut seen = HashSet::new();
        result.retain(|name| seen.insert(name.clone()));
        result
    }

    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.def.name == type_name || self.all_supertypes().iter().any(|t| t == type_name)
    }

    /// 注解（包含元注解）
    pub fn has_annotation(&self, annotation_type: &str) -> bool {
        MergedAnnotations::from_annotations(&self.def.annotations, self.source)
            .is_present(annotation_type)
    }

    /// 自身声明和继承的方法，同签名只保留最具体的一个
    pub fn all_methods(&self) -> Vec<MethodDef> {
        let mut result: Vec<MethodDef> = self
            .def
            .methods
            .iter()
            .filter(|m| !m.is_bridge)
            .cloned()
            .collect();
        let parents = self
            .def
            .superclass
            .iter()
            .chain(self.def.interfaces.iter());
        for parent in parents {
            for method in all_methods_in(self.source, parent) {
                if !result.iter().any(|m| m.same_signature(&method)) {
                    result.push(method);
                }
            }
        }
        result
    }

    /// 给定方法在这个类型上最具体的声明
    pub fn most_specific_method(&self, method: &MethodDef) -> MethodDef {
        self.all_methods()
            .into_iter()
            .find(|m| m.same_signature(method))
            .unwrap_or_else(|| method.clone())
    }
}

impl fmt::Debug for ClassView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassView").field(&self.def.name).finish()
    }
}

pub trait ClassFilter: Send + Sync {
    fn matches(&self, class: ClassView<'_>) -> bool;
}

pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool;

    /// 静态匹配通过后是否还需要按参数匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 按实际参数匹配，只对动态匹配器调用
    fn matches_runtime(&self, _method: &MethodDef, _class: ClassView<'_>, _args: &[DynValue]) -> bool {
        true
    }

    /// 匹配结果是否受目标上的引入影响
    fn is_introduction_aware(&self) -> bool {
        false
    }

    /// `has_introductions`：是否有引入通知器的类型过滤器匹配该类型
    fn matches_with_introductions(
        &self,
        method: &MethodDef,
        class: ClassView<'_>,
        _has_introductions: bool,
    ) -> bool {
        self.matches(method, class)
    }

    /// 对所有方法都匹配（用于跳过逐个方法的检查）
    fn matches_all(&self) -> bool {
        false
    }
}

pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;
}

/// 匹配所有类型
#[derive(Debug, Default, Clone, Copy)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: ClassView<'_>) -> bool {
        true
    }
}

/// 匹配所有方法
#[derive(Debug, Default, Clone, Copy)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &MethodDef, _class: ClassView<'_>) -> bool {
        true
    }

    fn matches_all(&self) -> bool {
        true
    }
}

/// 匹配一切
#[derive(Debug, Default, Clone, Copy)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(TrueMethodMatcher)
    }
}

/// 把 `*` 通配符模式编译为正则
fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
}

/// 简单的模式匹配（支持 * 通配符）
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `find*` - 以 find 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
pub fn simple_match(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == target;
    }
    wildcard_regex(pattern)
        .map(|regex| regex.is_match(target))
        .unwrap_or(false)
}

/// 类型模式
///
/// - `*` 匹配一个路径段中的任意字符
/// - `..::` 匹配任意多个路径段
/// - 末尾的 `+` 表示同时匹配子类型
///
/// 例如 `app::service::*Service`、`app::..::*Repository`、`app::Auditable+`
#[derive(Debug, Clone)]
pub struct TypePattern {
    pattern: String,
    regex: Regex,
    include_subtypes: bool,
}

impl TypePattern {
    pub fn new(pattern: &str) -> Option<Self> {
        let trimmed = pattern.trim();
        let (body, include_subtypes) = match trimmed.strip_suffix('+') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        if body.is_empty() {
            return None;
        }

        let mut regex = String::from("^");
        let mut rest = body;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("..::") {
                regex.push_str("(?:[^:]+::)*");
                rest = after;
            } else if let Some(after) = rest.strip_prefix('*') {
                regex.push_str("[^:]*");
                rest = after;
            } else {
                let next = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '*' || *c == '.')
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                regex.push_str(&regex::escape(&rest[..next]));
                rest = &rest[next..];
            }
        }
        regex.push('$');

        Some(Self {
            pattern: trimmed.to_string(),
            regex: Regex::new(&regex).ok()?,
            include_subtypes,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match_all(&self) -> bool {
        self.pattern == "*"
    }

    /// 只比较名称，不考虑子类型
    pub fn matches_name(&self, type_name: &str) -> bool {
        self.regex.is_match(type_name)
    }

    pub fn matches(&self, class: ClassView<'_>) -> bool {
        if self.regex.is_match(class.name()) {
            return true;
        }
        self.include_subtypes
            && class
                .all_supertypes()
                .iter()
                .any(|t| self.regex.is_match(t))
    }
}

/// 按类型模式过滤
#[derive(Debug, Clone)]
pub struct TypePatternClassFilter {
    pattern: TypePattern,
}

impl TypePatternClassFilter {
    pub fn new(pattern: TypePattern) -> Self {
        Self { pattern }
    }

    pub fn type_pattern(&self) -> &TypePattern {
        &self.pattern
    }
}

impl ClassFilter for TypePatternClassFilter {
    fn matches(&self, class: ClassView<'_>) -> bool {
        self.pattern.matches(class)
    }
}

/// 按方法名匹配（支持 `*` 通配符）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodPointcut {
    mapped_names: Vec<(String, Option<Regex>)>,
}

impl NameMatchMethodPointcut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pointcut = Self::new();
        for name in names {
            pointcut.add_method_name(name);
        }
        pointcut
    }

    pub fn add_method_name(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        let regex = if name.contains('*') {
            wildcard_regex(&name)
        } else {
            None
        };
        self.mapped_names.push((name, regex));
        self
    }

    pub fn mapped_names(&self) -> Vec<&str> {
        self.mapped_names.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl MethodMatcher for NameMatchMethodPointcut {
    fn matches(&self, method: &MethodDef, _class: ClassView<'_>) -> bool {
        self.mapped_names.iter().any(|(name, regex)| match regex {
            Some(regex) => regex.is_match(&method.name),
            None => name == "*" || *name == method.name,
        })
    }
}

impl Pointcut for NameMatchMethodPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TrueClassFilter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(self.clone())
    }
}

/// 类型上带有指定注解
#[derive(Debug, Clone)]
pub struct AnnotationClassFilter {
    annotation_type: String,
    check_inherited: bool,
}

impl AnnotationClassFilter {
    pub fn new(annotation_type: impl Into<String>, check_inherited: bool) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            check_inherited,
        }
    }
}

impl ClassFilter for AnnotationClassFilter {
    fn matches(&self, class: ClassView<'_>) -> bool {
        if !self.check_inherited {
            return class.def().has_annotation(&self.annotation_type);
        }
        if class.has_annotation(&self.annotation_type) {
            return true;
        }
        class.all_supertypes().iter().any(|name| {
            class.source().find_class(name).is_some_and(|def| {
                ClassView::new(&def, class.source()).has_annotation(&self.annotation_type)
            })
        })
    }
}

/// 方法上带有指定注解
#[derive(Debug, Clone)]
pub struct AnnotationMethodMatcher {
    annotation_type: String,
    check_inherited: bool,
}

impl AnnotationMethodMatcher {
    pub fn new(annotation_type: impl Into<String>, check_inherited: bool) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            check_inherited,
        }
    }

    fn annotated(&self, method: &MethodDef, source: &dyn ClassSource) -> bool {
        MergedAnnotations::from_annotations(&method.annotations, source).is_present(&self.annotation_type)
    }
}

impl MethodMatcher for AnnotationMethodMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        if self.annotated(method, class.source()) {
            return true;
        }
        let specific = class.most_specific_method(method);
        if self.annotated(&specific, class.source()) {
            return true;
        }
        // 接口或父类上的同签名声明
        self.check_inherited
            && class.all_supertypes().iter().any(|name| {
                class.source().find_class(name).is_some_and(|def| {
                    def.methods
                        .iter()
                        .any(|m| m.same_signature(method) && self.annotated(m, class.source()))
                })
            })
    }
}

/// 按类型注解和（或）方法注解匹配
#[derive(Clone)]
pub struct AnnotationMatchingPointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl AnnotationMatchingPointcut {
    pub fn new(class_annotation: Option<&str>, method_annotation: Option<&str>, check_inherited: bool) -> Self {
        let class_filter: Arc<dyn ClassFilter> = match class_annotation {
            Some(annotation) => Arc::new(AnnotationClassFilter::new(annotation, check_inherited)),
            None => Arc::new(TrueClassFilter),
        };
        let method_matcher: Arc<dyn MethodMatcher> = match method_annotation {
            Some(annotation) => Arc::new(AnnotationMethodMatcher::new(annotation, check_inherited)),
            None => Arc::new(TrueMethodMatcher),
        };
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn for_class_annotation(annotation_type: &str) -> Self {
        Self::new(Some(annotation_type), None, true)
    }

    pub fn for_method_annotation(annotation_type: &str) -> Self {
        Self::new(None, Some(annotation_type), true)
    }
}

impl Pointcut for AnnotationMatchingPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}

/// 任一过滤器匹配
pub struct UnionClassFilter(pub Vec<Arc<dyn ClassFilter>>);

impl ClassFilter for UnionClassFilter {
    fn matches(&self, class: ClassView<'_>) -> bool {
        self.0.iter().any(|f| f.matches(class))
    }
}

/// 所有过滤器都匹配
pub struct IntersectionClassFilter(pub Vec<Arc<dyn ClassFilter>>);

impl ClassFilter for IntersectionClassFilter {
    fn matches(&self, class: ClassView<'_>) -> bool {
        self.0.iter().all(|f| f.matches(class))
    }
}

pub struct NegateClassFilter(pub Arc<dyn ClassFilter>);

impl ClassFilter for NegateClassFilter {
    fn matches(&self, class: ClassView<'_>) -> bool {
        !self.0.matches(class)
    }
}

/// 方法匹配器的并集
///
/// 每一侧可以带上自己的类型过滤器，这样合并两个切点时，
/// 一个切点的方法匹配不会被另一个切点的类型过滤器放行
pub struct UnionMethodMatcher {
    left: (Option<Arc<dyn ClassFilter>>, Arc<dyn MethodMatcher>),
    right: (Option<Arc<dyn ClassFilter>>, Arc<dyn MethodMatcher>),
}

impl UnionMethodMatcher {
    pub fn new(left: Arc<dyn MethodMatcher>, right: Arc<dyn MethodMatcher>) -> Self {
        Self {
            left: (None, left),
            right: (None, right),
        }
    }

    pub fn class_filter_aware(
        left: (Arc<dyn ClassFilter>, Arc<dyn MethodMatcher>),
        right: (Arc<dyn ClassFilter>, Arc<dyn MethodMatcher>),
    ) -> Self {
        Self {
            left: (Some(left.0), left.1),
            right: (Some(right.0), right.1),
        }
    }

    fn sides(&self) -> [&(Option<Arc<dyn ClassFilter>>, Arc<dyn MethodMatcher>); 2] {
        [&self.left, &self.right]
    }

    fn side_applies(side: &(Option<Arc<dyn ClassFilter>>, Arc<dyn MethodMatcher>), class: ClassView<'_>) -> bool {
        side.0.as_ref().map(|f| f.matches(class)).unwrap_or(true)
    }
}

impl MethodMatcher for UnionMethodMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.sides()
            .iter()
            .any(|side| Self::side_applies(side, class) && side.1.matches(method, class))
    }

    fn is_runtime(&self) -> bool {
        self.left.1.is_runtime() || self.right.1.is_runtime()
    }

    fn matches_runtime(&self, method: &MethodDef, class: ClassView<'_>, args: &[DynValue]) -> bool {
        self.sides().iter().any(|side| {
            Self::side_applies(side, class)
                && side.1.matches(method, class)
                && (!side.1.is_runtime() || side.1.matches_runtime(method, class, args))
        })
    }

    fn is_introduction_aware(&self) -> bool {
        self.left.1.is_introduction_aware() || self.right.1.is_introduction_aware()
    }

    fn matches_with_introductions(&self, method: &MethodDef, class: ClassView<'_>, has_introductions: bool) -> bool {
        self.sides().iter().any(|side| {
            Self::side_applies(side, class)
                && side.1.matches_with_introductions(method, class, has_introductions)
        })
    }

    fn matches_all(&self) -> bool {
        self.left.1.matches_all() || self.right.1.matches_all()
    }
}

/// 方法匹配器的交集
pub struct IntersectionMethodMatcher {
    left: Arc<dyn MethodMatcher>,
    right: Arc<dyn MethodMatcher>,
}

impl IntersectionMethodMatcher {
    pub fn new(left: Arc<dyn MethodMatcher>, right: Arc<dyn MethodMatcher>) -> Self {
        Self { left, right }
    }
}

impl MethodMatcher for IntersectionMethodMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.left.matches(method, class) && self.right.matches(method, class)
    }

    fn is_runtime(&self) -> bool {
        self.left.is_runtime() || self.right.is_runtime()
    }

    fn matches_runtime(&self, method: &MethodDef, class: ClassView<'_>, args: &[DynValue]) -> bool {
        let left = !self.left.is_runtime() || self.left.matches_runtime(method, class, args);
        let right = !self.right.is_runtime() || self.right.matches_runtime(method, class, args);
        left && right
    }

    fn is_introduction_aware(&self) -> bool {
        self.left.is_introduction_aware() || self.right.is_introduction_aware()
    }

    fn matches_with_introductions(&self, method: &MethodDef, class: ClassView<'_>, has_introductions: bool) -> bool {
        self.left.matches_with_introductions(method, class, has_introductions)
            && self.right.matches_with_introductions(method, class, has_introductions)
    }

    fn matches_all(&self) -> bool {
        self.left.matches_all() && self.right.matches_all()
    }
}

/// 可组合的切点
///
/// ```rust,ignore
/// let pointcut = ComposablePointcut::from_class_filter(Arc::new(service_filter))
///     .intersection_method_matcher(Arc::new(NameMatchMethodPointcut::with_names(["save*"])))
///     .union(&AnnotationMatchingPointcut::for_method_annotation("app::Audited"));
/// ```
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposablePointcut {
    /// 匹配一切
    pub fn new() -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn from_pointcut(pointcut: &dyn Pointcut) -> Self {
        Self {
            class_filter: pointcut.class_filter(),
            method_matcher: pointcut.method_matcher(),
        }
    }

    pub fn from_class_filter(class_filter: Arc<dyn ClassFilter>) -> Self {
        Self {
            class_filter,
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn from_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher,
        }
    }

    pub fn union_class_filter(mut self, other: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = Arc::new(UnionClassFilter(vec![self.class_filter, other]));
        self
    }

    pub fn intersection_class_filter(mut self, other: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = Arc::new(IntersectionClassFilter(vec![self.class_filter, other]));
        self
    }

    pub fn union_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = Arc::new(UnionMethodMatcher::new(self.method_matcher, other));
        self
    }

    pub fn intersection_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = Arc::new(IntersectionMethodMatcher::new(self.method_matcher, other));
        self
    }

    pub fn union(mut self, other: &dyn Pointcut) -> Self {
        let other_filter = other.class_filter();
        self.method_matcher = Arc::new(UnionMethodMatcher::class_filter_aware(
            (Arc::clone(&self.class_filter), self.method_matcher),
            (Arc::clone(&other_filter), other.method_matcher()),
        ));
        self.class_filter = Arc::new(UnionClassFilter(vec![self.class_filter, other_filter]));
        self
    }

    pub fn intersection(mut self, other: &dyn Pointcut) -> Self {
        self.class_filter = Arc::new(IntersectionClassFilter(vec![self.class_filter, other.class_filter()]));
        self.method_matcher = Arc::new(IntersectionMethodMatcher::new(self.method_matcher, other.method_matcher()));
        self
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}

type StaticCheck = Arc<dyn Fn(&MethodDef, ClassView<'_>) -> bool + Send + Sync>;
type RuntimeCheck = Arc<dyn Fn(&MethodDef, ClassView<'_>, &[DynValue]) -> bool + Send + Sync>;

struct ClosureDynamicMatcher {
    static_check: Option<StaticCheck>,
    runtime_check: RuntimeCheck,
}

impl MethodMatcher for ClosureDynamicMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.static_check
            .as_ref()
            .map(|check| check(method, class))
            .unwrap_or(true)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &MethodDef, class: ClassView<'_>, args: &[DynValue]) -> bool {
        (self.runtime_check)(method, class, args)
    }
}

/// 由闭包决定的动态切点，每次调用都会重新按参数匹配
#[derive(Clone)]
pub struct DynamicMethodMatcherPointcut {
    class_filter: Arc<dyn ClassFilter>,
    matcher: Arc<ClosureDynamicMatcher>,
}

impl DynamicMethodMatcherPointcut {
    pub fn new<F>(runtime_check: F) -> Self
    where
        F: Fn(&MethodDef, ClassView<'_>, &[DynValue]) -> bool + Send + Sync + 'static,
    {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            matcher: Arc::new(ClosureDynamicMatcher {
                static_check: None,
                runtime_check: Arc::new(runtime_check),
            }),
        }
    }

    /// 静态部分：不匹配的方法根本不会进入调用链
    pub fn with_static_check<F>(self, static_check: F) -> Self
    where
        F: Fn(&MethodDef, ClassView<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            class_filter: self.class_filter,
            matcher: Arc::new(ClosureDynamicMatcher {
                static_check: Some(Arc::new(static_check)),
                runtime_check: Arc::clone(&self.matcher.runtime_check),
            }),
        }
    }

    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }
}

impl Pointcut for DynamicMethodMatcherPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.matcher) as Arc<dyn MethodMatcher>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{Annotation, ClassRegistry};

    fn registry() -> ClassRegistry {
        let registry = ClassRegistry::new();
        registry.register(ClassDef::annotation_type("app::Audited"));
        registry.register(
            ClassDef::interface("app::Repository")
                .method(MethodDef::new("save").annotated(Annotation::new("app::Audited"))),
        );
        registry.register(
            ClassDef::new("app::UserRepository")
                .implements("app::Repository")
                .annotated(Annotation::new("app::Audited"))
                .method(MethodDef::new("save"))
                .method(MethodDef::new("find_all")),
        );
        registry
    }

    #[test]
    fn test_simple_match() {
        assert!(simple_match("*", "anything"));
        assert!(simple_match("find*", "find_all"));
        assert!(simple_match("*_all", "find_all"));
        assert!(simple_match("*nd_a*", "find_all"));
        assert!(!simple_match("save", "find_all"));
    }

    #[test]
    fn test_type_patterns() {
        let registry = registry();
        let def = registry.get("app::UserRepository").unwrap();
        let view = ClassView::new(&def, &registry);

        assert!(TypePattern::new("app::*Repository").unwrap().matches(view));
        assert!(TypePattern::new("..::UserRepository").unwrap().matches(view));
        assert!(!TypePattern::new("app::Repository").unwrap().matches(view));
        assert!(TypePattern::new("app::Repository+").unwrap().matches(view));
        assert!(!TypePattern::new("other::..::*").unwrap().matches(view));
        assert!(TypePattern::new("app::..::*").unwrap().matches_name("app::a::b::C"));
        assert!(TypePattern::new("").is_none());
    }

    #[test]
    fn test_name_and_annotation_matching() {
        let registry = registry();
        let def = registry.get("app::UserRepository").unwrap();
        let view = ClassView::new(&def, &registry);
        let save = def.find_method("save").unwrap();
        let find_all = def.find_method("find_all").unwrap();

        let names = NameMatchMethodPointcut::with_names(["find*"]);
        assert!(names.matches(find_all, view));
        assert!(!names.matches(save, view));

        let annotated = AnnotationMatchingPointcut::for_method_annotation("app::Audited");
        assert!(annotated.method_matcher().matches(save, view));
        assert!(!annotated.method_matcher().matches(find_all, view));

        let direct_only = AnnotationMethodMatcher::new("app::Audited", false);
        assert!(!direct_only.matches(save, view));

        let class_level = AnnotationMatchingPointcut::for_class_annotation("app::Audited");
        assert!(class_level.class_filter().matches(view));
    }

    #[test]
    fn test_composable_union_respects_class_filters() {
        let registry = registry();
        let def = registry.get("app::UserRepository").unwrap();
        let view = ClassView::new(&def, &registry);
        let find_all = def.find_method("find_all").unwrap();

        let other_types = ComposablePointcut::from_class_filter(Arc::new(TypePatternClassFilter::new(
            TypePattern::new("other::*").unwrap(),
        )));
        let saves = NameMatchMethodPointcut::with_names(["save"]);
        let union = ComposablePointcut::from_pointcut(&saves).union(&other_types);

        assert!(union.class_filter().matches(view));
        // other_types 的 TrueMethodMatcher 不能因为 saves 的类型过滤器而放行 find_all
        assert!(!union.method_matcher().matches(find_all, view));

        let intersection = ComposablePointcut::new()
            .intersection_method_matcher(Arc::new(NameMatchMethodPointcut::with_names(["find*"])));
        assert!(intersection.method_matcher().matches(find_all, view));
    }

    #[test]
    fn test_dynamic_pointcut_is_runtime() {
        let registry = registry();
        let def = registry.get("app::UserRepository").unwrap();
        let view = ClassView::new(&def, &registry);
        let save = def.find_method("save").unwrap();

        let pointcut = DynamicMethodMatcherPointcut::new(|_, _, args| !args.is_empty())
            .with_static_check(|method, _| method.name == "save");
        let matcher = pointcut.method_matcher();
        assert!(matcher.is_runtime());
        assert!(matcher.matches(save, view));
        assert!(!matcher.matches_runtime(save, view, &[]));
        assert!(matcher.matches_runtime(save, view, &[Arc::new(1_i32) as DynValue]));
    }
}

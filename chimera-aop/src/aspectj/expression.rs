//! AspectJ 风格的切点表达式
//!
//! 支持的指示符：
//! - `execution([public] 返回类型 [类型模式::]方法名模式(参数模式))`
//! - `within(类型模式)`、`this(类型)`、`target(类型)`
//! - `args(参数模式)`：声明类型被擦除（`Any`、`dyn Any`、`DynValue`）时推迟到调用时检查
//! - `@annotation(注解类型)`、`@within(注解类型)`
//! - `bean(名称模式)`：只在创建代理时判断
//! - 命名切点引用：`audited()` 或 `app::Pointcuts::audited()`
//! - `&&` `||` `!`（以及 `and` `or` `not`）和括号
//!
//! `this()` 和 `target()` 都按目标类型静态判断。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chimera_core::metadata::annotations::MergedAnnotations;
use chimera_core::metadata::class_registry::{all_methods_in, is_assignable_in};
use chimera_core::metadata::{short_name, ClassSource, MethodKey};
use chimera_core::MethodDef;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::annotations::POINTCUT;
use crate::error::{AopError, AopResult};
use crate::pointcut::{simple_match, ClassFilter, ClassView, MethodMatcher, Pointcut, TypePattern};
use crate::target::DynValue;

/// 三值匹配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuzzyMatch {
    Always,
    /// 需要更多信息（调用参数或代理创建上下文）才能确定
    Maybe,
    Never,
}

impl FuzzyMatch {
    fn from_bool(value: bool) -> Self {
        if value {
            FuzzyMatch::Always
        } else {
            FuzzyMatch::Never
        }
    }

    fn and(self, other: FuzzyMatch) -> Self {
        match (self, other) {
            (FuzzyMatch::Never, _) | (_, FuzzyMatch::Never) => FuzzyMatch::Never,
            (FuzzyMatch::Always, FuzzyMatch::Always) => FuzzyMatch::Always,
            _ => FuzzyMatch::Maybe,
        }
    }

    fn or(self, other: FuzzyMatch) -> Self {
        match (self, other) {
            (FuzzyMatch::Always, _) | (_, FuzzyMatch::Always) => FuzzyMatch::Always,
            (FuzzyMatch::Never, FuzzyMatch::Never) => FuzzyMatch::Never,
            _ => FuzzyMatch::Maybe,
        }
    }

    fn not(self) -> Self {
        match self {
            FuzzyMatch::Always => FuzzyMatch::Never,
            FuzzyMatch::Never => FuzzyMatch::Always,
            FuzzyMatch::Maybe => FuzzyMatch::Maybe,
        }
    }

    pub fn could_match(self) -> bool {
        self != FuzzyMatch::Never
    }
}

// ============================================================================
// 调用参数的运行时类型检查
// ============================================================================

pub type ArgTypeCheck = fn(&DynValue) -> bool;

/// 链接期注册的参数类型检查
///
/// ```rust,ignore
/// inventory::submit! {
///     ArgTypeRegistration { type_name: "app::Order", check: |v| (**v).is::<Order>() }
/// }
/// ```
pub struct ArgTypeRegistration {
    pub type_name: &'static str,
    pub check: ArgTypeCheck,
}

inventory::collect!(ArgTypeRegistration);

macro_rules! builtin_arg_types {
    ($($name:literal => $ty:ty),* $(,)?) => {
        vec![$(($name, (|value: &DynValue| (**value).is::<$ty>()) as ArgTypeCheck)),*]
    };
}

/// 类型名称 -> 运行时类型检查
#[derive(Clone, Default)]
pub struct ArgTypeRegistry {
    checks: HashMap<String, ArgTypeCheck>,
}

impl ArgTypeRegistry {
    /// 基本类型 + 链接期注册的类型
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let builtins = builtin_arg_types![
            "i8" => i8, "i16" => i16, "i32" => i32, "i64" => i64, "isize" => isize,
            "u8" => u8, "u16" => u16, "u32" => u32, "u64" => u64, "usize" => usize,
            "f32" => f32, "f64" => f64, "bool" => bool, "char" => char, "()" => (),
            "String" => String, "std::string::String" => String,
            "&str" => &'static str,
        ];
        for (name, check) in builtins {
            registry.register(name, check);
        }
        for registration in inventory::iter::<ArgTypeRegistration> {
            registry.register(registration.type_name, registration.check);
        }
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, check: ArgTypeCheck) {
        self.checks.insert(type_name.into(), check);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.checks.contains_key(type_name)
    }

    /// 未登记的类型返回 `None`
    pub fn check(&self, type_name: &str, value: &DynValue) -> Option<bool> {
        self.checks.get(type_name).map(|check| check(value))
    }
}

static DEFAULT_ARG_TYPES: Lazy<Arc<ArgTypeRegistry>> = Lazy::new(|| Arc::new(ArgTypeRegistry::new()));

pub fn default_arg_types() -> Arc<ArgTypeRegistry> {
    Arc::clone(&DEFAULT_ARG_TYPES)
}

/// 被擦除的参数类型：只有调用时才知道实际类型
pub fn is_erased_type(type_name: &str) -> bool {
    matches!(
        type_name.trim(),
        "Any" | "dyn Any" | "DynValue" | "std::any::Any" | "dyn std::any::Any" | "chimera::aop::DynValue"
    )
}

// ============================================================================
// 代理创建上下文
// ============================================================================

thread_local! {
    static CURRENT_PROXIED_BEAN: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// 正在创建代理的 Bean 名称，`bean()` 指示符据此判断
pub struct ProxyCreationContext;

impl ProxyCreationContext {
    pub fn current_proxied_bean_name() -> Option<String> {
        CURRENT_PROXIED_BEAN.with(|current| current.borrow().clone())
    }

    /// 返回的守卫释放时恢复之前的名称
    pub fn enter(bean_name: &str) -> ProxyCreationGuard {
        let previous = CURRENT_PROXIED_BEAN.with(|current| current.replace(Some(bean_name.to_string())));
        ProxyCreationGuard { previous }
    }
}

pub struct ProxyCreationGuard {
    previous: Option<String>,
}

impl Drop for ProxyCreationGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXIED_BEAN.with(|current| *current.borrow_mut() = previous);
    }
}

// ============================================================================
// 表达式模型
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamPattern {
    /// `..`
    AnySequence,
    /// `*`
    AnyOne,
    Type(String),
}

#[derive(Debug, Clone)]
struct ExecutionPattern {
    public_only: bool,
    return_type: String,
    declaring_type: Option<TypePattern>,
    name: String,
    params: Vec<ParamPattern>,
}

#[derive(Debug, Clone)]
enum Expr {
    Execution(ExecutionPattern),
    Within(TypePattern),
    This(String),
    Target(String),
    Args(Vec<ParamPattern>),
    AtAnnotation(String),
    AtWithin(String),
    Bean(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// 是否包含需要调用参数的检查
    fn has_runtime_tests(&self) -> bool {
        match self {
            Expr::Args(params) => params.iter().any(|p| matches!(p, ParamPattern::Type(_))),
            Expr::And(l, r) | Expr::Or(l, r) => l.has_runtime_tests() || r.has_runtime_tests(),
            Expr::Not(inner) => inner.has_runtime_tests(),
            _ => false,
        }
    }
}

// ============================================================================
// 解析
// ============================================================================

struct ParseContext<'a> {
    source: &'a dyn ClassSource,
    /// 正在展开的命名切点，用于发现循环引用
    resolving: RefCell<Vec<String>>,
}

struct Parser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    pos: usize,
    /// 未限定的命名切点在这个类型上查找
    scope: Option<String>,
    context: &'a ParseContext<'a>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | ':' | '$' | '.')
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str, scope: Option<String>, context: &'a ParseContext<'a>) -> Self {
        Self {
            expression,
            chars: expression.chars().collect(),
            pos: 0,
            scope,
            context,
        }
    }

    fn error(&self, message: impl Into<String>) -> AopError {
        AopError::PointcutParse {
            expression: self.expression.to_string(),
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn looking_at(&self, token: &str) -> bool {
        token
            .chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.looking_at(token) {
            self.pos += token.chars().count();
            true
        } else {
            false
        }
    }

    /// 关键字后面不能紧跟标识符字符
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let len = keyword.chars().count();
        if self.looking_at(keyword) && !self.chars.get(self.pos + len).is_some_and(|c| is_ident_char(*c)) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    fn parse(mut self) -> AopResult<Expr> {
        let expr = self.parse_or()?;
        self.skip_ws();
        if !self.at_end() {
            return Err(self.error(format!("unexpected input at position {}", self.pos)));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> AopResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat("||") || self.eat_keyword("or") {
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> AopResult<Expr> {
        let mut left = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.eat("&&") || self.eat_keyword("and") {
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> AopResult<Expr> {
        self.skip_ws();
        if self.eat("!") || self.eat_keyword("not") {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AopResult<Expr> {
        self.skip_ws();
        if self.eat("(") {
            let expr = self.parse_or()?;
            self.skip_ws();
            if !self.eat(")") {
                return Err(self.error(format!("expected ')' at position {}", self.pos)));
            }
            return Ok(expr);
        }

        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(|c| is_ident_char(*c)) {
            self.pos += 1;
        }
        let designator: String = self.chars[start..self.pos].iter().collect();
        if designator.is_empty() {
            return Err(self.error(format!("expected pointcut designator at position {}", start)));
        }
        self.skip_ws();
        if !self.eat("(") {
            return Err(self.error(format!("expected '(' after '{}'", designator)));
        }
        let body = self.read_balanced()?;
        self.build(&designator, body.trim())
    }

    /// 读取到与已消费的 `(` 匹配的 `)` 为止
    fn read_balanced(&mut self) -> AopResult<String> {
        let start = self.pos;
        let mut depth = 1;
        while let Some(c) = self.chars.get(self.pos) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error("unbalanced parentheses"))
    }

    fn build(&self, designator: &str, body: &str) -> AopResult<Expr> {
        let non_empty = |what: &str| -> AopResult<String> {
            if body.is_empty() {
                Err(self.error(format!("{}() requires an argument", what)))
            } else {
                Ok(body.to_string())
            }
        };
        match designator {
            "execution" => self.parse_execution(body).map(Expr::Execution),
            "within" => TypePattern::new(body)
                .map(Expr::Within)
                .ok_or_else(|| self.error(format!("invalid type pattern '{}'", body))),
            "this" => non_empty("this").map(Expr::This),
            "target" => non_empty("target").map(Expr::Target),
            "args" => self.parse_params(body).map(Expr::Args),
            "@annotation" => non_empty("@annotation").map(Expr::AtAnnotation),
            "@within" => non_empty("@within").map(Expr::AtWithin),
            "bean" => non_empty("bean").map(Expr::Bean),
            name if body.is_empty() && !name.starts_with('@') => self.resolve_reference(name),
            other => Err(self.error(format!("unsupported pointcut designator '{}'", other))),
        }
    }

    fn parse_execution(&self, body: &str) -> AopResult<ExecutionPattern> {
        if !body.ends_with(')') {
            return Err(self.error("execution() requires a parameter list"));
        }
        let chars: Vec<char> = body.chars().collect();
        let mut depth = 0;
        let mut open = None;
        for (i, c) in chars.iter().enumerate().rev() {
            match c {
                ')' => depth += 1,
                '(' => {
                    depth -= 1;
                    if depth == 0 {
                        open = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let open = open.ok_or_else(|| self.error("unbalanced parameter list in execution()"))?;
        let head: String = chars[..open].iter().collect();
        let params: String = chars[open + 1..chars.len() - 1].iter().collect();

        let tokens: Vec<&str> = head.split_whitespace().collect();
        let Some((signature, rest)) = tokens.split_last() else {
            return Err(self.error("execution() requires a method name pattern"));
        };
        let Some((return_type, modifiers)) = rest.split_last() else {
            return Err(self.error("execution() requires a return type pattern"));
        };

        let (declaring_type, name) = match signature.rsplit_once("::") {
            Some((type_pattern, name)) => {
                let pattern = TypePattern::new(type_pattern)
                    .ok_or_else(|| self.error(format!("invalid type pattern '{}'", type_pattern)))?;
                (Some(pattern), name.to_string())
            }
            None => (None, signature.to_string()),
        };

        Ok(ExecutionPattern {
            public_only: modifiers.contains(&"public"),
            return_type: return_type.to_string(),
            declaring_type,
            name,
            params: self.parse_params(&params)?,
        })
    }

    fn parse_params(&self, body: &str) -> AopResult<Vec<ParamPattern>> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let mut parts = Vec::new();
        let mut depth = 0;
        let mut current = String::new();
        for c in body.chars() {
            match c {
                '<' => depth += 1,
                '>' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        parts.push(current);

        let params: Vec<ParamPattern> = parts
            .iter()
            .map(|p| match p.trim() {
                ".." => ParamPattern::AnySequence,
                "*" => ParamPattern::AnyOne,
                other => ParamPattern::Type(other.to_string()),
            })
            .collect();
        if params.iter().any(|p| matches!(p, ParamPattern::Type(t) if t.is_empty())) {
            return Err(self.error("empty parameter pattern"));
        }
        if params.iter().filter(|p| **p == ParamPattern::AnySequence).count() > 1 {
            return Err(self.error("at most one '..' is supported in a parameter pattern"));
        }
        Ok(params)
    }

    /// 展开命名切点
    fn resolve_reference(&self, name: &str) -> AopResult<Expr> {
        let (class_name, method_name) = match name.rsplit_once("::") {
            Some((class_name, method_name)) => (class_name.to_string(), method_name.to_string()),
            None => {
                let scope = self.scope.clone().ok_or_else(|| {
                    self.error(format!("cannot resolve pointcut reference '{}' without a declaring type", name))
                })?;
                (scope, name.to_string())
            }
        };

        let key = format!("{}::{}", class_name, method_name);
        if self.context.resolving.borrow().contains(&key) {
            return Err(self.error(format!("circular pointcut reference '{}'", key)));
        }

        let declaration = all_methods_in(self.context.source, &class_name)
            .into_iter()
            .find(|m| m.name == method_name && m.has_annotation(POINTCUT))
            .ok_or_else(|| self.error(format!("no pointcut named '{}' on [{}]", method_name, class_name)))?;
        let expression = declaration
            .annotations
            .iter()
            .find(|a| a.type_name == POINTCUT)
            .and_then(|a| a.attributes.get("value"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_default();
        if expression.trim().is_empty() {
            return Err(self.error(format!("pointcut '{}' has an empty expression", key)));
        }

        self.context.resolving.borrow_mut().push(key);
        let resolved = Parser::new(&expression, Some(class_name), self.context).parse();
        self.context.resolving.borrow_mut().pop();
        resolved
    }
}

// ============================================================================
// 匹配
// ============================================================================

#[derive(Clone, Copy)]
enum Phase<'a> {
    /// 只有类型
    Class,
    /// 类型 + 方法
    Method { method: &'a MethodDef, has_introductions: bool },
    /// 类型 + 方法 + 实际参数
    Runtime {
        method: &'a MethodDef,
        args: &'a [DynValue],
        arg_types: &'a ArgTypeRegistry,
    },
}

impl<'a> Phase<'a> {
    fn method(&self) -> Option<&'a MethodDef> {
        match self {
            Phase::Class => None,
            Phase::Method { method, .. } | Phase::Runtime { method, .. } => Some(method),
        }
    }
}

fn type_name_matches(pattern: &str, type_name: &str) -> bool {
    simple_match(pattern, type_name) || (!pattern.contains("::") && simple_match(pattern, short_name(type_name)))
}

fn param_type_matches(pattern: &str, declared: &str, source: &dyn ClassSource) -> bool {
    type_name_matches(pattern, declared) || is_assignable_in(source, declared, pattern)
}

/// 按参数模式逐个位置匹配，`at` 给出单个位置的结果
fn match_params(
    patterns: &[ParamPattern],
    count: usize,
    mut at: impl FnMut(usize, &str) -> FuzzyMatch,
) -> FuzzyMatch {
    let mut check = |index: usize, pattern: &ParamPattern| match pattern {
        ParamPattern::Type(type_name) => at(index, type_name),
        _ => FuzzyMatch::Always,
    };
    match patterns.iter().position(|p| *p == ParamPattern::AnySequence) {
        None => {
            if patterns.len() != count {
                return FuzzyMatch::Never;
            }
            patterns
                .iter()
                .enumerate()
                .fold(FuzzyMatch::Always, |acc, (i, p)| acc.and(check(i, p)))
        }
        Some(split) => {
            let prefix = &patterns[..split];
            let suffix = &patterns[split + 1..];
            if prefix.len() + suffix.len() > count {
                return FuzzyMatch::Never;
            }
            let mut result = FuzzyMatch::Always;
            for (i, p) in prefix.iter().enumerate() {
                result = result.and(check(i, p));
            }
            let offset = count - suffix.len();
            for (j, p) in suffix.iter().enumerate() {
                result = result.and(check(offset + j, p));
            }
            result
        }
    }
}

fn method_annotated(method: &MethodDef, annotation_type: &str, class: ClassView<'_>) -> bool {
    let source = class.source();
    if MergedAnnotations::from_annotations(&method.annotations, source).is_present(annotation_type) {
        return true;
    }
    let specific = class.most_specific_method(method);
    MergedAnnotations::from_annotations(&specific.annotations, source).is_present(annotation_type)
}

fn evaluate(expr: &Expr, phase: Phase<'_>, class: ClassView<'_>) -> FuzzyMatch {
    match expr {
        Expr::And(l, r) => {
            let left = evaluate(l, phase, class);
            if left == FuzzyMatch::Never {
                return left;
            }
            left.and(evaluate(r, phase, class))
        }
        Expr::Or(l, r) => {
            let left = evaluate(l, phase, class);
            if left == FuzzyMatch::Always {
                return left;
            }
            left.or(evaluate(r, phase, class))
        }
        Expr::Not(inner) => evaluate(inner, phase, class).not(),
        Expr::Within(pattern) => FuzzyMatch::from_bool(pattern.matches(class)),
        Expr::AtWithin(annotation_type) => FuzzyMatch::from_bool(class.has_annotation(annotation_type)),
        Expr::Target(type_name) => FuzzyMatch::from_bool(class.is_assignable_to(type_name)),
        Expr::This(type_name) => {
            if class.is_assignable_to(type_name) {
                FuzzyMatch::Always
            } else if matches!(phase, Phase::Method { has_introductions: true, .. }) {
                // 代理可能通过引入实现该类型
                FuzzyMatch::Maybe
            } else {
                FuzzyMatch::Never
            }
        }
        Expr::Bean(pattern) => match phase {
            Phase::Class => match ProxyCreationContext::current_proxied_bean_name() {
                Some(name) => FuzzyMatch::from_bool(simple_match(pattern, &name)),
                None => FuzzyMatch::Maybe,
            },
            _ => FuzzyMatch::Maybe,
        },
        Expr::Execution(execution) => match phase.method() {
            Some(method) => evaluate_execution(execution, method, class),
            None => match &execution.declaring_type {
                // 类型模式不含子类型时可以在类型阶段排除
                Some(pattern) if !pattern.pattern().ends_with('+') => {
                    let declared = class
                        .all_methods()
                        .iter()
                        .any(|m| pattern.matches_name(&m.declaring_class));
                    if pattern.matches(class) || declared {
                        FuzzyMatch::Maybe
                    } else {
                        FuzzyMatch::Never
                    }
                }
                _ => FuzzyMatch::Maybe,
            },
        },
        Expr::AtAnnotation(annotation_type) => match phase.method() {
            Some(method) => FuzzyMatch::from_bool(method_annotated(method, annotation_type, class)),
            None => FuzzyMatch::Maybe,
        },
        Expr::Args(patterns) => match phase {
            Phase::Class => FuzzyMatch::Maybe,
            Phase::Method { method, .. } => match_params(patterns, method.parameter_types.len(), |i, pattern| {
                let declared = &method.parameter_types[i];
                if param_type_matches(pattern, declared, class.source()) {
                    FuzzyMatch::Always
                } else if is_erased_type(declared) {
                    FuzzyMatch::Maybe
                } else {
                    FuzzyMatch::Never
                }
            }),
            Phase::Runtime { method, args, arg_types } => {
                let count = if method.parameter_types.is_empty() {
                    args.len()
                } else {
                    method.parameter_types.len()
                };
                match_params(patterns, count, |i, pattern| {
                    let declared = method.parameter_types.get(i).map(String::as_str).unwrap_or("Any");
                    if param_type_matches(pattern, declared, class.source()) {
                        return FuzzyMatch::Always;
                    }
                    let actual = args
                        .get(i)
                        .and_then(|arg| arg_types.check(pattern, arg))
                        .unwrap_or(false);
                    FuzzyMatch::from_bool(is_erased_type(declared) && actual)
                })
            }
        },
    }
}

fn evaluate_execution(execution: &ExecutionPattern, method: &MethodDef, class: ClassView<'_>) -> FuzzyMatch {
    if execution.public_only && method.is_private {
        return FuzzyMatch::Never;
    }
    if !type_name_matches(&execution.return_type, &method.return_type) {
        return FuzzyMatch::Never;
    }
    if !simple_match(&execution.name, &method.name) {
        return FuzzyMatch::Never;
    }
    if let Some(pattern) = &execution.declaring_type {
        if !(pattern.matches(class) || pattern.matches_name(&method.declaring_class)) {
            return FuzzyMatch::Never;
        }
    }
    match_params(&execution.params, method.parameter_types.len(), |i, pattern| {
        FuzzyMatch::from_bool(type_name_matches(pattern, &method.parameter_types[i]))
    })
}

// ============================================================================
// 切点
// ============================================================================

type ShadowKey = (MethodKey, String, bool);

struct ExpressionMatcher {
    expression: String,
    aspect_class: Option<String>,
    root: Expr,
    runtime: bool,
    arg_types: Arc<ArgTypeRegistry>,
    shadow_matches: DashMap<ShadowKey, FuzzyMatch>,
    populate: Mutex<()>,
}

impl ExpressionMatcher {
    fn shadow_match(&self, method: &MethodDef, class: ClassView<'_>, has_introductions: bool) -> FuzzyMatch {
        let key: ShadowKey = (method.key(), class.name().to_string(), has_introductions);
        if let Some(cached) = self.shadow_matches.get(&key) {
            return *cached;
        }
        let _guard = self.populate.lock();
        if let Some(cached) = self.shadow_matches.get(&key) {
            return *cached;
        }
        let result = evaluate(&self.root, Phase::Method { method, has_introductions }, class);
        tracing::trace!(
            "Pointcut '{}' {:?} for {} on '{}'",
            self.expression,
            result,
            method,
            class.name()
        );
        self.shadow_matches.insert(key, result);
        result
    }
}

impl ClassFilter for ExpressionMatcher {
    fn matches(&self, class: ClassView<'_>) -> bool {
        evaluate(&self.root, Phase::Class, class).could_match()
    }
}

impl MethodMatcher for ExpressionMatcher {
    fn matches(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        self.shadow_match(method, class, false).could_match()
    }

    fn is_runtime(&self) -> bool {
        self.runtime
    }

    fn matches_runtime(&self, method: &MethodDef, class: ClassView<'_>, args: &[DynValue]) -> bool {
        let phase = Phase::Runtime {
            method,
            args,
            arg_types: &self.arg_types,
        };
        evaluate(&self.root, phase, class).could_match()
    }

    fn is_introduction_aware(&self) -> bool {
        true
    }

    fn matches_with_introductions(&self, method: &MethodDef, class: ClassView<'_>, has_introductions: bool) -> bool {
        self.shadow_match(method, class, has_introductions).could_match()
    }
}

/// AspectJ 风格表达式切点
///
/// 表达式在创建时解析，命名切点引用在解析时展开。
/// 静态匹配结果按 (方法, 类型) 缓存。
#[derive(Clone)]
pub struct AspectJExpressionPointcut {
    matcher: Arc<ExpressionMatcher>,
}

impl AspectJExpressionPointcut {
    /// `aspect_class`：未限定的命名切点在这个类型上查找
    pub fn new(expression: &str, aspect_class: Option<&str>, source: &dyn ClassSource) -> AopResult<Self> {
        Self::with_arg_types(expression, aspect_class, source, default_arg_types())
    }

    pub fn with_arg_types(
        expression: &str,
        aspect_class: Option<&str>,
        source: &dyn ClassSource,
        arg_types: Arc<ArgTypeRegistry>,
    ) -> AopResult<Self> {
        let context = ParseContext {
            source,
            resolving: RefCell::new(Vec::new()),
        };
        let root = Parser::new(expression, aspect_class.map(String::from), &context).parse()?;
        let runtime = root.has_runtime_tests();
        Ok(Self {
            matcher: Arc::new(ExpressionMatcher {
                expression: expression.to_string(),
                aspect_class: aspect_class.map(String::from),
                root,
                runtime,
                arg_types,
                shadow_matches: DashMap::new(),
                populate: Mutex::new(()),
            }),
        })
    }

    pub fn expression(&self) -> &str {
        &self.matcher.expression
    }

    pub fn aspect_class(&self) -> Option<&str> {
        self.matcher.aspect_class.as_deref()
    }

    pub fn is_runtime(&self) -> bool {
        self.matcher.runtime
    }

    pub fn could_match_class(&self, class: ClassView<'_>) -> bool {
        ClassFilter::matches(&*self.matcher, class)
    }

    pub fn matches_method(&self, method: &MethodDef, class: ClassView<'_>) -> bool {
        MethodMatcher::matches(&*self.matcher, method, class)
    }

    pub fn shadow_match(&self, method: &MethodDef, class: ClassView<'_>) -> FuzzyMatch {
        self.matcher.shadow_match(method, class, false)
    }

    pub fn cached_shadow_matches(&self) -> usize {
        self.matcher.shadow_matches.len()
    }
}

impl Pointcut for AspectJExpressionPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.matcher) as Arc<dyn ClassFilter>
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.matcher) as Arc<dyn MethodMatcher>
    }
}

impl fmt::Debug for AspectJExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectJExpressionPointcut")
            .field("expression", &self.matcher.expression)
            .field("aspect_class", &self.matcher.aspect_class)
            .finish()
    }
}

impl fmt::Display for AspectJExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AspectJExpressionPointcut: {}", self.matcher.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{Annotation, ClassDef, ClassRegistry};

    fn registry() -> ClassRegistry {
        let registry = ClassRegistry::new();
        registry.register(ClassDef::annotation_type("app::Audited"));
        registry.register(ClassDef::interface("app::Repository").method(MethodDef::new("save").param("entity", "Any")));
        registry.register(
            ClassDef::new("app::service::OrderService")
                .method(MethodDef::new("place_order").param("id", "i64").returns("bool"))
                .method(
                    MethodDef::new("cancel")
                        .param("id", "i64")
                        .param("reason", "String")
                        .annotated(Annotation::new("app::Audited")),
                )
                .method(MethodDef::new("helper").private()),
        );
        registry.register(
            ClassDef::new("app::repo::OrderRepository")
                .implements("app::Repository")
                .annotated(Annotation::new("app::Audited"))
                .method(MethodDef::new("save").param("entity", "Any")),
        );
        registry.register(
            ClassDef::new("app::Pointcuts")
                .method(MethodDef::new("service").annotated(Annotation::new(POINTCUT).value("within(app::service::*)")))
                .method(MethodDef::new("audited").annotated(
                    Annotation::new(POINTCUT).value("service() && @annotation(app::Audited)"),
                ))
                .method(MethodDef::new("loop_a").annotated(Annotation::new(POINTCUT).value("loop_b()")))
                .method(MethodDef::new("loop_b").annotated(Annotation::new(POINTCUT).value("loop_a()"))),
        );
        registry
    }

    fn check(expression: &str, class: &str, method: &str) -> bool {
        let registry = registry();
        let pointcut = AspectJExpressionPointcut::new(expression, Some("app::Pointcuts"), &registry).unwrap();
        let def = registry.get(class).unwrap();
        let view = ClassView::new(&def, &registry);
        let method = def.methods.iter().find(|m| m.name == method).unwrap().clone();
        pointcut.could_match_class(view) && pointcut.matches_method(&method, view)
    }

    #[test]
    fn test_execution() {
        assert!(check("execution(* app::service::*Service::*(..))", "app::service::OrderService", "place_order"));
        assert!(check("execution(bool place_*(i64))", "app::service::OrderService", "place_order"));
        assert!(!check("execution(bool place_*())", "app::service::OrderService", "place_order"));
        assert!(check("execution(* *(.., String))", "app::service::OrderService", "cancel"));
        assert!(!check("execution(public * *(..))", "app::service::OrderService", "helper"));
        assert!(!check("execution(* app::repo::*::*(..))", "app::service::OrderService", "cancel"));
    }

    #[test]
    fn test_combinators_and_annotations() {
        assert!(check("within(app::service::*) && @annotation(app::Audited)", "app::service::OrderService", "cancel"));
        assert!(!check("within(app::service::*) and not @annotation(app::Audited)", "app::service::OrderService", "cancel"));
        assert!(check("@within(app::Audited) || within(app::service::*)", "app::repo::OrderRepository", "save"));
        assert!(check("target(app::Repository)", "app::repo::OrderRepository", "save"));
        assert!(check("within(app::Repository+)", "app::repo::OrderRepository", "save"));
    }

    #[test]
    fn test_named_references() {
        assert!(check("audited()", "app::service::OrderService", "cancel"));
        assert!(!check("audited()", "app::service::OrderService", "place_order"));
        assert!(check("app::Pointcuts::service()", "app::service::OrderService", "place_order"));

        let registry = registry();
        let err = AspectJExpressionPointcut::new("loop_a()", Some("app::Pointcuts"), &registry).unwrap_err();
        assert!(err.to_string().contains("circular pointcut reference"));
        assert!(AspectJExpressionPointcut::new("missing()", Some("app::Pointcuts"), &registry).is_err());
    }

    #[test]
    fn test_parse_errors() {
        let registry = registry();
        for expression in ["execution(* *(..)", "within()", "foo(bar)", "execution(*)", "args(.., ..)"] {
            assert!(
                AspectJExpressionPointcut::new(expression, None, &registry).is_err(),
                "{}",
                expression
            );
        }
    }

    #[test]
    fn test_args_on_erased_parameter_is_runtime() {
        let registry = registry();
        let pointcut = AspectJExpressionPointcut::new("args(String)", None, &registry).unwrap();
        assert!(pointcut.is_runtime());

        let def = registry.get("app::repo::OrderRepository").unwrap();
        let view = ClassView::new(&def, &registry);
        let save = def.methods[0].clone();
        assert_eq!(pointcut.shadow_match(&save, view), FuzzyMatch::Maybe);

        let matcher = pointcut.method_matcher();
        let text: DynValue = Arc::new("order".to_string());
        let number: DynValue = Arc::new(7_i32);
        assert!(matcher.matches_runtime(&save, view, &[text]));
        assert!(!matcher.matches_runtime(&save, view, &[number]));
    }

    #[test]
    fn test_bean_designator_uses_creation_context() {
        let registry = registry();
        let pointcut = AspectJExpressionPointcut::new("bean(order*)", None, &registry).unwrap();
        let def = registry.get("app::service::OrderService").unwrap();
        let view = ClassView::new(&def, &registry);

        assert!(pointcut.could_match_class(view));
        {
            let _context = ProxyCreationContext::enter("orderService");
            assert!(pointcut.could_match_class(view));
        }
        let _context = ProxyCreationContext::enter("paymentService");
        assert!(!pointcut.could_match_class(view));
    }

    #[test]
    fn test_shadow_matches_cached() {
        let registry = registry();
        let pointcut = AspectJExpressionPointcut::new("execution(* *(..))", None, &registry).unwrap();
        let def = registry.get("app::service::OrderService").unwrap();
        let view = ClassView::new(&def, &registry);
        for method in &def.methods {
            pointcut.matches_method(method, view);
            pointcut.matches_method(method, view);
        }
        assert_eq!(pointcut.cached_shadow_matches(), def.methods.len());
    }
}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 标量值的字符串形式，数组以逗号连接
    pub fn to_property_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Array(values) => Some(
                values
                    .iter()
                    .filter_map(ConfigValue::to_property_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ConfigValue::Object(_) => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 组合配置源返回自身，用于同名配置源的合并
    fn as_composite(&self) -> Option<&CompositePropertySource> {
        None
    }
}

impl fmt::Debug for dyn PropertySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertySource({})", self.name())
    }
}

/// 有序的配置源列表，靠前的优先
#[derive(Default)]
pub struct MutablePropertySources {
    sources: RwLock<Vec<Arc<dyn PropertySource>>>,
}

impl fmt::Debug for MutablePropertySources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl MutablePropertySources {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_existing(sources: &mut Vec<Arc<dyn PropertySource>>, name: &str) {
        sources.retain(|s| s.name() != name);
    }

    fn index_of(sources: &[Arc<dyn PropertySource>], name: &str) -> ContainerResult<usize> {
        sources
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| {
                ContainerError::IllegalState(format!("PropertySource named '{}' does not exist", name))
            })
    }

    pub fn add_first(&self, source: Arc<dyn PropertySource>) {
        let mut sources = self.sources.write();
        Self::remove_existing(&mut sources, source.name());
        sources.insert(0, source);
    }

    pub fn add_last(&self, source: Arc<dyn PropertySource>) {
        let mut sources = self.sources.write();
        Self::remove_existing(&mut sources, source.name());
        sources.push(source);
    }

    pub fn add_before(&self, relative: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        if relative == source.name() {
            return Err(ContainerError::IllegalState(format!(
                "PropertySource named '{}' cannot be added relative to itself",
                relative
            )));
        }
        let mut sources = self.sources.write();
        Self::remove_existing(&mut sources, source.name());
        let index = Self::index_of(&sources, relative)?;
        sources.insert(index, source);
        Ok(())
    }

    pub fn add_after(&self, relative: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        if relative == source.name() {
            return Err(ContainerError::IllegalState(format!(
                "PropertySource named '{}' cannot be added relative to itself",
                relative
            )));
        }
        let mut sources = self.sources.write();
        Self::remove_existing(&mut sources, source.name());
        let index = Self::index_of(&sources, relative)?;
        sources.insert(index + 1, source);
        Ok(())
    }

    /// 原位替换同名配置源
    pub fn replace(&self, name: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        let mut sources = self.sources.write();
        let index = Self::index_of(&sources, name)?;
        sources[index] = source;
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn PropertySource>> {
        let mut sources = self.sources.write();
        let index = sources.iter().position(|s| s.name() == name)?;
        Some(sources.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PropertySource>> {
        self.sources.read().iter().find(|s| s.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.read().iter().any(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.read().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// 当前顺序的快照
    pub fn snapshot(&self) -> Vec<Arc<dyn PropertySource>> {
        self.sources.read().clone()
    }
}

/// 激活 profile 的配置键
pub const ACTIVE_PROFILES_PROPERTY: &str = "chimera.profiles.active";

/// 默认 profile 的配置键
pub const DEFAULT_PROFILES_PROPERTY: &str = "chimera.profiles.default";

/// Environment - 配置管理器
///
/// 类似 Spring 的 Environment：有序的配置源、profile 与 `${key:default}` 占位符解析
pub struct Environment {
    /// 配置源列表（靠前的优先）
    property_sources: MutablePropertySources,

    /// 显式设置的激活 profile
    active_profiles: RwLock<Option<Vec<String>>>,

    /// 默认 profile（没有激活 profile 时生效）
    default_profiles: RwLock<Vec<String>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &self.get_active_profiles())
            .field("property_sources", &self.property_sources)
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            property_sources: MutablePropertySources::new(),
            active_profiles: RwLock::new(None),
            default_profiles: RwLock::new(vec!["default".to_string()]),
        }
    }

    pub fn property_sources(&self) -> &MutablePropertySources {
        &self.property_sources
    }

    /// 添加配置源（最低优先级）
    pub fn add_property_source(&self, source: impl PropertySource + 'static) {
        self.property_sources.add_last(Arc::new(source));
    }

    /// 获取配置值（原始值，不解析占位符）
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        for source in self.property_sources.snapshot() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 获取字符串配置，解析其中的占位符（无法解析的占位符保持原样）
    pub fn get_property(&self, key: &str) -> Option<String> {
        let raw = self.get(key)?.to_property_string()?;
        Some(self.resolve_placeholders(&raw))
    }

    /// 获取字符串配置（必需）
    pub fn get_required_property(&self, key: &str) -> ContainerResult<String> {
        let raw = self
            .get(key)
            .and_then(|v| v.to_property_string())
            .ok_or_else(|| ContainerError::IllegalState(format!("Required key '{}' not found", key)))?;
        self.resolve_required_placeholders(&raw)
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_property(key)
    }

    /// 获取字符串配置（带默认值）
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 获取整数配置（带默认值）
    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    /// 获取布尔值配置
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| match v {
            ConfigValue::String(s) => ConfigValue::String(self.resolve_placeholders(&s)).as_bool(),
            other => other.as_bool(),
        })
    }

    /// 获取布尔值配置（带默认值）
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 获取字符串数组配置
    /// 支持两种格式:
    /// 1. TOML数组: key = ["a", "b", "c"]
    /// 2. 逗号分隔字符串: key = "a, b, c"
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(
                arr.iter()
                    .filter_map(|v| v.to_property_string())
                    .map(|s| self.resolve_placeholders(&s))
                    .collect(),
            ),
            ConfigValue::String(s) => Some(split_comma_list(&self.resolve_placeholders(&s))),
            _ => None,
        }
    }

    /// 解析占位符，无法解析的保持原样
    pub fn resolve_placeholders(&self, text: &str) -> String {
        let mut visiting = HashSet::new();
        match self.parse_placeholders(text, true, &mut visiting) {
            Ok(resolved) => resolved,
            Err(_) => text.to_string(),
        }
    }

    /// 解析占位符，任何无法解析的占位符都是错误
    pub fn resolve_required_placeholders(&self, text: &str) -> ContainerResult<String> {
        let mut visiting = HashSet::new();
        self.parse_placeholders(text, false, &mut visiting)
    }

    fn parse_placeholders(
        &self,
        text: &str,
        ignore_unresolvable: bool,
        visiting: &mut HashSet<String>,
    ) -> ContainerResult<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = find_placeholder_end(after) else {
                // 没有闭合的占位符按字面量处理
                result.push_str(&rest[start..]);
                return Ok(result);
            };
            let inner = &after[..end];
            let original = &rest[start..start + 2 + end + 1];

            // 先解析嵌套的占位符（例如 ${a.${b}}）
            let key_expr = self.parse_placeholders(inner, ignore_unresolvable, visiting)?;
            let (key, default) = split_default(&key_expr);

            if !visiting.insert(key.to_string()) {
                return Err(ContainerError::IllegalState(format!(
                    "Circular placeholder reference '{}' in property definitions",
                    key
                )));
            }
            let value = self.get(key).and_then(|v| v.to_property_string());
            let resolved = match (value, default) {
                (Some(value), _) => Some(self.parse_placeholders(&value, ignore_unresolvable, visiting)?),
                (None, Some(default)) => {
                    Some(self.parse_placeholders(default, ignore_unresolvable, visiting)?)
                }
                (None, None) => None,
            };
            visiting.remove(key);

            match resolved {
                Some(resolved) => result.push_str(&resolved),
                None if ignore_unresolvable => result.push_str(original),
                None => {
                    return Err(ContainerError::UnresolvablePlaceholder {
                        placeholder: key.to_string(),
                        value: text.to_string(),
                    })
                }
            }
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    /// 设置激活的 profile
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = Some(profiles);
    }

    /// 追加激活的 profile
    pub fn add_active_profile(&self, profile: impl Into<String>) {
        let mut current = self.get_active_profiles();
        current.push(profile.into());
        *self.active_profiles.write() = Some(current);
    }

    /// 获取激活的 profile（未显式设置时读取 `chimera.profiles.active`）
    pub fn get_active_profiles(&self) -> Vec<String> {
        if let Some(profiles) = self.active_profiles.read().as_ref() {
            return profiles.clone();
        }
        self.get_string_array(ACTIVE_PROFILES_PROPERTY)
            .unwrap_or_default()
    }

    pub fn set_default_profiles(&self, profiles: Vec<String>) {
        *self.default_profiles.write() = profiles;
    }

    pub fn get_default_profiles(&self) -> Vec<String> {
        self.get_string_array(DEFAULT_PROFILES_PROPERTY)
            .unwrap_or_else(|| self.default_profiles.read().clone())
    }

    fn is_profile_active(&self, profile: &str) -> bool {
        let active = self.get_active_profiles();
        if active.iter().any(|p| p == profile) {
            return true;
        }
        active.is_empty() && self.get_default_profiles().iter().any(|p| p == profile)
    }

    /// 任意一个 profile 匹配即可，`!name` 表示该 profile 未激活
    pub fn accepts_profiles(&self, profiles: &[&str]) -> bool {
        profiles.iter().any(|profile| {
            let profile = profile.trim();
            match profile.strip_prefix('!') {
                Some(negated) => !self.is_profile_active(negated.trim()),
                None => self.is_profile_active(profile),
            }
        })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn split_comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `after` 从 "${" 之后开始，返回与之匹配的 "}" 的位置
fn find_placeholder_end(after: &str) -> Option<usize> {
    let bytes = after.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}

fn split_default(expr: &str) -> (&str, Option<&str>) {
    match expr.find(':') {
        Some(idx) => (&expr[..idx], Some(&expr[idx + 1..])),
        None => (expr, None),
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "systemEnvironment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }
}

/// TOML 配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ContainerError::Resource {
            location: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path.display().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let name = name.into();
        let value: toml::Value = toml::from_str(content).map_err(|e| ContainerError::Resource {
            location: name.clone(),
            message: format!("Failed to parse TOML: {}", e),
        })?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);
        Ok(Self { name, properties })
    }

    /// 展平 TOML 结构
    /// 例如: { database: { url: "xxx" } } -> { "database.url": "xxx" }
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    /// 转换 TOML 值为 ConfigValue
    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => {
                ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// `key=value` / `key: value` 文本配置源
pub struct PropertiesPropertySource {
    name: String,
    properties: BTreeMap<String, String>,
}

impl PropertiesPropertySource {
    pub fn parse(content: &str, name: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let separator = line.find(['=', ':']);
            let (key, value) = match separator {
                Some(idx) => (line[..idx].trim(), line[idx + 1..].trim()),
                None => (line, ""),
            };
            properties.insert(key.to_string(), value.to_string());
        }
        Self {
            name: name.into(),
            properties,
        }
    }
}

impl PropertySource for PropertiesPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned().map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// 组合配置源：按顺序查找内部配置源
pub struct CompositePropertySource {
    name: String,
    sources: RwLock<Vec<Arc<dyn PropertySource>>>,
}

impl CompositePropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 追加到末尾（最低优先级）
    pub fn add_property_source(&self, source: Arc<dyn PropertySource>) {
        self.sources.write().push(source);
    }

    /// 插入到开头（最高优先级）
    pub fn add_first_property_source(&self, source: Arc<dyn PropertySource>) {
        self.sources.write().insert(0, source);
    }

    pub fn property_sources(&self) -> Vec<Arc<dyn PropertySource>> {
        self.sources.read().clone()
    }
}

impl PropertySource for CompositePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.sources.read().iter().find_map(|s| s.get(key))
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for source in self.sources.read().iter() {
            for key in source.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn as_composite(&self) -> Option<&CompositePropertySource> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        let env = Environment::new();
        env.add_property_source(
            MapPropertySource::new("first")
                .with_property("app.name", "chimera")
                .with_property("app.greeting", "hello ${app.name}")
                .with_property("app.port", 8080i64)
                .with_property("flag", "${missing:true}"),
        );
        env.add_property_source(
            MapPropertySource::new("second")
                .with_property("app.name", "shadowed")
                .with_property("app.other", "second"),
        );
        env
    }

    #[test]
    fn test_first_source_wins() {
        let env = env();
        assert_eq!(env.get_string("app.name").as_deref(), Some("chimera"));
        assert_eq!(env.get_string("app.other").as_deref(), Some("second"));
        assert_eq!(env.get_i64_or("app.port", 0), 8080);
    }

    #[test]
    fn test_placeholders() {
        let env = env();
        assert_eq!(env.get_property("app.greeting").as_deref(), Some("hello chimera"));
        assert_eq!(env.resolve_placeholders("${nope}/x"), "${nope}/x");
        assert_eq!(env.resolve_placeholders("${nope:fallback}"), "fallback");
        assert_eq!(env.resolve_placeholders("${app.${key:name}}"), "chimera");
        assert!(env.get_bool_or("flag", false));
        assert!(matches!(
            env.resolve_required_placeholders("${nope}"),
            Err(ContainerError::UnresolvablePlaceholder { .. })
        ));
    }

    #[test]
    fn test_ordering_operations() {
        let sources = MutablePropertySources::new();
        sources.add_last(Arc::new(MapPropertySource::new("a")));
        sources.add_last(Arc::new(MapPropertySource::new("c")));
        sources.add_before("c", Arc::new(MapPropertySource::new("b"))).unwrap();
        sources.add_first(Arc::new(MapPropertySource::new("z")));
        assert_eq!(sources.names(), vec!["z", "a", "b", "c"]);

        sources.add_after("z", Arc::new(MapPropertySource::new("c"))).unwrap();
        assert_eq!(sources.names(), vec!["z", "c", "a", "b"]);
        assert!(sources.add_before("missing", Arc::new(MapPropertySource::new("q"))).is_err());
        assert!(sources.remove("a").is_some());
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn test_profiles() {
        let env = Environment::new();
        assert!(env.accepts_profiles(&["default"]));
        env.set_active_profiles(vec!["dev".to_string()]);
        assert!(env.accepts_profiles(&["dev"]));
        assert!(!env.accepts_profiles(&["default"]));
        assert!(env.accepts_profiles(&["!prod"]));
        assert!(!env.accepts_profiles(&["prod", "!dev"]));
    }

    #[test]
    fn test_profiles_from_property() {
        let env = Environment::new();
        env.add_property_source(
            MapPropertySource::new("props").with_property(ACTIVE_PROFILES_PROPERTY, "a, b"),
        );
        assert_eq!(env.get_active_profiles(), vec!["a", "b"]);
    }

    #[test]
    fn test_toml_and_properties_sources() {
        let toml = TomlPropertySource::parse("[server]\nport = 9000\nhosts = [\"a\", \"b\"]", "t").unwrap();
        assert_eq!(toml.get("server.port"), Some(ConfigValue::Int(9000)));
        assert_eq!(
            toml.get("server.hosts").and_then(|v| v.to_property_string()).as_deref(),
            Some("a,b")
        );

        let props = PropertiesPropertySource::parse("# comment\na=1\nb: two\n", "p");
        assert_eq!(props.get("b").and_then(|v| v.as_str().map(String::from)).as_deref(), Some("two"));
        assert_eq!(props.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_composite() {
        let composite = CompositePropertySource::new("c");
        composite.add_property_source(Arc::new(MapPropertySource::new("x").with_property("k", "x")));
        composite.add_property_source(Arc::new(MapPropertySource::new("y").with_property("k", "y")));
        assert_eq!(composite.get("k"), Some(ConfigValue::from("x")));
        assert!(composite.as_composite().is_some());
    }
}

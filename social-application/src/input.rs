//! 请求输入与过滤链
//!
//! 一次请求的参数集合（`RequestInput`）以及读取时套用的过滤链（`FilterChain`）。
//! 过滤链相当于按注册顺序执行的 `validate:input` 钩子，默认只含去除 HTML 标签的过滤器。
//!
use crate::error::{AppError, AppResult};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// 单个请求参数的取值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Text(String),
    List(Vec<InputValue>),
    Map(BTreeMap<String, InputValue>),
}

impl InputValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 展开为文本列表：单值视为只有一项的列表
    pub fn texts(&self) -> Vec<&str> {
        match self {
            InputValue::Text(s) => vec![s.as_str()],
            InputValue::List(items) => items.iter().flat_map(|v| v.texts()).collect(),
            InputValue::Map(map) => map.values().flat_map(|v| v.texts()).collect(),
        }
    }

    /// 非空且不为 `"0"`/`"false"` 即为真
    pub fn is_truthy(&self) -> bool {
        match self {
            InputValue::Text(s) => {
                let s = s.trim();
                !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
            }
            InputValue::List(items) => !items.is_empty(),
            InputValue::Map(map) => !map.is_empty(),
        }
    }

    /// 对每个文本叶子应用 `f`
    pub fn map_text(self, f: &impl Fn(String) -> String) -> Self {
        match self {
            InputValue::Text(s) => InputValue::Text(f(s)),
            InputValue::List(items) => {
                InputValue::List(items.into_iter().map(|v| v.map_text(f)).collect())
            }
            InputValue::Map(map) => {
                InputValue::Map(map.into_iter().map(|(k, v)| (k, v.map_text(f))).collect())
            }
        }
    }

    pub fn trimmed(self) -> Self {
        self.map_text(&|s| s.trim().to_string())
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl From<Vec<&str>> for InputValue {
    fn from(value: Vec<&str>) -> Self {
        InputValue::List(value.into_iter().map(InputValue::from).collect())
    }
}

/// 原始请求参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInput {
    params: BTreeMap<String, InputValue>,
}

impl RequestInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析 `a=1&b=2` 形式的查询串
    ///
    /// 以 `[]` 结尾的键累积为列表（`match_on[]=users&match_on[]=groups`），
    /// 普通键重复出现时后者覆盖前者。
    pub fn from_query(query: &str) -> AppResult<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| AppError::BadRequest(format!("malformed query string: {e}")))?;
        let mut input = Self::new();
        for (key, value) in pairs {
            match key.strip_suffix("[]") {
                Some(list_key) => input.push(list_key, value),
                None => input.insert(key, value),
            }
        }
        Ok(input)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<InputValue>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 向列表参数追加一项
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<InputValue>) {
        let value = value.into();
        match self.params.entry(key.into()).or_insert_with(|| InputValue::List(Vec::new())) {
            InputValue::List(items) => items.push(value),
            other => *other = InputValue::List(vec![other.clone(), value]),
        }
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.params.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// 输入过滤器
pub trait InputFilter: Send + Sync {
    fn name(&self) -> &str;

    fn filter(&self, value: InputValue) -> InputValue;
}

/// 有序过滤链
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn InputFilter>>,
}

impl FilterChain {
    /// 不含任何过滤器的链
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn with(mut self, filter: Arc<dyn InputFilter>) -> Self {
        self.register(filter);
        self
    }

    pub fn register(&mut self, filter: Arc<dyn InputFilter>) {
        self.filters.push(filter);
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn apply(&self, value: InputValue) -> InputValue {
        self.filters.iter().fold(value, |v, f| f.filter(v))
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::empty().with(Arc::new(StripTagsFilter))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// 去除 HTML 标签的默认过滤器
#[derive(Debug, Clone, Copy, Default)]
pub struct StripTagsFilter;

impl InputFilter for StripTagsFilter {
    fn name(&self) -> &str {
        "strip_tags"
    }

    fn filter(&self, value: InputValue) -> InputValue {
        value.map_text(&|s| strip_tags(&s))
    }
}

/// 去除 HTML 标签与注释
///
/// 只有 `<` 后紧跟字母、`/`、`!` 或 `?` 时才视为标签开始，
/// 因此 `a < b` 这样的文本保持原样。未闭合的标签一直丢弃到文本末尾。
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let opens_tag = chars
            .peek()
            .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'));
        if !opens_tag {
            out.push(c);
            continue;
        }
        let mut quote: Option<char> = None;
        for t in chars.by_ref() {
            match (quote, t) {
                (None, '"' | '\'') => quote = Some(t),
                (Some(q), t) if t == q => quote = None,
                (None, '>') => break,
                _ => {}
            }
        }
    }
    out
}

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
    )
    .ok()
});

/// 校验邮箱地址；首尾带空白的地址不合法
pub fn is_email_address(address: &str) -> bool {
    if address.len() > 254 {
        return false;
    }
    let Some((local, _)) = address.rsplit_once('@') else {
        return false;
    };
    if local.len() > 64 {
        return false;
    }
    EMAIL.as_ref().is_some_and(|re| re.is_match(address))
}

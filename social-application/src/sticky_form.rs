//! 表单暂存（sticky form）
//!
//! 表单提交校验失败时，把本次请求的参数以 `{form: {field: value}}` 的 JSON
//! 存入单个 Cookie，回到表单页面时再读出来回填。读取默认经过输入过滤链。
//!
//! Cookie 内容无法解析时视为空，不会报错。
//!
use crate::client_state::{ClientCookie, CookieJar};
use crate::config::StickyConfig;
use crate::input::{FilterChain, InputValue, RequestInput};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

type StickyState = BTreeMap<String, BTreeMap<String, InputValue>>;

#[derive(Debug, Clone, Default)]
pub struct StickyForms {
    config: StickyConfig,
}

impl StickyForms {
    pub fn new(config: StickyConfig) -> Self {
        Self { config }
    }

    fn read(&self, jar: &CookieJar) -> StickyState {
        let Some(raw) = jar.get(&self.config.cookie_name) else {
            return StickyState::new();
        };
        serde_json::from_str(raw).unwrap_or_else(|err| {
            warn!(cookie = %self.config.cookie_name, error = %err, "discarding unreadable sticky state");
            StickyState::new()
        })
    }

    fn write(&self, jar: &mut CookieJar, state: &StickyState, ttl_secs: i64) {
        // BTreeMap 的序列化不会失败
        let value = serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string());
        jar.set(ClientCookie {
            name: self.config.cookie_name.clone(),
            value,
            path: self.config.path.clone(),
            expires: Utc::now() + Duration::seconds(ttl_secs),
        });
    }

    /// 把本次请求的全部参数暂存到 `form` 下
    pub fn make(&self, jar: &mut CookieJar, form: &str, input: &RequestInput) {
        self.clear(jar, form);
        let mut state = self.read(jar);
        let fields = input
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        state.insert(form.to_string(), fields);
        self.write(jar, &state, self.config.ttl_secs);
        debug!(form, fields = input.len(), "sticky form saved");
    }

    /// 清除整张表单
    pub fn clear(&self, jar: &mut CookieJar, form: &str) {
        let mut state = self.read(jar);
        state.remove(form);
        self.write(jar, &state, self.config.clear_ttl_secs);
    }

    pub fn is_sticky(&self, jar: &CookieJar, form: &str) -> bool {
        self.read(jar).contains_key(form)
    }

    /// 读取单个字段；`filters` 为空时返回原值
    pub fn get_value(
        &self,
        jar: &CookieJar,
        filters: Option<&FilterChain>,
        form: &str,
        field: &str,
    ) -> Option<InputValue> {
        let value = self.read(jar).remove(form)?.remove(field)?;
        Some(match filters {
            Some(chain) => chain.apply(value),
            None => value,
        })
    }

    /// 读取整张表单；表单未暂存时返回 `None`
    pub fn get_values(
        &self,
        jar: &CookieJar,
        filters: Option<&FilterChain>,
        form: &str,
    ) -> Option<BTreeMap<String, InputValue>> {
        let values = self.read(jar).remove(form)?;
        Some(match filters {
            Some(chain) => values
                .into_iter()
                .map(|(k, v)| (k, chain.apply(v)))
                .collect(),
            None => values,
        })
    }

    /// 清除单个字段
    ///
    /// 写回的 Cookie 以负偏移过期，客户端会丢弃整个暂存状态。
    pub fn clear_value(&self, jar: &mut CookieJar, form: &str, field: &str) {
        let mut state = self.read(jar);
        if let Some(fields) = state.get_mut(form) {
            fields.remove(field);
        }
        self.write(jar, &state, self.config.clear_value_offset_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> RequestInput {
        RequestInput::new()
            .with("title", "<b>Hello</b>")
            .with("tags", vec!["rust", "elgg"])
    }

    #[test]
    fn make_then_read_back_filtered() {
        let sticky = StickyForms::default();
        let mut jar = CookieJar::new();
        sticky.make(&mut jar, "blog", &submitted());

        assert!(sticky.is_sticky(&jar, "blog"));
        assert!(!sticky.is_sticky(&jar, "other"));

        let chain = FilterChain::default();
        assert_eq!(
            sticky.get_value(&jar, Some(&chain), "blog", "title"),
            Some(InputValue::from("Hello"))
        );
        assert_eq!(
            sticky.get_value(&jar, None, "blog", "title"),
            Some(InputValue::from("<b>Hello</b>"))
        );
        assert_eq!(sticky.get_value(&jar, None, "blog", "missing"), None);

        let values = sticky.get_values(&jar, Some(&chain), "blog").unwrap();
        assert_eq!(values.len(), 2);
        assert!(sticky.get_values(&jar, None, "other").is_none());
    }

    #[test]
    fn cookie_expiries() {
        let sticky = StickyForms::default();
        let mut jar = CookieJar::new();
        let now = Utc::now();

        sticky.make(&mut jar, "blog", &submitted());
        let made = jar.outgoing().last().unwrap().clone();
        assert_eq!(made.name, "mindsStickyForm");
        assert_eq!(made.path, "/");
        let ttl = (made.expires - now).num_seconds();
        assert!((216_000 - 5..=216_000 + 5).contains(&ttl));

        sticky.clear(&mut jar, "blog");
        let cleared = jar.outgoing().last().unwrap().clone();
        let ttl = (cleared.expires - now).num_seconds();
        assert!((55..=65).contains(&ttl));
        assert!(!sticky.is_sticky(&jar, "blog"));
    }

    #[test]
    fn clearing_a_value_expires_the_cookie() {
        let sticky = StickyForms::default();
        let mut jar = CookieJar::new();
        sticky.make(&mut jar, "blog", &submitted());
        sticky.make(&mut jar, "profile", &RequestInput::new().with("name", "Ann"));

        sticky.clear_value(&mut jar, "blog", "title");
        let last = jar.outgoing().last().unwrap();
        assert!(last.expires < Utc::now());
        assert!(last.value.contains("profile"));
        assert!(!last.value.contains("Hello"));
        assert!(!sticky.is_sticky(&jar, "profile"));
    }

    #[test]
    fn forms_are_kept_side_by_side() {
        let sticky = StickyForms::default();
        let mut jar = CookieJar::new();
        sticky.make(&mut jar, "blog", &submitted());
        sticky.make(&mut jar, "profile", &RequestInput::new().with("name", "Ann"));
        assert!(sticky.is_sticky(&jar, "blog"));
        assert!(sticky.is_sticky(&jar, "profile"));

        sticky.clear(&mut jar, "blog");
        assert!(!sticky.is_sticky(&jar, "blog"));
        assert!(sticky.is_sticky(&jar, "profile"));
    }

    #[test]
    fn unreadable_cookie_is_treated_as_empty() {
        let sticky = StickyForms::default();
        let jar = CookieJar::new().with_cookie("mindsStickyForm", "not json");
        assert!(!sticky.is_sticky(&jar, "blog"));
        assert!(sticky.get_values(&jar, None, "blog").is_none());
    }
}

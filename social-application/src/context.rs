use crate::client_state::CookieJar;
use crate::input::{FilterChain, InputValue, RequestInput};
use bon::Builder;
use social_domain::access::Viewer;
use social_domain::domain_event::BusinessContext;
use std::collections::BTreeMap;

/// 请求上下文（Request Context）
///
/// 承载一次请求所需的全部横切信息，显式传给命令/查询处理器，取代全局状态：
/// - 访问者（`viewer`）：匿名访问者没有 GUID；
/// - 请求参数（`input`）与读取时套用的过滤链（`filters`）；
/// - 通过 `set_input` 写入的覆盖值，优先于原始参数；
/// - 客户端 Cookie（`cookies`），表单暂存读写于此；
/// - 业务语境（`biz`）：关联追踪、因果链、执行者，随领域事件一起发布。
///
/// 典型用法：
/// ```rust
/// use social_application::context::RequestContext;
/// use social_application::input::{InputValue, RequestInput};
/// use social_domain::access::Viewer;
/// use social_domain::value_object::Guid;
///
/// let mut ctx = RequestContext::builder()
///     .viewer(Viewer::user(Guid::new(7)))
///     .input(RequestInput::new().with("q", "  <b>ann</b> "))
///     .build();
/// assert_eq!(ctx.get_input("q"), Some(InputValue::from("ann")));
///
/// ctx.set_input("q", " bob ");
/// assert_eq!(ctx.get_input("q"), Some(InputValue::from("bob")));
/// ```
#[derive(Builder, Clone, Debug, Default)]
pub struct RequestContext {
    #[builder(default)]
    pub viewer: Viewer,
    #[builder(default)]
    pub input: RequestInput,
    #[builder(default)]
    pub filters: FilterChain,
    #[builder(default)]
    pub cookies: CookieJar,
    #[builder(default)]
    pub biz: BusinessContext,
    #[builder(skip)]
    overrides: BTreeMap<String, InputValue>,
}

impl RequestContext {
    /// 读取参数：覆盖值优先，其次为去除首尾空白的原始参数，结果经过过滤链
    pub fn get_input(&self, name: &str) -> Option<InputValue> {
        self.get_input_raw(name).map(|v| self.filters.apply(v))
    }

    /// 同 `get_input`，但不经过过滤链
    pub fn get_input_raw(&self, name: &str) -> Option<InputValue> {
        if let Some(v) = self.overrides.get(name) {
            return Some(v.clone());
        }
        self.input.get(name).map(|v| match v {
            InputValue::Text(s) => InputValue::Text(s.trim().to_string()),
            other => other.clone(),
        })
    }

    /// 读取文本参数；空字符串视为缺失
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get_input(name)
            .and_then(|v| v.as_text().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    /// 设置覆盖值；名称与取值都去除首尾空白
    pub fn set_input(&mut self, name: &str, value: impl Into<InputValue>) {
        self.overrides
            .insert(name.trim().to_string(), value.into().trimmed());
    }

    /// 以访问者身份生成事件业务语境：未显式指定执行者时补上访问者
    pub fn business_context(&self) -> BusinessContext {
        if self.biz.actor_id().is_some() {
            return self.biz.clone();
        }
        match self.viewer.guid() {
            Some(guid) => BusinessContext::builder()
                .maybe_correlation_id(self.biz.correlation_id().map(str::to_string))
                .maybe_causation_id(self.biz.causation_id().map(str::to_string))
                .actor_type("user".to_string())
                .actor_id(guid.to_string())
                .build(),
            None => self.biz.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_domain::value_object::Guid;

    #[test]
    fn overrides_take_precedence_and_are_trimmed() {
        let mut ctx = RequestContext::builder()
            .input(RequestInput::new().with("name", " raw "))
            .build();
        assert_eq!(ctx.get_input("name"), Some(InputValue::from("raw")));

        ctx.set_input(" name ", vec![" a ", "b "]);
        assert_eq!(ctx.get_input("name"), Some(InputValue::from(vec!["a", "b"])));
        assert_eq!(ctx.get_input("missing"), None);
    }

    #[test]
    fn raw_read_skips_filters() {
        let ctx = RequestContext::builder()
            .input(RequestInput::new().with("body", "<p>hi</p>"))
            .build();
        assert_eq!(ctx.get_text("body").as_deref(), Some("hi"));
        assert_eq!(
            ctx.get_input_raw("body"),
            Some(InputValue::from("<p>hi</p>"))
        );
    }

    #[test]
    fn empty_text_is_missing() {
        let ctx = RequestContext::builder()
            .input(RequestInput::new().with("term", "   "))
            .build();
        assert_eq!(ctx.get_text("term"), None);
    }

    #[test]
    fn business_context_defaults_actor_to_viewer() {
        let ctx = RequestContext::builder()
            .viewer(Viewer::user(Guid::new(3)))
            .biz(
                BusinessContext::builder()
                    .correlation_id("cor-1".to_string())
                    .build(),
            )
            .build();
        let biz = ctx.business_context();
        assert_eq!(biz.actor_id(), Some("3"));
        assert_eq!(biz.actor_type(), Some("user"));
        assert_eq!(biz.correlation_id(), Some("cor-1"));

        assert_eq!(RequestContext::default().business_context(), BusinessContext::default());
    }
}

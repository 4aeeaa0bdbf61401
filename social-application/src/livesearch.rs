//! 实时搜索（live search）
//!
//! 输入框联想使用的检索：按请求的类别（用户、群组、好友）做前缀/词首匹配，
//! 合并后按名称升序返回。
//!
//! 处理顺序：
//! 1. 没有登录的访问者时直接结束，不访问任何存储；
//! 2. 没有搜索词时返回空响应；
//! 3. 类别全部校验通过后才开始检索，未知类别返回 `BadRequest`；
//! 4. 每个候选都以访问者身份重新读取，读不到的跳过。
//!
use crate::config::{AppConfig, SearchConfig};
use crate::context::RequestContext;
use crate::dto::Dto;
use crate::error::{AppError, AppResult};
use crate::input::strip_tags;
use crate::query::Query;
use crate::query_handler::QueryHandler;
use async_trait::async_trait;
use bon::Builder;
use serde::Serialize;
use social_domain::access::Viewer;
use social_domain::entity::{EntityAttributes, EntityDetails, EntityType};
use social_domain::error::DomainError;
use social_domain::persist::{AttributeStore, Direction, RelationshipGraph};
use social_domain::search::{EntitySearch, SearchTerm};
use social_domain::value_object::{Guid, Page, Verb};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// 搜索类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOn {
    Users,
    Groups,
    Friends,
}

impl MatchOn {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOn::Users => "users",
            MatchOn::Groups => "groups",
            MatchOn::Friends => "friends",
        }
    }

    /// 解析请求中的类别列表；`all` 等价于用户加群组，重复项只保留第一次出现
    pub fn parse_all<'a>(values: impl IntoIterator<Item = &'a str>) -> AppResult<Vec<MatchOn>> {
        let values: Vec<&str> = values.into_iter().collect();
        if values.contains(&"all") {
            return Ok(vec![MatchOn::Users, MatchOn::Groups]);
        }

        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let parsed = match value {
                "users" => MatchOn::Users,
                "groups" => MatchOn::Groups,
                "friends" => MatchOn::Friends,
                other => {
                    return Err(AppError::BadRequest(format!(
                        "livesearch: unknown match_on of {other}"
                    )));
                }
            };
            if !out.contains(&parsed) {
                out.push(parsed);
            }
        }
        Ok(out)
    }
}

impl fmt::Display for MatchOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次实时搜索请求
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct LiveSearchQuery {
    #[builder(into)]
    pub term: String,
    #[builder(default = vec![MatchOn::Users, MatchOn::Groups])]
    pub match_on: Vec<MatchOn>,
    /// 群组只返回访问者拥有的
    #[builder(default)]
    pub match_owner: bool,
    #[builder(default = 10)]
    pub limit: usize,
}

impl LiveSearchQuery {
    /// 从请求参数构造
    ///
    /// - `term`，未提供时取 `q`；取到的值为空时返回 `Ok(None)`；
    /// - `match_on`，字符串或数组，缺省为 `all`；
    /// - `match_owner`，布尔语义的任意取值；
    /// - `limit`，按配置收敛到合法范围，无法解析时按缺省处理。
    pub fn from_context(ctx: &RequestContext, config: &SearchConfig) -> AppResult<Option<Self>> {
        // `term` 一旦出现就不再回退到 `q`，即使为空
        let key = if ctx.get_input_raw("term").is_some() {
            "term"
        } else {
            "q"
        };
        let Some(term) = ctx.get_text(key) else {
            return Ok(None);
        };

        let match_on = match ctx.get_input("match_on") {
            Some(value) => {
                let texts = value.texts();
                if texts.is_empty() {
                    MatchOn::parse_all(["all"])?
                } else {
                    MatchOn::parse_all(texts)?
                }
            }
            None => MatchOn::parse_all(["all"])?,
        };

        let match_owner = ctx.get_input("match_owner").is_some_and(|v| v.is_truthy());
        let limit = config.clamp_limit(
            ctx.get_text("limit")
                .and_then(|raw| raw.parse::<i64>().ok()),
        );

        Ok(Some(Self {
            term,
            match_on,
            match_owner,
            limit,
        }))
    }

    pub fn wants(&self, category: MatchOn) -> bool {
        self.match_on.contains(&category)
    }
}

/// 选中结果后回填的值：用户名或 GUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SearchValue {
    Guid(Guid),
    Username(String),
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    /// 副文本：用户为用户名，群组为去除标签后的描述
    pub desc: String,
    pub guid: Guid,
    pub value: SearchValue,
    pub icon: String,
    pub url: String,
}

/// 实体的站内链接与图标地址
pub trait EntityLinks: Send + Sync {
    fn url(&self, attrs: &EntityAttributes) -> String;

    fn icon(&self, attrs: &EntityAttributes) -> String;
}

/// 以站点根地址生成链接
#[derive(Debug, Clone)]
pub struct SiteLinks {
    config: AppConfig,
}

impl SiteLinks {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl EntityLinks for SiteLinks {
    fn url(&self, attrs: &EntityAttributes) -> String {
        match &attrs.details {
            EntityDetails::User { username, .. } => self.config.url(&format!("profile/{username}")),
            EntityDetails::Group { .. } => self.config.url(&format!("groups/profile/{}", attrs.guid)),
            _ => self.config.url(&format!("view/{}", attrs.guid)),
        }
    }

    fn icon(&self, attrs: &EntityAttributes) -> String {
        match &attrs.details {
            EntityDetails::Group {
                icon_time: Some(t), ..
            } => self.config.url(&format!("groups/icon/{}/tiny/{t}.jpg", attrs.guid)),
            EntityDetails::Group { .. } => self.config.url("_graphics/icons/default/tiny.png"),
            _ => self.config.url(&format!("icon/{}/tiny", attrs.guid)),
        }
    }
}

/// 实时搜索服务
#[derive(Builder, Clone)]
pub struct LiveSearchService {
    store: Arc<dyn AttributeStore>,
    graph: Arc<dyn RelationshipGraph>,
    search: Arc<dyn EntitySearch>,
    links: Arc<dyn EntityLinks>,
    #[builder(default)]
    config: AppConfig,
}

impl LiveSearchService {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 执行搜索
    ///
    /// 匿名访问者返回 `Unauthorized`，此时不会访问任何存储。
    #[tracing::instrument(skip_all, fields(term = %query.term, limit = query.limit))]
    pub async fn search(
        &self,
        viewer: &Viewer,
        query: &LiveSearchQuery,
    ) -> AppResult<Vec<SearchResult>> {
        let Some(viewer_guid) = viewer.guid() else {
            return Err(AppError::Unauthorized("livesearch requires a logged in user".into()));
        };
        let Some(term) = SearchTerm::new(&query.term) else {
            return Ok(Vec::new());
        };

        // 总线或直接调用传入的上限同样要收敛到配置范围
        let limit = self
            .config
            .search
            .clamp_limit(Some(i64::try_from(query.limit).unwrap_or(i64::MAX)));

        let mut results = Vec::new();
        for category in &query.match_on {
            match category {
                MatchOn::Users => {
                    let found = self.search.search_users(&term, None, limit).await?;
                    let user_value = if query.wants(MatchOn::Groups) {
                        UserValue::Guid
                    } else {
                        UserValue::Username
                    };
                    self.collect_users(viewer, found, user_value, &mut results)
                        .await?;
                }
                MatchOn::Groups => {
                    if !self.config.is_feature_enabled("groups") {
                        debug!("groups feature disabled, skipping group matches");
                        continue;
                    }
                    let owner = query.match_owner.then_some(viewer_guid);
                    let found = self.search.search_groups(&term, owner, limit).await?;
                    self.collect_groups(viewer, found, &mut results).await?;
                }
                MatchOn::Friends => {
                    let friends = self
                        .graph
                        .query(&Verb::friend(), viewer_guid, Direction::Outgoing, Page::unbounded())
                        .await?;
                    if friends.is_empty() {
                        continue;
                    }
                    let found = self
                        .search
                        .search_users(&term, Some(friends.as_slice()), limit)
                        .await?;
                    self.collect_users(viewer, found, UserValue::Username, &mut results)
                        .await?;
                }
            }
        }

        // 稳定排序：同名结果保持插入顺序
        results.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = results.len(), "livesearch finished");
        Ok(results)
    }

    async fn collect_users(
        &self,
        viewer: &Viewer,
        found: Vec<Guid>,
        user_value: UserValue,
        results: &mut Vec<SearchResult>,
    ) -> AppResult<()> {
        for guid in found {
            let Some(attrs) = self.readable(guid, EntityType::User, viewer).await? else {
                continue;
            };
            let username = attrs.username().unwrap_or_default().to_string();
            let value = match user_value {
                UserValue::Guid => SearchValue::Guid(attrs.guid),
                UserValue::Username => SearchValue::Username(username.clone()),
            };
            results.push(SearchResult {
                entity_type: EntityType::User,
                name: attrs.display_name().to_string(),
                desc: username,
                guid: attrs.guid,
                value,
                icon: self.links.icon(&attrs),
                url: self.links.url(&attrs),
            });
        }
        Ok(())
    }

    async fn collect_groups(
        &self,
        viewer: &Viewer,
        found: Vec<Guid>,
        results: &mut Vec<SearchResult>,
    ) -> AppResult<()> {
        for guid in found {
            let Some(attrs) = self.readable(guid, EntityType::Group, viewer).await? else {
                continue;
            };
            results.push(SearchResult {
                entity_type: EntityType::Group,
                name: attrs.display_name().to_string(),
                desc: strip_tags(attrs.description().unwrap_or_default()),
                guid: attrs.guid,
                value: SearchValue::Guid(attrs.guid),
                icon: self.links.icon(&attrs),
                url: self.links.url(&attrs),
            });
        }
        Ok(())
    }

    async fn readable(
        &self,
        guid: Guid,
        expected: EntityType,
        viewer: &Viewer,
    ) -> AppResult<Option<EntityAttributes>> {
        match self.store.get_typed(guid, expected, viewer).await {
            Ok(attrs) => Ok(Some(attrs)),
            Err(DomainError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum UserValue {
    Guid,
    Username,
}

/// 简化的 HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl HttpReply {
    pub fn ok_json(body: String) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json"),
            body,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            content_type: Some("text/plain"),
            body: message.into(),
        }
    }

    pub fn server_error() -> Self {
        Self {
            status: 500,
            content_type: Some("text/plain"),
            body: "internal error".to_string(),
        }
    }

    /// 静默结束：没有正文
    pub fn empty() -> Self {
        Self {
            status: 200,
            content_type: None,
            body: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// 实时搜索端点：把请求参数转换为搜索并序列化结果
#[derive(Clone)]
pub struct LiveSearchEndpoint {
    service: Arc<LiveSearchService>,
}

impl LiveSearchEndpoint {
    pub fn new(service: Arc<LiveSearchService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, ctx: &RequestContext) -> HttpReply {
        if !ctx.viewer.is_logged_in() {
            return HttpReply::empty();
        }

        let query = match LiveSearchQuery::from_context(ctx, &self.service.config().search) {
            Ok(Some(query)) => query,
            Ok(None) => return HttpReply::empty(),
            Err(err) => return error_reply(err),
        };

        match self.service.search(&ctx.viewer, &query).await {
            Ok(results) => match serde_json::to_string(&results) {
                Ok(body) => HttpReply::ok_json(body),
                Err(err) => {
                    warn!(error = %err, "failed to encode livesearch results");
                    HttpReply::server_error()
                }
            },
            Err(err) => error_reply(err),
        }
    }
}

fn error_reply(err: AppError) -> HttpReply {
    if err.is_unauthorized() {
        return HttpReply::empty();
    }
    if err.is_bad_request() {
        warn!(error = %err, "rejected livesearch request");
        return HttpReply::bad_request(err.to_string());
    }
    warn!(error = %err, "livesearch failed");
    HttpReply::server_error()
}

/// 查询总线上的实时搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LiveSearchResults(pub Vec<SearchResult>);

impl Dto for LiveSearchResults {}

impl Query for LiveSearchQuery {
    const NAME: &'static str = "LiveSearch";
    type Dto = LiveSearchResults;
}

pub struct LiveSearchHandler {
    service: Arc<LiveSearchService>,
}

impl LiveSearchHandler {
    pub fn new(service: Arc<LiveSearchService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl QueryHandler<LiveSearchQuery> for LiveSearchHandler {
    async fn handle(&self, ctx: &RequestContext, q: LiveSearchQuery) -> AppResult<LiveSearchResults> {
        self.service
            .search(&ctx.viewer, &q)
            .await
            .map(LiveSearchResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RequestInput;
    use social_domain::value_object::AccessLevel;

    fn ctx(input: RequestInput) -> RequestContext {
        RequestContext::builder()
            .viewer(Viewer::user(Guid::new(1)))
            .input(input)
            .build()
    }

    #[test]
    fn parse_expands_all_and_dedups() {
        assert_eq!(
            MatchOn::parse_all(["friends", "all"]).unwrap(),
            vec![MatchOn::Users, MatchOn::Groups]
        );
        assert_eq!(
            MatchOn::parse_all(["friends", "users", "friends"]).unwrap(),
            vec![MatchOn::Friends, MatchOn::Users]
        );
        let err = MatchOn::parse_all(["users", "bogus"]).unwrap_err();
        assert_eq!(err.to_string(), "livesearch: unknown match_on of bogus");
        assert!(err.is_bad_request());
    }

    #[test]
    fn query_from_request_parameters() {
        let config = SearchConfig::default();

        let q = LiveSearchQuery::from_context(&ctx(RequestInput::new().with("q", " ann ")), &config)
            .unwrap()
            .unwrap();
        assert_eq!(q.term, "ann");
        assert_eq!(q.match_on, vec![MatchOn::Users, MatchOn::Groups]);
        assert!(!q.match_owner);
        assert_eq!(q.limit, 10);

        let q = LiveSearchQuery::from_context(
            &ctx(RequestInput::new()
                .with("term", "bo")
                .with("q", "ignored")
                .with("match_on", vec!["friends"])
                .with("match_owner", "1")
                .with("limit", "500")),
            &config,
        )
        .unwrap()
        .unwrap();
        assert_eq!(q.term, "bo");
        assert_eq!(q.match_on, vec![MatchOn::Friends]);
        assert!(q.match_owner);
        assert_eq!(q.limit, 50);
    }

    #[test]
    fn blank_term_does_not_fall_back_to_q() {
        let config = SearchConfig::default();
        let q = LiveSearchQuery::from_context(
            &ctx(RequestInput::new().with("term", "  ").with("q", "ann")),
            &config,
        )
        .unwrap();
        assert_eq!(q, None);
    }

    #[test]
    fn missing_term_wins_over_bad_category() {
        let config = SearchConfig::default();
        let q = LiveSearchQuery::from_context(
            &ctx(RequestInput::new().with("match_on", "bogus")),
            &config,
        )
        .unwrap();
        assert!(q.is_none());

        let err = LiveSearchQuery::from_context(
            &ctx(RequestInput::new().with("term", "a").with("match_on", "bogus")),
            &config,
        )
        .unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn result_serializes_with_wire_names() {
        let result = SearchResult {
            entity_type: EntityType::User,
            name: "Ann".into(),
            desc: "ann".into(),
            guid: Guid::new(5),
            value: SearchValue::Username("ann".into()),
            icon: "http://localhost/icon/5/tiny".into(),
            url: "http://localhost/profile/ann".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["value"], "ann");
        assert_eq!(json["guid"], 5);

        let by_guid = SearchValue::Guid(Guid::new(5));
        assert_eq!(serde_json::to_value(&by_guid).unwrap(), 5);
    }

    #[test]
    fn site_links() {
        let links = SiteLinks::new(AppConfig::builder().site_url("https://s.test/").build());
        let mut user = EntityAttributes::user("Ann", "ann");
        user.guid = Guid::new(4);
        assert_eq!(links.url(&user), "https://s.test/profile/ann");
        assert_eq!(links.icon(&user), "https://s.test/icon/4/tiny");

        let mut group = EntityAttributes::group(Guid::new(4), "Crabs", "")
            .with_access(AccessLevel::Public);
        group.guid = Guid::new(9);
        assert_eq!(links.url(&group), "https://s.test/groups/profile/9");
        assert_eq!(links.icon(&group), "https://s.test/_graphics/icons/default/tiny.png");
    }
}

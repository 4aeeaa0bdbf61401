use async_trait::async_trait;
use serde_json::Value;
use social_application::InMemoryQueryBus;
use social_application::config::AppConfig;
use social_application::context::RequestContext;
use social_application::input::RequestInput;
use social_application::livesearch::{
    LiveSearchEndpoint, LiveSearchHandler, LiveSearchQuery, LiveSearchService, MatchOn,
    SearchValue, SiteLinks,
};
use social_application::query_bus::QueryBus;
use social_domain::access::Viewer;
use social_domain::entity::{EntityAttributes, EntityDetails};
use social_domain::error::DomainResult;
use social_domain::persist::{
    AttributeStore, Direction, EntityFilter, InMemoryAttributeStore, InMemoryRelationshipGraph,
    RelationshipGraph,
};
use social_domain::search::{EntitySearch, SearchTerm};
use social_domain::value_object::{AccessLevel, Guid, Page, Verb};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 统计调用次数的存储包装
struct Counting<T> {
    inner: T,
    calls: Arc<AtomicUsize>,
}

impl<T> Counting<T> {
    fn new(inner: T, calls: Arc<AtomicUsize>) -> Self {
        Self { inner, calls }
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: AttributeStore> AttributeStore for Counting<T> {
    async fn load(&self, guid: Guid) -> DomainResult<Option<EntityAttributes>> {
        self.hit();
        self.inner.load(guid).await
    }

    async fn put(&self, attributes: EntityAttributes) -> DomainResult<Guid> {
        self.hit();
        self.inner.put(attributes).await
    }

    async fn delete(&self, guid: Guid) -> DomainResult<bool> {
        self.hit();
        self.inner.delete(guid).await
    }

    async fn find(&self, filter: &EntityFilter, page: Page) -> DomainResult<Vec<EntityAttributes>> {
        self.hit();
        self.inner.find(filter, page).await
    }

    async fn count(&self, filter: &EntityFilter) -> DomainResult<u64> {
        self.hit();
        self.inner.count(filter).await
    }
}

#[async_trait]
impl<T: EntitySearch> EntitySearch for Counting<T> {
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> DomainResult<Vec<Guid>> {
        self.hit();
        self.inner.search_users(term, among, limit).await
    }

    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> DomainResult<Vec<Guid>> {
        self.hit();
        self.inner.search_groups(term, owner, limit).await
    }
}

#[async_trait]
impl<T: RelationshipGraph> RelationshipGraph for Counting<T> {
    async fn insert(&self, subject: Guid, verb: &Verb, object: Guid) -> DomainResult<bool> {
        self.hit();
        self.inner.insert(subject, verb, object).await
    }

    async fn remove(&self, subject: Guid, verb: &Verb, object: Guid) -> DomainResult<bool> {
        self.hit();
        self.inner.remove(subject, verb, object).await
    }

    async fn exists(&self, subject: Guid, verb: &Verb, object: Guid) -> DomainResult<bool> {
        self.hit();
        self.inner.exists(subject, verb, object).await
    }

    async fn query(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
        page: Page,
    ) -> DomainResult<Vec<Guid>> {
        self.hit();
        self.inner.query(verb, anchor, direction, page).await
    }

    async fn count(&self, verb: &Verb, anchor: Guid, direction: Direction) -> DomainResult<u64> {
        self.hit();
        self.inner.count(verb, anchor, direction).await
    }

    async fn remove_all(&self, guid: Guid) -> DomainResult<u64> {
        self.hit();
        self.inner.remove_all(guid).await
    }
}

struct World {
    store: Arc<Counting<InMemoryAttributeStore>>,
    graph: Arc<Counting<InMemoryRelationshipGraph>>,
    calls: Arc<AtomicUsize>,
    me: Guid,
}

impl World {
    async fn new() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(Counting::new(InMemoryAttributeStore::new(), calls.clone()));
        let graph = Arc::new(Counting::new(InMemoryRelationshipGraph::new(), calls.clone()));
        let me = store
            .inner
            .put(EntityAttributes::user("Me Myself", "me"))
            .await
            .unwrap();
        Self {
            store,
            graph,
            calls,
            me,
        }
    }

    async fn seed(&self, attrs: EntityAttributes) -> Guid {
        self.store.inner.put(attrs).await.unwrap()
    }

    async fn user(&self, name: &str, username: &str) -> Guid {
        self.seed(EntityAttributes::user(name, username)).await
    }

    fn service(&self, config: AppConfig) -> Arc<LiveSearchService> {
        Arc::new(
            LiveSearchService::builder()
                .store(self.store.clone())
                .graph(self.graph.clone())
                .search(self.store.clone())
                .links(Arc::new(SiteLinks::new(config.clone())))
                .config(config)
                .build(),
        )
    }

    fn endpoint(&self) -> LiveSearchEndpoint {
        LiveSearchEndpoint::new(self.service(AppConfig::default()))
    }

    fn request(&self, input: RequestInput) -> RequestContext {
        RequestContext::builder()
            .viewer(Viewer::user(self.me))
            .input(input)
            .build()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn names(body: &str) -> Vec<String> {
    let json: Value = serde_json::from_str(body).unwrap();
    json.as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn users_limit_bounds_the_result() {
    let world = World::new().await;
    for i in 0..8 {
        world.user(&format!("Ann {i}"), &format!("ann{i}")).await;
    }
    world.user("Mary Ann", "mary").await;
    world.user("Joanne", "jo").await;

    let reply = world
        .endpoint()
        .handle(&world.request(
            RequestInput::new()
                .with("term", "ann")
                .with("match_on", "users")
                .with("limit", "5"),
        ))
        .await;

    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, Some("application/json"));
    let json: Value = serde_json::from_str(&reply.body).unwrap();
    let records = json.as_array().unwrap();
    assert!(!records.is_empty() && records.len() <= 5);
    for record in records {
        assert_eq!(record["type"], "user");
        let name = record["name"].as_str().unwrap().to_lowercase();
        let username = record["desc"].as_str().unwrap().to_lowercase();
        assert!(name.starts_with("ann") || name.contains(" ann") || username.starts_with("ann"));
        // 只请求用户时回填用户名
        assert_eq!(record["value"], record["desc"]);
    }
}

#[tokio::test]
async fn unknown_match_on_is_rejected_before_any_store_call() {
    let world = World::new().await;
    world.user("Ann Lee", "annlee").await;

    let reply = world
        .endpoint()
        .handle(&world.request(
            RequestInput::new()
                .with("term", "ann")
                .with("match_on", vec!["users", "bogus"]),
        ))
        .await;

    assert_eq!(reply.status, 400);
    assert_eq!(reply.content_type, Some("text/plain"));
    assert_eq!(reply.body, "livesearch: unknown match_on of bogus");
    assert_eq!(world.calls(), 0);
}

#[tokio::test]
async fn anonymous_viewer_gets_nothing_and_touches_nothing() {
    let world = World::new().await;
    world.user("Ann Lee", "annlee").await;

    let ctx = RequestContext::builder()
        .input(RequestInput::new().with("term", "ann"))
        .build();
    let reply = world.endpoint().handle(&ctx).await;
    assert!(reply.is_empty());
    assert_eq!(reply.content_type, None);

    let err = world
        .service(AppConfig::default())
        .search(&Viewer::anonymous(), &LiveSearchQuery::builder().term("ann").build())
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(world.calls(), 0);
}

#[tokio::test]
async fn missing_term_is_an_empty_reply() {
    let world = World::new().await;
    let reply = world
        .endpoint()
        .handle(&world.request(RequestInput::new().with("term", "   ")))
        .await;
    assert!(reply.is_empty());
    assert_eq!(world.calls(), 0);
}

#[tokio::test]
async fn merged_results_are_sorted_by_name() {
    let world = World::new().await;
    world.user("Zed", "annz").await;
    world.user("Mary Ann", "mary").await;
    world.user("Ann Lee", "annlee").await;
    world
        .seed(EntityAttributes::group(world.me, "Annual Meetup", "yearly"))
        .await;
    world
        .seed(EntityAttributes::user("Anna Banned", "anna").with_enabled(false))
        .await;

    let reply = world
        .endpoint()
        .handle(&world.request(RequestInput::new().with("q", "ann")))
        .await;
    assert_eq!(
        names(&reply.body),
        vec!["Ann Lee", "Annual Meetup", "Mary Ann", "Zed"]
    );

    // 同时请求群组时，用户以 GUID 回填
    let json: Value = serde_json::from_str(&reply.body).unwrap();
    for record in json.as_array().unwrap() {
        assert_eq!(record["value"], record["guid"]);
    }
}

#[tokio::test]
async fn equal_names_keep_search_order() {
    let world = World::new().await;
    let first = world.user("Ann", "ann_one").await;
    let second = world.user("Ann", "ann_two").await;

    let results = world
        .service(AppConfig::default())
        .search(
            &Viewer::user(world.me),
            &LiveSearchQuery::builder()
                .term("ann")
                .match_on(vec![MatchOn::Users])
                .build(),
        )
        .await
        .unwrap();
    // 检索按创建时间倒序返回，排序不打乱同名结果
    let guids: Vec<Guid> = results.iter().map(|r| r.guid).collect();
    assert_eq!(guids, vec![second, first]);
}

#[tokio::test]
async fn unreadable_and_banned_candidates_are_skipped() {
    let world = World::new().await;
    world
        .seed(EntityAttributes::user("Ann Hidden", "annhidden").with_access(AccessLevel::Private))
        .await;
    let mut banned = EntityAttributes::user("Ann Banned", "annbanned");
    if let EntityDetails::User { banned, .. } = &mut banned.details {
        *banned = true;
    }
    world.seed(banned).await;
    let other = world.user("Other", "other").await;
    world
        .seed(
            EntityAttributes::group(other, "Ann's Secret Club", "")
                .with_access(AccessLevel::Private),
        )
        .await;
    world.user("Ann Visible", "annvisible").await;

    let results = world
        .service(AppConfig::default())
        .search(
            &Viewer::user(world.me),
            &LiveSearchQuery::builder().term("ann").build(),
        )
        .await
        .unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ann Visible"]);

    let admin = world
        .service(AppConfig::default())
        .search(
            &Viewer::admin(world.me),
            &LiveSearchQuery::builder().term("ann").build(),
        )
        .await
        .unwrap();
    assert_eq!(admin.len(), 3);
}

#[tokio::test]
async fn groups_respect_feature_switch_and_owner_filter() {
    let world = World::new().await;
    let other = world.user("Other", "other").await;
    world
        .seed(EntityAttributes::group(
            world.me,
            "Crabs",
            "we <b>love</b> rust",
        ))
        .await;
    world
        .seed(EntityAttributes::group(other, "Rustaceans", ""))
        .await;

    let query = LiveSearchQuery::builder()
        .term("rust")
        .match_on(vec![MatchOn::Groups])
        .build();
    let service = world.service(AppConfig::default());

    let all = service.search(&Viewer::user(world.me), &query).await.unwrap();
    assert_eq!(all.len(), 2);
    let crabs = all.iter().find(|r| r.name == "Crabs").unwrap();
    assert_eq!(crabs.desc, "we love rust");
    assert_eq!(crabs.value, SearchValue::Guid(crabs.guid));
    assert_eq!(crabs.url, format!("http://localhost/groups/profile/{}", crabs.guid));

    let mine = service
        .search(
            &Viewer::user(world.me),
            &LiveSearchQuery {
                match_owner: true,
                ..query.clone()
            },
        )
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].name, "Crabs");

    let before = world.calls();
    let disabled = world
        .service(AppConfig::builder().features(vec![]).build())
        .search(&Viewer::user(world.me), &query)
        .await
        .unwrap();
    assert!(disabled.is_empty());
    assert_eq!(world.calls(), before);
}

#[tokio::test]
async fn friends_are_searched_among_outgoing_friend_edges() {
    let world = World::new().await;
    let ann = world.user("Ann Friend", "annf").await;
    let stranger = world.user("Ann Stranger", "anns").await;
    let follower = world.user("Ann Follower", "annfo").await;
    world
        .graph
        .inner
        .add(world.me, &Verb::friend(), ann)
        .await
        .unwrap();
    world
        .graph
        .inner
        .add(follower, &Verb::friend(), world.me)
        .await
        .unwrap();

    let results = world
        .service(AppConfig::default())
        .search(
            &Viewer::user(world.me),
            &LiveSearchQuery::builder()
                .term("ann")
                .match_on(vec![MatchOn::Friends])
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].guid, ann);
    assert_eq!(results[0].value, SearchValue::Username("annf".into()));
    assert_ne!(results[0].guid, stranger);
}

#[tokio::test]
async fn live_search_through_the_query_bus() {
    let world = World::new().await;
    world.user("Ann Lee", "annlee").await;

    let bus = InMemoryQueryBus::new();
    bus.register::<LiveSearchQuery, _>(Arc::new(LiveSearchHandler::new(
        world.service(AppConfig::default()),
    )))
    .unwrap();

    let ctx = world.request(RequestInput::new());
    let results = bus
        .dispatch(
            &ctx,
            LiveSearchQuery::builder()
                .term("ann")
                .match_on(vec![MatchOn::Users])
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.0.len(), 1);
    assert_eq!(results.0[0].value, SearchValue::Username("annlee".into()));
}

#[tokio::test]
async fn bus_queries_are_held_to_the_configured_limit() {
    let world = World::new().await;
    for i in 0..60 {
        world.user(&format!("Ann {i}"), &format!("ann{i}")).await;
    }

    let bus = InMemoryQueryBus::new();
    bus.register::<LiveSearchQuery, _>(Arc::new(LiveSearchHandler::new(
        world.service(AppConfig::default()),
    )))
    .unwrap();
    let ctx = world.request(RequestInput::new());

    let query = |limit| {
        LiveSearchQuery::builder()
            .term("ann")
            .match_on(vec![MatchOn::Users])
            .limit(limit)
            .build()
    };
    let none = bus.dispatch(&ctx, query(0)).await.unwrap();
    assert_eq!(none.0.len(), 1);

    let many = bus.dispatch(&ctx, query(1000)).await.unwrap();
    assert_eq!(many.0.len(), AppConfig::default().search.max_limit);
}

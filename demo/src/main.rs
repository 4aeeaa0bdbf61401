//! social-demo：以内存存储装配一个小站点并执行一次实时搜索
//!
//! 运行示例：`social-demo --term ann --match-on users,groups`
//!
use anyhow::Context;
use clap::Parser;
use social_application::InMemoryCommandBus;
use social_application::command_bus::CommandBus;
use social_application::config::AppConfig;
use social_application::context::RequestContext;
use social_application::handlers::{JoinGroup, JoinGroupHandler};
use social_application::input::RequestInput;
use social_application::livesearch::{LiveSearchEndpoint, LiveSearchService, SiteLinks};
use social_application::sticky_form::StickyForms;
use social_domain::access::Viewer;
use social_domain::domain_event::{DomainEvent, EntityEvent};
use social_domain::entity::EntityAttributes;
use social_domain::eventing::{EventHandler, HandledEventType, InMemoryEventBus};
use social_domain::friendship::Friendships;
use social_domain::group::Group;
use social_domain::persist::{
    AttributeStore, CachedAttributeStore, InMemoryAttributeStore, InMemoryRelationshipGraph,
};
use social_domain::services::DomainServices;
use social_domain::value_object::{AccessLevel, Guid};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "social-demo")]
#[command(about = "Seed an in-memory social site and run a live search against it")]
struct Args {
    /// 配置文件（`.toml` 或 JSON）
    #[arg(short, long, env = "SOCIAL_CONFIG")]
    config: Option<PathBuf>,

    /// 搜索词
    #[arg(short, long, default_value = "ann")]
    term: String,

    /// 搜索类别，逗号分隔：all、users、groups、friends
    #[arg(long, value_delimiter = ',', default_value = "all")]
    match_on: Vec<String>,

    /// 群组只返回自己拥有的
    #[arg(long)]
    match_owner: bool,

    #[arg(long)]
    limit: Option<i64>,

    /// 未设置 RUST_LOG 时使用的日志级别
    #[arg(long, env = "SOCIAL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// 把成员关系事件写进日志
struct MembershipLog;

#[async_trait::async_trait]
impl EventHandler for MembershipLog {
    fn handler_name(&self) -> &str {
        "membership-log"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::Many(vec!["join:group".into(), "leave:group".into()])
    }

    async fn handle(&self, event: &EntityEvent) -> anyhow::Result<()> {
        info!(
            event = %event.event_type(),
            group = %event.subject(),
            user = ?event.related(),
            "membership changed"
        );
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = if path.extension().is_some_and(|ext| ext == "toml") {
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        config
    } else {
        AppConfig::from_json(&content)?
    };
    Ok(config)
}

struct Seeded {
    me: Guid,
}

async fn seed(services: &DomainServices, bus: &InMemoryCommandBus) -> anyhow::Result<Seeded> {
    let store = services.store();
    let me = store.put(EntityAttributes::user("Ann Lee", "annlee")).await?;
    let mary = store.put(EntityAttributes::user("Mary Ann", "mary")).await?;
    let anna = store.put(EntityAttributes::user("Anna Karlsson", "annak")).await?;
    store.put(EntityAttributes::user("Bob", "bob")).await?;
    store
        .put(EntityAttributes::user("Annette Private", "annette").with_access(AccessLevel::Private))
        .await?;

    let friendships = Friendships::new(services.graph().clone());
    friendships.befriend(me, mary).await?;
    friendships.befriend(anna, me).await?;

    let annual = Group::create(
        services.clone(),
        Viewer::user(me),
        EntityAttributes::group(Guid::UNASSIGNED, "Annual Meetup", "<p>Once a year</p>"),
    )
    .await?;
    Group::create(
        services.clone(),
        Viewer::user(mary),
        EntityAttributes::group(Guid::UNASSIGNED, "Knitting", "for anne and friends"),
    )
    .await?;

    let ctx = RequestContext::builder().viewer(Viewer::user(me)).build();
    for user in [me, mary] {
        bus.dispatch(
            &ctx,
            JoinGroup {
                group: annual.guid()?,
                user: Some(user),
            },
        )
        .await?;
    }
    info!(members = annual.member_count().await?, "seeded site");
    Ok(Seeded { me })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(args.config.as_deref())?;

    let store = Arc::new(CachedAttributeStore::new(InMemoryAttributeStore::new()));
    let graph = Arc::new(InMemoryRelationshipGraph::new());
    let events =
        InMemoryEventBus::with_handlers(vec![Arc::new(MembershipLog) as Arc<dyn EventHandler>]);

    let services = DomainServices::builder()
        .store(store.clone())
        .graph(graph.clone())
        .events(Arc::new(events))
        .build();

    let bus = InMemoryCommandBus::new();
    bus.register::<JoinGroup, _>(Arc::new(JoinGroupHandler::new(services.clone())))?;
    let seeded = seed(&services, &bus).await?;

    let service = LiveSearchService::builder()
        .store(store.clone())
        .graph(graph)
        .search(store)
        .links(Arc::new(SiteLinks::new(config.clone())))
        .config(config.clone())
        .build();
    let endpoint = LiveSearchEndpoint::new(Arc::new(service));

    let mut input = RequestInput::new().with("term", args.term.as_str());
    for category in &args.match_on {
        input.push("match_on", category.as_str());
    }
    if args.match_owner {
        input.insert("match_owner", "1");
    }
    if let Some(limit) = args.limit {
        input.insert("limit", limit.to_string());
    }

    let mut ctx = RequestContext::builder()
        .viewer(Viewer::user(seeded.me))
        .input(input.clone())
        .build();
    let reply = endpoint.handle(&ctx).await;
    info!(status = reply.status, "livesearch replied");

    // 把这次的搜索参数作为表单暂存，模拟回到搜索页时的回填
    let sticky = StickyForms::new(config.sticky.clone());
    sticky.make(&mut ctx.cookies, "livesearch", &input);
    for cookie in ctx.cookies.take_outgoing() {
        info!(header = %cookie.to_header(), "set-cookie");
    }

    if reply.is_empty() {
        println!("(no output)");
    } else if reply.status == 200 {
        let json: serde_json::Value = serde_json::from_str(&reply.body)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{} {}", reply.status, reply.body);
    }
    Ok(())
}

//! 群组外观（Group）
//!
//! 包装一行群组属性，提供加载、写穿透的修改、成员关系与所含对象的管理、
//! 导出以及带级联的删除。状态机为 `Unloaded → Loaded → Deleted`，
//! 除构造与加载外的操作在非 `Loaded` 状态下返回 `InvalidState`。
//!
//! 成员关系即 `user --member--> group` 边：
//! - 加入：先写边，边为新建时再发布 `join:group`，发布失败则撤销该边；
//! - 退出：先发布 `leave:group`（处理器仍能看到成员关系），再删边。
//!
use crate::access::{Viewer, can_read_entity};
use crate::domain_event::{BusinessContext, EntityEvent, EventName};
use crate::entity::{Entity, EntityAttributes, EntityDetails, EntityType, MetaValue};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{Direction, EntityFilter};
use crate::services::DomainServices;
use crate::value_object::{AccessLevel, Guid, Page, Verb};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

/// 外观的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Deleted,
}

/// 可加入能力：成员关系的统一接口
#[async_trait]
pub trait Joinable: Send + Sync {
    /// 加入；已是成员时同样返回 true
    async fn join(&self, user: Guid) -> Result<bool>;

    /// 退出；原本不是成员时返回 false
    async fn leave(&self, user: Guid) -> Result<bool>;

    /// 是否成员；`user` 为空时使用当前访问者，匿名访问者总是 false
    async fn is_member(&self, user: Option<Guid>) -> Result<bool>;

    async fn list_members(&self, page: Page) -> Result<Vec<EntityAttributes>>;

    async fn count_members(&self) -> Result<u64>;
}

/// 群组导出视图：基础字段加上群组特有字段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupExport {
    pub guid: Guid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: AccessLevel,
    pub time_created: i64,
    pub time_updated: i64,
    pub name: String,
    pub description: String,
    pub icontime: Option<i64>,
    pub banner: Option<String>,
}

pub struct Group {
    services: DomainServices,
    viewer: Viewer,
    context: BusinessContext,
    state: LifecycleState,
    attributes: Option<EntityAttributes>,
}

impl Group {
    /// 构造一个尚未加载的外观
    pub fn new(services: DomainServices, viewer: Viewer) -> Self {
        Self {
            services,
            viewer,
            context: BusinessContext::default(),
            state: LifecycleState::Unloaded,
            attributes: None,
        }
    }

    /// 以访问者身份加载群组；不存在、不可读或不是群组时返回 `NotFound`
    #[tracing::instrument(skip(services, viewer))]
    pub async fn load(services: DomainServices, viewer: Viewer, guid: Guid) -> Result<Self> {
        let attrs = services
            .store()
            .get_typed(guid, EntityType::Group, &viewer)
            .await?;
        Self::wrap(services, viewer, attrs)
    }

    /// 包装一行已持久化的群组属性
    pub fn wrap(services: DomainServices, viewer: Viewer, attrs: EntityAttributes) -> Result<Self> {
        if attrs.entity_type() != EntityType::Group {
            return Err(DomainError::invalid_value(format!(
                "entity {} is a {}, not a group",
                attrs.guid,
                attrs.entity_type()
            )));
        }
        if attrs.guid.is_unassigned() {
            return Err(DomainError::invalid_state("group row has no guid"));
        }
        let mut group = Self::new(services, viewer);
        group.attributes = Some(attrs);
        group.state = LifecycleState::Loaded;
        Ok(group)
    }

    /// 持久化一个新群组并发布 `create:group`
    ///
    /// 匿名访问者返回 `Unauthorized`；所有者未指定时取当前访问者。
    pub async fn create(
        services: DomainServices,
        viewer: Viewer,
        mut draft: EntityAttributes,
    ) -> Result<Self> {
        if draft.entity_type() != EntityType::Group {
            return Err(DomainError::invalid_value("draft is not a group"));
        }
        if !draft.guid.is_unassigned() {
            return Err(DomainError::invalid_state(format!(
                "group {} already exists",
                draft.guid
            )));
        }
        let Some(creator) = viewer.guid() else {
            return Err(DomainError::unauthorized("anonymous viewer cannot create groups"));
        };
        if draft.owner_guid.is_unassigned() {
            draft.owner_guid = creator;
            if draft.container_guid.is_unassigned() {
                draft.container_guid = creator;
            }
        }

        let guid = services.store().put(draft.clone()).await?;
        draft.guid = guid;
        let group = Self::wrap(services, viewer, draft)?;
        group
            .publish(EntityEvent::new(EventName::Create, EntityType::Group, guid))
            .await?;
        info!(%guid, "group created");
        Ok(group)
    }

    /// 事件携带的业务上下文
    pub fn with_context(mut self, context: BusinessContext) -> Self {
        self.context = context;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn attributes(&self) -> Result<&EntityAttributes> {
        match (self.state, &self.attributes) {
            (LifecycleState::Loaded, Some(attrs)) => Ok(attrs),
            (state, _) => Err(DomainError::invalid_state(format!("group is {state:?}"))),
        }
    }

    pub fn guid(&self) -> Result<Guid> {
        Ok(self.attributes()?.guid)
    }

    pub fn name(&self) -> Result<&str> {
        Ok(self.attributes()?.display_name())
    }

    pub fn description(&self) -> Result<&str> {
        Ok(self.attributes()?.description().unwrap_or_default())
    }

    pub fn membership(&self) -> Result<AccessLevel> {
        match &self.attributes()?.details {
            EntityDetails::Group { membership, .. } => Ok(*membership),
            _ => Err(DomainError::invalid_state("group row lost its details")),
        }
    }

    /// 群组的伪用户名：`group:{guid}`
    pub fn username(&self) -> Result<String> {
        Ok(format!("group:{}", self.guid()?))
    }

    /// 是否开放加入（成员可见性为公开）
    pub fn is_public_membership(&self) -> Result<bool> {
        Ok(self.membership()? == AccessLevel::Public)
    }

    /// 群组默认不允许评论
    pub fn can_comment(&self, _user: Option<Guid>) -> Result<bool> {
        self.attributes()?;
        Ok(false)
    }

    /// 所有者与管理员可以编辑/删除
    pub fn can_edit(&self, user: Option<Guid>) -> Result<bool> {
        let attrs = self.attributes()?;
        let Some(user) = user.or(self.viewer.guid()) else {
            return Ok(false);
        };
        Ok(user == attrs.owner_guid || (self.viewer.is_admin() && self.viewer.guid() == Some(user)))
    }

    pub fn export(&self) -> Result<GroupExport> {
        let attrs = self.attributes()?;
        let (icon_time, banner) = match &attrs.details {
            EntityDetails::Group {
                icon_time, banner, ..
            } => (*icon_time, banner.clone()),
            _ => (None, None),
        };
        Ok(GroupExport {
            guid: attrs.guid,
            entity_type: attrs.entity_type(),
            subtype: attrs.subtype.clone(),
            owner_guid: attrs.owner_guid,
            container_guid: attrs.container_guid,
            access_id: attrs.access,
            time_created: attrs.time_created.timestamp(),
            time_updated: attrs.time_updated.timestamp(),
            name: attrs.display_name().to_string(),
            description: attrs.description().unwrap_or_default().to_string(),
            icontime: icon_time,
            banner,
        })
    }

    pub async fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.update(move |attrs| {
            if let EntityDetails::Group { name: n, .. } = &mut attrs.details {
                *n = name;
            }
        })
        .await
    }

    pub async fn set_description(&mut self, description: impl Into<String>) -> Result<()> {
        let description = description.into();
        self.update(move |attrs| {
            if let EntityDetails::Group { description: d, .. } = &mut attrs.details {
                *d = description;
            }
        })
        .await
    }

    pub async fn set_membership(&mut self, membership: AccessLevel) -> Result<()> {
        self.update(move |attrs| {
            if let EntityDetails::Group { membership: m, .. } = &mut attrs.details {
                *m = membership;
            }
        })
        .await
    }

    pub async fn set_icon_time(&mut self, icon_time: Option<i64>) -> Result<()> {
        self.update(move |attrs| {
            if let EntityDetails::Group { icon_time: t, .. } = &mut attrs.details {
                *t = icon_time;
            }
        })
        .await
    }

    pub async fn set_banner(&mut self, banner: Option<String>) -> Result<()> {
        self.update(move |attrs| {
            if let EntityDetails::Group { banner: b, .. } = &mut attrs.details {
                *b = banner;
            }
        })
        .await
    }

    pub async fn set_metadata(
        &mut self,
        key: impl Into<String>,
        values: Vec<MetaValue>,
    ) -> Result<()> {
        let key = key.into();
        self.update(move |attrs| attrs.set_metadata(key, values))
            .await
    }

    /// 写穿透：修改副本、刷新更新时间、写入存储成功后再替换本地状态
    async fn update(&mut self, apply: impl FnOnce(&mut EntityAttributes) + Send) -> Result<()> {
        let mut next = self.attributes()?.clone();
        apply(&mut next);
        next.touch();
        let guid = self.services.store().put(next.clone()).await?;
        self.attributes = Some(next);
        self.publish(EntityEvent::new(EventName::Update, EntityType::Group, guid))
            .await?;
        debug!(%guid, "group updated");
        Ok(())
    }

    /// 把对象放入群组（容器改为本群组）
    pub async fn add_object(&self, object: Guid) -> Result<bool> {
        let guid = self.guid()?;
        let mut attrs = self
            .services
            .store()
            .get_typed(object, EntityType::Object, &self.viewer)
            .await?;
        attrs.container_guid = guid;
        attrs.touch();
        self.services.store().put(attrs).await?;
        debug!(group = %guid, %object, "object added to group");
        Ok(true)
    }

    /// 把对象移出群组（容器恢复为其所有者）；对象不在本群组时返回 false
    pub async fn remove_object(&self, object: Guid) -> Result<bool> {
        let guid = self.guid()?;
        let mut attrs = self
            .services
            .store()
            .get_typed(object, EntityType::Object, &self.viewer)
            .await?;
        if attrs.container_guid != guid {
            return Ok(false);
        }
        attrs.container_guid = attrs.owner_guid;
        attrs.touch();
        self.services.store().put(attrs).await?;
        debug!(group = %guid, %object, "object removed from group");
        Ok(true)
    }

    fn objects_filter(guid: Guid, subtype: Option<&str>) -> EntityFilter {
        EntityFilter::builder()
            .entity_type(EntityType::Object)
            .maybe_subtype(subtype)
            .container(guid)
            .build()
    }

    /// 群组内的对象（访问者可读者），按创建时间倒序
    pub async fn objects(&self, subtype: Option<&str>, page: Page) -> Result<Vec<EntityAttributes>> {
        let filter = Self::objects_filter(self.guid()?, subtype);
        let rows = self.services.store().find(&filter, page).await?;
        Ok(rows
            .into_iter()
            .filter(|r| can_read_entity(&self.viewer, r))
            .collect())
    }

    pub async fn count_objects(&self, subtype: Option<&str>) -> Result<u64> {
        let filter = Self::objects_filter(self.guid()?, subtype);
        self.services.store().count(&filter).await
    }

    pub async fn members(&self, page: Page) -> Result<Vec<EntityAttributes>> {
        self.list_members(page).await
    }

    pub async fn member_count(&self) -> Result<u64> {
        self.count_members().await
    }

    /// 删除群组：发布 `delete:group`，级联删除全部关系边，再删除属性行
    pub async fn delete(&mut self) -> Result<bool> {
        let guid = self.guid()?;
        self.publish(EntityEvent::new(EventName::Delete, EntityType::Group, guid))
            .await?;
        let edges = self.services.graph().remove_all(guid).await?;
        let deleted = self.services.store().delete(guid).await?;
        self.state = LifecycleState::Deleted;
        self.attributes = None;
        info!(%guid, edges, "group deleted");
        Ok(deleted)
    }

    async fn publish(&self, event: EntityEvent) -> Result<()> {
        let event = event.with_context(self.context.clone());
        self.services.events().publish(&event).await
    }

    /// 校验参与方是一个存在的用户
    async fn ensure_user(&self, user: Guid) -> Result<()> {
        match self.services.store().load(user).await? {
            Some(attrs) if attrs.entity_type() == EntityType::User => Ok(()),
            _ => Err(DomainError::not_found(format!("user {user}"))),
        }
    }
}

#[async_trait]
impl Joinable for Group {
    async fn join(&self, user: Guid) -> Result<bool> {
        let guid = self.guid()?;
        self.ensure_user(user).await?;
        let created = self
            .services
            .graph()
            .insert(user, &Verb::member(), guid)
            .await?;
        if created {
            let event =
                EntityEvent::new(EventName::Join, EntityType::Group, guid).with_related(user);
            if let Err(err) = self.publish(event).await {
                // 通知失败时撤销新边，重试仍会重新发布
                self.services
                    .graph()
                    .remove(user, &Verb::member(), guid)
                    .await?;
                warn!(group = %guid, %user, error = %err, "join notification failed, edge rolled back");
                return Err(err);
            }
            info!(group = %guid, %user, "user joined group");
        }
        Ok(true)
    }

    async fn leave(&self, user: Guid) -> Result<bool> {
        let guid = self.guid()?;
        self.ensure_user(user).await?;
        self.publish(EntityEvent::new(EventName::Leave, EntityType::Group, guid).with_related(user))
            .await?;
        let removed = self
            .services
            .graph()
            .remove(user, &Verb::member(), guid)
            .await?;
        if removed {
            info!(group = %guid, %user, "user left group");
        }
        Ok(removed)
    }

    async fn is_member(&self, user: Option<Guid>) -> Result<bool> {
        let guid = self.guid()?;
        match user.or(self.viewer.guid()) {
            Some(user) => {
                self.services
                    .graph()
                    .exists(user, &Verb::member(), guid)
                    .await
            }
            None => Ok(false),
        }
    }

    async fn list_members(&self, page: Page) -> Result<Vec<EntityAttributes>> {
        let guid = self.guid()?;
        let ids = self
            .services
            .graph()
            .query(&Verb::member(), guid, Direction::Incoming, page)
            .await?;

        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            match self
                .services
                .store()
                .get_typed(id, EntityType::User, &self.viewer)
                .await
            {
                Ok(attrs) => members.push(attrs),
                Err(DomainError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(members)
    }

    async fn count_members(&self) -> Result<u64> {
        let guid = self.guid()?;
        self.services
            .graph()
            .count(&Verb::member(), guid, Direction::Incoming)
            .await
    }
}

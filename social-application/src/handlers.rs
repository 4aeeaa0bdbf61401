//! 群组成员关系与实体删除的命令及处理器
//!
//! 处理器只做权限判定与参数补全，领域规则（事件顺序、级联删除）由
//! `social_domain::group::Group` 负责。
//!
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use social_domain::domain_event::{EntityEvent, EventName};
use social_domain::entity::{Entity, EntityType};
use social_domain::error::DomainError;
use social_domain::group::{Group, Joinable};
use social_domain::services::DomainServices;
use social_domain::value_object::Guid;
use tracing::info;

/// 加入群组；`user` 为空时为访问者本人
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroup {
    pub group: Guid,
    pub user: Option<Guid>,
}

impl Command for JoinGroup {
    const NAME: &'static str = "JoinGroup";
}

/// 退出群组；`user` 为空时为访问者本人
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveGroup {
    pub group: Guid,
    pub user: Option<Guid>,
}

impl Command for LeaveGroup {
    const NAME: &'static str = "LeaveGroup";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntity {
    pub guid: Guid,
}

impl Command for DeleteEntity {
    const NAME: &'static str = "DeleteEntity";
}

fn actor(ctx: &RequestContext) -> AppResult<Guid> {
    ctx.viewer
        .guid()
        .ok_or_else(|| AppError::Unauthorized("login required".into()))
}

/// 加载群组并确认访问者能以 `user` 的身份操作
async fn group_for(
    services: &DomainServices,
    ctx: &RequestContext,
    group: Guid,
    user: Option<Guid>,
) -> AppResult<(Group, Guid)> {
    let actor = actor(ctx)?;
    let group = Group::load(services.clone(), ctx.viewer.clone(), group)
        .await?
        .with_context(ctx.business_context());
    let user = user.unwrap_or(actor);
    if user != actor && !group.can_edit(Some(actor))? {
        return Err(AppError::Unauthorized(format!(
            "user {actor} cannot manage memberships of group {}",
            group.guid()?
        )));
    }
    Ok((group, user))
}

pub struct JoinGroupHandler {
    services: DomainServices,
}

impl JoinGroupHandler {
    pub fn new(services: DomainServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CommandHandler<JoinGroup> for JoinGroupHandler {
    async fn handle(&self, ctx: &RequestContext, cmd: JoinGroup) -> AppResult<()> {
        let (group, user) = group_for(&self.services, ctx, cmd.group, cmd.user).await?;
        group.join(user).await?;
        Ok(())
    }
}

pub struct LeaveGroupHandler {
    services: DomainServices,
}

impl LeaveGroupHandler {
    pub fn new(services: DomainServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CommandHandler<LeaveGroup> for LeaveGroupHandler {
    async fn handle(&self, ctx: &RequestContext, cmd: LeaveGroup) -> AppResult<()> {
        let (group, user) = group_for(&self.services, ctx, cmd.group, cmd.user).await?;
        group.leave(user).await?;
        Ok(())
    }
}

/// 删除任意实体
///
/// 群组交给 `Group::delete`；其他实体由所有者或管理员删除，
/// 同样先发布 `delete:{type}`，再级联删除关系边与属性行。
pub struct DeleteEntityHandler {
    services: DomainServices,
}

impl DeleteEntityHandler {
    pub fn new(services: DomainServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CommandHandler<DeleteEntity> for DeleteEntityHandler {
    async fn handle(&self, ctx: &RequestContext, cmd: DeleteEntity) -> AppResult<()> {
        let actor = actor(ctx)?;
        let attrs = self
            .services
            .store()
            .get(cmd.guid, &ctx.viewer)
            .await?;

        if attrs.entity_type() == EntityType::Group {
            let mut group = Group::wrap(self.services.clone(), ctx.viewer.clone(), attrs)?
                .with_context(ctx.business_context());
            if !group.can_edit(Some(actor))? {
                return Err(AppError::Unauthorized(format!(
                    "user {actor} cannot delete group {}",
                    cmd.guid
                )));
            }
            group.delete().await?;
            return Ok(());
        }

        if attrs.owner_guid != actor && attrs.guid != actor && !ctx.viewer.is_admin() {
            return Err(AppError::Unauthorized(format!(
                "user {actor} cannot delete entity {}",
                cmd.guid
            )));
        }

        let event = EntityEvent::new(EventName::Delete, attrs.entity_type(), cmd.guid)
            .with_context(ctx.business_context());
        self.services.events().publish(&event).await?;
        let edges = self.services.graph().remove_all(cmd.guid).await?;
        if !self.services.store().delete(cmd.guid).await? {
            return Err(DomainError::not_found(format!("entity {}", cmd.guid)).into());
        }
        info!(guid = %cmd.guid, edges, "entity deleted");
        Ok(())
    }
}

//! 属性存储协议（AttributeStore）
//!
//! GUID → 实体属性行的扁平映射。实现方需要保证：
//! - `put` 对未分配 GUID 的行分配新 GUID；对已存在的行整体覆盖，
//!   但不得改变其实体类型（返回 `InvalidState`），也不得改写创建时间；
//! - `put` 指向一个不存在的已分配 GUID 时返回 `NotFound`；
//! - `delete` 仅删除属性行，关系的级联清理由上层（实体外观）负责。
//!
use crate::access::{Viewer, can_read_entity};
use crate::entity::{Entity, EntityAttributes, EntityType};
use crate::error::{DomainError, DomainResult as Result};
use crate::value_object::{Guid, Page};
use async_trait::async_trait;
use bon::Builder;
use std::sync::Arc;

/// 实体筛选条件
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    entity_type: Option<EntityType>,
    #[builder(into)]
    subtype: Option<String>,
    owner: Option<Guid>,
    container: Option<Guid>,
    /// 仅返回启用的实体
    #[builder(default = true)]
    enabled_only: bool,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EntityFilter {
    pub fn entity_type(&self) -> Option<EntityType> {
        self.entity_type
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    pub fn owner(&self) -> Option<Guid> {
        self.owner
    }

    pub fn container(&self) -> Option<Guid> {
        self.container
    }

    pub fn enabled_only(&self) -> bool {
        self.enabled_only
    }

    pub fn matches(&self, attrs: &EntityAttributes) -> bool {
        if self.enabled_only && !attrs.enabled {
            return false;
        }
        if self.entity_type.is_some_and(|t| t != attrs.entity_type()) {
            return false;
        }
        if self.subtype.as_deref().is_some_and(|s| s != attrs.subtype) {
            return false;
        }
        if self.owner.is_some_and(|o| o != attrs.owner_guid) {
            return false;
        }
        if self.container.is_some_and(|c| c != attrs.container_guid) {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// 读取原始属性行（不做访问控制）
    async fn load(&self, guid: Guid) -> Result<Option<EntityAttributes>>;

    /// 写入属性行，返回（可能新分配的）GUID
    async fn put(&self, attributes: EntityAttributes) -> Result<Guid>;

    /// 删除属性行；不存在时返回 false
    async fn delete(&self, guid: Guid) -> Result<bool>;

    /// 按条件列出实体，按创建时间倒序
    async fn find(&self, filter: &EntityFilter, page: Page) -> Result<Vec<EntityAttributes>>;

    /// 按条件计数
    async fn count(&self, filter: &EntityFilter) -> Result<u64>;

    /// 以访问者身份读取实体
    ///
    /// 行不存在或访问者无读取权限时都返回 `NotFound`，不暴露两者的区别。
    async fn get(&self, guid: Guid, viewer: &Viewer) -> Result<EntityAttributes> {
        match self.load(guid).await? {
            Some(attrs) if can_read_entity(viewer, &attrs) => Ok(attrs),
            _ => Err(DomainError::not_found(format!("entity {guid}"))),
        }
    }

    /// 以访问者身份读取并校验实体类型
    async fn get_typed(
        &self,
        guid: Guid,
        expected: EntityType,
        viewer: &Viewer,
    ) -> Result<EntityAttributes> {
        let attrs = self.get(guid, viewer).await?;
        if attrs.entity_type() != expected {
            return Err(DomainError::not_found(format!("{expected} {guid}")));
        }
        Ok(attrs)
    }
}

#[async_trait]
impl<T> AttributeStore for Arc<T>
where
    T: AttributeStore + ?Sized,
{
    async fn load(&self, guid: Guid) -> Result<Option<EntityAttributes>> {
        (**self).load(guid).await
    }

    async fn put(&self, attributes: EntityAttributes) -> Result<Guid> {
        (**self).put(attributes).await
    }

    async fn delete(&self, guid: Guid) -> Result<bool> {
        (**self).delete(guid).await
    }

    async fn find(&self, filter: &EntityFilter, page: Page) -> Result<Vec<EntityAttributes>> {
        (**self).find(filter, page).await
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        (**self).count(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_on_every_dimension() {
        let owner = Guid::new(1);
        let blog = EntityAttributes::object(owner, "blog", "hello").with_container(Guid::new(9));

        assert!(EntityFilter::default().matches(&blog));
        assert!(
            EntityFilter::builder()
                .entity_type(EntityType::Object)
                .subtype("blog")
                .owner(owner)
                .container(Guid::new(9))
                .build()
                .matches(&blog)
        );
        assert!(!EntityFilter::builder().subtype("file").build().matches(&blog));
        assert!(
            !EntityFilter::builder()
                .entity_type(EntityType::Group)
                .build()
                .matches(&blog)
        );
        assert!(!EntityFilter::builder().owner(Guid::new(2)).build().matches(&blog));
    }

    #[test]
    fn disabled_entities_are_hidden_by_default() {
        let hidden = EntityAttributes::object(Guid::new(1), "blog", "x").with_enabled(false);
        assert!(!EntityFilter::default().matches(&hidden));
        assert!(
            EntityFilter::builder()
                .enabled_only(false)
                .build()
                .matches(&hidden)
        );
    }
}

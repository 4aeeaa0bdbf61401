//! 关系图协议（RelationshipGraph）
//!
//! 两个 GUID 之间有向、带类型的边，在 (subject, verb, object) 上唯一。
//! 单条边的增删在存储层是原子的；谓词语义（例如不能与自己成为好友）
//! 由调用方校验，图本身允许自环。
//!
use crate::error::DomainResult as Result;
use crate::value_object::{Guid, Page, Verb};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 查询方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 锚点为 subject，返回 object
    Outgoing,
    /// 锚点为 object，返回 subject
    Incoming,
}

/// 一条关系边
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u64,
    pub subject: Guid,
    pub verb: Verb,
    pub object: Guid,
    pub time_created: DateTime<Utc>,
}

#[async_trait]
pub trait RelationshipGraph: Send + Sync {
    /// 插入边；返回是否为新建（已存在时不重复插入并返回 false）
    async fn insert(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool>;

    /// 删除边；不存在时返回 false
    async fn remove(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool>;

    async fn exists(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool>;

    /// 以锚点查询另一端的 GUID，按边的创建时间倒序（同一时刻后插入者在前）
    async fn query(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
        page: Page,
    ) -> Result<Vec<Guid>>;

    /// 仅计数，不排序
    async fn count(&self, verb: &Verb, anchor: Guid, direction: Direction) -> Result<u64>;

    /// 删除与 GUID 相关的全部边（无论方向），返回删除条数
    async fn remove_all(&self, guid: Guid) -> Result<u64>;

    /// 幂等添加：边已存在同样视为成功
    async fn add(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        self.insert(subject, verb, object).await?;
        Ok(true)
    }
}

#[async_trait]
impl<T> RelationshipGraph for Arc<T>
where
    T: RelationshipGraph + ?Sized,
{
    async fn insert(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        (**self).insert(subject, verb, object).await
    }

    async fn remove(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        (**self).remove(subject, verb, object).await
    }

    async fn exists(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        (**self).exists(subject, verb, object).await
    }

    async fn query(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
        page: Page,
    ) -> Result<Vec<Guid>> {
        (**self).query(verb, anchor, direction, page).await
    }

    async fn count(&self, verb: &Verb, anchor: Guid, direction: Direction) -> Result<u64> {
        (**self).count(verb, anchor, direction).await
    }

    async fn remove_all(&self, guid: Guid) -> Result<u64> {
        (**self).remove_all(guid).await
    }
}

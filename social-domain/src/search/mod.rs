//! 实体检索（search）
//!
//! 按名称类字段做前缀/词首匹配的检索协议，供实时搜索使用。
//! 检索只返回候选 GUID，调用方需要再以访问者身份读取实体完成访问控制。
//!
mod like;

pub use like::{SearchTerm, escape_like, like_matches};

use crate::entity::{EntityAttributes, EntityDetails};
use crate::error::DomainResult as Result;
use crate::value_object::Guid;
use async_trait::async_trait;
use std::sync::Arc;

/// 用户是否命中搜索词
///
/// 已启用且未被封禁，并且 `name LIKE t%`、`name LIKE % t%`、
/// `username LIKE t%` 任一成立。
pub fn user_matches(term: &SearchTerm, attrs: &EntityAttributes) -> bool {
    if !attrs.enabled {
        return false;
    }
    match &attrs.details {
        EntityDetails::User {
            name,
            username,
            banned,
        } => {
            !*banned
                && (term.matches_prefix(name)
                    || term.matches_word(name)
                    || term.matches_prefix(username))
        }
        _ => false,
    }
}

/// 群组是否命中搜索词
///
/// 已启用，并且 `name LIKE t%`、`name LIKE % t%`、`description LIKE % t%` 任一成立。
pub fn group_matches(term: &SearchTerm, attrs: &EntityAttributes) -> bool {
    if !attrs.enabled {
        return false;
    }
    match &attrs.details {
        EntityDetails::Group {
            name, description, ..
        } => term.matches_prefix(name) || term.matches_word(name) || term.matches_word(description),
        _ => false,
    }
}

#[async_trait]
pub trait EntitySearch: Send + Sync {
    /// 检索用户；`among` 不为空时只在给定 GUID 集合内检索
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> Result<Vec<Guid>>;

    /// 检索群组；`owner` 不为空时只返回该用户拥有的群组
    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> Result<Vec<Guid>>;
}

#[async_trait]
impl<T> EntitySearch for Arc<T>
where
    T: EntitySearch + ?Sized,
{
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        (**self).search_users(term, among, limit).await
    }

    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        (**self).search_groups(term, owner, limit).await
    }
}

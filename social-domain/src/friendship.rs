//! 好友关系
//!
//! `friend` 边是单向的：`a --friend--> b` 表示 a 关注/添加了 b。
//! 关系图允许自环，不能与自己成为好友的约束在这里校验。
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{Direction, RelationshipGraph};
use crate::value_object::{Guid, Page, Verb};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Friendships {
    graph: Arc<dyn RelationshipGraph>,
}

impl Friendships {
    pub fn new(graph: Arc<dyn RelationshipGraph>) -> Self {
        Self { graph }
    }

    pub async fn befriend(&self, user: Guid, friend: Guid) -> Result<bool> {
        if user == friend {
            return Err(DomainError::invalid_value(format!(
                "user {user} cannot befriend themselves"
            )));
        }
        let created = self.graph.insert(user, &Verb::friend(), friend).await?;
        if created {
            debug!(%user, %friend, "friend added");
        }
        Ok(true)
    }

    pub async fn unfriend(&self, user: Guid, friend: Guid) -> Result<bool> {
        self.graph.remove(user, &Verb::friend(), friend).await
    }

    pub async fn is_friend(&self, user: Guid, friend: Guid) -> Result<bool> {
        self.graph.exists(user, &Verb::friend(), friend).await
    }

    /// 用户添加的好友，最近添加者在前
    pub async fn friends(&self, user: Guid, page: Page) -> Result<Vec<Guid>> {
        self.graph
            .query(&Verb::friend(), user, Direction::Outgoing, page)
            .await
    }

    /// 把用户加为好友的人
    pub async fn friends_of(&self, user: Guid, page: Page) -> Result<Vec<Guid>> {
        self.graph
            .query(&Verb::friend(), user, Direction::Incoming, page)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::InMemoryRelationshipGraph;

    #[tokio::test]
    async fn befriend_is_directed_and_rejects_self() {
        let friendships = Friendships::new(Arc::new(InMemoryRelationshipGraph::new()));
        let (a, b) = (Guid::new(1), Guid::new(2));

        assert!(matches!(
            friendships.befriend(a, a).await.unwrap_err(),
            DomainError::InvalidValue { .. }
        ));

        assert!(friendships.befriend(a, b).await.unwrap());
        assert!(friendships.befriend(a, b).await.unwrap());
        assert!(friendships.is_friend(a, b).await.unwrap());
        assert!(!friendships.is_friend(b, a).await.unwrap());
        assert_eq!(friendships.friends(a, Page::default()).await.unwrap(), vec![b]);
        assert_eq!(friendships.friends_of(b, Page::default()).await.unwrap(), vec![a]);

        assert!(friendships.unfriend(a, b).await.unwrap());
        assert!(!friendships.unfriend(a, b).await.unwrap());
    }
}

//! 旧式好友接口适配
//!
//! 早期调用方以“加好友”的名字操作群组成员关系。这里只做名字映射，
//! 语义全部委托给 [`Joinable`]。
//!
use crate::entity::EntityAttributes;
use crate::error::DomainResult as Result;
use crate::group::Joinable;
use crate::value_object::{Guid, Page};

pub struct FriendableGroup<G> {
    inner: G,
}

impl<G: Joinable> FriendableGroup<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> G {
        self.inner
    }

    /// 加好友即加入
    pub async fn add_friend(&self, user: Guid) -> Result<bool> {
        self.inner.join(user).await
    }

    /// 删好友即退出
    pub async fn remove_friend(&self, user: Guid) -> Result<bool> {
        self.inner.leave(user).await
    }

    /// 当前访问者是否成员
    pub async fn is_friend(&self) -> Result<bool> {
        self.inner.is_member(None).await
    }

    pub async fn is_friends_with(&self, user: Guid) -> Result<bool> {
        self.inner.is_member(Some(user)).await
    }

    pub async fn is_friend_of(&self, user: Guid) -> Result<bool> {
        self.inner.is_member(Some(user)).await
    }

    pub async fn get_friends(&self, page: Page) -> Result<Vec<EntityAttributes>> {
        self.inner.list_members(page).await
    }

    pub async fn get_friends_of(&self, page: Page) -> Result<Vec<EntityAttributes>> {
        self.inner.list_members(page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Viewer;
    use crate::group::Group;
    use crate::services::DomainServices;

    #[tokio::test]
    async fn friend_names_map_to_membership() {
        let services = DomainServices::in_memory();
        let ann = services
            .store()
            .put(EntityAttributes::user("Ann", "ann"))
            .await
            .unwrap();
        let group = Group::create(
            services,
            Viewer::user(ann),
            EntityAttributes::group(ann, "G", ""),
        )
        .await
        .unwrap();
        let legacy = FriendableGroup::new(group);

        assert!(!legacy.is_friend().await.unwrap());
        assert!(legacy.add_friend(ann).await.unwrap());
        assert!(legacy.is_friend().await.unwrap());
        assert!(legacy.is_friends_with(ann).await.unwrap());
        assert_eq!(legacy.get_friends(Page::default()).await.unwrap().len(), 1);

        assert!(legacy.remove_friend(ann).await.unwrap());
        assert!(!legacy.is_friend_of(ann).await.unwrap());
        assert!(legacy.get_friends_of(Page::default()).await.unwrap().is_empty());
    }
}

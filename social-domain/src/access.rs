//! 访问控制
//!
//! 读取权限是 (访问者, 访问级别, 所有者, 容器) 的纯函数：
//! 不访问存储、没有副作用，同样的输入总是得到同样的结论。
//!
use crate::entity::EntityAttributes;
use crate::value_object::{AccessLevel, Guid};
use std::collections::BTreeSet;

/// 当前请求的访问者
///
/// `guid` 为空表示匿名访问；`acl_ids` 为其所属的自定义访问列表。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    guid: Option<Guid>,
    acl_ids: BTreeSet<u64>,
    admin: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(guid: Guid) -> Self {
        Self {
            guid: Some(guid),
            ..Self::default()
        }
    }

    pub fn admin(guid: Guid) -> Self {
        Self {
            guid: Some(guid),
            admin: true,
            ..Self::default()
        }
    }

    pub fn with_acl(mut self, acl_id: u64) -> Self {
        self.acl_ids.insert(acl_id);
        self
    }

    pub fn guid(&self) -> Option<Guid> {
        self.guid
    }

    pub fn is_logged_in(&self) -> bool {
        self.guid.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn in_acl(&self, acl_id: u64) -> bool {
        self.acl_ids.contains(&acl_id)
    }
}

/// 判断访问者能否读取具有给定访问属性的实体
///
/// 容器本身不赋予任何隐式读取权限。
pub fn can_read(viewer: &Viewer, access: AccessLevel, owner: Guid, _container: Guid) -> bool {
    if viewer.is_admin() {
        return true;
    }
    if viewer.guid() == Some(owner) {
        return true;
    }
    match access {
        AccessLevel::Public => true,
        AccessLevel::LoggedIn => viewer.is_logged_in(),
        AccessLevel::Private => false,
        AccessLevel::Custom(acl) => viewer.is_logged_in() && viewer.in_acl(acl),
    }
}

/// [`can_read`] 作用于完整属性行的便捷形式
///
/// 实体本身即访问者（如用户读取自己的资料）时同样可读。
pub fn can_read_entity(viewer: &Viewer, attrs: &EntityAttributes) -> bool {
    if viewer.guid() == Some(attrs.guid) {
        return true;
    }
    can_read(viewer, attrs.access, attrs.owner_guid, attrs.container_guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Guid = Guid::new(10);
    const OTHER: Guid = Guid::new(11);
    const CONTAINER: Guid = Guid::new(12);

    #[test]
    fn private_is_owner_only() {
        assert!(can_read(&Viewer::user(OWNER), AccessLevel::Private, OWNER, CONTAINER));
        assert!(!can_read(&Viewer::user(OTHER), AccessLevel::Private, OWNER, CONTAINER));
        assert!(!can_read(&Viewer::anonymous(), AccessLevel::Private, OWNER, CONTAINER));
    }

    #[test]
    fn logged_in_requires_identity() {
        assert!(can_read(&Viewer::user(OTHER), AccessLevel::LoggedIn, OWNER, CONTAINER));
        assert!(!can_read(&Viewer::anonymous(), AccessLevel::LoggedIn, OWNER, CONTAINER));
    }

    #[test]
    fn public_is_open() {
        assert!(can_read(&Viewer::anonymous(), AccessLevel::Public, OWNER, CONTAINER));
    }

    #[test]
    fn custom_acl_membership() {
        let access = AccessLevel::Custom(42);
        assert!(can_read(&Viewer::user(OTHER).with_acl(42), access, OWNER, CONTAINER));
        assert!(!can_read(&Viewer::user(OTHER).with_acl(7), access, OWNER, CONTAINER));
        assert!(!can_read(&Viewer::anonymous().with_acl(42), access, OWNER, CONTAINER));
    }

    #[test]
    fn container_grants_nothing() {
        assert!(!can_read(&Viewer::user(CONTAINER), AccessLevel::Private, OWNER, CONTAINER));
    }

    #[test]
    fn admin_reads_everything() {
        assert!(can_read(&Viewer::admin(OTHER), AccessLevel::Private, OWNER, CONTAINER));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let viewer = Viewer::user(OTHER).with_acl(3);
        let first = can_read(&viewer, AccessLevel::Custom(3), OWNER, CONTAINER);
        for _ in 0..10 {
            assert_eq!(can_read(&viewer, AccessLevel::Custom(3), OWNER, CONTAINER), first);
        }
    }
}

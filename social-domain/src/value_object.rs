//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象，用于封装不可变的概念性值与校验逻辑。
//!
use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 值对象抽象
pub trait ValueObject {
    /// 业务校验失败时的错误类型
    type Error;

    /// 创建值对象时进行验证
    fn validate(&self) -> Result<(), Self::Error>;
}

/// 全局唯一实体标识（GUID）
///
/// `0` 保留为“尚未分配”，由属性存储在首次 `put` 时分配真实值。
///
/// ```
/// use social_domain::value_object::Guid;
///
/// let g = Guid::new(42);
/// assert_eq!(g.value(), 42);
/// assert!(!g.is_unassigned());
/// assert!(Guid::UNASSIGNED.is_unassigned());
/// assert_eq!("42".parse::<Guid>().unwrap(), g);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Guid(u64);

impl Guid {
    pub const UNASSIGNED: Guid = Guid(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_unassigned(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Guid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse::<u64>()?))
    }
}

impl From<u64> for Guid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Guid> for u64 {
    fn from(value: Guid) -> Self {
        value.0
    }
}

/// 访问级别：附着在实体上的可见性策略
///
/// 序列化形态沿用整型访问 ID：`0` 私有、`1` 登录可见、`2` 公开，
/// 其余值为自定义访问控制列表（ACL）的 ID。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    #[default]
    Private,
    LoggedIn,
    Public,
    Custom(u64),
}

impl AccessLevel {
    pub const PRIVATE_ID: u64 = 0;
    pub const LOGGED_IN_ID: u64 = 1;
    pub const PUBLIC_ID: u64 = 2;

    pub fn id(&self) -> u64 {
        match self {
            AccessLevel::Private => Self::PRIVATE_ID,
            AccessLevel::LoggedIn => Self::LOGGED_IN_ID,
            AccessLevel::Public => Self::PUBLIC_ID,
            AccessLevel::Custom(acl) => *acl,
        }
    }

    pub fn from_id(id: u64) -> Self {
        match id {
            Self::PRIVATE_ID => AccessLevel::Private,
            Self::LOGGED_IN_ID => AccessLevel::LoggedIn,
            Self::PUBLIC_ID => AccessLevel::Public,
            acl => AccessLevel::Custom(acl),
        }
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.id())
    }
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(AccessLevel::from_id)
    }
}

/// 分页参数（limit/offset）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 10;

    pub const fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// 不限条数
    pub const fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// 关系谓词（如 `member`、`friend`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verb(String);

impl Verb {
    pub const MEMBER: &'static str = "member";
    pub const FRIEND: &'static str = "friend";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn member() -> Self {
        Self::new(Self::MEMBER)
    }

    pub fn friend() -> Self {
        Self::new(Self::FRIEND)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Verb {
    type Error = DomainError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.0.trim().is_empty() {
            return Err(DomainError::invalid_value("relationship verb must not be empty"));
        }
        if self.0.len() > 50 {
            return Err(DomainError::invalid_value(format!(
                "relationship verb too long: {}",
                self.0.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Verb {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_id_mapping() {
        assert_eq!(AccessLevel::from_id(0), AccessLevel::Private);
        assert_eq!(AccessLevel::from_id(1), AccessLevel::LoggedIn);
        assert_eq!(AccessLevel::from_id(2), AccessLevel::Public);
        assert_eq!(AccessLevel::from_id(17), AccessLevel::Custom(17));
        assert_eq!(AccessLevel::Custom(17).id(), 17);
    }

    #[test]
    fn access_level_serializes_as_integer() {
        let json = serde_json::to_string(&AccessLevel::Public).unwrap();
        assert_eq!(json, "2");
        let back: AccessLevel = serde_json::from_str("5").unwrap();
        assert_eq!(back, AccessLevel::Custom(5));
    }

    #[test]
    fn guid_parse_rejects_garbage() {
        assert!("abc".parse::<Guid>().is_err());
        assert_eq!(" 7 ".parse::<Guid>().unwrap(), Guid::new(7));
    }

    #[test]
    fn verb_validation() {
        assert!(Verb::member().validate().is_ok());
        assert!(Verb::new("  ").validate().is_err());
        assert!(Verb::new("x".repeat(51)).validate().is_err());
    }
}

//! 实体（Entity）基础抽象与属性行
//!
//! 所有实体共享同一套基础属性（GUID、类型、子类型、所有者、容器、访问级别、
//! 时间戳、多值元数据），类型特有的字段放在 [`EntityDetails`] 中。
//! 实体类型由 `details` 的变体推导，创建后不可更改。
//!
use crate::value_object::{AccessLevel, Guid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 具备全局唯一标识与类型的实体抽象
pub trait Entity: Send + Sync {
    /// 获取实体 GUID
    fn guid(&self) -> Guid;

    /// 获取实体类型
    fn entity_type(&self) -> EntityType;
}

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Object,
    User,
    Group,
    Site,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Object => "object",
            EntityType::User => "user",
            EntityType::Group => "group",
            EntityType::Site => "site",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 元数据取值（同一键可对应多个值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Integer(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// 类型特有字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityDetails {
    Object {
        title: String,
        #[serde(default)]
        description: String,
    },
    User {
        name: String,
        username: String,
        #[serde(default)]
        banned: bool,
    },
    Group {
        name: String,
        #[serde(default)]
        description: String,
        /// 成员可见性；公开即开放加入
        #[serde(default)]
        membership: AccessLevel,
        #[serde(default)]
        icon_time: Option<i64>,
        #[serde(default)]
        banner: Option<String>,
    },
    Site {
        name: String,
        url: String,
    },
}

impl EntityDetails {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityDetails::Object { .. } => EntityType::Object,
            EntityDetails::User { .. } => EntityType::User,
            EntityDetails::Group { .. } => EntityType::Group,
            EntityDetails::Site { .. } => EntityType::Site,
        }
    }
}

/// 属性存储中的一行：实体的全部持久化属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub guid: Guid,
    #[serde(default)]
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    #[serde(rename = "access_id")]
    pub access: AccessLevel,
    pub enabled: bool,
    pub time_created: DateTime<Utc>,
    pub time_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Vec<MetaValue>>,
    pub details: EntityDetails,
}

impl EntityAttributes {
    /// 以给定类型字段创建一个尚未持久化的实体行
    ///
    /// 容器默认等于所有者。
    pub fn new(owner_guid: Guid, details: EntityDetails) -> Self {
        let now = Utc::now();
        Self {
            guid: Guid::UNASSIGNED,
            subtype: String::new(),
            owner_guid,
            container_guid: owner_guid,
            access: AccessLevel::Public,
            enabled: true,
            time_created: now,
            time_updated: now,
            metadata: BTreeMap::new(),
            details,
        }
    }

    pub fn user(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(
            Guid::UNASSIGNED,
            EntityDetails::User {
                name: name.into(),
                username: username.into(),
                banned: false,
            },
        )
    }

    pub fn group(owner_guid: Guid, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            owner_guid,
            EntityDetails::Group {
                name: name.into(),
                description: description.into(),
                membership: AccessLevel::Public,
                icon_time: None,
                banner: None,
            },
        )
    }

    pub fn object(owner_guid: Guid, subtype: impl Into<String>, title: impl Into<String>) -> Self {
        let mut attrs = Self::new(
            owner_guid,
            EntityDetails::Object {
                title: title.into(),
                description: String::new(),
            },
        );
        attrs.subtype = subtype.into();
        attrs
    }

    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }

    pub fn with_container(mut self, container_guid: Guid) -> Self {
        self.container_guid = container_guid;
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = subtype.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 展示名：用户/群组/站点的 name，对象的 title
    pub fn display_name(&self) -> &str {
        match &self.details {
            EntityDetails::Object { title, .. } => title,
            EntityDetails::User { name, .. }
            | EntityDetails::Group { name, .. }
            | EntityDetails::Site { name, .. } => name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.details {
            EntityDetails::Object { description, .. }
            | EntityDetails::Group { description, .. } => Some(description),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.details {
            EntityDetails::User { username, .. } => Some(username),
            _ => None,
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self.details, EntityDetails::User { banned: true, .. })
    }

    /// 读取某个元数据键的全部取值
    pub fn metadata(&self, key: &str) -> &[MetaValue] {
        self.metadata.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// 覆盖某个元数据键（空列表等价于删除）
    pub fn set_metadata(&mut self, key: impl Into<String>, values: Vec<MetaValue>) {
        let key = key.into();
        if values.is_empty() {
            self.metadata.remove(&key);
        } else {
            self.metadata.insert(key, values);
        }
    }

    /// 追加一个元数据取值
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.metadata.entry(key.into()).or_default().push(value.into());
    }

    pub fn touch(&mut self) {
        self.time_updated = Utc::now();
    }
}

impl Entity for EntityAttributes {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn entity_type(&self) -> EntityType {
        self.details.entity_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_is_derived_from_details() {
        let user = EntityAttributes::user("Ann Smith", "ann");
        assert_eq!(user.entity_type(), EntityType::User);
        assert_eq!(user.display_name(), "Ann Smith");
        assert_eq!(user.username(), Some("ann"));
        assert!(user.guid().is_unassigned());

        let group = EntityAttributes::group(Guid::new(1), "Rustaceans", "crabs");
        assert_eq!(group.entity_type(), EntityType::Group);
        assert_eq!(group.container_guid, Guid::new(1));
        assert_eq!(group.description(), Some("crabs"));
    }

    #[test]
    fn metadata_is_multi_valued() {
        let mut obj = EntityAttributes::object(Guid::new(3), "blog", "hello");
        obj.add_metadata("tags", "rust");
        obj.add_metadata("tags", "elgg");
        obj.add_metadata("views", 5_i64);
        assert_eq!(obj.metadata("tags").len(), 2);
        assert_eq!(obj.metadata("views"), &[MetaValue::Integer(5)]);
        assert!(obj.metadata("missing").is_empty());

        obj.set_metadata("tags", vec![]);
        assert!(obj.metadata("tags").is_empty());
    }

    #[test]
    fn details_serialize_with_type_tag() {
        let user = EntityAttributes::user("Bob", "bob");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["details"]["type"], "user");
        assert_eq!(json["access_id"], 2);

        let back: EntityAttributes = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }
}

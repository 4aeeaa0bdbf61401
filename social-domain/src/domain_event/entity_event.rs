use super::{BusinessContext, DomainEvent};
use crate::entity::EntityType;
use crate::value_object::Guid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 实体生命周期事件名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    Create,
    Update,
    Delete,
    Join,
    Leave,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Create => "create",
            EventName::Update => "update",
            EventName::Delete => "delete",
            EventName::Join => "join",
            EventName::Leave => "leave",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 实体生命周期事件
///
/// `event_type` 形如 `{name}:{object_type}`，例如 `join:group`；
/// `subject` 为事件所属实体，`related` 为参与方（如加入群组的用户）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    event_id: String,
    event_type: String,
    name: EventName,
    object_type: EntityType,
    subject: Guid,
    related: Option<Guid>,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    context: BusinessContext,
}

impl EntityEvent {
    pub fn new(name: EventName, object_type: EntityType, subject: Guid) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: Self::type_key(name, object_type),
            name,
            object_type,
            subject,
            related: None,
            occurred_at: Utc::now(),
            context: BusinessContext::default(),
        }
    }

    /// 事件类型键，用于处理器订阅匹配
    pub fn type_key(name: EventName, object_type: EntityType) -> String {
        format!("{name}:{object_type}")
    }

    pub fn with_related(mut self, related: Guid) -> Self {
        self.related = Some(related);
        self
    }

    pub fn with_context(mut self, context: BusinessContext) -> Self {
        self.context = context;
        self
    }

    pub fn name(&self) -> EventName {
        self.name
    }

    pub fn object_type(&self) -> EntityType {
        self.object_type
    }

    pub fn subject(&self) -> Guid {
        self.subject
    }

    pub fn related(&self) -> Option<Guid> {
        self.related
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }
}

impl DomainEvent for EntityEvent {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_combines_name_and_object_type() {
        let ev = EntityEvent::new(EventName::Join, EntityType::Group, Guid::new(5))
            .with_related(Guid::new(9));
        assert_eq!(ev.event_type(), "join:group");
        assert_eq!(ev.subject(), Guid::new(5));
        assert_eq!(ev.related(), Some(Guid::new(9)));
        assert!(!ev.event_id().is_empty());
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EntityEvent::new(EventName::Leave, EntityType::Group, Guid::new(1));
        let b = EntityEvent::new(EventName::Leave, EntityType::Group, Guid::new(1));
        assert_ne!(a.event_id(), b.event_id());
    }
}

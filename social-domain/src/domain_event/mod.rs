//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`），实体生命周期事件
//! `EntityEvent`，以及随事件携带的业务上下文 `BusinessContext`。

mod business_context;
mod domain_event_trait;
mod entity_event;

pub use business_context::BusinessContext;
pub use domain_event_trait::DomainEvent;
pub use entity_event::{EntityEvent, EventName};

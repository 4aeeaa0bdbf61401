//! 事件总线（EventBus）协议
//!
use crate::{domain_event::EntityEvent, error::DomainResult as Result};
use async_trait::async_trait;
use std::sync::Arc;

/// 事件总线：负责把事件分发给订阅者
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 发布事件；返回时所有匹配的处理器都已处理完毕
    async fn publish(&self, event: &EntityEvent) -> Result<()>;
}

#[async_trait]
impl<T> EventBus for Arc<T>
where
    T: EventBus + ?Sized,
{
    async fn publish(&self, event: &EntityEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

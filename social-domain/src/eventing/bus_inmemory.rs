//! 内存版事件总线（InMemoryEventBus）
//!
//! 进程内同步分发：`publish` 按注册顺序逐个等待匹配的处理器完成后才返回，
//! 处理器因此能观察到发布那一刻的存储状态。
//!
//! 处理器失败只记录告警，不会中断触发事件的业务操作。

use crate::domain_event::{DomainEvent, EntityEvent};
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::{EventBus, EventHandler, HandledEventType};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

#[derive(Clone, Default)]
struct HandlerRegistry {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    fn push(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .iter()
            .filter(|h| match h.handled_event_type() {
                HandledEventType::All => true,
                HandledEventType::One(t) => t == event_type,
                HandledEventType::Many(ts) => ts.iter().any(|t| t == event_type),
            })
            .cloned()
            .collect()
    }
}

/// 简单的内存事件总线实现
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    registry: Arc<RwLock<HandlerRegistry>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以处理器列表创建总线，调用顺序即列表顺序
    pub fn with_handlers(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let bus = Self::default();
        for h in handlers {
            // 新建的锁不可能处于中毒状态
            let _ = bus.subscribe(h);
        }
        bus
    }

    /// 注册处理器
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let mut registry = self
            .registry
            .write()
            .map_err(|e| DomainError::event_bus(e.to_string()))?;
        registry.push(handler);
        Ok(())
    }

    fn matching(&self, event_type: &str) -> Result<Vec<Arc<dyn EventHandler>>> {
        let registry = self
            .registry
            .read()
            .map_err(|e| DomainError::event_bus(e.to_string()))?;
        Ok(registry.matching(event_type))
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &EntityEvent) -> Result<()> {
        let handlers = self.matching(event.event_type())?;
        debug!(
            event_type = event.event_type(),
            subject = %event.subject(),
            handlers = handlers.len(),
            "dispatching event"
        );

        for h in handlers {
            if let Err(err) = h.handle(event).await {
                warn!(
                    handler = h.handler_name(),
                    event_type = event.event_type(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
        Ok(())
    }
}

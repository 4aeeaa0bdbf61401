//! 事件子系统（eventing）
//!
//! 提供事件发布与处理的基础抽象与进程内实现：
//! - `EventBus`：统一发布接口，`publish` 返回时所有匹配处理器均已执行完毕；
//! - `EventHandler`：对实体事件进行消费处理；
//! - `InMemoryEventBus`：按注册顺序依次调用处理器的同步分发实现。
//!
//! 发布与存储变更之间的先后顺序由调用方决定（见 `group` 模块的 join/leave），
//! 因此总线不做异步排队或后台投递。
//!
pub mod bus;
pub mod bus_inmemory;
pub mod handler;

pub use bus::EventBus;
pub use bus_inmemory::InMemoryEventBus;
pub use handler::{EventHandler, HandledEventType};

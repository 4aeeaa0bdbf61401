//! 持久化（persist）
//!
//! 定义实体属性存储与关系图两类协议，以及它们的组合实现：
//! - 属性存储（`AttributeStore`）：GUID → 实体属性行，读取时按访问者做权限判定；
//! - 关系图（`RelationshipGraph`）：(subject, verb, object) 唯一的有向边；
//! - 读穿透缓存装饰器（`CachedAttributeStore`）；
//! - 内存实现（`InMemoryAttributeStore`、`InMemoryRelationshipGraph`），
//!   以及启用 `infra-sqlx` 时的 Postgres 实现。
//!
//! 该模块聚焦协议与装配逻辑，上层（群组外观、实时搜索）只依赖 trait 对象。
//!
mod attribute_store;
mod cache;
mod inmemory;
#[cfg(feature = "infra-sqlx")]
mod postgres;
mod relationship_graph;

pub use attribute_store::{AttributeStore, EntityFilter};
pub use cache::CachedAttributeStore;
pub use inmemory::{InMemoryAttributeStore, InMemoryRelationshipGraph};
#[cfg(feature = "infra-sqlx")]
pub use postgres::{PgAttributeStore, PgRelationshipGraph};
pub use relationship_graph::{Direction, Relationship, RelationshipGraph};

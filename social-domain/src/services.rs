//! 领域服务装配
//!
//! 群组外观与好友关系共享的协作者集合：属性存储、关系图与事件总线。
//! 以 `Arc<dyn _>` 持有，克隆成本低，可在每个请求中传递。
//!
use crate::eventing::{EventBus, InMemoryEventBus};
use crate::persist::{
    AttributeStore, CachedAttributeStore, InMemoryAttributeStore, InMemoryRelationshipGraph,
    RelationshipGraph,
};
use bon::Builder;
use std::sync::Arc;

#[derive(Builder, Clone)]
pub struct DomainServices {
    store: Arc<dyn AttributeStore>,
    graph: Arc<dyn RelationshipGraph>,
    events: Arc<dyn EventBus>,
}

impl DomainServices {
    /// 内存实现的组合：带缓存的属性存储、内存关系图与内存事件总线
    pub fn in_memory() -> Self {
        Self::builder()
            .store(Arc::new(CachedAttributeStore::new(InMemoryAttributeStore::new())))
            .graph(Arc::new(InMemoryRelationshipGraph::new()))
            .events(Arc::new(InMemoryEventBus::new()))
            .build()
    }

    pub fn store(&self) -> &Arc<dyn AttributeStore> {
        &self.store
    }

    pub fn graph(&self) -> &Arc<dyn RelationshipGraph> {
        &self.graph
    }

    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }
}

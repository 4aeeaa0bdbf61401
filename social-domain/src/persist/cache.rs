//! 带缓存的属性存储装饰器
//!
//! 读穿透缓存：`load` 命中时直接返回副本，未命中则回源并写入缓存。
//! 任何经由本装饰器的 `put`/`delete` 都会在写前、写后两次失效对应 GUID，
//! 保证之后的读取不会拿到旧值。列表查询不经过缓存。
//!
use crate::entity::EntityAttributes;
use crate::error::DomainResult as Result;
use crate::persist::{AttributeStore, EntityFilter};
use crate::search::{EntitySearch, SearchTerm};
use crate::value_object::{Guid, Page};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

pub struct CachedAttributeStore<S> {
    inner: S,
    cache: DashMap<Guid, EntityAttributes>,
}

impl<S> CachedAttributeStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// 主动失效某个 GUID（例如其他进程写入之后）
    pub fn invalidate(&self, guid: Guid) {
        if self.cache.remove(&guid).is_some() {
            trace!(%guid, "entity cache invalidated");
        }
    }

    pub fn is_cached(&self, guid: Guid) -> bool {
        self.cache.contains_key(&guid)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S> AttributeStore for CachedAttributeStore<S>
where
    S: AttributeStore,
{
    async fn load(&self, guid: Guid) -> Result<Option<EntityAttributes>> {
        if let Some(hit) = self.cache.get(&guid) {
            return Ok(Some(hit.value().clone()));
        }

        let loaded = self.inner.load(guid).await?;
        if let Some(attrs) = &loaded {
            self.cache.insert(guid, attrs.clone());
        }
        Ok(loaded)
    }

    async fn put(&self, attributes: EntityAttributes) -> Result<Guid> {
        let requested = attributes.guid;
        if !requested.is_unassigned() {
            self.invalidate(requested);
        }
        let guid = self.inner.put(attributes).await?;
        self.invalidate(guid);
        Ok(guid)
    }

    async fn delete(&self, guid: Guid) -> Result<bool> {
        self.invalidate(guid);
        let deleted = self.inner.delete(guid).await?;
        self.invalidate(guid);
        Ok(deleted)
    }

    async fn find(&self, filter: &EntityFilter, page: Page) -> Result<Vec<EntityAttributes>> {
        self.inner.find(filter, page).await
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        self.inner.count(filter).await
    }
}

#[async_trait]
impl<S> EntitySearch for CachedAttributeStore<S>
where
    S: EntitySearch,
{
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        self.inner.search_users(term, among, limit).await
    }

    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        self.inner.search_groups(term, owner, limit).await
    }
}

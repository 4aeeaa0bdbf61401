//! 内存版存储实现
//!
//! 基于 `DashMap` 的属性存储与关系图，满足各自协议的全部约束：
//! - 典型用途：测试环境、示例与本地开发；
//! - 关系边以 (subject, verb, object) 为键，借助 entry API 保证单边插入的原子性。
//!
use crate::entity::{Entity, EntityAttributes, EntityType};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{AttributeStore, Direction, EntityFilter, Relationship, RelationshipGraph};
use crate::search::{EntitySearch, SearchTerm, group_matches, user_matches};
use crate::value_object::{Guid, Page, ValueObject, Verb};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.offset).take(page.limit).collect()
}

/// 内存属性存储
pub struct InMemoryAttributeStore {
    rows: DashMap<Guid, EntityAttributes>,
    next_guid: AtomicU64,
}

impl Default for InMemoryAttributeStore {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            next_guid: AtomicU64::new(1),
        }
    }
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按条件收集并按创建时间倒序排列（GUID 倒序作为平局裁决）
    fn collect(&self, pred: impl Fn(&EntityAttributes) -> bool) -> Vec<EntityAttributes> {
        let mut rows: Vec<EntityAttributes> = self
            .rows
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| Reverse((r.time_created, r.guid)));
        rows
    }
}

#[async_trait]
impl AttributeStore for InMemoryAttributeStore {
    async fn load(&self, guid: Guid) -> Result<Option<EntityAttributes>> {
        Ok(self.rows.get(&guid).map(|r| r.value().clone()))
    }

    async fn put(&self, mut attributes: EntityAttributes) -> Result<Guid> {
        if attributes.guid.is_unassigned() {
            let guid = Guid::new(self.next_guid.fetch_add(1, Ordering::SeqCst));
            attributes.guid = guid;
            debug!(%guid, entity_type = %attributes.entity_type(), "entity created");
            self.rows.insert(guid, attributes);
            return Ok(guid);
        }

        let guid = attributes.guid;
        match self.rows.entry(guid) {
            Entry::Occupied(mut existing) => {
                let current = existing.get();
                if current.entity_type() != attributes.entity_type() {
                    return Err(DomainError::invalid_state(format!(
                        "entity {guid} is a {} and cannot become a {}",
                        current.entity_type(),
                        attributes.entity_type()
                    )));
                }
                attributes.time_created = current.time_created;
                existing.insert(attributes);
                debug!(%guid, "entity updated");
                Ok(guid)
            }
            Entry::Vacant(_) => Err(DomainError::not_found(format!("entity {guid}"))),
        }
    }

    async fn delete(&self, guid: Guid) -> Result<bool> {
        let removed = self.rows.remove(&guid).is_some();
        if removed {
            debug!(%guid, "entity deleted");
        }
        Ok(removed)
    }

    async fn find(&self, filter: &EntityFilter, page: Page) -> Result<Vec<EntityAttributes>> {
        Ok(paginate(self.collect(|r| filter.matches(r)), page))
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        Ok(self.rows.iter().filter(|r| filter.matches(r.value())).count() as u64)
    }
}

#[async_trait]
impl EntitySearch for InMemoryAttributeStore {
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        let rows = self.collect(|r| {
            r.entity_type() == EntityType::User
                && among.is_none_or(|set| set.contains(&r.guid))
                && user_matches(term, r)
        });
        Ok(rows.into_iter().take(limit).map(|r| r.guid).collect())
    }

    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        let rows = self.collect(|r| {
            r.entity_type() == EntityType::Group
                && owner.is_none_or(|o| o == r.owner_guid)
                && group_matches(term, r)
        });
        Ok(rows.into_iter().take(limit).map(|r| r.guid).collect())
    }
}

type EdgeKey = (Guid, Verb, Guid);

/// 内存关系图
pub struct InMemoryRelationshipGraph {
    edges: DashMap<EdgeKey, Relationship>,
    next_id: AtomicU64,
}

impl Default for InMemoryRelationshipGraph {
    fn default() -> Self {
        Self {
            edges: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryRelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// 列出与锚点相关的全部边（按创建时间倒序）
    pub fn relationships(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
    ) -> Vec<Relationship> {
        let mut rels: Vec<Relationship> = self
            .edges
            .iter()
            .filter(|e| Self::anchored(e.value(), verb, anchor, direction))
            .map(|e| e.value().clone())
            .collect();
        rels.sort_by_key(|r| Reverse((r.time_created, r.id)));
        rels
    }

    fn anchored(rel: &Relationship, verb: &Verb, anchor: Guid, direction: Direction) -> bool {
        rel.verb == *verb
            && match direction {
                Direction::Outgoing => rel.subject == anchor,
                Direction::Incoming => rel.object == anchor,
            }
    }
}

#[async_trait]
impl RelationshipGraph for InMemoryRelationshipGraph {
    async fn insert(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        verb.validate()?;
        match self.edges.entry((subject, verb.clone(), object)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let rel = Relationship {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    subject,
                    verb: verb.clone(),
                    object,
                    time_created: Utc::now(),
                };
                slot.insert(rel);
                debug!(%subject, %verb, %object, "relationship added");
                Ok(true)
            }
        }
    }

    async fn remove(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        let removed = self
            .edges
            .remove(&(subject, verb.clone(), object))
            .is_some();
        if removed {
            debug!(%subject, %verb, %object, "relationship removed");
        }
        Ok(removed)
    }

    async fn exists(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        Ok(self.edges.contains_key(&(subject, verb.clone(), object)))
    }

    async fn query(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
        page: Page,
    ) -> Result<Vec<Guid>> {
        let others = self
            .relationships(verb, anchor, direction)
            .into_iter()
            .map(|r| match direction {
                Direction::Outgoing => r.object,
                Direction::Incoming => r.subject,
            })
            .collect();
        Ok(paginate(others, page))
    }

    async fn count(&self, verb: &Verb, anchor: Guid, direction: Direction) -> Result<u64> {
        Ok(self
            .edges
            .iter()
            .filter(|e| Self::anchored(e.value(), verb, anchor, direction))
            .count() as u64)
    }

    async fn remove_all(&self, guid: Guid) -> Result<u64> {
        let before = self.edges.len();
        self.edges
            .retain(|(subject, _, object), _| *subject != guid && *object != guid);
        let removed = before.saturating_sub(self.edges.len()) as u64;
        debug!(%guid, removed, "relationships cascaded");
        Ok(removed)
    }
}

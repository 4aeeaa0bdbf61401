//! Postgres 实现（启用 `infra-sqlx` 特性）
//!
//! 所有查询均为参数化语句；搜索词以转义后的 LIKE 模式绑定，
//! 并显式声明 `ESCAPE '\'`。边的插入依赖唯一约束与 `ON CONFLICT DO NOTHING`
//! 保证单边原子性。
//!
use crate::entity::{Entity, EntityAttributes, EntityDetails, MetaValue};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{AttributeStore, Direction, EntityFilter, RelationshipGraph};
use crate::search::{EntitySearch, SearchTerm};
use crate::value_object::{AccessLevel, Guid, Page, ValueObject, Verb};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;
use tracing::debug;

/// 建表语句；`ensure_schema` 幂等执行
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    guid BIGSERIAL PRIMARY KEY,
    type TEXT NOT NULL,
    subtype TEXT NOT NULL DEFAULT '',
    owner_guid BIGINT NOT NULL DEFAULT 0,
    container_guid BIGINT NOT NULL DEFAULT 0,
    access_id BIGINT NOT NULL DEFAULT 2,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    time_created TIMESTAMPTZ NOT NULL,
    time_updated TIMESTAMPTZ NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}',
    details JSONB NOT NULL
);
CREATE TABLE IF NOT EXISTS entity_relationships (
    id BIGSERIAL PRIMARY KEY,
    guid_one BIGINT NOT NULL,
    relationship VARCHAR(50) NOT NULL,
    guid_two BIGINT NOT NULL,
    time_created TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (guid_one, relationship, guid_two)
);
"#;

fn to_db(guid: Guid) -> i64 {
    guid.value() as i64
}

fn from_db(value: i64) -> Guid {
    Guid::new(value as u64)
}

fn page_args(page: Page) -> (i64, i64) {
    let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    (limit, offset)
}

fn row_to_attributes(row: &PgRow) -> Result<EntityAttributes> {
    let Json(details): Json<EntityDetails> = row.try_get("details")?;
    let Json(metadata): Json<BTreeMap<String, Vec<MetaValue>>> = row.try_get("metadata")?;
    let stored_type: String = row.try_get("type")?;
    if stored_type != details.entity_type().as_str() {
        return Err(DomainError::repository(format!(
            "entity type column {stored_type} disagrees with details"
        )));
    }
    Ok(EntityAttributes {
        guid: from_db(row.try_get("guid")?),
        subtype: row.try_get("subtype")?,
        owner_guid: from_db(row.try_get("owner_guid")?),
        container_guid: from_db(row.try_get("container_guid")?),
        access: AccessLevel::from_id(row.try_get::<i64, _>("access_id")? as u64),
        enabled: row.try_get("enabled")?,
        time_created: row.try_get::<DateTime<Utc>, _>("time_created")?,
        time_updated: row.try_get::<DateTime<Utc>, _>("time_updated")?,
        metadata,
        details,
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EntityFilter) {
    qb.push(" WHERE TRUE");
    if let Some(t) = filter.entity_type() {
        qb.push(" AND type = ").push_bind(t.as_str());
    }
    if let Some(s) = filter.subtype() {
        qb.push(" AND subtype = ").push_bind(s.to_string());
    }
    if let Some(o) = filter.owner() {
        qb.push(" AND owner_guid = ").push_bind(to_db(o));
    }
    if let Some(c) = filter.container() {
        qb.push(" AND container_guid = ").push_bind(to_db(c));
    }
    if filter.enabled_only() {
        qb.push(" AND enabled");
    }
}

/// Postgres 属性存储
#[derive(Clone)]
pub struct PgAttributeStore {
    pool: PgPool,
}

impl PgAttributeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AttributeStore for PgAttributeStore {
    async fn load(&self, guid: Guid) -> Result<Option<EntityAttributes>> {
        let row = sqlx::query("SELECT * FROM entities WHERE guid = $1")
            .bind(to_db(guid))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_attributes).transpose()
    }

    async fn put(&self, attributes: EntityAttributes) -> Result<Guid> {
        let entity_type = attributes.entity_type();
        if attributes.guid.is_unassigned() {
            let guid: i64 = sqlx::query_scalar(
                "INSERT INTO entities (type, subtype, owner_guid, container_guid, access_id, \
                 enabled, time_created, time_updated, metadata, details) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING guid",
            )
            .bind(entity_type.as_str())
            .bind(&attributes.subtype)
            .bind(to_db(attributes.owner_guid))
            .bind(to_db(attributes.container_guid))
            .bind(attributes.access.id() as i64)
            .bind(attributes.enabled)
            .bind(attributes.time_created)
            .bind(attributes.time_updated)
            .bind(Json(&attributes.metadata))
            .bind(Json(&attributes.details))
            .fetch_one(&self.pool)
            .await?;
            debug!(guid, %entity_type, "entity created");
            return Ok(from_db(guid));
        }

        let guid = attributes.guid;
        let stored: Option<String> = sqlx::query_scalar("SELECT type FROM entities WHERE guid = $1")
            .bind(to_db(guid))
            .fetch_optional(&self.pool)
            .await?;
        match stored {
            None => return Err(DomainError::not_found(format!("entity {guid}"))),
            Some(t) if t != entity_type.as_str() => {
                return Err(DomainError::invalid_state(format!(
                    "entity {guid} is a {t} and cannot become a {entity_type}"
                )));
            }
            Some(_) => {}
        }

        // time_created 不在更新列中
        sqlx::query(
            "UPDATE entities SET subtype = $2, owner_guid = $3, container_guid = $4, \
             access_id = $5, enabled = $6, time_updated = $7, metadata = $8, details = $9 \
             WHERE guid = $1 AND type = $10",
        )
        .bind(to_db(guid))
        .bind(&attributes.subtype)
        .bind(to_db(attributes.owner_guid))
        .bind(to_db(attributes.container_guid))
        .bind(attributes.access.id() as i64)
        .bind(attributes.enabled)
        .bind(attributes.time_updated)
        .bind(Json(&attributes.metadata))
        .bind(Json(&attributes.details))
        .bind(entity_type.as_str())
        .execute(&self.pool)
        .await?;
        debug!(%guid, "entity updated");
        Ok(guid)
    }

    async fn delete(&self, guid: Guid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM entities WHERE guid = $1")
            .bind(to_db(guid))
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn find(&self, filter: &EntityFilter, page: Page) -> Result<Vec<EntityAttributes>> {
        let (limit, offset) = page_args(page);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM entities");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY time_created DESC, guid DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_attributes).collect()
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM entities");
        push_filter(&mut qb, filter);
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl EntitySearch for PgAttributeStore {
    async fn search_users(
        &self,
        term: &SearchTerm,
        among: Option<&[Guid]>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT guid FROM entities WHERE type = 'user' AND enabled \
             AND NOT COALESCE((details->>'banned')::boolean, FALSE) AND (",
        );
        qb.push("details->>'name' ILIKE ")
            .push_bind(term.prefix_pattern())
            .push(r" ESCAPE '\' OR details->>'name' ILIKE ")
            .push_bind(term.word_pattern())
            .push(r" ESCAPE '\' OR details->>'username' ILIKE ")
            .push_bind(term.prefix_pattern())
            .push(r" ESCAPE '\')");
        if let Some(set) = among {
            let ids: Vec<i64> = set.iter().copied().map(to_db).collect();
            qb.push(" AND guid = ANY(").push_bind(ids).push(")");
        }
        qb.push(" ORDER BY time_created DESC, guid DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        let ids: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(from_db).collect())
    }

    async fn search_groups(
        &self,
        term: &SearchTerm,
        owner: Option<Guid>,
        limit: usize,
    ) -> Result<Vec<Guid>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT guid FROM entities WHERE type = 'group' AND enabled AND (",
        );
        qb.push("details->>'name' ILIKE ")
            .push_bind(term.prefix_pattern())
            .push(r" ESCAPE '\' OR details->>'name' ILIKE ")
            .push_bind(term.word_pattern())
            .push(r" ESCAPE '\' OR details->>'description' ILIKE ")
            .push_bind(term.word_pattern())
            .push(r" ESCAPE '\')");
        if let Some(o) = owner {
            qb.push(" AND owner_guid = ").push_bind(to_db(o));
        }
        qb.push(" ORDER BY time_created DESC, guid DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        let ids: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(from_db).collect())
    }
}

/// Postgres 关系图
#[derive(Clone)]
pub struct PgRelationshipGraph {
    pool: PgPool,
}

impl PgRelationshipGraph {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn anchor_columns(direction: Direction) -> (&'static str, &'static str) {
        match direction {
            Direction::Outgoing => ("guid_one", "guid_two"),
            Direction::Incoming => ("guid_two", "guid_one"),
        }
    }
}

#[async_trait]
impl RelationshipGraph for PgRelationshipGraph {
    async fn insert(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        verb.validate()?;
        let done = sqlx::query(
            "INSERT INTO entity_relationships (guid_one, relationship, guid_two) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(to_db(subject))
        .bind(verb.as_str())
        .bind(to_db(object))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn remove(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        let done = sqlx::query(
            "DELETE FROM entity_relationships \
             WHERE guid_one = $1 AND relationship = $2 AND guid_two = $3",
        )
        .bind(to_db(subject))
        .bind(verb.as_str())
        .bind(to_db(object))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn exists(&self, subject: Guid, verb: &Verb, object: Guid) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM entity_relationships \
             WHERE guid_one = $1 AND relationship = $2 AND guid_two = $3)",
        )
        .bind(to_db(subject))
        .bind(verb.as_str())
        .bind(to_db(object))
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn query(
        &self,
        verb: &Verb,
        anchor: Guid,
        direction: Direction,
        page: Page,
    ) -> Result<Vec<Guid>> {
        let (anchor_col, other_col) = Self::anchor_columns(direction);
        let (limit, offset) = page_args(page);
        let sql = format!(
            "SELECT {other_col} FROM entity_relationships \
             WHERE relationship = $1 AND {anchor_col} = $2 \
             ORDER BY time_created DESC, id DESC LIMIT $3 OFFSET $4"
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(verb.as_str())
            .bind(to_db(anchor))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(from_db).collect())
    }

    async fn count(&self, verb: &Verb, anchor: Guid, direction: Direction) -> Result<u64> {
        let (anchor_col, _) = Self::anchor_columns(direction);
        let sql = format!(
            "SELECT COUNT(*) FROM entity_relationships \
             WHERE relationship = $1 AND {anchor_col} = $2"
        );
        let n: i64 = sqlx::query_scalar(&sql)
            .bind(verb.as_str())
            .bind(to_db(anchor))
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn remove_all(&self, guid: Guid) -> Result<u64> {
        let done =
            sqlx::query("DELETE FROM entity_relationships WHERE guid_one = $1 OR guid_two = $1")
                .bind(to_db(guid))
                .execute(&self.pool)
                .await?;
        Ok(done.rows_affected())
    }
}

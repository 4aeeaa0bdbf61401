use crate::{context::RequestContext, error::AppResult, query::Query};
use async_trait::async_trait;

#[async_trait]
pub trait QueryHandler<Q>: Send + Sync
where
    Q: Query,
{
    async fn handle(&self, ctx: &RequestContext, q: Q) -> AppResult<Q::Dto>;
}

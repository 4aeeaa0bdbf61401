use crate::{context::RequestContext, error::AppResult, query::Query};
use async_trait::async_trait;

/// 查询总线（Query Bus）
///
/// 根据查询的具体类型路由到对应的处理器，返回该查询的 DTO。
#[async_trait]
pub trait QueryBus: Send + Sync {
    async fn dispatch<Q>(&self, ctx: &RequestContext, q: Q) -> AppResult<Q::Dto>
    where
        Q: Query;
}

use crate::{command::Command, context::RequestContext, error::AppResult};
use async_trait::async_trait;

#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &RequestContext, cmd: C) -> AppResult<()>;
}

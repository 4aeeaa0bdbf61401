use crate::{command::Command, context::RequestContext, error::AppResult};
use async_trait::async_trait;

/// 命令总线（Command Bus）
///
/// - 根据命令的具体类型路由到对应的处理器；
/// - 该 trait 带有泛型方法，以具体实现类型注入使用。
#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn dispatch<C>(&self, ctx: &RequestContext, cmd: C) -> AppResult<()>
    where
        C: Command;
}

use crate::{
    context::RequestContext, error::AppError, error::AppResult, query::Query,
    query_bus::QueryBus, query_handler::QueryHandler,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

type BoxAnySend = Box<dyn Any + Send>;

type QueryHandlerFuture<'a> = Pin<Box<dyn Future<Output = AppResult<BoxAnySend>> + Send + 'a>>;

type QueryHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a RequestContext) -> QueryHandlerFuture<'a> + Send + Sync>;

fn erase<F>(f: F) -> QueryHandlerFn
where
    F: for<'a> Fn(BoxAnySend, &'a RequestContext) -> QueryHandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// 基于内存的 QueryBus 实现
/// - 通过 TypeId 注册不同 Query 对应的 Handler
/// - 以类型擦除方式调度，并在调用端还原为 `Q::Dto`
pub struct InMemoryQueryBus {
    handlers: DashMap<TypeId, (&'static str, QueryHandlerFn)>,
}

impl Default for InMemoryQueryBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryQueryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册查询处理器
    pub fn register<Q, H>(&self, handler: Arc<H>) -> AppResult<()>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let f = erase(move |boxed_q, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                match boxed_q.downcast::<Q>() {
                    Ok(q) => {
                        let dto = handler.handle(ctx, *q).await?;
                        Ok(Box::new(dto) as BoxAnySend)
                    }
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: type_name::<Q>(),
                        found: "unknown",
                    }),
                }
            })
        });

        match self.handlers.entry(TypeId::of::<Q>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredQuery { query: Q::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((Q::NAME, f));
                Ok(())
            }
        }
    }

    /// 已注册的查询名
    pub fn registered_queries(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl QueryBus for InMemoryQueryBus {
    async fn dispatch<Q>(&self, ctx: &RequestContext, q: Q) -> AppResult<Q::Dto>
    where
        Q: Query,
    {
        let Some(f) = self
            .handlers
            .get(&TypeId::of::<Q>())
            .map(|h| h.value().1.clone())
        else {
            return Err(AppError::HandlerNotFound(Q::NAME));
        };

        debug!(query = Q::NAME, "dispatching query");
        let out = (f)(Box::new(q), ctx).await?;

        match out.downcast::<Q::Dto>() {
            Ok(dto) => Ok(*dto),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<Q::Dto>(),
                found: "unknown",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::Dto;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count;

    #[derive(Debug, Serialize)]
    struct NumDto(usize);

    impl Dto for NumDto {}

    impl Query for Count {
        const NAME: &'static str = "Count";
        type Dto = NumDto;
    }

    struct CountHandler {
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryHandler<Count> for CountHandler {
        async fn handle(&self, _ctx: &RequestContext, _q: Count) -> AppResult<NumDto> {
            Ok(NumDto(self.counter.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    #[tokio::test]
    async fn register_and_dispatch() {
        let bus = InMemoryQueryBus::new();
        bus.register::<Count, _>(Arc::new(CountHandler {
            counter: Arc::new(AtomicUsize::new(0)),
        }))
        .unwrap();

        let ctx = RequestContext::default();
        let NumDto(first) = bus.dispatch(&ctx, Count).await.unwrap();
        let NumDto(second) = bus.dispatch(&ctx, Count).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(bus.registered_queries(), vec!["Count"]);
    }

    #[tokio::test]
    async fn not_found_when_unregistered() {
        let bus = InMemoryQueryBus::new();
        let err = bus
            .dispatch(&RequestContext::default(), Count)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HandlerNotFound("Count")));
    }

    #[tokio::test]
    async fn type_mismatch_when_result_downcast_fails() {
        #[derive(Serialize)]
        struct WrongDto;

        let bus = InMemoryQueryBus::new();
        let f = erase(|_q, _ctx| {
            Box::pin(async move { Ok::<_, AppError>(Box::new(WrongDto) as BoxAnySend) })
        });
        bus.handlers.insert(TypeId::of::<Count>(), ("Count", f));

        let err = bus
            .dispatch(&RequestContext::default(), Count)
            .await
            .unwrap_err();
        match err {
            AppError::TypeMismatch { expected, .. } => assert!(expected.contains("NumDto")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let bus = InMemoryQueryBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.register::<Count, _>(Arc::new(CountHandler {
            counter: counter.clone(),
        }))
        .unwrap();
        let err = bus
            .register::<Count, _>(Arc::new(CountHandler { counter }))
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegisteredQuery { query: "Count" }));
    }
}

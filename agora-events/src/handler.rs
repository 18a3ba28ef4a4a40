//! Event handler contract

use crate::error::HandlerError;
use crate::event::DomainEvent;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Result returned by a handler
pub type HandlerResult = Result<(), HandlerError>;

/// Event handler trait
///
/// Handlers receive the exact event instance that was published and must
/// treat it as read-only. Delivery is at most once per publish, but a retry
/// stage replays the *whole* dispatch on total failure, so a handler can run
/// more than once for the same logical event. Handlers with external side
/// effects (email, push) should deduplicate on [`DomainEvent::event_id`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle the event
    async fn handle(&self, event: Arc<DomainEvent>) -> HandlerResult;

    /// Name used in logs and failure reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed handler, see [`handler_fn`]
pub struct FnHandler<F, Fut> {
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as an [`EventHandler`]
///
/// ```rust,ignore
/// bus.subscribe(EventType::PostCreated, handler_fn(|event| async move {
///     println!("post created: {}", event.event_id());
///     Ok(())
/// }))?;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F, Fut>
where
    F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    named_handler_fn("anonymous", func)
}

/// Wrap an async closure as a named [`EventHandler`]
pub fn named_handler_fn<F, Fut>(name: impl Into<String>, func: F) -> FnHandler<F, Fut>
where
    F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler {
        name: name.into(),
        func,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event: Arc<DomainEvent>) -> HandlerResult {
        (self.func)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PostDeleted;

    struct AuditHandler;

    #[async_trait]
    impl EventHandler for AuditHandler {
        async fn handle(&self, _event: Arc<DomainEvent>) -> HandlerResult {
            Err(HandlerError::failed("audit log offline"))
        }
    }

    fn event() -> Arc<DomainEvent> {
        Arc::new(
            DomainEvent::new(PostDeleted {
                post_id: "p1".into(),
                author_id: "u1".into(),
                deleted_by: "mod1".into(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_handler_fn_invokes_closure() {
        let handler = named_handler_fn("cache", |event: Arc<DomainEvent>| async move {
            assert_eq!(event.event_type().as_str(), "post.deleted");
            Ok(())
        });

        assert_eq!(handler.name(), "cache");
        assert!(handler.handle(event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_trait_handler_default_name() {
        let handler = AuditHandler;
        assert!(handler.name().ends_with("AuditHandler"));
        assert_eq!(
            handler.handle(event()).await,
            Err(HandlerError::failed("audit log offline"))
        );
    }
}

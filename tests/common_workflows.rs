//! Integration tests for common Agora event workflows.
//!
//! These tests drive the bus through the public API the way application
//! services do: build events, subscribe side effects, publish, inspect.

use agora::prelude::*;
use agora::{
    AnalyticsMiddleware, EventRecord, FactoryOptions, LogSink, PostCreated, ReactionAdded,
    ReactionKind, RetryConfig, UserRegistered, ValidationMiddleware,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn post_created(user: &str) -> DomainEvent {
    let payload = EventPayload::from_value(
        EventType::PostCreated,
        json!({ "postId": "p1", "authorId": "u1", "content": "hello", "tags": [] }),
    )
    .unwrap();
    DomainEvent::builder(payload).user_id(user).build().unwrap()
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new(2)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
}

// =============================================================================
// Publishing
// =============================================================================

#[tokio::test]
async fn test_post_created_reaches_every_subscriber() {
    init_tracing();
    let bus = EventBusFactory::create(Profile::Production);
    let notified = Arc::new(AtomicUsize::new(0));
    let tracked = Arc::new(AtomicUsize::new(0));

    let counter = notified.clone();
    bus.subscribe(
        EventType::PostCreated,
        named_handler_fn("notification", move |event| {
            let counter = counter.clone();
            async move {
                assert_eq!(event.user_id(), Some("u1"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .unwrap();

    let counter = tracked.clone();
    bus.subscribe(
        EventType::PostCreated,
        named_handler_fn("analytics", move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .unwrap();

    let result = bus.publish(post_created("u1")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.handlers_executed, 2);
    assert_eq!(result.handlers_failed, 0);
    assert!(result.errors.is_empty());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(tracked.load(Ordering::SeqCst), 1);

    let stats = bus.statistics();
    assert_eq!(stats.total_events_published, 1);
    assert_eq!(stats.total_handlers_executed, 2);
    assert_eq!(stats.published(EventType::PostCreated), 1);
    assert_eq!(stats.active_subscriptions, 2);
}

#[tokio::test]
async fn test_event_without_subscribers_succeeds() {
    let bus = EventBusFactory::create(Profile::Development);
    let event = DomainEvent::new(UserRegistered {
        user_id: "u7".into(),
        email: "grace@campus.edu".into(),
        display_name: "Grace".into(),
    })
    .unwrap();

    let result = bus.publish(event).await.unwrap();

    assert!(result.success);
    assert_eq!(result.handlers_executed, 0);
    assert_eq!(bus.statistics().total_events_published, 1);
}

#[tokio::test]
async fn test_one_failing_side_effect_does_not_hide_others() {
    let bus = EventBusFactory::create_with(
        Profile::Production,
        FactoryOptions::default().retry(fast_retry()),
    );
    let delivered = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        EventType::ReactionAdded,
        named_handler_fn("push", |_event| async {
            Err(HandlerError::failed("push gateway unavailable"))
        }),
    )
    .unwrap();
    let counter = delivered.clone();
    bus.subscribe_fn(EventType::ReactionAdded, move |_event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .unwrap();

    let event = DomainEvent::new(ReactionAdded {
        reaction_id: "r1".into(),
        post_id: "p1".into(),
        user_id: "u2".into(),
        kind: ReactionKind::Like,
    })
    .unwrap();
    let result = bus.publish(event).await.unwrap();

    assert!(!result.success);
    assert!(result.is_partial_failure());
    assert_eq!(result.handlers_executed, 1);
    assert_eq!(result.handlers_failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].to_string().contains("push gateway unavailable"));
    // partial failures are never replayed
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_follow_up_events_share_correlation() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    bus.subscribe_fn(EventType::ReactionAdded, move |event| {
        let sink = sink.clone();
        async move {
            sink.lock().push((
                event.correlation_id().map(str::to_owned),
                event.causation_id(),
            ));
            Ok(())
        }
    })
    .unwrap();

    let original = DomainEvent::builder(PostCreated {
        post_id: "p1".into(),
        author_id: "u1".into(),
        content: "hello".into(),
        tags: vec!["intro".into()],
        community_id: None,
    })
    .user_id("u1")
    .correlation_id("req-42")
    .build()
    .unwrap();

    let follow_up = original
        .caused(ReactionAdded {
            reaction_id: "r1".into(),
            post_id: "p1".into(),
            user_id: "u1".into(),
            kind: ReactionKind::Love,
        })
        .build()
        .unwrap();

    let results = bus.publish_all(vec![original.clone(), follow_up]).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.success)));

    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![(Some("req-42".to_string()), Some(original.event_id()))]
    );
}

// =============================================================================
// Records
// =============================================================================

#[test]
fn test_record_round_trip_through_json() {
    let event = post_created("u1");

    let json = event.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["eventType"], "post.created");
    assert_eq!(value["data"]["postId"], "p1");
    assert_eq!(value["userId"], "u1");

    let restored = DomainEvent::from_json(&json).unwrap();
    assert_eq!(restored.event_id(), event.event_id());
    assert_eq!(restored.occurred_at(), event.occurred_at());
    assert_eq!(restored.payload(), event.payload());
}

#[test]
fn test_record_with_mismatched_payload_rejected() {
    let mut record: EventRecord = post_created("u1").to_record().unwrap();
    record.event_type = "user.registered".into();

    let err = DomainEvent::from_record(record).unwrap_err();
    assert!(matches!(err, EventError::InvalidEvent(_)));
}

#[test]
fn test_record_with_future_timestamp_rejected() {
    let mut record = post_created("u1").to_record().unwrap();
    record.occurred_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

    assert!(DomainEvent::from_record(record).is_err());
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_stale_event_rejected_before_handlers_run() {
    let bus = EventBus::builder()
        .middleware(ValidationMiddleware::new().max_age(Duration::from_secs(60)))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bus.subscribe_fn(EventType::PostCreated, move |_event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .unwrap();

    let stale = DomainEvent::builder(PostCreated {
        post_id: "p1".into(),
        author_id: "u1".into(),
        content: "hello".into(),
        tags: vec![],
        community_id: None,
    })
    .occurred_at(chrono::Utc::now() - chrono::Duration::minutes(5))
    .build()
    .unwrap();

    let err = bus.publish(stale).await.unwrap_err();

    assert!(matches!(err, EventError::StaleEvent { max_age_secs: 60, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(bus.statistics().total_events_published, 0);
}

#[tokio::test]
async fn test_development_profile_retries_and_logs() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let captured = lines.clone();
    let sink: LogSink = Arc::new(move |_level: tracing::Level, line: &str| {
        captured.lock().push(line.to_string())
    });

    let bus = EventBusFactory::create_with(
        Profile::Development,
        FactoryOptions::default().retry(fast_retry()).logger(sink),
    );

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    bus.subscribe(
        EventType::UserRegistered,
        named_handler_fn("welcome-mail", move |_event| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HandlerError::failed("smtp timeout"))
                } else {
                    Ok(())
                }
            }
        }),
    )
    .unwrap();

    let event = DomainEvent::new(UserRegistered {
        user_id: "u3".into(),
        email: "alan@campus.edu".into(),
        display_name: "Alan".into(),
    })
    .unwrap();
    let result = bus.publish(event).await.unwrap();

    assert!(result.success);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let lines = lines.lock();
    assert!(lines.iter().any(|l| l.starts_with("-> user.registered")));
    assert!(lines.iter().any(|l| l.starts_with("<- user.registered")));
}

#[tokio::test]
async fn test_exhausted_retries_surface_to_publisher() {
    let bus = EventBusFactory::create_with(
        Profile::Production,
        FactoryOptions::default().retry(fast_retry()),
    );
    bus.subscribe(
        EventType::PostCreated,
        named_handler_fn("search-index", |_event| async {
            Err(HandlerError::failed("index offline"))
        }),
    )
    .unwrap();

    match bus.publish(post_created("u1")).await {
        Err(EventError::RetryExhausted { attempts, errors }) => {
            assert_eq!(attempts, 3);
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("search-index"));
        }
        other => panic!("expected retry exhaustion, got {other:?}"),
    }
    assert_eq!(bus.statistics().total_events_published, 3);
}

#[tokio::test]
async fn test_custom_middleware_joins_profile_chain() {
    struct Audit {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Middleware for Audit {
        fn name(&self) -> &str {
            "audit"
        }

        fn priority(&self) -> i32 {
            5
        }

        async fn process(
            &self,
            event: Arc<DomainEvent>,
            next: Next<'_>,
        ) -> agora::Result<PublicationResult> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            next.run(event).await
        }
    }

    let seen = Arc::new(AtomicUsize::new(0));
    let bus = EventBusFactory::create(Profile::Production);
    bus.add_middleware(Audit { seen: seen.clone() });

    assert_eq!(
        bus.middleware_names(),
        vec!["validation", "audit", "retry", "analytics"]
    );

    bus.publish(post_created("u1")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(bus.remove_middleware("audit"));
    bus.publish(post_created("u1")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_analytics_stage_tracks_success_rate() {
    let analytics = AnalyticsMiddleware::new();
    let bus = EventBus::builder().middleware(analytics.clone()).build();
    bus.subscribe_fn(EventType::PostCreated, |_event| async { Ok(()) })
        .unwrap();

    for _ in 0..3 {
        bus.publish(post_created("u1")).await.unwrap();
    }

    let metrics = analytics.metrics(EventType::PostCreated).unwrap();
    assert_eq!(metrics.count, 3);
    assert_eq!(metrics.handlers_executed, 3);
    assert!((metrics.success_rate() - 1.0).abs() < f64::EPSILON);
}

// =============================================================================
// Subscriptions and capacity
// =============================================================================

#[tokio::test]
async fn test_unsubscribed_handler_stops_receiving() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let subscription = bus
        .subscribe_fn(EventType::PostCreated, move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    bus.publish(post_created("u1")).await.unwrap();
    assert!(bus.unsubscribe(&subscription));
    assert!(!subscription.unsubscribe());
    bus.publish(post_created("u1")).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.handler_count(EventType::PostCreated), 0);
}

#[test]
fn test_fifty_first_handler_rejected() {
    let bus = EventBus::new();
    for _ in 0..50 {
        bus.subscribe_fn(EventType::CommentAdded, |_event| async { Ok(()) })
            .unwrap();
    }

    let err = bus
        .subscribe_fn(EventType::CommentAdded, |_event| async { Ok(()) })
        .unwrap_err();

    assert!(matches!(
        err,
        EventError::CapacityExceeded { limit: 50, .. }
    ));
    assert_eq!(bus.handler_count(EventType::CommentAdded), 50);
}

// =============================================================================
// Shared instance
// =============================================================================

#[test]
fn test_shared_bus_lifecycle() {
    BusManager::clear();
    assert!(matches!(
        BusManager::get_instance(),
        Err(EventError::NotInitialized)
    ));

    let bus = BusManager::initialize(Profile::Test);
    assert!(bus.middleware_names().is_empty());
    assert!(!bus.config().catch_handler_errors);

    let shared = BusManager::get_instance().unwrap();
    shared
        .subscribe_fn(EventType::CommunityJoined, |_event| async { Ok(()) })
        .unwrap();
    assert_eq!(bus.handler_count(EventType::CommunityJoined), 1);

    BusManager::clear();
    assert!(!BusManager::is_initialized());
    assert_eq!(bus.handler_count(EventType::CommunityJoined), 0);
}

#[test]
fn test_event_type_tags_parse() {
    for ty in EventType::ALL {
        assert_eq!(ty.as_str().parse::<EventType>().unwrap(), *ty);
    }
    assert!("post.archived".parse::<EventType>().is_err());
}

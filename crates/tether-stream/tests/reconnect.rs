use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

use tether_core::MessageDiff;
use tether_core::Record;
use tether_core::RecordingSink;
use tether_core::RepeatedDiff;
use tether_core::Scalar;
use tether_core::SchemaRegistry;
use tether_core::SessionEvent;
use tether_core::SessionMirror;
use tether_core::SingularValue;
use tether_core::StreamConfig;
use tether_core::TransportError;
use tether_core::Value;
use tether_core::STEP_PAYLOAD_GROUP;
use tether_stream::ConnectionState;
use tether_stream::ConsumerExit;
use tether_stream::ConsumerReport;
use tether_stream::ReactiveTransport;
use tether_stream::StreamConsumer;
use tether_stream::StreamError;
use tether_stream::SubscribeRequest;
use tether_stream::TraceEntry;
use tether_stream::TraceTransport;
use tether_stream::UpdateStream;

fn config(delay_ms: u64) -> StreamConfig {
    StreamConfig {
        reconnect_delay_ms: delay_ms,
        ..StreamConfig::default()
    }
}

fn consumer(entries: Vec<TraceEntry>, config: StreamConfig) -> (StreamConsumer, Arc<TraceTransport>) {
    let transport = Arc::new(TraceTransport::from_entries(entries));
    let registry = Arc::new(SchemaRegistry::builtin().expect("builtin schema"));
    let mirror = SessionMirror::new("session-1", registry, transport.clone());
    (StreamConsumer::new(transport.clone(), mirror, config), transport)
}

/// Runs a consumer over the trace until the trace is used up or the loop
/// stops on its own.
async fn replay(
    entries: Vec<TraceEntry>,
    config: StreamConfig,
) -> (ConsumerReport, Vec<SessionEvent>, Arc<TraceTransport>) {
    let (consumer, transport) = consumer(entries, config);
    let cancel = consumer.cancellation_token();
    let exhausted = transport.exhausted();
    tokio::spawn(async move {
        exhausted.cancelled().await;
        cancel.cancel();
    });
    let (tx, mut rx) = mpsc::channel(256);
    let report = consumer.run(tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (report, events, transport)
}

/// Holds every subscription until the test hands out a permit.
struct GatedTransport {
    inner: TraceTransport,
    gate: Semaphore,
}

#[async_trait]
impl ReactiveTransport for GatedTransport {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| StreamError::Closed(err.to_string()))?;
        permit.forget();
        self.inner.subscribe(request).await
    }

    async fn fetch_full_state(&self, session_id: &str) -> Result<Record, TransportError> {
        self.inner.fetch_full_state(session_id).await
    }
}

fn update(diff: MessageDiff) -> TraceEntry {
    TraceEntry::Update { diff: Some(diff) }
}

fn run_status(status: i32) -> TraceEntry {
    update(MessageDiff::new().scalar(1, Scalar::Enum(status)))
}

fn step_text(status: i32, text: &str) -> TraceEntry {
    let step = MessageDiff::new()
        .scalar(1, Scalar::Enum(status))
        .message(11, MessageDiff::new().scalar(1, Scalar::string(text)));
    update(MessageDiff::new().message(
        2,
        MessageDiff::new()
            .scalar(1, Scalar::string("traj-1"))
            .repeated(2, RepeatedDiff::resize(1).set(0, SingularValue::Message(step))),
    ))
}

fn names(events: &[SessionEvent]) -> Vec<&'static str> {
    events.iter().map(SessionEvent::name).collect()
}

fn text_deltas(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::TextDelta { delta, .. } => Some(delta.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn clean_end_of_stream_resubscribes_after_fixed_delay() {
    let entries = vec![
        run_status(2),
        TraceEntry::EndOfStream,
        run_status(1),
        TraceEntry::EndOfStream,
    ];
    let (consumer, transport) = consumer(entries, config(1000));
    let state = consumer.state();
    let cancel = consumer.cancellation_token();
    let exhausted = transport.exhausted();
    tokio::spawn(async move {
        exhausted.cancelled().await;
        cancel.cancel();
    });
    let (tx, mut rx) = mpsc::channel(16);
    let report = consumer.run(tx).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(names(&events), vec!["status_change", "status_change", "done"]);
    assert_eq!(report.exit, ConsumerExit::Cancelled);
    assert_eq!(report.messages, 2);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    let subscriptions = transport.subscriptions();
    assert_eq!(subscriptions.len(), 3);
    let ids: HashSet<&str> = subscriptions
        .iter()
        .map(|record| record.request.subscriber_id.as_str())
        .collect();
    assert_eq!(ids.len(), 3);
    for pair in subscriptions.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, Duration::from_millis(1000));
    }
}

#[tokio::test(start_paused = true)]
async fn not_found_is_reported_once_and_stops() {
    let entries = vec![
        run_status(2),
        TraceEntry::Error {
            error: StreamError::NotFound("session-1".to_string()),
        },
        run_status(1),
    ];
    let (report, events, transport) = replay(entries, config(10)).await;

    assert_eq!(names(&events), vec!["status_change", "error"]);
    assert_eq!(
        report.exit,
        ConsumerExit::Terminal(StreamError::NotFound("session-1".to_string()))
    );
    assert_eq!(transport.subscriptions().len(), 1);
    assert_eq!(transport.remaining_segments(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_stream_error_is_reported_once_and_stops() {
    let entries = vec![
        run_status(2),
        TraceEntry::Error {
            error: StreamError::Cancelled("server shutting down".to_string()),
        },
        run_status(1),
    ];
    let (report, events, transport) = replay(entries, config(10)).await;

    assert_eq!(names(&events), vec!["status_change", "error"]);
    assert_eq!(
        report.exit,
        ConsumerExit::Terminal(StreamError::Cancelled("server shutting down".to_string()))
    );
    assert_eq!(transport.subscriptions().len(), 1);
    assert_eq!(transport.remaining_segments(), 1);
}

#[tokio::test(start_paused = true)]
async fn connection_state_cycles_through_streaming_and_backoff() {
    let transport = Arc::new(GatedTransport {
        inner: TraceTransport::from_entries(vec![
            run_status(2),
            run_status(4),
            TraceEntry::EndOfStream,
            run_status(1),
        ]),
        gate: Semaphore::new(0),
    });
    let registry = Arc::new(SchemaRegistry::builtin().expect("builtin schema"));
    let mirror = SessionMirror::new("session-1", registry, Arc::new(RecordingSink::new()));
    let consumer = StreamConsumer::new(
        transport.clone(),
        mirror,
        StreamConfig {
            event_buffer: 1,
            ..config(1000)
        },
    );
    let mut state = consumer.state();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    let mut handle = consumer.spawn();

    state
        .wait_for(|current| *current == ConnectionState::Subscribing)
        .await
        .expect("subscribing");
    transport.gate.add_permits(1);

    // The second event cannot fit the channel yet, so the consumer is still
    // inside the stream.
    let first = handle.recv().await.expect("first event");
    assert_eq!(first.name(), "status_change");
    assert_eq!(handle.state(), ConnectionState::Streaming);
    handle.recv().await.expect("second event");

    state
        .wait_for(|current| *current == ConnectionState::Backoff)
        .await
        .expect("backoff");
    state
        .wait_for(|current| *current == ConnectionState::Subscribing)
        .await
        .expect("resubscribing");
    assert_eq!(transport.inner.subscriptions().len(), 1);

    transport.gate.add_permits(1);
    let resumed = [
        handle.recv().await.expect("status after reconnect"),
        handle.recv().await.expect("done"),
    ];
    assert_eq!(names(&resumed), vec!["status_change", "done"]);
    assert_eq!(transport.inner.subscriptions().len(), 2);

    handle.cancel();
    let report = handle.join().await.expect("join");
    assert_eq!(report.exit, ConsumerExit::Cancelled);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_back_off_and_retry() {
    let entries = vec![
        TraceEntry::Error {
            error: StreamError::Transport("connection reset".to_string()),
        },
        run_status(2),
        TraceEntry::EndOfStream,
    ];
    let (report, events, transport) = replay(entries, config(10)).await;

    assert_eq!(names(&events), vec!["status_change"]);
    assert_eq!(report.exit, ConsumerExit::Cancelled);
    assert_eq!(transport.subscriptions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_never_subscribes() {
    let (consumer, transport) = consumer(vec![run_status(2)], config(10));
    consumer.cancellation_token().cancel();
    let (tx, mut rx) = mpsc::channel(4);

    let report = consumer.run(tx).await;

    assert_eq!(report.exit, ConsumerExit::Cancelled);
    assert_eq!(report.subscriptions, 0);
    assert!(rx.try_recv().is_err());
    assert!(transport.subscriptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_prevents_resubscription() {
    let (consumer, transport) = consumer(
        vec![run_status(2), TraceEntry::EndOfStream, run_status(1)],
        config(60_000),
    );
    let mut handle = consumer.spawn();

    let first = handle.recv().await.expect("first event");
    assert_eq!(first.name(), "status_change");
    handle.cancel();
    let report = handle.join().await.expect("join");

    assert_eq!(report.exit, ConsumerExit::Cancelled);
    assert_eq!(transport.subscriptions().len(), 1);
    assert_eq!(transport.remaining_segments(), 1);
}

#[tokio::test(start_paused = true)]
async fn resync_after_reconnect_does_not_repeat_text() {
    let entries = vec![
        step_text(4, "Looking"),
        TraceEntry::EndOfStream,
        // The next subscription opens with the full state again.
        step_text(4, "Looking"),
        step_text(6, "Looking at the repo"),
        TraceEntry::EndOfStream,
    ];
    let (_, events, _) = replay(entries, config(10)).await;

    assert_eq!(text_deltas(&events), vec!["Looking".to_string(), " at the repo".to_string()]);
    assert_eq!(
        names(&events),
        vec!["step:new", "text:delta", "step:update", "text:delta"]
    );
}

#[tokio::test(start_paused = true)]
async fn hydration_runs_before_the_first_subscription() {
    let planner = Record::new().with("response", Value::String("abc".to_string()));
    let step = Record::new()
        .with("status", Value::Number(4.0))
        .with_case(STEP_PAYLOAD_GROUP, "planner_response", Value::Message(planner));
    let trajectory = Record::new()
        .with("trajectory_id", Value::String("traj-1".to_string()))
        .with("steps", Value::List(vec![Value::Message(step)]));
    let snapshot = Record::new()
        .with("status", Value::Number(2.0))
        .with("trajectory", Value::Message(trajectory));
    let entries = vec![
        TraceEntry::Snapshot { state: snapshot },
        step_text(4, "abcdef"),
        TraceEntry::EndOfStream,
    ];
    let hydrating = StreamConfig {
        hydrate_on_start: true,
        ..config(10)
    };

    let (report, events, _) = replay(entries, hydrating).await;

    assert_eq!(
        names(&events),
        vec!["status_change", "step:new", "text:delta", "text:delta"]
    );
    assert_eq!(text_deltas(&events), vec!["abc".to_string(), "def".to_string()]);
    assert_eq!(report.apply_warnings, 0);
}

#[tokio::test(start_paused = true)]
async fn approvals_acknowledge_through_the_transport() {
    let step = MessageDiff::new()
        .scalar(1, Scalar::Enum(3))
        .message(10, MessageDiff::new().scalar(2, Scalar::string("cargo test")))
        .message(2, MessageDiff::new().message(1, MessageDiff::new()));
    let entries = vec![
        update(MessageDiff::new().message(
            2,
            MessageDiff::new()
                .scalar(1, Scalar::string("traj-7"))
                .repeated(2, RepeatedDiff::resize(1).set(0, SingularValue::Message(step))),
        )),
        TraceEntry::EndOfStream,
    ];
    let (_, events, transport) = replay(entries, config(10)).await;

    let request = events
        .iter()
        .find_map(|event| match event {
            SessionEvent::ApprovalNeeded(request) => Some(request.clone()),
            _ => None,
        })
        .expect("approval");
    assert_eq!(request.description(), "Run command: cargo test");
    request.approve(None).await.expect("approve");

    let acks = transport.acks();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].trajectory_id, "traj-7");
}

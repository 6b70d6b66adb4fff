use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use tether_core::SessionEvent;
use tether_core::SessionMirror;
use tether_core::StreamConfig;

use crate::transport::ReactiveTransport;
use crate::transport::StreamError;
use crate::transport::SubscribeRequest;
use crate::transport::UpdateMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Subscribing,
    Streaming,
    Backoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    Cancelled,
    /// A terminal stream error, already reported as an `error` event.
    Terminal(StreamError),
    /// Nobody is listening for events any more.
    ReceiverClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    pub exit: ConsumerExit,
    pub subscriptions: u64,
    pub messages: u64,
    pub events: u64,
    pub apply_warnings: u64,
}

/// Why a single subscription attempt stopped.
enum AttemptEnd {
    Resubscribe,
    Exit(ConsumerExit),
}

/// Owns one session's subscription loop: subscribe, apply each message in
/// arrival order, back off for a fixed delay whenever the stream ends, repeat.
pub struct StreamConsumer {
    transport: Arc<dyn ReactiveTransport>,
    mirror: SessionMirror,
    config: StreamConfig,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    consecutive_failures: u32,
    subscriptions: u64,
    messages: u64,
    events: u64,
    apply_warnings: u64,
}

impl StreamConsumer {
    pub fn new(
        transport: Arc<dyn ReactiveTransport>,
        mirror: SessionMirror,
        config: StreamConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            mirror,
            config,
            cancel: CancellationToken::new(),
            state,
            consecutive_failures: 0,
            subscriptions: 0,
            messages: 0,
            events: 0,
            apply_warnings: 0,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn mirror(&self) -> &SessionMirror {
        &self.mirror
    }

    /// Runs the loop on a new task with a bounded event channel.
    pub fn spawn(self) -> ConsumerHandle {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(tx));
        ConsumerHandle {
            events: rx,
            state,
            cancel,
            join,
        }
    }

    pub async fn run(mut self, events: mpsc::Sender<SessionEvent>) -> ConsumerReport {
        let exit = self.run_loop(&events).await;
        self.set_state(ConnectionState::Disconnected);
        info!(
            session_id = %self.mirror.session_id(),
            ?exit,
            subscriptions = self.subscriptions,
            messages = self.messages,
            "session stream stopped"
        );
        ConsumerReport {
            exit,
            subscriptions: self.subscriptions,
            messages: self.messages,
            events: self.events,
            apply_warnings: self.apply_warnings,
        }
    }

    async fn run_loop(&mut self, events: &mpsc::Sender<SessionEvent>) -> ConsumerExit {
        if self.config.hydrate_on_start {
            if let Some(exit) = self.hydrate(events).await {
                return exit;
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                return ConsumerExit::Cancelled;
            }
            match self.attempt(events).await {
                AttemptEnd::Exit(exit) => return exit,
                AttemptEnd::Resubscribe => {}
            }

            self.set_state(ConnectionState::Backoff);
            debug!(
                session_id = %self.mirror.session_id(),
                delay_ms = self.config.reconnect_delay_ms,
                failures = self.consecutive_failures,
                "backing off before resubscribing"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ConsumerExit::Cancelled,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }
    }

    async fn hydrate(&mut self, events: &mpsc::Sender<SessionEvent>) -> Option<ConsumerExit> {
        let session_id = self.mirror.session_id().to_string();
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Some(ConsumerExit::Cancelled),
            fetched = self.transport.fetch_full_state(&session_id) => fetched,
        };
        match fetched {
            Ok(snapshot) => {
                let (report, derived) = self.mirror.hydrate(&snapshot);
                self.apply_warnings += report.warnings.len() as u64;
                info!(%session_id, fields = report.fields_applied, "hydrated from full state");
                self.forward(events, derived).await
            }
            Err(err) => {
                warn!(%session_id, error = %err, "full state fetch failed; subscribing without it");
                None
            }
        }
    }

    async fn attempt(&mut self, events: &mpsc::Sender<SessionEvent>) -> AttemptEnd {
        self.set_state(ConnectionState::Subscribing);
        let request = SubscribeRequest {
            session_id: self.mirror.session_id().to_string(),
            subscriber_id: Uuid::new_v4().to_string(),
            protocol_version: self.config.protocol_version,
        };
        self.subscriptions += 1;
        info!(
            session_id = %request.session_id,
            subscriber_id = %request.subscriber_id,
            attempt = self.subscriptions,
            "subscribing to session updates"
        );

        let subscribed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return AttemptEnd::Exit(ConsumerExit::Cancelled),
            subscribed = self.transport.subscribe(request) => subscribed,
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(err) => return self.stream_failed(events, err).await,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return AttemptEnd::Exit(ConsumerExit::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(message)) => {
                    if let Some(exit) = self.on_message(events, message).await {
                        return AttemptEnd::Exit(exit);
                    }
                }
                Some(Err(err)) => return self.stream_failed(events, err).await,
                None => {
                    debug!(
                        session_id = %self.mirror.session_id(),
                        "update stream ended; resubscribing"
                    );
                    return AttemptEnd::Resubscribe;
                }
            }
        }
    }

    async fn on_message(
        &mut self,
        events: &mpsc::Sender<SessionEvent>,
        message: UpdateMessage,
    ) -> Option<ConsumerExit> {
        self.consecutive_failures = 0;
        self.messages += 1;
        if *self.state.borrow() != ConnectionState::Streaming {
            self.set_state(ConnectionState::Streaming);
        }
        let diff = message.diff?;
        let (report, derived) = self.mirror.apply_update(&diff);
        self.apply_warnings += report.warnings.len() as u64;
        self.forward(events, derived).await
    }

    async fn stream_failed(
        &mut self,
        events: &mpsc::Sender<SessionEvent>,
        err: StreamError,
    ) -> AttemptEnd {
        if err.is_terminal() {
            warn!(session_id = %self.mirror.session_id(), error = %err, "terminal stream error");
            let report = SessionEvent::Error {
                cause: err.to_string(),
            };
            if let Some(exit) = self.forward(events, vec![report]).await {
                return AttemptEnd::Exit(exit);
            }
            return AttemptEnd::Exit(ConsumerExit::Terminal(err));
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        warn!(
            session_id = %self.mirror.session_id(),
            error = %err,
            failures = self.consecutive_failures,
            "stream failed; will resubscribe"
        );
        AttemptEnd::Resubscribe
    }

    async fn forward(
        &mut self,
        events: &mpsc::Sender<SessionEvent>,
        derived: Vec<SessionEvent>,
    ) -> Option<ConsumerExit> {
        for event in derived {
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Some(ConsumerExit::Cancelled),
                sent = events.send(event) => sent,
            };
            if sent.is_err() {
                return Some(ConsumerExit::ReceiverClosed);
            }
            self.events += 1;
        }
        None
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(
                session_id = %self.mirror.session_id(),
                from = ?previous,
                to = ?next,
                "connection state"
            );
        }
    }
}

/// A consumer running on its own task.
pub struct ConsumerHandle {
    pub events: mpsc::Receiver<SessionEvent>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    join: JoinHandle<ConsumerReport>,
}

impl ConsumerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub async fn join(self) -> Result<ConsumerReport, JoinError> {
        self.join.await
    }
}

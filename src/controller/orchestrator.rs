use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::data_capture::capture_session::{CaptureSession, SessionHandle};
use crate::data_capture::types::Feed;
use crate::dispatch::registry::Dispatcher;
use crate::error_handling::types::{CaptureError, OrchestratorError};
use crate::protocol::decoder::SignatureDecoder;

use super::ready_gate::{GateWaiter, ReadyGate};
use super::types::{FeedFailure, OrchestratorState, ShutdownReport};

/// Owns both feeds' capture sessions and their consumers.
///
/// Lifecycle: `CREATED → STARTING → RUNNING → STOPPING → STOPPED`.
///
/// - [`start`](Self::start) spawns both capture processes and one consumer
///   per feed; consumers only begin once both processes exist.
/// - A consumer whose capture tool leaves error text behind terminates the
///   other feed's process and ends with [`CaptureError::ToolFailed`].
/// - [`shutdown`](Self::shutdown) stops and terminates both sessions before
///   unwinding the consumers, and folds every failure into one report.
pub struct CaptureOrchestrator {
    config: Config,
    dispatcher: Arc<dyn Dispatcher>,
    decoder: SignatureDecoder,
    state: OrchestratorState,
    cancel: CancellationToken,
    gate: ReadyGate,
    sessions: Vec<SessionHandle>,
    consumers: JoinSet<Result<(), CaptureError>>,
    consumer_feeds: HashMap<Id, Feed>,
    failures: Vec<FeedFailure>,
}

impl CaptureOrchestrator {
    pub fn new(config: Config, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            decoder: SignatureDecoder::new(),
            state: OrchestratorState::Created,
            cancel: CancellationToken::new(),
            gate: ReadyGate::new(),
            sessions: Vec::new(),
            consumers: JoinSet::new(),
            consumer_feeds: HashMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Handles of the running sessions, in [`Feed::ALL`] order.
    pub fn sessions(&self) -> &[SessionHandle] {
        &self.sessions
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug!("Orchestrator {} -> {}", self.state, next);
        self.state = next;
    }

    /// Spawns both capture processes and their consumers.
    ///
    /// Errors
    /// - [`OrchestratorError::NoHandlers`] if the dispatcher has nothing
    ///   registered; no process is started.
    /// - [`OrchestratorError::Capture`] if either process cannot be started;
    ///   a sibling that did start is terminated again.
    pub async fn start(&mut self) -> Result<(), OrchestratorError> {
        if self.state != OrchestratorState::Created {
            return Err(OrchestratorError::InvalidState("start called twice"));
        }
        if self.dispatcher.is_empty() {
            error!("No event handlers registered, nothing to listen for");
            return Err(OrchestratorError::NoHandlers);
        }

        self.transition(OrchestratorState::Starting);
        let (community, game) = tokio::join!(
            self.spawn_session(Feed::Community),
            self.spawn_session(Feed::Game)
        );
        let (community, game) = match (community, game) {
            (Ok(community), Ok(game)) => (community, game),
            (Err(e), other) | (other, Err(e)) => {
                error!("Failed to start capture: {}", e);
                if let Ok(session) = other {
                    session.handle().terminate();
                }
                self.transition(OrchestratorState::Stopped);
                return Err(e.into());
            }
        };

        self.sessions = vec![community.handle(), game.handle()];
        let community_sibling = game.handle();
        let game_sibling = community.handle();
        self.spawn_consumer(community, community_sibling);
        self.spawn_consumer(game, game_sibling);

        self.gate.fire();
        self.transition(OrchestratorState::Running);
        info!("Listening on {} and {} feeds", Feed::Community, Feed::Game);
        Ok(())
    }

    async fn spawn_session(&self, feed: Feed) -> Result<CaptureSession, CaptureError> {
        CaptureSession::spawn(
            feed,
            &self.config.capture,
            self.config.filters.for_feed(feed),
            self.cancel.clone(),
        )
    }

    fn spawn_consumer(&mut self, session: CaptureSession, sibling: SessionHandle) {
        let feed = session.feed();
        let abort = self.consumers.spawn(consume(
            session,
            sibling,
            self.gate.waiter(),
            self.decoder,
            Arc::clone(&self.dispatcher),
        ));
        self.consumer_feeds.insert(abort.id(), feed);
    }

    /// Starts both feeds and runs until they end on their own or `shutdown`
    /// resolves, then shuts down.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ShutdownReport, OrchestratorError>
    where
        F: Future,
    {
        self.start().await?;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = self.consumers.join_next_with_id() => match joined {
                    Some(joined) => self.collect(joined),
                    None => {
                        debug!("Both feeds ended");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(self.shutdown().await)
    }

    /// Stops both sessions, terminates their processes, then waits for every
    /// consumer to unwind. Calling it again returns the same report.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        if self.state != OrchestratorState::Stopped {
            self.transition(OrchestratorState::Stopping);

            for session in &self.sessions {
                session.stop();
            }
            for session in &self.sessions {
                session.terminate();
            }
            self.cancel.cancel();

            while let Some(joined) = self.consumers.join_next_with_id().await {
                self.collect(joined);
            }
            self.transition(OrchestratorState::Stopped);

            for failure in &self.failures {
                error!("{} capture returned: {}", failure.feed, failure.message);
            }
            info!("See ya around");
        }
        ShutdownReport::new(self.failures.clone())
    }

    fn terminate_feed(&self, feed: Feed) {
        for session in self.sessions.iter().filter(|s| s.feed() == feed) {
            warn!("Terminating {} feed after a consumer failure", feed);
            session.terminate();
        }
    }

    fn collect(&mut self, joined: Result<(Id, Result<(), CaptureError>), JoinError>) {
        match joined {
            Ok((id, Ok(()))) => {
                let feed = self.consumer_feeds.remove(&id);
                debug!("Consumer for {:?} feed finished", feed);
            }
            Ok((id, Err(e))) => {
                self.consumer_feeds.remove(&id);
                warn!("[{}] capture failed: {}", e.feed(), e);
                self.failures.push(FeedFailure {
                    feed: e.feed(),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let feed = self.consumer_feeds.remove(&e.id());
                if e.is_cancelled() {
                    debug!("Consumer for {:?} feed cancelled", feed);
                    return;
                }
                error!("Consumer for {:?} feed panicked: {}", feed, e);
                if let Some(feed) = feed {
                    self.terminate_feed(feed.sibling());
                    self.failures.push(FeedFailure {
                        feed,
                        message: format!("consumer panicked: {}", e),
                    });
                }
            }
        }
    }
}

/// Per-feed consumption loop.
///
/// Waits for the readiness gate, then matches every record against the
/// feed's signature window and hands decoded events to the dispatcher.
/// A record whose payload does not fit its event's layout decodes to no
/// fields and is dropped here rather than dispatched as an empty event.
async fn consume(
    mut session: CaptureSession,
    sibling: SessionHandle,
    ready: GateWaiter,
    decoder: SignatureDecoder,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<(), CaptureError> {
    let feed = session.feed();
    if !ready.wait().await {
        debug!("[{}] startup abandoned before both feeds were ready", feed);
        return Ok(());
    }

    let window = feed.signature_window();
    debug!("[{}] consuming capture output", feed);
    while let Some(record) = session.next_record().await {
        let Some(matched) = decoder.locate(&record, window.clone()) else {
            trace!(
                "[{}] no known event at {:?}",
                feed,
                record.window(window.clone())
            );
            continue;
        };

        let event = matched.kind.name();
        debug!("[{}] What's the event: {}", feed, event);
        if !dispatcher.has_handler(event) {
            continue;
        }
        let fields = decoder.decode(&record, &matched);
        if fields.is_empty() {
            debug!("[{}] {} payload did not fit its layout", feed, event);
            continue;
        }
        dispatcher.enqueue(event, fields);
        dispatcher.process();
    }

    let error_text = session.finish().await;
    if error_text.is_empty() {
        debug!("[{}] capture output ended cleanly", feed);
        return Ok(());
    }

    warn!(
        "[{}] capture tool reported an error, terminating {} feed",
        feed,
        sibling.feed()
    );
    sibling.terminate();
    Err(CaptureError::ToolFailed {
        feed,
        text: error_text,
    })
}

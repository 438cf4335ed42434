//! Session - async driver around the sans-IO [`Navigator`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Command (mpsc)  ┌─────────────────────────────────┐
//! │ SessionHandle│ ───────────────► │ Session task                    │
//! │  (cloneable) │ ◄─── oneshot ─── │  Navigator + provider + clock   │
//! └──────────────┘                  └─────────────────────────────────┘
//!        ▲                              │                  │
//!        │ watch<NavSnapshot>           │ broadcast<NavEvent>
//!        └──────────────────────────────┴──────────────────┘
//! ```
//!
//! The session runs as a single task. While a fetch or an animation is in
//! progress it `select!`s between that work and the command channel, so
//! commands arriving mid-travel are applied to the navigator immediately
//! (where they are captured as pending) rather than waiting behind it.
//!
//! The snapshot is published before a command is answered, so a caller that
//! awaits a reply and then reads [`SessionHandle::snapshot`] sees the effect.
//! It is also updated before the events describing a change are broadcast,
//! so a subscriber reading the snapshot on an event sees that change.

use crate::clock::FrameClock;
use futures::future::{BoxFuture, FutureExt};
use starmap_core::{
    Directive, EffectSet, NavAction, NavEvent, NavFault, NavSnapshot, Navigator, NavigatorConfig,
    NeighborSet, TravelId, TravelRequest,
};
use starmap_provider::{NeighborProvider, ProviderError, Summary};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has shut down")]
    Closed,

    #[error(transparent)]
    Nav(#[from] NavFault),
}

enum Command {
    Back(oneshot::Sender<bool>),
    Forward(oneshot::Sender<bool>),
    Jump {
        index: usize,
        reply: oneshot::Sender<Result<bool, NavFault>>,
    },
    Travel {
        title: String,
        add_to_history: bool,
        reply: oneshot::Sender<Result<bool, NavFault>>,
    },
    Queue {
        action: NavAction,
        reply: oneshot::Sender<Result<bool, NavFault>>,
    },
    ShowBacklinks {
        show: bool,
        reply: oneshot::Sender<bool>,
    },
    TrailMode {
        enabled: bool,
        reply: oneshot::Sender<EffectSet>,
    },
    FreshSearch {
        title: String,
        reply: oneshot::Sender<Result<bool, NavFault>>,
    },
    Shutdown,
}

type FetchFuture = BoxFuture<'static, Result<NeighborSet, ProviderError>>;

enum Work {
    Idle,
    Fetch { id: TravelId, future: FetchFuture },
    Animate,
}

enum Next {
    /// Carry on with the current work.
    Keep,
    Start(Work),
    Stop,
}

impl Next {
    /// After the current work finished, "keep" means there is nothing left.
    fn or_idle(self) -> Next {
        match self {
            Next::Keep => Next::Start(Work::Idle),
            other => other,
        }
    }
}

pub struct Session {
    navigator: Navigator,
    provider: Arc<dyn NeighborProvider>,
    clock: Box<dyn FrameClock>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<NavEvent>,
    snapshots: watch::Sender<NavSnapshot>,
}

impl Session {
    pub fn new(
        config: NavigatorConfig,
        provider: Arc<dyn NeighborProvider>,
        clock: Box<dyn FrameClock>,
    ) -> (Self, SessionHandle) {
        let navigator = Navigator::new(config);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(navigator.snapshot());

        let handle = SessionHandle {
            commands: command_tx,
            events: event_tx.clone(),
            snapshots: snapshot_rx,
            provider: Arc::clone(&provider),
        };
        let session = Self {
            navigator,
            provider,
            clock,
            commands: command_rx,
            events: event_tx,
            snapshots: snapshot_tx,
        };
        (session, handle)
    }

    /// Create a session and run it on the current tokio runtime.
    pub fn spawn(
        config: NavigatorConfig,
        provider: Arc<dyn NeighborProvider>,
        clock: Box<dyn FrameClock>,
    ) -> SessionHandle {
        let (session, handle) = Self::new(config, provider, clock);
        tokio::spawn(session.run());
        handle
    }

    /// Process commands until shutdown or until every handle is dropped and
    /// the last travel has finished.
    pub async fn run(mut self) {
        info!(provider = self.provider.name(), "Session started");
        let mut work = Work::Idle;
        let mut closed = false;

        loop {
            let next = match &mut work {
                Work::Idle => {
                    if closed {
                        break;
                    }
                    match self.commands.recv().await {
                        Some(command) => self.handle(command),
                        None => break,
                    }
                }
                Work::Fetch { id, future } => {
                    let id = *id;
                    tokio::select! {
                        result = future => {
                            let result = result.map_err(describe_failure);
                            let next = match self.navigator.on_fetched(id, result) {
                                Ok(directive) => self.follow(directive),
                                Err(e) => {
                                    warn!(travel = %id, error = %e, "Dropped fetch result");
                                    Next::Keep
                                }
                            };
                            self.publish();
                            next.or_idle()
                        }
                        command = self.commands.recv(), if !closed => match command {
                            Some(command) => self.handle(command),
                            None => {
                                closed = true;
                                Next::Keep
                            }
                        },
                    }
                }
                Work::Animate => {
                    tokio::select! {
                        dt = self.clock.tick() => {
                            let next = match self.navigator.tick(dt) {
                                Some(directive) => self.follow(directive).or_idle(),
                                None => Next::Keep,
                            };
                            self.publish();
                            next
                        }
                        command = self.commands.recv(), if !closed => match command {
                            Some(command) => self.handle(command),
                            None => {
                                closed = true;
                                Next::Keep
                            }
                        },
                    }
                }
            };

            match next {
                Next::Keep => {}
                Next::Start(next) => work = next,
                Next::Stop => break,
            }
        }
        info!("Session stopped");
    }

    fn handle(&mut self, command: Command) -> Next {
        match command {
            Command::Back(reply) => {
                let directive = self.navigator.go_back_one();
                let accepted = directive.accepted();
                let next = self.follow(directive);
                self.answer(reply, accepted);
                next
            }
            Command::Forward(reply) => {
                let directive = self.navigator.go_forward_one();
                let accepted = directive.accepted();
                let next = self.follow(directive);
                self.answer(reply, accepted);
                next
            }
            Command::Jump { index, reply } => {
                let result = self.navigator.jump_to_breadcrumb(index);
                let (next, value) = self.follow_result(result);
                self.answer(reply, value);
                next
            }
            Command::Travel {
                title,
                add_to_history,
                reply,
            } => {
                let result = self.navigator.travel_to_neighbor(&title, add_to_history);
                let (next, value) = self.follow_result(result);
                self.answer(reply, value);
                next
            }
            Command::Queue { action, reply } => {
                debug!(?action, "Queue navigation");
                let result = self.navigator.queue_nav(action);
                let (next, value) = self.follow_result(result);
                self.answer(reply, value);
                next
            }
            Command::ShowBacklinks { show, reply } => {
                let directive = self.navigator.set_show_backlinks(show);
                let accepted = directive.accepted();
                let next = self.follow(directive);
                self.answer(reply, accepted);
                next
            }
            Command::TrailMode { enabled, reply } => {
                let effects = self.navigator.set_trail_mode(enabled);
                self.answer(reply, effects);
                Next::Keep
            }
            Command::FreshSearch { title, reply } => {
                let result = self.navigator.start_fresh_search(&title);
                if matches!(&result, Ok(d) if d.accepted()) {
                    self.provider.clear_caches();
                }
                let (next, value) = self.follow_result(result);
                self.answer(reply, value);
                next
            }
            Command::Shutdown => Next::Stop,
        }
    }

    fn follow(&mut self, directive: Directive) -> Next {
        match directive {
            Directive::Fetch(request) => Next::Start(self.fetch(request)),
            Directive::Animate(plan) => {
                debug!(
                    travel = %plan.travel,
                    to = %plan.incoming.title,
                    duration_ms = plan.duration_ms,
                    "Animating"
                );
                self.clock.reset();
                Next::Start(Work::Animate)
            }
            Directive::Idle | Directive::Queued => Next::Keep,
        }
    }

    fn follow_result(&mut self, result: Result<Directive, NavFault>) -> (Next, Result<bool, NavFault>) {
        match result {
            Ok(directive) => {
                let accepted = directive.accepted();
                (self.follow(directive), Ok(accepted))
            }
            Err(fault) => {
                if fault.is_bug() {
                    warn!(error = %fault, "Command failed");
                } else {
                    debug!(error = %fault, recoverable = fault.is_recoverable(), "Command rejected");
                }
                (Next::Keep, Err(fault))
            }
        }
    }

    fn fetch(&self, request: TravelRequest) -> Work {
        let provider = Arc::clone(&self.provider);
        let TravelRequest {
            id, title, mode, ..
        } = request;
        debug!(travel = %id, title = %title, mode = %mode, "Fetching neighbor set");
        let future = async move { provider.fetch_neighbor_set(&title, mode).await }.boxed();
        Work::Fetch { id, future }
    }

    fn answer<T>(&mut self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        // The caller may have stopped waiting.
        let _ = reply.send(value);
    }

    fn publish(&mut self) {
        let snapshot = self.navigator.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        for event in self.navigator.drain_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

/// Provider failure text for the user-facing notice.
fn describe_failure(e: ProviderError) -> String {
    if e.is_transient() {
        format!("{e} (temporary, try again)")
    } else {
        e.to_string()
    }
}

/// Cloneable front end to a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<NavEvent>,
    snapshots: watch::Receiver<NavSnapshot>,
    provider: Arc<dyn NeighborProvider>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Step back one history entry. `false` when already at the start.
    pub async fn go_back_one(&self) -> Result<bool, SessionError> {
        self.request(Command::Back).await
    }

    /// Step forward one history entry. `false` when already at the end.
    pub async fn go_forward_one(&self) -> Result<bool, SessionError> {
        self.request(Command::Forward).await
    }

    pub async fn jump_to_breadcrumb(&self, index: usize) -> Result<bool, SessionError> {
        Ok(self
            .request(|reply| Command::Jump { index, reply })
            .await??)
    }

    pub async fn travel_to_neighbor(
        &self,
        title: impl Into<String>,
        add_to_history: bool,
    ) -> Result<bool, SessionError> {
        let title = title.into();
        Ok(self
            .request(|reply| Command::Travel {
                title,
                add_to_history,
                reply,
            })
            .await??)
    }

    /// Travel to a neighbor picked from the current cluster. Picking the
    /// entry before the cursor (the return node) steps back instead of
    /// appending it again.
    pub async fn follow_neighbor(&self, title: impl Into<String>) -> Result<bool, SessionError> {
        let title = title.into();
        let steps_back = {
            let snapshot = self.snapshots.borrow();
            !snapshot.is_animating && snapshot.chain_prev.as_deref() == Some(title.trim())
        };
        if steps_back {
            return self.go_back_one().await;
        }
        self.travel_to_neighbor(title, true).await
    }

    pub async fn queue_nav(&self, action: NavAction) -> Result<bool, SessionError> {
        Ok(self
            .request(|reply| Command::Queue { action, reply })
            .await??)
    }

    pub async fn set_show_backlinks(&self, show: bool) -> Result<bool, SessionError> {
        self.request(|reply| Command::ShowBacklinks { show, reply })
            .await
    }

    pub async fn set_trail_mode(&self, enabled: bool) -> Result<EffectSet, SessionError> {
        self.request(|reply| Command::TrailMode { enabled, reply })
            .await
    }

    /// Start a new session rooted at `title`. Provider caches are cleared
    /// when the search is accepted.
    pub async fn start_fresh_search(&self, title: impl Into<String>) -> Result<bool, SessionError> {
        let title = title.into();
        Ok(self
            .request(|reply| Command::FreshSearch { title, reply })
            .await??)
    }

    /// Page summary straight from the provider; does not touch navigation.
    pub async fn summary(&self, title: &str) -> Summary {
        self.provider.fetch_summary(title).await
    }

    pub async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.provider.suggest(prefix, limit).await
    }

    pub fn snapshot(&self) -> NavSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NavSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavEvent> {
        self.events.subscribe()
    }

    /// Wait until nothing is in flight and nothing is pending.
    pub async fn wait_until_idle(&self) -> Result<NavSnapshot, SessionError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(NavSnapshot::is_settled)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Stop the session, dropping any travel in flight.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

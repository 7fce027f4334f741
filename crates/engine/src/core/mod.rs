//! Engine state and orchestration.
//!
//! One [`Engine`] owns the document and every subsystem. All DOM mutation
//! happens on the engine's own task; background workers (fetch, timers,
//! polls, sockets) communicate exclusively through the message channel, so
//! the tree is never touched off the main loop.

mod apply;
mod calls;
mod dispatch;
mod lifecycle;

pub use dispatch::Event;

use crate::binding::Binding;
use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::fetch::{CallId, FetchEvent};
use crate::fragments::FragmentReader;
use crate::hooks::HookRegistry;
use crate::scheduler::UpdateScheduler;
use crate::signals::SignalBus;
use crate::syslog;
use crate::url_state::UrlState;
use core::time::Duration;
use dom::{Document, NodeId};
use log::Level;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Work routed back into the engine loop by background tasks and deferred
/// steps.
#[derive(Debug)]
pub enum EngineMsg {
    /// Start a scheduled non-sequential call if its token is still current.
    IssueCall { node: NodeId, token: u64 },
    /// Fetch worker traffic for an active call.
    Stream { call: CallId, event: FetchEvent },
    PollTick { node: NodeId },
    TimerFired { node: NodeId },
    AutoFired { node: NodeId },
    EmitSignal { signal: String },
    /// The sequential drainer's inter-update delay elapsed.
    SeqAdvance { node: NodeId },
    SocketText { node: NodeId, text: String },
    SocketClosed { node: NodeId },
}

/// Engine-side state of one in-flight response stream.
pub(crate) struct ActiveCall {
    pub node: NodeId,
    pub reader: FragmentReader,
    /// Full response text, for caching and diagnostics.
    pub raw: String,
    /// Final composed request URL; doubles as the cache key.
    pub url: String,
    pub swap_hook_ran: bool,
    pub sequential: bool,
}

pub struct Engine {
    /// The live document tree.
    pub(crate) doc: Document,
    pub(crate) config: EngineConfig,
    /// One binding per registered element, keyed by node identity.
    pub(crate) registry: HashMap<NodeId, Binding>,
    pub(crate) bus: SignalBus,
    pub(crate) cache: ResponseCache,
    pub(crate) scheduler: UpdateScheduler,
    pub(crate) urls: UrlState,
    pub(crate) hooks: HookRegistry,
    pub(crate) client: Client,
    /// Base URL for resolving relative endpoints.
    pub(crate) base: url::Url,
    pub(crate) tx: UnboundedSender<EngineMsg>,
    rx: UnboundedReceiver<EngineMsg>,
    pub(crate) calls: HashMap<CallId, ActiveCall>,
    next_call: CallId,
}

impl Engine {
    #[inline]
    #[must_use]
    pub fn new(doc: Document, base: url::Url, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // Falls back to the default client when the configured user agent
        // is not a valid header value.
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();
        Self {
            doc,
            config,
            registry: HashMap::new(),
            bus: SignalBus::new(),
            cache: ResponseCache::new(),
            scheduler: UpdateScheduler::new(),
            urls: UrlState::new(base.clone()),
            hooks: HookRegistry::new(),
            client,
            base,
            tx,
            rx,
            calls: HashMap::new(),
            next_call: 0,
        }
    }

    /// Scan the whole document and register every recognized element.
    /// Re-initialization is a no-op: registration is idempotent.
    #[inline]
    pub fn initialize(&mut self) {
        let root = self.doc.root();
        self.register_subtree(root);
        syslog!(
            Level::Info,
            "initialized with {} binding(s)",
            self.registry.len()
        );
    }

    #[inline]
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.doc
    }

    #[inline]
    #[must_use]
    pub const fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// The lifecycle hook registry. Register hooks before `initialize`;
    /// bindings resolve hook names once, at registration.
    #[inline]
    #[must_use]
    pub const fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// The engine's view of the address bar.
    #[inline]
    #[must_use]
    pub const fn url_state(&self) -> &UrlState {
        &self.urls
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of registered bindings.
    #[inline]
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.registry.len()
    }

    /// Process queued messages, then release one frame of scheduled updates.
    /// Returns how many units of work ran.
    #[inline]
    pub fn tick(&mut self) -> usize {
        let mut work = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            work += 1;
        }
        let frame = self.scheduler.drain_frame();
        work += frame.len();
        for patch in frame {
            self.apply_patch(patch);
        }
        work
    }

    /// Drive the loop for a wall-clock duration at the configured frame
    /// budget.
    #[inline]
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            self.tick();
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.config.frame_budget()).await;
        }
        self.tick();
    }

    /// Drive the loop until nothing has happened for `idle`, or `max`
    /// elapses. Pending one-shot timers do not count as activity until they
    /// fire.
    #[inline]
    pub async fn run_until_idle(&mut self, idle: Duration, max: Duration) {
        let deadline = Instant::now() + max;
        let mut last_activity = Instant::now();
        loop {
            let worked = self.tick();
            let now = Instant::now();
            if worked > 0 || self.has_active_work() {
                last_activity = now;
            }
            if now >= deadline || now.duration_since(last_activity) >= idle {
                break;
            }
            tokio::time::sleep(self.config.frame_budget()).await;
        }
    }

    /// Whether calls, scheduled updates, or sequential drains are pending.
    #[inline]
    #[must_use]
    pub fn has_active_work(&self) -> bool {
        !self.calls.is_empty()
            || !self.scheduler.is_empty()
            || self
                .registry
                .values()
                .any(|binding| !binding.state.seq.is_idle())
    }

    pub(crate) fn next_call_id(&mut self) -> CallId {
        self.next_call += 1;
        self.next_call
    }

    /// Deliver a message back to the loop after a delay.
    pub(crate) fn send_after(&self, delay: Duration, msg: EngineMsg) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            drop(tx.send(msg));
        });
    }

    fn handle(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::IssueCall { node, token } => self.on_issue_call(node, token),
            EngineMsg::Stream { call, event } => self.on_stream(call, event),
            EngineMsg::PollTick { node } => self.on_poll_tick(node),
            EngineMsg::TimerFired { node } => self.on_timer(node),
            EngineMsg::AutoFired { node } => self.fire(node),
            EngineMsg::EmitSignal { signal } => self.emit(&signal),
            EngineMsg::SeqAdvance { node } => self.on_seq_advance(node),
            EngineMsg::SocketText { node, text } => self.on_socket_text(node, &text),
            EngineMsg::SocketClosed { node } => self.on_socket_closed(node),
        }
    }
}

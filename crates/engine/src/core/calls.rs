//! Call lifecycle: request planning, stream routing, post-processing, and
//! the per-binding sequential drainer.

use super::{ActiveCall, Engine, EngineMsg};
use crate::binding::InFlight;
use crate::elemlog;
use crate::fetch::{self, CallId, EmitDirective, FetchEvent, RequestPlan};
use crate::fragments::{FragmentBlock, FragmentReader};
use crate::scheduler::DomPatch;
use crate::syslog;
use crate::target::TargetInstruction;
use core::time::Duration;
use dom::{Document, NodeId};
use log::Level;
use reqwest::Method;

/// Markup swapped into `loading` targets while a call is in flight.
pub(crate) const LOADING_HTML: &str = "<div class=\"loading\">Loading...</div>";

/// Where a resolved update goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Apply immediately (streaming responses and cache hits).
    Now,
    /// Next frame via the scheduler.
    Frame,
    /// The binding's sequential update FIFO.
    Sequential,
}

/// Request-shaped fields cloned out of a binding so the borrow ends before
/// the pipeline starts mutating.
struct RequestSpec {
    method: Method,
    endpoint: String,
    source: Vec<String>,
    extras: Vec<(String, String)>,
    loading: Vec<TargetInstruction>,
    cache_ttl: Option<Duration>,
    timeout: Option<Duration>,
    retries: u32,
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookSlot {
    Before,
    BeforeSwap,
    AfterSwap,
    After,
}

fn is_form_control(doc: &Document, node: NodeId) -> bool {
    matches!(doc.tag(node), Some("input" | "select" | "textarea"))
}

fn control_value(doc: &Document, node: NodeId) -> String {
    match doc.tag(node) {
        Some("textarea") => doc.text_content(node),
        Some("select") => {
            let options: Vec<NodeId> = doc
                .descendants(node)
                .filter(|&option| doc.tag(option) == Some("option"))
                .collect();
            let chosen = options
                .iter()
                .copied()
                .find(|&option| doc.has_attr(option, "selected"))
                .or_else(|| options.first().copied());
            chosen.map_or_else(String::new, |option| {
                doc.attr(option, "value")
                    .map_or_else(|| doc.text_content(option), str::to_owned)
            })
        }
        _ => doc.attr(node, "value").unwrap_or_default().to_owned(),
    }
}

/// Collect `(name, value)` pairs from every named control in the subtree,
/// the subtree root included.
fn collect_controls(doc: &Document, root: NodeId, out: &mut Vec<(String, String)>) {
    for node in doc.descendants(root) {
        if is_form_control(doc, node)
            && let Some(name) = doc.attr(node, "name")
        {
            let name = name.to_owned();
            let value = control_value(doc, node);
            out.push((name, value));
        }
    }
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

impl Engine {
    /// Cancel whatever this binding has in flight and schedule a fresh call
    /// on the next tick, carrying a new pending-call token.
    pub(crate) fn supersede_and_schedule(&mut self, node: NodeId) {
        let mut superseded = None;
        if let Some(binding) = self.registry.get_mut(&node) {
            if let Some(flight) = binding.state.in_flight.take() {
                flight.abort.abort();
                superseded = Some(flight.call);
            }
            binding.state.pending_token += 1;
            let token = binding.state.pending_token;
            drop(self.tx.send(EngineMsg::IssueCall { node, token }));
        }
        if let Some(call) = superseded {
            self.calls.remove(&call);
            elemlog!(
                self.registry.get(&node).is_some_and(|b| b.debug),
                Level::Debug,
                "superseded call {call}"
            );
        }
    }

    pub(crate) fn on_issue_call(&mut self, node: NodeId, token: u64) {
        let current = self.registry.get(&node).is_some_and(|binding| {
            binding.state.pending_token == token && !binding.state.poll_disabled
        });
        if current {
            self.start_call(node, false);
        }
    }

    /// Perform a call for the binding. The engine-side steps run here; the
    /// network work happens on a spawned worker that streams back through
    /// the channel.
    pub(crate) fn start_call(&mut self, node: NodeId, sequential: bool) {
        self.run_hook(node, HookSlot::Before);

        let Some(spec) = self.request_spec(node) else {
            return;
        };
        let body = self.collect_body(node, &spec);

        for instruction in spec.loading.clone() {
            self.apply_patch(DomPatch {
                context: node,
                instruction,
                content: LOADING_HTML.to_owned(),
            });
        }

        let url = match self.compose_url(&spec, &body) {
            Ok(url) => url,
            Err(err) => {
                syslog!(Level::Error, "cannot compose URL for {:?}: {err}", spec.endpoint);
                return;
            }
        };

        if spec.cache_ttl.is_some()
            && let Some(hit) = self.cache.get(&url)
        {
            elemlog!(spec.debug, Level::Debug, "cache hit for {url}");
            self.apply_response_text(node, &hit);
            return;
        }

        let call = self.next_call_id();
        let payload = (spec.method != Method::GET && !body.is_empty())
            .then(|| encode_pairs(&body));
        let plan = RequestPlan {
            call,
            node,
            method: spec.method,
            url: url.clone(),
            body: payload,
            timeout: spec.timeout,
            retries: spec.retries,
        };
        elemlog!(spec.debug, Level::Debug, "issuing {} {url}", plan.method);
        let abort = fetch::spawn(self.client.clone(), plan, self.tx.clone());
        self.calls.insert(
            call,
            ActiveCall {
                node,
                reader: FragmentReader::new(),
                raw: String::new(),
                url,
                swap_hook_ran: false,
                sequential,
            },
        );
        if let Some(binding) = self.registry.get_mut(&node) {
            if sequential {
                binding.state.seq.calls.push_back(call);
            } else {
                binding.state.in_flight = Some(InFlight { call, abort });
            }
        }
    }

    fn request_spec(&self, node: NodeId) -> Option<RequestSpec> {
        let binding = self.registry.get(&node)?;
        let method = binding.method.clone()?;
        Some(RequestSpec {
            method,
            endpoint: binding.endpoint.clone(),
            source: binding.source.clone(),
            extras: binding.extras.clone(),
            loading: binding.loading.clone(),
            cache_ttl: binding.cache_ttl,
            timeout: binding.timeout,
            retries: binding.retry,
            debug: binding.debug,
        })
    }

    /// Build the form body: the element's own named controls, every `source`
    /// selector's controls, then the `extras` pairs.
    fn collect_body(&self, node: NodeId, spec: &RequestSpec) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        collect_controls(&self.doc, node, &mut pairs);
        for selector in &spec.source {
            for hit in self.doc.query_all(selector) {
                collect_controls(&self.doc, hit, &mut pairs);
            }
        }
        pairs.extend(spec.extras.iter().cloned());
        pairs
    }

    /// Resolve the endpoint against the base URL; GET merges the encoded
    /// body into the query string.
    fn compose_url(&self, spec: &RequestSpec, body: &[(String, String)]) -> anyhow::Result<String> {
        let mut url = self.base.join(&spec.endpoint)?;
        if spec.method == Method::GET && !body.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in body {
                query.append_pair(key, value);
            }
            drop(query);
        }
        Ok(url.into())
    }

    /// Feed a full response text through the fragment pipeline synchronously.
    /// Used for cache hits, which never re-fire the request.
    fn apply_response_text(&mut self, node: NodeId, text: &str) {
        let mut reader = FragmentReader::new();
        let mut blocks = reader.push(text);
        let (rest, leftover) = reader.finish();
        blocks.extend(rest);
        for block in blocks {
            self.route_block(node, block, Route::Now);
        }
        if let Some(body) = leftover {
            self.fallback_update(node, &body, Route::Now);
        }
    }

    pub(crate) fn on_stream(&mut self, call: CallId, event: FetchEvent) {
        match event {
            FetchEvent::Chunk(chunk) => self.on_chunk(call, &chunk),
            FetchEvent::Restarted => self.on_stream_restarted(call),
            FetchEvent::End { emit } => self.on_stream_end(call, emit),
            FetchEvent::Failed { message } => self.on_stream_failed(call, &message),
        }
    }

    /// A retry is replacing a partially streamed body: the buffered bytes
    /// belong to the failed attempt and must not leak into the fresh one,
    /// or into the cached response text.
    fn on_stream_restarted(&mut self, call: CallId) {
        if let Some(active) = self.calls.get_mut(&call) {
            active.reader = FragmentReader::new();
            active.raw.clear();
            active.swap_hook_ran = false;
        }
    }

    fn on_chunk(&mut self, call: CallId, chunk: &[u8]) {
        // A missing entry means the call was superseded; drop silently.
        let Some(node) = self.calls.get(&call).map(|active| active.node) else {
            return;
        };
        let first_chunk = self.calls.get_mut(&call).is_some_and(|active| {
            let first = !active.swap_hook_ran;
            active.swap_hook_ran = true;
            first
        });
        if first_chunk {
            self.run_hook(node, HookSlot::BeforeSwap);
        }

        let text = String::from_utf8_lossy(chunk).into_owned();
        let Some((blocks, route)) = self.calls.get_mut(&call).map(|active| {
            active.raw.push_str(&text);
            let blocks = active.reader.push(&text);
            let route = if active.reader.streaming() {
                Route::Now
            } else if active.sequential {
                Route::Sequential
            } else {
                Route::Frame
            };
            (blocks, route)
        }) else {
            return;
        };
        for block in blocks {
            self.route_block(node, block, route);
        }
    }

    fn on_stream_end(&mut self, call: CallId, emit: Option<EmitDirective>) {
        let Some(mut active) = self.calls.remove(&call) else {
            return;
        };
        let node = active.node;
        if !active.swap_hook_ran {
            self.run_hook(node, HookSlot::BeforeSwap);
        }

        let (blocks, leftover) = active.reader.finish();
        let route = if active.reader.streaming() {
            Route::Now
        } else if active.sequential {
            Route::Sequential
        } else {
            Route::Frame
        };
        for block in blocks {
            self.route_block(node, block, route);
        }
        if let Some(body) = leftover {
            self.fallback_update(node, &body, route);
        }
        self.run_hook(node, HookSlot::AfterSwap);

        let directives = self.registry.get(&node).map(|binding| binding.url.clone());
        if let Some(directives) = directives {
            self.urls.apply(&directives);
        }

        if let Some(directive) = emit {
            match directive.delay {
                Some(delay) => {
                    self.send_after(delay, EngineMsg::EmitSignal {
                        signal: directive.signal,
                    });
                }
                None => self.emit(&directive.signal),
            }
        }

        let publish = self
            .registry
            .get(&node)
            .map(|binding| (binding.publish.clone(), binding.timer));
        if let Some((Some(signal), timer)) = publish {
            self.emit(&signal);
            if let Some(delay) = timer {
                self.send_after(delay, EngineMsg::EmitSignal { signal });
            }
        }

        let ttl = self.registry.get(&node).and_then(|binding| binding.cache_ttl);
        if let Some(ttl) = ttl {
            self.cache.put(active.url, active.raw, ttl);
        }

        self.run_hook(node, HookSlot::After);

        self.maybe_start_poll(node);

        if let Some(binding) = self.registry.get_mut(&node) {
            if active.sequential {
                binding.state.seq.done.insert(call);
            } else if binding
                .state
                .in_flight
                .as_ref()
                .is_some_and(|flight| flight.call == call)
            {
                binding.state.in_flight = None;
            }
        }
        if active.sequential {
            self.drain_seq(node);
        }
    }

    /// Exhausted retries without cancellation: report through the `onerror`
    /// targets and terminate the chain.
    fn on_stream_failed(&mut self, call: CallId, message: &str) {
        let Some(active) = self.calls.remove(&call) else {
            return;
        };
        let node = active.node;
        syslog!(Level::Error, "request to {} failed: {message}", active.url);

        let onerror = self
            .registry
            .get(&node)
            .map(|binding| binding.onerror.clone())
            .unwrap_or_default();
        let content = format!("<div class=\"error\">Error: {message}</div>");
        for instruction in onerror {
            self.apply_patch(DomPatch {
                context: node,
                instruction,
                content: content.clone(),
            });
        }

        if let Some(binding) = self.registry.get_mut(&node) {
            if active.sequential {
                binding.state.seq.done.insert(call);
            } else if binding
                .state
                .in_flight
                .as_ref()
                .is_some_and(|flight| flight.call == call)
            {
                binding.state.in_flight = None;
            }
        }
        if active.sequential {
            self.drain_seq(node);
        }
    }

    /// Route one extracted fragment. A `this` selector defers to the first
    /// caller target when the triggering element declares its own.
    fn route_block(&mut self, node: NodeId, block: FragmentBlock, route: Route) {
        let caller_first = self
            .registry
            .get(&node)
            .and_then(|binding| binding.targets.first().cloned());
        for instruction in block.targets {
            let instruction = if instruction.is_this()
                && let Some(first) = &caller_first
            {
                first.clone()
            } else {
                instruction
            };
            self.route_patch(
                DomPatch {
                    context: node,
                    instruction,
                    content: block.inner.clone(),
                },
                route,
            );
        }
    }

    /// Fragment-free response body: swap the full text into the caller's
    /// targets, or the element itself when it has none.
    fn fallback_update(&mut self, node: NodeId, content: &str, route: Route) {
        let targets = self
            .registry
            .get(&node)
            .map(|binding| binding.targets.clone())
            .filter(|targets| !targets.is_empty())
            .unwrap_or_else(|| vec![TargetInstruction::this()]);
        for instruction in targets {
            self.route_patch(
                DomPatch {
                    context: node,
                    instruction,
                    content: content.to_owned(),
                },
                route,
            );
        }
    }

    fn route_patch(&mut self, patch: DomPatch, route: Route) {
        match route {
            Route::Now => self.apply_patch(patch),
            Route::Frame => self.scheduler.schedule(patch),
            Route::Sequential => {
                if let Some(binding) = self.registry.get_mut(&patch.context) {
                    binding.state.seq.updates.push_back(patch);
                }
            }
        }
    }

    /// Advance the sequential drainer: completed calls are retired in issue
    /// order, each releasing at most one pending update, separated by the
    /// binding's configured delay. The drainer goes quiet when both FIFOs
    /// are empty and never runs more than once concurrently.
    pub(crate) fn drain_seq(&mut self, node: NodeId) {
        loop {
            let step = {
                let Some(binding) = self.registry.get_mut(&node) else {
                    return;
                };
                let delay = binding.sequential.unwrap_or_default();
                let seq = &mut binding.state.seq;
                if seq.waiting {
                    return;
                }
                let Some(&front) = seq.calls.front() else {
                    return;
                };
                if !seq.done.contains(&front) {
                    return;
                }
                seq.calls.pop_front();
                seq.done.remove(&front);
                seq.updates.pop_front().map(|patch| (patch, delay))
            };
            match step {
                Some((patch, delay)) => {
                    self.apply_patch(patch);
                    if !delay.is_zero() {
                        if let Some(binding) = self.registry.get_mut(&node) {
                            binding.state.seq.waiting = true;
                        }
                        self.send_after(delay, EngineMsg::SeqAdvance { node });
                        return;
                    }
                }
                // The call produced no update (failure or empty stream);
                // keep retiring without a delay.
                None => {}
            }
        }
    }

    pub(crate) fn on_seq_advance(&mut self, node: NodeId) {
        if let Some(binding) = self.registry.get_mut(&node) {
            binding.state.seq.waiting = false;
        }
        self.drain_seq(node);
    }

    /// Invoke a lifecycle hook defensively; a hook error is logged and the
    /// pipeline continues.
    pub(crate) fn run_hook(&mut self, node: NodeId, slot: HookSlot) {
        let hook = self.registry.get(&node).and_then(|binding| match slot {
            HookSlot::Before => binding.hooks.before.clone(),
            HookSlot::BeforeSwap => binding.hooks.before_swap.clone(),
            HookSlot::AfterSwap => binding.hooks.after_swap.clone(),
            HookSlot::After => binding.hooks.after.clone(),
        });
        if let Some(hook) = hook
            && let Err(err) = hook(&mut self.doc, node)
        {
            syslog!(Level::Warn, "lifecycle hook failed: {err:#}");
        }
    }
}

//! Registration, timers, auto modes, and polling.

use super::{Engine, EngineMsg};
use crate::binding::{self, AutoMode, Binding, PollWorker};
use crate::elemlog;
use crate::scheduler::DomPatch;
use crate::socket;
use crate::target::TargetInstruction;
use dom::NodeId;
use dom::swap::Strategy;
use futures::future::{AbortHandle, Abortable};
use log::Level;

enum TimerAction {
    Call,
    Publish(String),
    Remove(Vec<TargetInstruction>),
    Clear(Vec<TargetInstruction>),
    RemoveSelf,
}

impl Engine {
    /// Register every recognized, not-yet-registered element in the subtree.
    /// Guarded per element: registration never fires twice for one node.
    pub(crate) fn register_subtree(&mut self, root: NodeId) {
        let nodes: Vec<NodeId> = self.doc.descendants(root).collect();
        for node in nodes {
            if !self.doc.is_element(node)
                || self.registry.contains_key(&node)
                || !binding::is_recognized(&self.doc, node)
            {
                continue;
            }
            self.register(node);
        }
    }

    fn register(&mut self, node: NodeId) {
        let mut binding =
            Binding::from_element(&self.doc, node, &self.hooks, self.config.poll_floor());

        for name in &binding.subscribe {
            self.bus.subscribe(name, node);
        }

        if let Some(url) = binding.socket.clone() {
            binding.state.socket = Some(socket::spawn(node, url, self.tx.clone()));
        }

        // One-shot; the armed flag keeps re-scans from re-arming it.
        if let Some(delay) = binding.timer
            && !binding.state.timer_armed
        {
            binding.state.timer_armed = true;
            self.send_after(delay, EngineMsg::TimerFired { node });
        }

        match binding.auto {
            Some(AutoMode::Delay(delay)) => {
                self.send_after(delay, EngineMsg::AutoFired { node });
            }
            Some(AutoMode::Prefetch) => {
                drop(self.tx.send(EngineMsg::AutoFired { node }));
            }
            Some(AutoMode::Lazy) => binding.state.lazy_armed = true,
            None => {}
        }

        self.registry.insert(node, binding);
    }

    /// The host reports that an element became visible. Fires `auto="lazy"`
    /// bindings exactly once; the armed flag disarms on first reveal.
    pub fn reveal(&mut self, node: NodeId) {
        let armed = self.registry.get_mut(&node).is_some_and(|binding| {
            let was = binding.state.lazy_armed;
            binding.state.lazy_armed = false;
            was
        });
        if armed {
            self.fire(node);
        }
    }

    /// A `timer` element fired. Precedence: API call, then publish, then a
    /// `(remove)` target, then clearing the target's content, then removing
    /// the element itself.
    pub(crate) fn on_timer(&mut self, node: NodeId) {
        let action = {
            let Some(binding) = self.registry.get(&node) else {
                return;
            };
            if binding.method.is_some() {
                TimerAction::Call
            } else if let Some(signal) = &binding.publish {
                TimerAction::Publish(signal.clone())
            } else {
                let removals: Vec<TargetInstruction> = binding
                    .targets
                    .iter()
                    .filter(|target| target.strategy == Strategy::Remove)
                    .cloned()
                    .collect();
                if !removals.is_empty() {
                    TimerAction::Remove(removals)
                } else if binding.targets.is_empty() {
                    TimerAction::RemoveSelf
                } else {
                    TimerAction::Clear(binding.targets.clone())
                }
            }
        };
        match action {
            TimerAction::Call => self.fire(node),
            TimerAction::Publish(signal) => self.emit(&signal),
            TimerAction::Remove(instructions) => {
                for instruction in instructions {
                    self.apply_patch(DomPatch {
                        context: node,
                        instruction,
                        content: String::new(),
                    });
                }
            }
            TimerAction::Clear(targets) => {
                for target in targets {
                    self.apply_patch(DomPatch {
                        context: node,
                        instruction: TargetInstruction {
                            selector: target.selector,
                            strategy: Strategy::InnerHtml,
                        },
                        content: String::new(),
                    });
                }
            }
            TimerAction::RemoveSelf => {
                self.apply_patch(DomPatch {
                    context: node,
                    instruction: TargetInstruction {
                        selector: String::from("this"),
                        strategy: Strategy::Remove,
                    },
                    content: String::new(),
                });
            }
        }
    }

    /// Launch the poll worker after the binding's first completed call.
    pub(crate) fn maybe_start_poll(&mut self, node: NodeId) {
        let spec = {
            let Some(binding) = self.registry.get(&node) else {
                return;
            };
            if binding.state.poll_started || binding.state.poll_disabled {
                return;
            }
            let Some(spec) = binding.poll else {
                return;
            };
            spec
        };

        let tx = self.tx.clone();
        let (handle, registration) = AbortHandle::new_pair();
        let ticker = Abortable::new(
            async move {
                loop {
                    tokio::time::sleep(spec.every).await;
                    if tx.send(EngineMsg::PollTick { node }).is_err() {
                        break;
                    }
                }
            },
            registration,
        );
        tokio::spawn(async move {
            drop(ticker.await);
        });

        if let Some(binding) = self.registry.get_mut(&node) {
            binding.state.poll_started = true;
            binding.state.poll = Some(PollWorker {
                abort: handle,
                remaining: spec.repeat,
            });
            elemlog!(
                binding.debug,
                Level::Debug,
                "poll started every {}ms",
                spec.every.as_millis()
            );
        }
    }

    /// One poll interval elapsed. Re-entrancy is suppressed: a tick is
    /// skipped while a previous call is still in flight. Reaching the
    /// repeat limit tears the worker down and disables the binding.
    pub(crate) fn on_poll_tick(&mut self, node: NodeId) {
        let fire = {
            let Some(binding) = self.registry.get_mut(&node) else {
                return;
            };
            if binding.state.poll_disabled || binding.state.poll.is_none() {
                None
            } else if binding.state.in_flight.is_some() || !binding.state.seq.calls.is_empty() {
                elemlog!(
                    binding.debug,
                    Level::Debug,
                    "poll tick skipped; previous call still in flight"
                );
                None
            } else {
                let sequential = binding.sequential.is_some();
                let mut exhausted = false;
                if let Some(worker) = &mut binding.state.poll
                    && let Some(remaining) = &mut worker.remaining
                {
                    *remaining -= 1;
                    exhausted = *remaining == 0;
                }
                Some((sequential, exhausted))
            }
        };
        let Some((sequential, exhausted)) = fire else {
            return;
        };
        self.start_call(node, sequential);
        if exhausted
            && let Some(binding) = self.registry.get_mut(&node)
        {
            if let Some(worker) = binding.state.poll.take() {
                worker.abort.abort();
            }
            binding.state.poll_disabled = true;
            elemlog!(
                binding.debug,
                Level::Info,
                "poll repeat limit reached; binding disabled"
            );
        }
    }
}

//! Event dispatch and signal fan-out.

use super::Engine;
use crate::elemlog;
use crate::syslog;
use dom::NodeId;
use log::Level;

/// A synthetic DOM event delivered by the host. Dispatch bubbles from the
/// target up its ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub target: NodeId,
}

impl Event {
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
        }
    }
}

enum FireAction {
    Call { sequential: bool },
    Publish(String),
    Nothing,
}

impl Engine {
    /// Dispatch an event: walk from the target to the root and fire every
    /// binding whose trigger matches.
    ///
    /// For `click`/`submit` triggers on non-form elements, events whose
    /// origin is a descendant of the bound element are ignored; other event
    /// kinds bypass that check.
    pub fn dispatch(&mut self, event: &Event) {
        let mut chain = vec![event.target];
        let mut cursor = event.target;
        while let Some(parent) = self.doc.parent(cursor) {
            chain.push(parent);
            cursor = parent;
        }

        for node in chain {
            let should_fire = {
                let Some(binding) = self.registry.get_mut(&node) else {
                    continue;
                };
                if binding.trigger != event.kind {
                    false
                } else {
                    let guards_origin = event.kind == "click" || event.kind == "submit";
                    let is_form = self.doc.tag(node) == Some("form");
                    if guards_origin && !is_form && event.target != node {
                        false
                    } else if binding
                        .throttle
                        .as_mut()
                        .is_some_and(|gate| !gate.allow())
                    {
                        elemlog!(binding.debug, Level::Debug, "throttled {}", event.kind);
                        false
                    } else if binding
                        .debounce
                        .as_mut()
                        .is_some_and(|gate| !gate.allow())
                    {
                        elemlog!(binding.debug, Level::Debug, "debounced {}", event.kind);
                        false
                    } else {
                        true
                    }
                }
            };
            if should_fire {
                self.fire(node);
            }
        }
    }

    /// Convenience for the common click trigger.
    #[inline]
    pub fn dispatch_click(&mut self, target: NodeId) {
        self.dispatch(&Event::new("click", target));
    }

    /// Convenience for form submission.
    #[inline]
    pub fn dispatch_submit(&mut self, target: NodeId) {
        self.dispatch(&Event::new("submit", target));
    }

    /// Run a binding's configured action: issue its call, or emit its
    /// signal when it has no method.
    pub(crate) fn fire(&mut self, node: NodeId) {
        let action = {
            let Some(binding) = self.registry.get(&node) else {
                return;
            };
            if binding.state.poll_disabled {
                elemlog!(
                    binding.debug,
                    Level::Debug,
                    "binding is poll-disabled; call refused"
                );
                FireAction::Nothing
            } else if binding.method.is_some() {
                FireAction::Call {
                    sequential: binding.sequential.is_some(),
                }
            } else if let Some(signal) = &binding.publish {
                FireAction::Publish(signal.clone())
            } else {
                FireAction::Nothing
            }
        };
        match action {
            FireAction::Call { sequential: true } => self.start_call(node, true),
            FireAction::Call { sequential: false } => self.supersede_and_schedule(node),
            FireAction::Publish(signal) => self.emit(&signal),
            FireAction::Nothing => {}
        }
    }

    /// Publish a signal: every subscriber with an API action is activated,
    /// in subscription order. A misbehaving subscriber is contained by its
    /// own call pipeline; later subscribers always run.
    pub fn emit(&mut self, signal: &str) {
        let subscribers = self.bus.subscribers(signal).to_vec();
        syslog!(
            Level::Debug,
            "signal {signal:?} -> {} subscriber(s)",
            subscribers.len()
        );
        for node in subscribers {
            let has_method = self
                .registry
                .get(&node)
                .is_some_and(|binding| binding.method.is_some());
            if has_method {
                self.fire(node);
            }
        }
    }

    pub(crate) fn on_socket_text(&mut self, node: NodeId, text: &str) {
        let (targets, sequential) = {
            let Some(binding) = self.registry.get(&node) else {
                return;
            };
            if binding.targets.is_empty() {
                elemlog!(
                    binding.debug,
                    Level::Debug,
                    "socket message dropped; no target configured"
                );
                return;
            }
            (binding.targets.clone(), binding.sequential.is_some())
        };
        for instruction in targets {
            let patch = crate::scheduler::DomPatch {
                context: node,
                instruction,
                content: text.to_owned(),
            };
            if sequential {
                self.scheduler.schedule_sequential(patch);
            } else {
                self.scheduler.schedule(patch);
            }
        }
    }

    pub(crate) fn on_socket_closed(&mut self, node: NodeId) {
        if let Some(binding) = self.registry.get_mut(&node) {
            binding.state.socket = None;
            elemlog!(binding.debug, Level::Debug, "socket closed");
        }
    }
}

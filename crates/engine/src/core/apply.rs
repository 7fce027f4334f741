//! Patch application, subtree re-registration, and detached-node cleanup.

use super::Engine;
use crate::elemlog;
use crate::scheduler::DomPatch;
use crate::syslog;
use dom::NodeId;
use dom::swap::{self, Strategy};
use log::Level;

impl Engine {
    /// Resolve the patch's selector and apply its strategy to every match.
    /// Newly inserted subtrees are scanned for recognized attributes (the
    /// registry is idempotent, so re-scanning is safe), which also arms
    /// timers carried by inserted elements. Detached elements then have
    /// their background resources shut down.
    pub(crate) fn apply_patch(&mut self, patch: DomPatch) {
        let DomPatch {
            context,
            instruction,
            content,
        } = patch;
        let targets = self.resolve_targets(context, &instruction.selector);
        for target in targets {
            let rescan_root = match instruction.strategy {
                Strategy::InnerHtml | Strategy::Append | Strategy::Prepend => Some(target),
                Strategy::OuterHtml | Strategy::Before | Strategy::After => {
                    self.doc.parent(target)
                }
                Strategy::Remove => None,
            };
            swap::apply(&mut self.doc, target, instruction.strategy, &content);
            if let Some(root) = rescan_root {
                self.register_subtree(root);
            }
        }
        self.sweep_detached();
    }

    /// `this` resolves to the triggering element; anything else is a
    /// document query. An empty match warns and falls back to the
    /// triggering element.
    fn resolve_targets(&self, context: NodeId, selector: &str) -> Vec<NodeId> {
        if selector == "this" {
            return vec![context];
        }
        let hits = self.doc.query_all(selector);
        if hits.is_empty() {
            syslog!(
                Level::Warn,
                "no matches for target selector {selector:?}; using the triggering element"
            );
            return vec![context];
        }
        hits
    }

    /// Shut down sockets and poll workers whose element left the tree.
    /// The binding record itself stays; node ids remain stable, so a
    /// re-inserted element keeps its registration.
    pub(crate) fn sweep_detached(&mut self) {
        let stale: Vec<NodeId> = self
            .registry
            .iter()
            .filter_map(|(&node, binding)| {
                let holds_resources =
                    binding.state.socket.is_some() || binding.state.poll.is_some();
                (holds_resources && !self.doc.is_attached(node)).then_some(node)
            })
            .collect();
        for node in stale {
            let Some(binding) = self.registry.get_mut(&node) else {
                continue;
            };
            if let Some(handle) = binding.state.socket.take() {
                handle.abort();
                elemlog!(binding.debug, Level::Debug, "socket torn down on removal");
            }
            if let Some(worker) = binding.state.poll.take() {
                worker.abort.abort();
                binding.state.poll_started = false;
                elemlog!(binding.debug, Level::Debug, "poll torn down on removal");
            }
        }
    }
}

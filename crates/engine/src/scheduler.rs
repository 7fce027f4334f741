//! Per-frame update queue.

use crate::target::TargetInstruction;
use dom::NodeId;
use std::collections::VecDeque;

/// One pending DOM mutation: a target instruction plus the content to splice.
/// The selector is resolved against `context` at apply time.
#[derive(Debug, Clone)]
pub struct DomPatch {
    pub context: NodeId,
    pub instruction: TargetInstruction,
    pub content: String,
}

/// Two-lane frame queue. Immediate patches all release on the next frame;
/// sequential patches release one per frame.
#[derive(Default)]
pub struct UpdateScheduler {
    immediate: VecDeque<DomPatch>,
    sequential: VecDeque<DomPatch>,
}

impl UpdateScheduler {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a patch for the next frame.
    #[inline]
    pub fn schedule(&mut self, patch: DomPatch) {
        self.immediate.push_back(patch);
    }

    /// Append a patch to the global sequential FIFO (one released per frame).
    #[inline]
    pub fn schedule_sequential(&mut self, patch: DomPatch) {
        self.sequential.push_back(patch);
    }

    /// Release this frame's work: every immediate patch plus at most one
    /// sequential patch.
    #[inline]
    pub fn drain_frame(&mut self) -> Vec<DomPatch> {
        let mut out: Vec<DomPatch> = self.immediate.drain(..).collect();
        if let Some(next) = self.sequential.pop_front() {
            out.push(next);
        }
        out
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.sequential.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{DomPatch, UpdateScheduler};
    use crate::target::TargetInstruction;
    use dom::Document;

    fn patch(doc: &Document, content: &str) -> DomPatch {
        DomPatch {
            context: doc.root(),
            instruction: TargetInstruction::this(),
            content: content.to_owned(),
        }
    }

    #[test]
    fn immediate_patches_release_together() {
        let doc = Document::new();
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule(patch(&doc, "a"));
        scheduler.schedule(patch(&doc, "b"));
        let frame = scheduler.drain_frame();
        assert_eq!(frame.len(), 2);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn sequential_patches_release_one_per_frame() {
        let doc = Document::new();
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_sequential(patch(&doc, "a"));
        scheduler.schedule_sequential(patch(&doc, "b"));
        scheduler.schedule(patch(&doc, "now"));

        let first = scheduler.drain_frame();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "now");
        assert_eq!(first[1].content, "a");

        let second = scheduler.drain_frame();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "b");
        assert!(scheduler.is_empty());
    }
}

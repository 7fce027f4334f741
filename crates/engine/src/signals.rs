//! Named signal topics with ordered fan-out.

use dom::NodeId;
use std::collections::HashMap;

/// Topic name to subscribers, in subscription order. Subscriber lists are
/// append-only for the process lifetime; fan-out never reorders. Unnamed
/// topics do not exist: a topic is created on first subscribe.
#[derive(Default)]
pub struct SignalBus {
    topics: HashMap<String, Vec<NodeId>>,
}

impl SignalBus {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn subscribe(&mut self, name: &str, node: NodeId) {
        self.topics.entry(name.to_owned()).or_default().push(node);
    }

    /// Subscribers of a topic in subscription order; empty for unknown topics.
    #[inline]
    #[must_use]
    pub fn subscribers(&self, name: &str) -> &[NodeId] {
        self.topics.get(name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::SignalBus;
    use dom::Document;

    #[test]
    fn fan_out_preserves_subscription_order() {
        let mut doc = Document::new();
        let first = doc.new_element("div");
        let second = doc.new_element("div");
        let third = doc.new_element("div");

        let mut bus = SignalBus::new();
        bus.subscribe("step", second);
        bus.subscribe("step", first);
        bus.subscribe("step", third);
        assert_eq!(bus.subscribers("step"), &[second, first, third]);
    }

    #[test]
    fn duplicate_subscriptions_are_kept() {
        let mut doc = Document::new();
        let node = doc.new_element("div");
        let mut bus = SignalBus::new();
        bus.subscribe("s", node);
        bus.subscribe("s", node);
        assert_eq!(bus.subscribers("s").len(), 2);
    }

    #[test]
    fn unknown_topics_are_empty() {
        let bus = SignalBus::new();
        assert!(bus.subscribers("nope").is_empty());
    }
}

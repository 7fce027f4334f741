//! Per-element binding records.
//!
//! For every element carrying a recognized attribute the registry holds one
//! binding: the parsed capability fields plus the mutable runtime state of
//! that element's call machine. Bindings are created at most once per element.

use crate::elemlog;
use crate::fetch::CallId;
use crate::hooks::{Hook, HookRegistry};
use crate::limiter::{Debounce, Throttle};
use crate::scheduler::DomPatch;
use crate::syslog;
use crate::target::{TargetInstruction, parse_targets};
use crate::url_state::UrlDirectives;
use core::time::Duration;
use dom::{Document, NodeId};
use futures::future::AbortHandle;
use log::Level;
use reqwest::Method;
use std::collections::{HashSet, VecDeque};

/// HTTP method attributes, recognized case-insensitively.
const METHOD_ATTRS: [(&str, Method); 5] = [
    ("get", Method::GET),
    ("post", Method::POST),
    ("put", Method::PUT),
    ("delete", Method::DELETE),
    ("patch", Method::PATCH),
];

/// Attributes whose presence makes an element worth registering.
const TRIGGERING_ATTRS: [&str; 11] = [
    "get",
    "post",
    "put",
    "delete",
    "patch",
    "publish",
    "subscribe",
    "socket",
    "timer",
    "auto",
    "poll",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMode {
    /// Fire once after the delay.
    Delay(Duration),
    /// Fire the first time the element is revealed.
    Lazy,
    /// Fire immediately on registration.
    Prefetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub every: Duration,
    /// Iteration limit; `None` is unlimited.
    pub repeat: Option<u64>,
}

#[derive(Default)]
pub struct BindingHooks {
    pub before: Option<Hook>,
    pub before_swap: Option<Hook>,
    pub after_swap: Option<Hook>,
    pub after: Option<Hook>,
}

/// A superseding handle on a non-sequential in-flight call.
pub struct InFlight {
    pub call: CallId,
    pub abort: AbortHandle,
}

/// Background poll worker plus its remaining iteration budget.
pub struct PollWorker {
    pub abort: AbortHandle,
    pub remaining: Option<u64>,
}

/// Sequential-mode FIFOs: issued calls, their completion marks, and the
/// pending single-unit DOM updates.
#[derive(Default)]
pub struct SeqState {
    pub calls: VecDeque<CallId>,
    pub done: HashSet<CallId>,
    pub updates: VecDeque<DomPatch>,
    /// Set while the drainer sleeps out the inter-update delay.
    pub waiting: bool,
}

impl SeqState {
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.calls.is_empty() && self.updates.is_empty() && !self.waiting
    }
}

/// Mutable runtime state of one binding.
#[derive(Default)]
pub struct BindingState {
    /// Pending-call token; a newer trigger invalidates older scheduled calls.
    pub pending_token: u64,
    pub in_flight: Option<InFlight>,
    pub poll: Option<PollWorker>,
    pub poll_started: bool,
    pub poll_disabled: bool,
    pub seq: SeqState,
    pub timer_armed: bool,
    pub lazy_armed: bool,
    pub socket: Option<AbortHandle>,
}

pub struct Binding {
    pub node: NodeId,
    pub debug: bool,
    pub method: Option<Method>,
    pub endpoint: String,
    pub trigger: String,
    pub targets: Vec<TargetInstruction>,
    pub source: Vec<String>,
    pub extras: Vec<(String, String)>,
    pub loading: Vec<TargetInstruction>,
    pub onerror: Vec<TargetInstruction>,
    pub auto: Option<AutoMode>,
    pub cache_ttl: Option<Duration>,
    pub retry: u32,
    pub timeout: Option<Duration>,
    pub debounce: Option<Debounce>,
    pub throttle: Option<Throttle>,
    pub poll: Option<PollSpec>,
    /// Sequential mode with its inter-update delay.
    pub sequential: Option<Duration>,
    pub publish: Option<String>,
    pub subscribe: Vec<String>,
    pub timer: Option<Duration>,
    pub socket: Option<String>,
    pub url: UrlDirectives,
    pub hooks: BindingHooks,
    pub state: BindingState,
}

/// Whether the element carries any attribute the engine reacts to.
#[must_use]
pub fn is_recognized(doc: &Document, node: NodeId) -> bool {
    TRIGGERING_ATTRS
        .iter()
        .any(|name| doc.has_attr(node, name))
}

fn parse_millis(doc: &Document, node: NodeId, name: &str) -> Option<Duration> {
    let raw = doc.attr(node, name)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            syslog!(Level::Warn, "ignoring non-numeric {name}={raw:?}");
            None
        }
    }
}

fn parse_auto(doc: &Document, node: NodeId) -> Option<AutoMode> {
    let raw = doc.attr(node, "auto")?.trim();
    match raw {
        "" | "prefetch" => Some(AutoMode::Prefetch),
        "lazy" => Some(AutoMode::Lazy),
        other => match other.parse::<u64>() {
            Ok(ms) => Some(AutoMode::Delay(Duration::from_millis(ms))),
            Err(_) => {
                syslog!(Level::Warn, "ignoring unrecognized auto={other:?}");
                None
            }
        },
    }
}

fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split_whitespace()
        .filter_map(|token| match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Some((key.to_owned(), value.to_owned()))
            }
            _ => {
                syslog!(Level::Warn, "ignoring malformed key=value token {token:?}");
                None
            }
        })
        .collect()
}

fn parse_names(doc: &Document, node: NodeId, name: &str) -> Vec<String> {
    doc.attr(node, name)
        .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

impl Binding {
    /// Build the binding record for an element. Resolution of hook names and
    /// the poll floor happen here, once, at registration.
    #[must_use]
    pub fn from_element(
        doc: &Document,
        node: NodeId,
        hooks: &HookRegistry,
        poll_floor: Duration,
    ) -> Self {
        let debug = doc.has_attr(node, "debug");

        let (method, endpoint) = METHOD_ATTRS
            .iter()
            .find_map(|(name, method)| {
                doc.attr(node, name)
                    .map(|value| (Some(method.clone()), value.to_owned()))
            })
            .unwrap_or((None, String::new()));

        let trigger = doc.attr(node, "trigger").map_or_else(
            || {
                if doc.tag(node) == Some("form") {
                    String::from("submit")
                } else {
                    String::from("click")
                }
            },
            |raw| {
                let raw = raw.trim();
                raw.strip_prefix("on").unwrap_or(raw).to_owned()
            },
        );

        let poll = parse_millis(doc, node, "poll").and_then(|every| {
            if every < poll_floor {
                syslog!(
                    Level::Warn,
                    "poll interval {}ms below the {}ms floor; refused",
                    every.as_millis(),
                    poll_floor.as_millis()
                );
                return None;
            }
            let repeat = doc
                .attr(node, "repeat")
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|&count| count > 0);
            Some(PollSpec { every, repeat })
        });

        let sequential = doc.attr(node, "sequential").map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .unwrap_or_default()
        });

        let resolve = |attr: &str| -> Option<Hook> {
            let name = doc.attr(node, attr)?.trim();
            let hook = hooks.resolve(name);
            if hook.is_none() {
                syslog!(Level::Warn, "{attr} names unknown hook {name:?}");
            }
            hook
        };

        let binding = Self {
            node,
            debug,
            method,
            endpoint,
            trigger,
            targets: parse_targets(doc.attr(node, "target").unwrap_or_default()),
            source: parse_names(doc, node, "source"),
            extras: parse_pairs(doc.attr(node, "extras").unwrap_or_default()),
            loading: parse_targets(doc.attr(node, "loading").unwrap_or_default()),
            onerror: parse_targets(doc.attr(node, "onerror").unwrap_or_default()),
            auto: parse_auto(doc, node),
            cache_ttl: parse_millis(doc, node, "cache"),
            retry: doc
                .attr(node, "retry")
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(0),
            timeout: parse_millis(doc, node, "timeout").filter(|limit| !limit.is_zero()),
            debounce: parse_millis(doc, node, "debounce").map(Debounce::new),
            throttle: parse_millis(doc, node, "throttle").map(Throttle::new),
            poll,
            sequential,
            publish: doc.attr(node, "publish").map(str::to_owned),
            subscribe: parse_names(doc, node, "subscribe"),
            timer: parse_millis(doc, node, "timer"),
            socket: doc.attr(node, "socket").map(str::to_owned),
            url: UrlDirectives {
                push: parse_pairs(doc.attr(node, "push").unwrap_or_default()),
                pull: parse_names(doc, node, "pull"),
                path: doc.attr(node, "path").map(str::to_owned),
                history_push: doc.attr(node, "history") == Some("push"),
            },
            hooks: BindingHooks {
                before: resolve("onbefore"),
                before_swap: resolve("onbeforeswap"),
                after_swap: resolve("onafterswap"),
                after: resolve("onafter"),
            },
            state: BindingState::default(),
        };
        elemlog!(
            binding.debug,
            Level::Debug,
            "bound <{}> trigger={} method={:?} endpoint={:?}",
            doc.tag(node).unwrap_or("?"),
            binding.trigger,
            binding.method,
            binding.endpoint
        );
        binding
    }
}

#[cfg(test)]
mod tests {
    use super::{AutoMode, Binding, is_recognized};
    use crate::hooks::HookRegistry;
    use core::time::Duration;
    use dom::Document;
    use reqwest::Method;

    const FLOOR: Duration = Duration::from_millis(100);

    fn bind(html: &str) -> (Document, Binding) {
        let doc = Document::parse(html);
        let hooks = HookRegistry::new();
        let node = doc
            .descendants(doc.root())
            .find(|&node| is_recognized(&doc, node))
            .expect("no recognized element in fixture");
        let binding = Binding::from_element(&doc, node, &hooks, FLOOR);
        (doc, binding)
    }

    #[test]
    fn methods_are_case_insensitive() {
        let (_, binding) = bind("<html><body><button GET=\"/x\"></button></body></html>");
        assert_eq!(binding.method, Some(Method::GET));
        assert_eq!(binding.endpoint, "/x");
        assert_eq!(binding.trigger, "click");
    }

    #[test]
    fn forms_default_to_submit() {
        let (_, binding) =
            bind("<html><body><form POST=\"/todos/create\"></form></body></html>");
        assert_eq!(binding.method, Some(Method::POST));
        assert_eq!(binding.trigger, "submit");
    }

    #[test]
    fn trigger_strips_leading_on() {
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" trigger=\"onmouseover\"></div></body></html>");
        assert_eq!(binding.trigger, "mouseover");
    }

    #[test]
    fn poll_below_floor_is_refused() {
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" poll=\"50\"></div></body></html>");
        assert!(binding.poll.is_none());
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" poll=\"250\" repeat=\"3\"></div></body></html>");
        let poll = binding.poll.unwrap();
        assert_eq!(poll.every, Duration::from_millis(250));
        assert_eq!(poll.repeat, Some(3));
    }

    #[test]
    fn repeat_zero_means_unlimited() {
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" poll=\"250\" repeat=\"0\"></div></body></html>");
        assert_eq!(binding.poll.unwrap().repeat, None);
    }

    #[test]
    fn timeout_zero_disables() {
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" timeout=\"0\"></div></body></html>");
        assert!(binding.timeout.is_none());
    }

    #[test]
    fn sequential_without_value_has_zero_delay() {
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" sequential></div></body></html>");
        assert_eq!(binding.sequential, Some(Duration::ZERO));
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" sequential=\"250\"></div></body></html>");
        assert_eq!(binding.sequential, Some(Duration::from_millis(250)));
    }

    #[test]
    fn auto_modes() {
        let (_, binding) = bind("<html><body><div GET=\"/x\" auto></div></body></html>");
        assert_eq!(binding.auto, Some(AutoMode::Prefetch));
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" auto=\"lazy\"></div></body></html>");
        assert_eq!(binding.auto, Some(AutoMode::Lazy));
        let (_, binding) =
            bind("<html><body><div GET=\"/x\" auto=\"750\"></div></body></html>");
        assert_eq!(binding.auto, Some(AutoMode::Delay(Duration::from_millis(750))));
    }

    #[test]
    fn url_directives_parse() {
        let (_, binding) = bind(
            "<html><body><div GET=\"/x\" push=\"a=1 b=2\" pull=\"c\" path=\"/next\" history=\"push\"></div></body></html>",
        );
        assert_eq!(binding.url.push.len(), 2);
        assert_eq!(binding.url.pull, vec![String::from("c")]);
        assert_eq!(binding.url.path.as_deref(), Some("/next"));
        assert!(binding.url.history_push);
    }

    #[test]
    fn publish_only_elements_are_recognized() {
        let doc = Document::parse("<html><body><button publish=\"s1\"></button></body></html>");
        let node = doc.query_all("button")[0];
        assert!(is_recognized(&doc, node));
        let binding = Binding::from_element(&doc, node, &HookRegistry::new(), FLOOR);
        assert!(binding.method.is_none());
        assert_eq!(binding.publish.as_deref(), Some("s1"));
    }
}

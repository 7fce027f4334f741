//! Parsing of `selector(strategy)` target lists.

use crate::syslog;
use core::fmt;
use dom::swap::Strategy;
use log::Level;

/// One parsed target token. The selector literal `this` resolves to the
/// triggering element at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInstruction {
    pub selector: String,
    pub strategy: Strategy,
}

impl TargetInstruction {
    /// The default instruction: `this(innerHTML)`.
    #[inline]
    #[must_use]
    pub fn this() -> Self {
        Self {
            selector: String::from("this"),
            strategy: Strategy::InnerHtml,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.selector == "this"
    }
}

impl fmt::Display for TargetInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.selector, self.strategy)
    }
}

/// Split an attribute on whitespace and parse each token with the first `(`
/// and last `)`. Unparenthesised tokens adopt `innerHTML`; duplicates are
/// allowed and order is kept.
#[must_use]
pub fn parse_targets(attr: &str) -> Vec<TargetInstruction> {
    attr.split_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> TargetInstruction {
    let (selector, strategy) = match (token.find('('), token.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let name = &token[open + 1..close];
            let strategy = Strategy::parse(name).unwrap_or_else(|| {
                syslog!(Level::Warn, "unknown swap strategy {name:?}; using innerHTML");
                Strategy::InnerHtml
            });
            (&token[..open], strategy)
        }
        _ => (token, Strategy::InnerHtml),
    };
    TargetInstruction {
        selector: selector.to_owned(),
        strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::{TargetInstruction, parse_targets};
    use dom::swap::Strategy;

    #[test]
    fn parses_ordered_list() {
        let targets = parse_targets("#list(innerHTML) .row(append) this(remove)");
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].selector, "#list");
        assert_eq!(targets[0].strategy, Strategy::InnerHtml);
        assert_eq!(targets[1].selector, ".row");
        assert_eq!(targets[1].strategy, Strategy::Append);
        assert!(targets[2].is_this());
        assert_eq!(targets[2].strategy, Strategy::Remove);
    }

    #[test]
    fn missing_strategy_defaults_to_inner_html() {
        let targets = parse_targets("#panel");
        assert_eq!(targets[0].strategy, Strategy::InnerHtml);
    }

    #[test]
    fn unknown_strategy_falls_back() {
        let targets = parse_targets("#panel(sideways)");
        assert_eq!(targets[0].strategy, Strategy::InnerHtml);
        assert_eq!(targets[0].selector, "#panel");
    }

    #[test]
    fn duplicates_are_allowed() {
        let targets = parse_targets("#a(append) #a(append)");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], targets[1]);
    }

    #[test]
    fn round_trips_through_display() {
        let source = "a(innerHTML) b(append)";
        let targets = parse_targets(source);
        let rendered: Vec<String> = targets.iter().map(ToString::to_string).collect();
        assert_eq!(rendered.join(" "), source);
        assert_eq!(parse_targets(&rendered.join(" ")), targets);
    }

    #[test]
    fn selector_with_attribute_parens() {
        // First '(' / last ')' split keeps bracketed selectors intact.
        let targets = parse_targets("div[data-x=1](append)");
        assert_eq!(targets[0].selector, "div[data-x=1]");
        assert_eq!(targets[0].strategy, Strategy::Append);
    }
}

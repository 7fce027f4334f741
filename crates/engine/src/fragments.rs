//! Streaming extraction of `<fragment>` blocks.
//!
//! Server responses are arbitrary byte streams containing zero or more
//! `<fragment target="...">...</fragment>` blocks, possibly split across
//! chunk boundaries. The reader keeps a rolling buffer and only ever commits
//! complete blocks; a still-open fragment stays buffered. Fragments do not
//! nest, so the first close tag after an opening tag is its pair.

use crate::syslog;
use crate::target::{TargetInstruction, parse_targets};
use log::Level;

const OPEN_TAG: &str = "<fragment";
const CLOSE_TAG: &str = "</fragment>";

/// One complete fragment block.
#[derive(Debug, Clone)]
pub struct FragmentBlock {
    /// Parsed `target` attribute; defaults to `this(innerHTML)`.
    pub targets: Vec<TargetInstruction>,
    /// Raw inner markup, exactly as it appeared on the wire.
    pub inner: String,
}

/// Chunk-by-chunk fragment extractor for one response.
#[derive(Default)]
pub struct FragmentReader {
    buffer: String,
    chunks: usize,
    seen: usize,
}

impl FragmentReader {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and extract every block that completed.
    #[inline]
    pub fn push(&mut self, chunk: &str) -> Vec<FragmentBlock> {
        self.chunks += 1;
        self.buffer.push_str(chunk);
        self.extract()
    }

    /// Final flush at stream end. Returns any remaining complete blocks plus,
    /// when the stream carried no fragments at all, the leftover body for the
    /// caller's fallback update.
    #[inline]
    pub fn finish(&mut self) -> (Vec<FragmentBlock>, Option<String>) {
        let blocks = self.extract();
        let leftover = if self.seen == 0 && !self.buffer.trim().is_empty() {
            Some(core::mem::take(&mut self.buffer))
        } else {
            None
        };
        (blocks, leftover)
    }

    /// Streaming mode engages once the body arrives in more than one chunk.
    #[inline]
    #[must_use]
    pub const fn streaming(&self) -> bool {
        self.chunks > 1
    }

    /// Number of complete fragments extracted so far.
    #[inline]
    #[must_use]
    pub const fn fragments_seen(&self) -> usize {
        self.seen
    }

    fn extract(&mut self) -> Vec<FragmentBlock> {
        let mut out = Vec::new();
        loop {
            let Some(open) = find_open(&self.buffer) else {
                break;
            };
            let Some(tag_len) = self.buffer[open..].find('>') else {
                // Opening tag not complete yet.
                break;
            };
            let content_start = open + tag_len + 1;
            let Some(close_rel) = self.buffer[content_start..].find(CLOSE_TAG) else {
                // Block still open; wait for more bytes.
                break;
            };
            let close = content_start + close_rel;
            let open_tag = &self.buffer[open..content_start];
            let targets = match attr_in_tag(open_tag, "target") {
                Some(value) if !value.trim().is_empty() => parse_targets(&value),
                _ => vec![TargetInstruction::this()],
            };
            let inner = self.buffer[content_start..close].to_owned();
            self.buffer.replace_range(..close + CLOSE_TAG.len(), "");
            self.seen += 1;
            out.push(FragmentBlock { targets, inner });
        }
        out
    }
}

/// Locate the next `<fragment` opening tag, skipping the optional
/// `<fragments>` wrapper.
fn find_open(buffer: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = buffer[from..].find(OPEN_TAG) {
        let index = from + rel;
        match buffer[index + OPEN_TAG.len()..].chars().next() {
            Some(next) if next == '>' || next.is_whitespace() => return Some(index),
            // "<fragment" at the buffer edge could still grow into either tag.
            None => return None,
            Some(_) => from = index + OPEN_TAG.len(),
        }
    }
    None
}

/// Pull a named attribute value out of a raw opening tag.
fn attr_in_tag(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    let mut search = 0;
    while let Some(rel) = lower[search..].find(&needle) {
        let start = search + rel;
        let preceded = lower[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = tag[start + needle.len()..].trim_start();
        if preceded && let Some(rest) = after.strip_prefix('=') {
            let rest = rest.trim_start();
            let value = match rest.chars().next() {
                Some(quote @ ('"' | '\'')) => rest[1..].split(quote).next().unwrap_or(""),
                _ => rest
                    .split(|ch: char| ch.is_whitespace() || ch == '>')
                    .next()
                    .unwrap_or(""),
            };
            return Some(value.to_owned());
        }
        search = start + needle.len();
    }
    if !lower.contains(&needle) {
        return None;
    }
    syslog!(Level::Debug, "attribute {name:?} present but unreadable in {tag:?}");
    None
}

#[cfg(test)]
mod tests {
    use super::FragmentReader;
    use dom::swap::Strategy;

    #[test]
    fn extracts_complete_block() {
        let mut reader = FragmentReader::new();
        let blocks =
            reader.push("<fragment target=\"#out(append)\"><li>one</li></fragment>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].inner, "<li>one</li>");
        assert_eq!(blocks[0].targets[0].selector, "#out");
        assert_eq!(blocks[0].targets[0].strategy, Strategy::Append);
        assert!(!reader.streaming());
        assert_eq!(reader.fragments_seen(), 1);
    }

    #[test]
    fn default_target_is_this() {
        let mut reader = FragmentReader::new();
        let blocks = reader.push("<fragment>x</fragment>");
        assert!(blocks[0].targets[0].is_this());
        assert_eq!(blocks[0].targets[0].strategy, Strategy::InnerHtml);
    }

    #[test]
    fn survives_chunk_boundaries() {
        let mut reader = FragmentReader::new();
        assert!(reader.push("<frag").is_empty());
        assert!(reader.push("ment target=\"#a\"><b>x</b></fragm").is_empty());
        let blocks = reader.push("ent>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].inner, "<b>x</b>");
        assert!(reader.streaming());
    }

    #[test]
    fn multiple_blocks_in_one_chunk_stay_ordered() {
        let mut reader = FragmentReader::new();
        let blocks = reader.push(
            "<fragments><fragment target=\"#a\">1</fragment><fragment target=\"#b\">2</fragment></fragments>",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].inner, "1");
        assert_eq!(blocks[0].targets[0].selector, "#a");
        assert_eq!(blocks[1].inner, "2");
        assert_eq!(blocks[1].targets[0].selector, "#b");
    }

    #[test]
    fn partial_block_stays_buffered() {
        let mut reader = FragmentReader::new();
        assert!(reader.push("<fragment target=\"#a\">half ").is_empty());
        let blocks = reader.push("rest</fragment>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].inner, "half rest");
        let (rest, leftover) = reader.finish();
        assert!(rest.is_empty());
        assert_eq!(leftover, None);
    }

    #[test]
    fn fragment_free_body_comes_back_as_leftover() {
        let mut reader = FragmentReader::new();
        assert!(reader.push("<p>plain page</p>").is_empty());
        let (blocks, leftover) = reader.finish();
        assert!(blocks.is_empty());
        assert_eq!(leftover.as_deref(), Some("<p>plain page</p>"));
    }

    #[test]
    fn no_leftover_once_fragments_were_seen() {
        let mut reader = FragmentReader::new();
        reader.push("junk <fragment target=\"#a\">x</fragment> trailing");
        let (blocks, leftover) = reader.finish();
        assert!(blocks.is_empty());
        assert_eq!(leftover, None);
    }

    #[test]
    fn unquoted_and_single_quoted_targets() {
        let mut reader = FragmentReader::new();
        let blocks = reader.push("<fragment target=#x(append)>a</fragment>");
        assert_eq!(blocks[0].targets[0].selector, "#x");
        let blocks = reader.push("<fragment target='#y'>b</fragment>");
        assert_eq!(blocks[0].targets[0].selector, "#y");
    }
}

//! Content-addressed document blocks.

use std::ops::Range;

use crate::cache::ContentHash;

/// A contiguous run of lines rendered and cached as one unit.
///
/// `range` holds byte offsets into the document the block was split from.
/// Separator lines belong to no block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: ContentHash,
    pub range: Range<usize>,
    pub raw_text: String,
}

impl Block {
    fn new(document: &str, range: Range<usize>) -> Self {
        let raw_text = document[range.clone()].to_string();
        Self {
            id: ContentHash::of(&raw_text),
            range,
            raw_text,
        }
    }
}

/// Markup-specific line predicates that decide where blocks begin and end.
///
/// Every method must be a pure function of the line.
pub trait BoundaryRule: Send + Sync {
    /// Line ends the current block and is not part of any block.
    fn is_separator(&self, line: &str) -> bool;

    /// Line begins a new block even without a preceding separator.
    fn starts_block(&self, line: &str) -> bool;

    /// Fence marker if the line opens or closes a verbatim region, inside
    /// which no boundaries apply.
    fn verbatim_fence<'a>(&self, _line: &'a str) -> Option<&'a str> {
        None
    }
}

/// Markdown boundaries: blank lines separate, ATX headings start blocks, and
/// backtick or tilde fences are verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownBoundaries;

/// Strip up to three leading spaces, the CommonMark block indentation limit.
fn strip_block_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

impl BoundaryRule for MarkdownBoundaries {
    fn is_separator(&self, line: &str) -> bool {
        line.trim().is_empty()
    }

    fn starts_block(&self, line: &str) -> bool {
        let Some(rest) = strip_block_indent(line) else {
            return false;
        };
        let hashes = rest.len() - rest.trim_start_matches('#').len();
        if !(1..=6).contains(&hashes) {
            return false;
        }
        let after = &rest[hashes..];
        after.is_empty() || after.starts_with(' ') || after.starts_with('\t')
    }

    fn verbatim_fence<'a>(&self, line: &'a str) -> Option<&'a str> {
        let rest = strip_block_indent(line)?;
        let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let run = rest.len() - rest.trim_start_matches(marker).len();
        (run >= 3).then(|| &rest[..run])
    }
}

fn closes_fence(open: &str, candidate: &str) -> bool {
    open.chars().next() == candidate.chars().next() && candidate.len() >= open.len()
}

/// Partitions documents into blocks using a [`BoundaryRule`].
pub struct BlockSplitter {
    rule: Box<dyn BoundaryRule>,
}

impl BlockSplitter {
    pub fn new(rule: impl BoundaryRule + 'static) -> Self {
        Self {
            rule: Box::new(rule),
        }
    }

    pub fn markdown() -> Self {
        Self::new(MarkdownBoundaries)
    }

    /// Split `document` into ordered blocks. Deterministic: the same text
    /// always yields the same boundaries and hashes.
    pub fn split(&self, document: &str) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut current: Option<Range<usize>> = None;
        let mut open_fence: Option<String> = None;
        let mut offset = 0;

        for raw_line in document.split_inclusive('\n') {
            let line_start = offset;
            offset += raw_line.len();

            let line = raw_line.trim_end_matches(['\n', '\r']);
            let line_end = line_start + line.len();

            if let Some(open) = open_fence.as_deref() {
                extend(&mut current, line_start, line_end);
                if self
                    .rule
                    .verbatim_fence(line)
                    .is_some_and(|marker| closes_fence(open, marker))
                {
                    open_fence = None;
                }
                continue;
            }

            if self.rule.is_separator(line) {
                flush(document, &mut current, &mut blocks);
                continue;
            }

            if self.rule.starts_block(line) {
                flush(document, &mut current, &mut blocks);
            }

            extend(&mut current, line_start, line_end);

            if let Some(marker) = self.rule.verbatim_fence(line) {
                open_fence = Some(marker.to_string());
            }
        }

        flush(document, &mut current, &mut blocks);
        blocks
    }
}

impl Default for BlockSplitter {
    fn default() -> Self {
        Self::markdown()
    }
}

fn extend(current: &mut Option<Range<usize>>, line_start: usize, line_end: usize) {
    match current {
        Some(range) => range.end = line_end,
        None => *current = Some(line_start..line_end),
    }
}

fn flush(document: &str, current: &mut Option<Range<usize>>, blocks: &mut Vec<Block>) {
    if let Some(range) = current.take() {
        blocks.push(Block::new(document, range));
    }
}

/// Index of the block containing `offset`. Offsets between blocks map to the
/// following block; offsets past the end map to the last one.
pub fn block_index_at(blocks: &[Block], offset: usize) -> Option<usize> {
    if blocks.is_empty() {
        return None;
    }
    let index = blocks.partition_point(|block| block.range.end < offset);
    Some(index.min(blocks.len() - 1))
}

//! Boundary-aware text chunker
//!
//! Splits text into overlapping passages of at most `max_chars` characters.
//! A chunk ends at the last paragraph break that fits, then the last sentence
//! end, then the last word break; with none of those it is cut hard at
//! `max_chars`. The next chunk starts `overlap` characters before the end of
//! the previous one.
//!
//! All sizes and offsets count `char`s, not bytes.

use serde::{Deserialize, Serialize};

/// A contiguous slice of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Position of the passage within its source document (0-based)
    pub index: usize,

    /// Passage text, exactly as it appears in the source
    pub text: String,

    /// Start offset in characters (inclusive)
    pub start: usize,

    /// End offset in characters (exclusive)
    pub end: usize,
}

impl Passage {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Boundary kinds, from most to least preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

const BOUNDARY_PREFERENCE: [Boundary; 3] =
    [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

/// Lazy sequence of passages over a text.
///
/// Clone it before iterating (or call [`chunk`] again) to walk the same
/// sequence twice.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as a sentinel
    offsets: Vec<usize>,
    chars: Vec<char>,
    max_chars: usize,
    overlap: usize,
    next_start: usize,
    next_index: usize,
    done: bool,
}

/// Split `text` into passages of at most `max_chars` characters, consecutive
/// passages sharing `overlap` characters.
///
/// `max_chars == 0` yields nothing. An overlap that would prevent progress is
/// clamped to `max_chars - 1`.
pub fn chunk(text: &str, max_chars: usize, overlap: usize) -> Chunks<'_> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let chars: Vec<char> = text.chars().collect();

    Chunks {
        text,
        offsets,
        done: chars.is_empty() || max_chars == 0,
        chars,
        max_chars,
        overlap: overlap.min(max_chars.saturating_sub(1)),
        next_start: 0,
        next_index: 0,
    }
}

impl<'a> Chunks<'a> {
    fn total_chars(&self) -> usize {
        self.chars.len()
    }

    /// Pick the end of a chunk starting at `start`.
    /// Only ends beyond `start + overlap` are accepted so the next chunk
    /// always starts later than this one.
    fn split_point(&self, start: usize) -> usize {
        let limit = start + self.max_chars;
        let min_end = start + self.overlap + 1;

        for kind in BOUNDARY_PREFERENCE {
            if let Some(end) = self.last_boundary(kind, min_end, limit) {
                return end;
            }
        }

        limit
    }

    /// Largest `end` in `[min_end, limit]` directly after a boundary of `kind`.
    fn last_boundary(&self, kind: Boundary, min_end: usize, limit: usize) -> Option<usize> {
        (min_end..=limit).rev().find(|&end| self.is_boundary(kind, end))
    }

    fn is_boundary(&self, kind: Boundary, end: usize) -> bool {
        if end == 0 || end > self.total_chars() {
            return false;
        }
        let prev = self.chars[end - 1];
        let before_prev = end.checked_sub(2).map(|i| self.chars[i]);

        match kind {
            Boundary::Paragraph => prev == '\n' && before_prev == Some('\n'),
            Boundary::Sentence => {
                prev == '\n'
                    || (prev.is_whitespace() && matches!(before_prev, Some('.' | '!' | '?')))
            }
            Boundary::Word => prev.is_whitespace(),
        }
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.offsets[start]..self.offsets[end]]
    }
}

impl Iterator for Chunks<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        if self.done {
            return None;
        }

        let start = self.next_start;
        let total = self.total_chars();

        let end = if total - start <= self.max_chars {
            self.done = true;
            total
        } else {
            let end = self.split_point(start);
            self.next_start = end - self.overlap;
            end
        };

        let passage = Passage {
            index: self.next_index,
            text: self.slice(start, end).to_string(),
            start,
            end,
        };
        self.next_index += 1;

        Some(passage)
    }
}

/// Concatenate passages dropping each passage's overlap with its predecessor.
pub fn reassemble(passages: &[Passage]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for passage in passages {
        let skip = covered.saturating_sub(passage.start);
        text.extend(passage.text.chars().skip(skip));
        covered = passage.end;
    }

    text
}

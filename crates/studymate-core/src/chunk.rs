//! Recursive boundary-preferring text chunker.
//!
//! Splits extracted document text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Boundaries are chosen from a separator ladder
//! (paragraph, line, word, character): the first separator present in a
//! span is used to cut it into pieces, pieces that are still too large are
//! split again with the next separator, and small pieces are merged back
//! together up to `chunk_size`.
//!
//! Each chunk is an exact contiguous span of the input. Separators stay
//! attached to the piece that follows them and nothing is trimmed, so the
//! non-overlapping parts of consecutive chunks concatenate back to the
//! original text.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in `["\n\n", "\n", " ", ""]` that occurs in
//!    the span (`""` means "every character").
//! 2. Cut the span before every occurrence of that separator.
//! 3. Pieces shorter than `chunk_size` are queued for merging; longer ones
//!    flush the queue and are split recursively with the remaining
//!    separators.
//! 4. Merging accumulates pieces until the next one would exceed
//!    `chunk_size`, emits the accumulated span, then drops pieces from the
//!    front until at most `chunk_overlap` characters remain. The remainder
//!    becomes the start of the next chunk.
//!
//! # Example
//!
//! ```rust
//! use studymate_core::chunk::{chunk_text, ChunkerConfig};
//!
//! let config = ChunkerConfig::new(1000, 200).unwrap();
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", &config);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::models::Chunk;

/// Separator ladder, tried in order.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Validated chunking parameters, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkerConfig {
    /// Requires `chunk_size > 0` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ValidationError> {
        if chunk_size == 0 {
            return Err(ValidationError::ChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ValidationError::Overlap {
                overlap: chunk_overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Half-open character range `[start, end)`.
type Span = (usize, usize);

/// Split `text` into overlapping chunks.
///
/// # Guarantees
///
/// - Empty or whitespace-only text yields no chunks.
/// - Text no longer than `chunk_size` yields exactly one chunk.
/// - Every chunk has `1..=chunk_size` characters.
/// - Consecutive chunks share at most `chunk_overlap` characters and never
///   leave a gap.
/// - Indices are contiguous from 0, and the output is a pure function of
///   `(text, config)`.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let separators: Vec<Vec<char>> = DEFAULT_SEPARATORS
        .iter()
        .map(|s| s.chars().collect())
        .collect();

    let splitter = Splitter {
        chars: &chars,
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
    };

    let mut spans = Vec::new();
    splitter.split((0, chars.len()), &separators, &mut spans);

    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| make_chunk(index, start, end, &chars[start..end]))
        .collect()
}

struct Splitter<'a> {
    chars: &'a [char],
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter<'_> {
    fn split(&self, span: Span, separators: &[Vec<char>], out: &mut Vec<Span>) {
        let (sep_idx, remaining) = self.pick_separator(span, separators);
        let separator = &separators[sep_idx];

        let mut good: Vec<Span> = Vec::new();
        for piece in self.cut(span, separator) {
            if piece.1 - piece.0 < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge(&good, out);
                good.clear();
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                self.split(piece, remaining, out);
            }
        }

        if !good.is_empty() {
            self.merge(&good, out);
        }
    }

    /// First separator that occurs in `span`; the empty separator always
    /// matches and ends the ladder.
    fn pick_separator<'s>(
        &self,
        span: Span,
        separators: &'s [Vec<char>],
    ) -> (usize, &'s [Vec<char>]) {
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                return (i, &[]);
            }
            if self.chars[span.0..span.1]
                .windows(sep.len())
                .any(|w| w == sep.as_slice())
            {
                return (i, &separators[i + 1..]);
            }
        }
        (separators.len() - 1, &[])
    }

    /// Cut `span` before each non-overlapping occurrence of `separator`.
    /// Empty pieces are dropped; the pieces tile the span exactly.
    fn cut(&self, span: Span, separator: &[char]) -> Vec<Span> {
        let (start, end) = span;
        if separator.is_empty() {
            return (start..end).map(|i| (i, i + 1)).collect();
        }

        let mut pieces = Vec::new();
        let mut piece_start = start;
        let mut i = start;
        while i + separator.len() <= end {
            if &self.chars[i..i + separator.len()] == separator {
                if i > piece_start {
                    pieces.push((piece_start, i));
                }
                piece_start = i;
                i += separator.len();
            } else {
                i += 1;
            }
        }
        if end > piece_start {
            pieces.push((piece_start, end));
        }
        pieces
    }

    /// Merge contiguous small pieces into chunks with trailing overlap.
    fn merge(&self, pieces: &[Span], out: &mut Vec<Span>) {
        let mut current: VecDeque<Span> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = piece.1 - piece.0;
            if total + len > self.chunk_size && !current.is_empty() {
                out.push(covering(&current));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= front.1 - front.0,
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if !current.is_empty() {
            out.push(covering(&current));
        }
    }
}

fn covering(pieces: &VecDeque<Span>) -> Span {
    match (pieces.front(), pieces.back()) {
        (Some(first), Some(last)) => (first.0, last.1),
        _ => (0, 0),
    }
}

/// Create a [`Chunk`] with its SHA-256 content hash.
fn make_chunk(index: usize, start: usize, end: usize, chars: &[char]) -> Chunk {
    let text: String = chars.iter().collect();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_index: index,
        start,
        end,
        text,
        hash,
    }
}

/// Plain-text chunking. Chunks are contiguous substrings of the input, so
/// concatenating them in order reproduces the source exactly.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::task::{TranslationUnit, UnitPosition};

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n(?:\r?\n)+").expect("valid paragraph regex"));

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]*[.!?]+['\u{201d}\u{2019})\]]*\s*").expect("valid sentence regex"));

/// Split text into chunks of at most `max_chars` characters, preferring
/// paragraph boundaries, then sentence boundaries, then a hard slice for
/// pathological runs.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<TranslationUnit> {
    split_chunks(text, max_chars)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| TranslationUnit::new(UnitPosition::Chunk(index), chunk))
        .collect()
}

/// Concatenate unit output texts by chunk index.
pub fn join_chunks(units: &[TranslationUnit]) -> String {
    let mut ordered: Vec<&TranslationUnit> = units.iter().collect();
    ordered.sort_by_key(|unit| match unit.position {
        UnitPosition::Chunk(index) => index,
        _ => usize::MAX,
    });

    ordered.iter().map(|unit| unit.output_text()).collect()
}

pub(crate) fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for segment in paragraph_segments(text) {
        if current.chars().count() + segment.chars().count() > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if segment.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            split_oversize(segment, max_chars, &mut chunks, &mut current);
        } else {
            current.push_str(segment);
            if current.chars().count() >= max_chars {
                chunks.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Paragraphs including their trailing blank-line separators, partitioning
/// the input exactly.
fn paragraph_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;

    for sep in PARAGRAPH_BREAK.find_iter(text) {
        segments.push(&text[start..sep.end()]);
        start = sep.end();
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

/// A paragraph larger than the chunk bound: fall back to sentence
/// boundaries, then to a hard character slice.
fn split_oversize(segment: &str, max_chars: usize, chunks: &mut Vec<String>, current: &mut String) {
    for sentence in sentence_segments(segment) {
        if current.chars().count() + sentence.chars().count() > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(current));
        }

        if sentence.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(current));
            }
            for slice in hard_slices(sentence, max_chars) {
                chunks.push(slice.to_string());
            }
        } else {
            current.push_str(sentence);
            if current.chars().count() >= max_chars {
                chunks.push(std::mem::take(current));
            }
        }
    }
}

fn sentence_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;

    for found in SENTENCE_END.find_iter(text) {
        if found.start() != start {
            break;
        }
        segments.push(found.as_str());
        start = found.end();
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

fn hard_slices(text: &str, max_chars: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let mut end = remaining.len();
        if remaining.chars().count() > max_chars {
            end = remaining
                .char_indices()
                .nth(max_chars)
                .map(|(idx, _)| idx)
                .unwrap_or(remaining.len());
        }
        slices.push(&remaining[..end]);
        remaining = &remaining[end..];
    }

    slices
}

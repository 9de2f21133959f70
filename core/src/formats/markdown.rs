/// Markdown chunking. Headings and fenced code blocks start new elements so
/// neither is ever fragmented; code fences are kept whole regardless of
/// size. Chunks partition the source exactly.
use crate::task::{TranslationUnit, UnitPosition};

use super::text;

pub fn chunk_markdown(markdown: &str, max_chars: usize) -> Vec<TranslationUnit> {
    split_markdown_chunks(markdown, max_chars)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| TranslationUnit::new(UnitPosition::Chunk(index), chunk))
        .collect()
}

pub(crate) fn split_markdown_chunks(markdown: &str, max_chars: usize) -> Vec<String> {
    if markdown.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for element in elements(markdown) {
        let is_code = element.text.starts_with("```");

        if current.chars().count() + element.text.chars().count() > max_chars
            && !current.is_empty()
        {
            chunks.push(std::mem::take(&mut current));
        }

        if element.text.chars().count() > max_chars && !is_code {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            for piece in text::split_chunks(element.text, max_chars) {
                chunks.push(piece);
            }
        } else {
            current.push_str(element.text);
            if current.chars().count() >= max_chars && !is_code {
                chunks.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

struct Element<'a> {
    text: &'a str,
}

/// Split into contiguous elements, opening a new element at each heading
/// line and at each fence. A fence element runs through its closing fence.
fn elements(markdown: &str) -> Vec<Element<'_>> {
    let mut boundaries = vec![0];
    let mut in_fence = false;
    let mut offset = 0;

    for line in markdown.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let is_fence_line = trimmed.starts_with("```");

        if in_fence {
            if is_fence_line {
                in_fence = false;
                // Next element starts after the closing fence line.
                if offset + line.len() < markdown.len() {
                    boundaries.push(offset + line.len());
                }
            }
        } else if is_fence_line {
            if offset > 0 {
                boundaries.push(offset);
            }
            in_fence = true;
        } else if is_heading(trimmed) && offset > 0 {
            boundaries.push(offset);
        }

        offset += line.len();
    }

    boundaries.dedup();
    let mut result = Vec::new();
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(markdown.len());
        if start < end {
            result.push(Element {
                text: &markdown[start..end],
            });
        }
    }

    result
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes)
        && line
            .chars()
            .nth(hashes)
            .map(|c| c == ' ' || c == '\t')
            .unwrap_or(false)
}

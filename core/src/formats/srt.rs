/// SRT subtitle handling. The unit is one block's joined text lines; index
/// and timecode lines pass through untouched.
use serde::{Deserialize, Serialize};

use crate::task::{TranslationUnit, UnitPosition, UnitStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleBlock {
    pub index: String,
    pub time_code: String,
    pub lines: Vec<String>,
}

/// Parse SRT content into blocks. Blocks shorter than index + timecode +
/// one text line are dropped, as are stray trailing fragments.
pub fn parse(content: &str) -> Vec<SubtitleBlock> {
    let mut blocks = Vec::new();
    let normalized = content.replace("\r\n", "\n");

    for part in normalized.trim().split("\n\n") {
        let lines: Vec<&str> = part.split('\n').collect();
        if lines.len() < 3 {
            continue;
        }

        blocks.push(SubtitleBlock {
            index: lines[0].trim().to_string(),
            time_code: lines[1].to_string(),
            lines: lines[2..].iter().map(|l| l.to_string()).collect(),
        });
    }

    blocks
}

/// One unit per block: the text lines joined with newlines.
pub fn chunk_blocks(blocks: &[SubtitleBlock]) -> Vec<TranslationUnit> {
    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            TranslationUnit::new(UnitPosition::Subtitle(index), block.lines.join("\n"))
        })
        .collect()
}

/// Rebuild the SRT document, re-splitting translated text on newlines so
/// the original line count is restored where the translation kept it.
pub fn reassemble(blocks: &[SubtitleBlock], units: &[TranslationUnit]) -> String {
    let mut rendered = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.iter().enumerate() {
        let text = units
            .iter()
            .find(|u| u.position == UnitPosition::Subtitle(index) && u.status != UnitStatus::Pending)
            .map(|u| u.output_text().to_string())
            .unwrap_or_else(|| block.lines.join("\n"));

        let mut out = Vec::with_capacity(block.lines.len() + 3);
        out.push(block.index.clone());
        out.push(block.time_code.clone());
        out.extend(text.split('\n').map(|l| l.to_string()));
        out.push(String::new());
        rendered.push(out.join("\n"));
    }

    rendered.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:03,000\nHello there.\n\n2\n00:00:04,000 --> 00:00:06,000\nTwo lines\nof text.\n";

    #[test]
    fn parses_blocks_with_index_and_timecode() {
        let blocks = parse(SAMPLE);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].index, "1");
        assert_eq!(blocks[0].time_code, "00:00:01,000 --> 00:00:03,000");
        assert_eq!(blocks[1].lines, vec!["Two lines", "of text."]);
    }

    #[test]
    fn short_fragments_are_skipped() {
        let blocks = parse("1\n00:00:01,000 --> 00:00:02,000\n\n\nstray");
        assert!(blocks.is_empty());
    }

    #[test]
    fn units_join_text_lines() {
        let blocks = parse(SAMPLE);
        let units = chunk_blocks(&blocks);
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].source_text, "Two lines\nof text.");
    }

    #[test]
    fn reassembly_without_translation_is_identity() {
        let blocks = parse(SAMPLE);
        let units = chunk_blocks(&blocks);
        let out = reassemble(&blocks, &units);
        assert_eq!(out.trim_end(), SAMPLE.trim_end());
    }

    #[test]
    fn translated_text_is_resplit_into_lines() {
        let blocks = parse(SAMPLE);
        let mut units = chunk_blocks(&blocks);
        units[1].translated_text = Some("Deux lignes\nde texte.".into());
        units[1].status = UnitStatus::Done;

        let out = reassemble(&blocks, &units);
        assert!(out.contains("Deux lignes\nde texte."));
        // Timecodes pass through untouched.
        assert!(out.contains("00:00:04,000 --> 00:00:06,000"));
    }

    #[test]
    fn empty_input_round_trips() {
        let blocks = parse("");
        assert!(blocks.is_empty());
        assert!(chunk_blocks(&blocks).is_empty());
        assert_eq!(reassemble(&blocks, &[]), "");
    }
}

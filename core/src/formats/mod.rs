/// Format-specific decomposition of documents into translation units and
/// reassembly of translated units into output bytes. Both directions are
/// pure over their inputs; dispatch is an exhaustive match so a new format
/// is a compile-time-checked extension point.
pub mod json_doc;
pub mod markdown;
pub mod srt;
pub mod table;
pub mod text;

mod csv_io;

use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::extract;
use crate::task::{DocumentFormat, TranslationUnit};

pub use srt::SubtitleBlock;
pub use table::{Sheet, Table};

/// Maximum chunk size in characters for sequential-prose formats.
pub const MAX_CHUNK_CHARS: usize = 3000;

/// Decoded document content, ready for chunking.
#[derive(Debug, Clone)]
pub enum DocumentContent {
    /// Plain text: txt, markdown, and the extracted text of Word/PDF files.
    Text(String),
    /// Tabular grid: CSV and Excel.
    Table(Table),
    /// Parsed SRT subtitle blocks.
    Subtitles(Vec<SubtitleBlock>),
    /// Parsed JSON document.
    Json(Value),
}

/// Decode raw upload bytes into format-appropriate content.
pub fn decode(format: DocumentFormat, bytes: &[u8]) -> ServiceResult<DocumentContent> {
    match format {
        DocumentFormat::Txt | DocumentFormat::Markdown => {
            Ok(DocumentContent::Text(decode_text(bytes)))
        }
        DocumentFormat::Word => Ok(DocumentContent::Text(extract::docx_text(bytes)?)),
        DocumentFormat::Pdf => Ok(DocumentContent::Text(extract::pdf_text(bytes)?)),
        DocumentFormat::Csv => Ok(DocumentContent::Table(csv_io::decode(bytes)?)),
        DocumentFormat::Excel => Ok(DocumentContent::Table(extract::xlsx_table(bytes)?)),
        DocumentFormat::Srt => Ok(DocumentContent::Subtitles(srt::parse(&decode_text(bytes)))),
        DocumentFormat::Json => serde_json::from_slice(bytes)
            .map(DocumentContent::Json)
            .map_err(|e| ServiceError::Validation(format!("JSON parse error: {}", e))),
    }
}

/// Split decoded content into ordered translation units. Empty input yields
/// zero units.
pub fn chunk(format: DocumentFormat, content: &DocumentContent) -> ServiceResult<Vec<TranslationUnit>> {
    match (format, content) {
        (DocumentFormat::Txt | DocumentFormat::Word | DocumentFormat::Pdf, DocumentContent::Text(text)) => {
            Ok(text::chunk_text(text, MAX_CHUNK_CHARS))
        }
        (DocumentFormat::Markdown, DocumentContent::Text(text)) => {
            Ok(markdown::chunk_markdown(text, MAX_CHUNK_CHARS))
        }
        (DocumentFormat::Csv | DocumentFormat::Excel, DocumentContent::Table(table)) => {
            Ok(table::chunk_table(table))
        }
        (DocumentFormat::Srt, DocumentContent::Subtitles(blocks)) => Ok(srt::chunk_blocks(blocks)),
        (DocumentFormat::Json, DocumentContent::Json(value)) => Ok(json_doc::chunk_json(value)),
        _ => Err(ServiceError::Validation(
            "decoded content does not match the document format".into(),
        )),
    }
}

/// Apply translated units back onto the original content and serialize the
/// output artifact.
pub fn reassemble(
    format: DocumentFormat,
    content: &DocumentContent,
    units: &[TranslationUnit],
) -> ServiceResult<Vec<u8>> {
    match (format, content) {
        (
            DocumentFormat::Txt
            | DocumentFormat::Word
            | DocumentFormat::Pdf
            | DocumentFormat::Markdown,
            DocumentContent::Text(_),
        ) => Ok(text::join_chunks(units).into_bytes()),
        (DocumentFormat::Csv, DocumentContent::Table(table)) => {
            csv_io::encode(&table::apply_units(table, units))
        }
        (DocumentFormat::Excel, DocumentContent::Table(table)) => {
            extract::xlsx_encode(&table::apply_units(table, units))
        }
        (DocumentFormat::Srt, DocumentContent::Subtitles(blocks)) => {
            Ok(srt::reassemble(blocks, units).into_bytes())
        }
        (DocumentFormat::Json, DocumentContent::Json(value)) => {
            let output = json_doc::reassemble(value, units)?;
            Ok(output.into_bytes())
        }
        _ => Err(ServiceError::Validation(
            "decoded content does not match the document format".into(),
        )),
    }
}

/// The original uploads are expected to be UTF-8; anything else is decoded
/// lossily rather than rejected.
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::UnitStatus;

    #[test]
    fn empty_text_yields_no_units() {
        let content = decode(DocumentFormat::Txt, b"").unwrap();
        let units = chunk(DocumentFormat::Txt, &content).unwrap();
        assert!(units.is_empty());

        let out = reassemble(DocumentFormat::Txt, &content, &units).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn text_round_trip_without_translation_is_identity() {
        let source = "First paragraph.\n\nSecond paragraph with more text.\n";
        let content = decode(DocumentFormat::Txt, source.as_bytes()).unwrap();
        let units = chunk(DocumentFormat::Txt, &content).unwrap();

        let out = reassemble(DocumentFormat::Txt, &content, &units).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), source);
    }

    #[test]
    fn markdown_round_trip_without_translation_is_identity() {
        let source = "# Title\n\nIntro paragraph.\n\n```rust\nfn main() {}\n```\n\n## Section\n\nBody.\n";
        let content = decode(DocumentFormat::Markdown, source.as_bytes()).unwrap();
        let units = chunk(DocumentFormat::Markdown, &content).unwrap();

        let out = reassemble(DocumentFormat::Markdown, &content, &units).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), source);
    }

    #[test]
    fn translated_chunks_replace_source_in_order() {
        let source = "Alpha.\n\nBeta.";
        let content = decode(DocumentFormat::Txt, source.as_bytes()).unwrap();
        let mut units = chunk(DocumentFormat::Txt, &content).unwrap();
        for unit in &mut units {
            unit.translated_text = Some(unit.source_text.to_uppercase());
            unit.status = UnitStatus::Done;
        }

        let out = reassemble(DocumentFormat::Txt, &content, &units).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), source.to_uppercase());
    }

    #[test]
    fn mismatched_content_is_rejected() {
        let content = DocumentContent::Text("hello".into());
        assert!(chunk(DocumentFormat::Json, &content).is_err());
    }
}

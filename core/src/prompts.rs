/// Prompt selection for the translation API. The pair is deterministic by
/// document format; callers without a format get the generic pair.
use crate::task::DocumentFormat;

pub struct PromptParams<'a> {
    pub source_language: Option<&'a str>,
    pub target_language: &'a str,
    pub preserve_formatting: bool,
    pub text: &'a str,
}

/// System prompt shared by every request.
pub fn system_prompt(params: &PromptParams<'_>) -> String {
    format!(
        "You are a professional document translation assistant. Translate the user's text from {} into {}. \
         The translation must be accurate and natural, keeping the tone and meaning of the source.",
        params.source_language.unwrap_or("the detected source language"),
        params.target_language
    )
}

/// User prompt for a given format, or the generic prompt when no format is
/// specified.
pub fn user_prompt(format: Option<DocumentFormat>, params: &PromptParams<'_>) -> String {
    let target = params.target_language;
    let instruction = match format {
        Some(DocumentFormat::Txt) | Some(DocumentFormat::Word) | Some(DocumentFormat::Pdf) => {
            format!("Translate the following text into {target}")
        }
        Some(DocumentFormat::Markdown) => format!(
            "Translate the following Markdown into {target}, leaving all Markdown syntax, code blocks and links unchanged"
        ),
        Some(DocumentFormat::Csv) | Some(DocumentFormat::Excel) => format!(
            "Translate the following table cell into {target}, leaving numbers, dates and identifiers unchanged"
        ),
        Some(DocumentFormat::Srt) => format!(
            "Translate the following subtitle text into {target}; keep it short and readable on screen"
        ),
        Some(DocumentFormat::Json) => format!(
            "Translate the following JSON string value into {target}; translate the value only, never keys or structure"
        ),
        None => generic_instruction(params),
    };

    let formatting = if params.preserve_formatting && prose_format(format) {
        ", preserving the original formatting, paragraphs and punctuation"
    } else {
        ""
    };

    format!("{instruction}{formatting}:\n\n{}", params.text)
}

fn generic_instruction(params: &PromptParams<'_>) -> String {
    match params.source_language {
        Some(source) => format!(
            "Translate the following {} text into {}",
            source, params.target_language
        ),
        None => format!("Translate the following text into {}", params.target_language),
    }
}

fn prose_format(format: Option<DocumentFormat>) -> bool {
    !matches!(
        format,
        Some(DocumentFormat::Csv) | Some(DocumentFormat::Excel) | Some(DocumentFormat::Json)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(text: &str) -> PromptParams<'_> {
        PromptParams {
            source_language: None,
            target_language: "French",
            preserve_formatting: true,
            text,
        }
    }

    #[test]
    fn selection_is_deterministic_by_format() {
        let p = params("hello");
        let a = user_prompt(Some(DocumentFormat::Markdown), &p);
        let b = user_prompt(Some(DocumentFormat::Markdown), &p);
        assert_eq!(a, b);
        assert!(a.contains("Markdown"));

        let json = user_prompt(Some(DocumentFormat::Json), &p);
        assert!(json.contains("never keys"));
        assert_ne!(a, json);
    }

    #[test]
    fn generic_prompt_used_without_format() {
        let p = params("hello");
        let prompt = user_prompt(None, &p);
        assert!(prompt.contains("Translate the following text into French"));
        assert!(prompt.ends_with("hello"));
    }

    #[test]
    fn cell_formats_skip_formatting_clause() {
        let p = params("hello");
        let csv = user_prompt(Some(DocumentFormat::Csv), &p);
        assert!(!csv.contains("paragraphs"));

        let txt = user_prompt(Some(DocumentFormat::Txt), &p);
        assert!(txt.contains("paragraphs"));
    }

    #[test]
    fn system_prompt_names_both_languages() {
        let mut p = params("x");
        p.source_language = Some("German");
        let system = system_prompt(&p);
        assert!(system.contains("German"));
        assert!(system.contains("French"));
    }
}

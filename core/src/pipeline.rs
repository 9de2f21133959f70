/// One processing attempt for one task: read the upload, decode, chunk,
/// translate, reassemble, and write the output artifact. Returns the final
/// artifact path; any error aborts the attempt and is handled by the
/// scheduler's retry policy.
use std::path::{Path, PathBuf};

use log::info;

use crate::client::Translator;
use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::executor::{BatchExecutor, ProgressSink, DECODE_BAND, ENCODE_BAND};
use crate::formats;
use crate::task::{DocumentFormat, Task};

pub async fn process_task(
    task: &Task,
    config: &AppConfig,
    translator: &dyn Translator,
    sink: &dyn ProgressSink,
) -> ServiceResult<PathBuf> {
    let format = task.file_info.format;
    info!(
        "processing {} ({:?}, {} bytes)",
        task.file_info.original_name, format, task.file_info.size
    );

    let bytes = tokio::fs::read(&task.file_info.stored_path)
        .await
        .map_err(|e| {
            ServiceError::NotFound(format!(
                "uploaded file {}: {}",
                task.file_info.stored_path.display(),
                e
            ))
        })?;
    sink.report(DECODE_BAND.at(1, 2));

    let content = formats::decode(format, &bytes)?;
    let mut units = formats::chunk(format, &content)?;
    sink.report(DECODE_BAND.end);

    let executor = BatchExecutor::new(config.tasks.max_concurrent_translations);
    executor
        .execute(translator, format, &task.options, &mut units, sink)
        .await?;

    let output = formats::reassemble(format, &content, &units)?;
    sink.report(ENCODE_BAND.at(1, 2));

    let output_path = write_artifact(task, config, &output).await?;
    sink.report(ENCODE_BAND.end);

    info!(
        "finished {} -> {}",
        task.file_info.original_name,
        output_path.display()
    );

    Ok(output_path)
}

/// Binary formats are staged in the temp directory and then moved into the
/// output directory; text formats are written to the output directory
/// directly.
async fn write_artifact(task: &Task, config: &AppConfig, output: &[u8]) -> ServiceResult<PathBuf> {
    let filename = output_filename(&task.file_info.original_name, task.file_info.format);
    let final_path = config.files.output_dir.join(&filename);

    if task.file_info.format.is_binary() {
        let staging = config.files.temp_dir.join(&filename);
        tokio::fs::write(&staging, output).await?;
        if tokio::fs::rename(&staging, &final_path).await.is_err() {
            // Rename fails across filesystems; fall back to copy + remove.
            tokio::fs::copy(&staging, &final_path).await?;
            let _ = tokio::fs::remove_file(&staging).await;
        }
    } else {
        tokio::fs::write(&final_path, output).await?;
    }

    Ok(final_path)
}

/// `report.md` -> `report_translated.md`; Word and PDF translations are
/// plain-text artifacts, so their extension becomes `.txt`.
fn output_filename(original_name: &str, format: DocumentFormat) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("translated");

    let extension = match format {
        DocumentFormat::Word | DocumentFormat::Pdf => "txt".to_string(),
        _ => path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("txt")
            .to_string(),
    };

    format!("{}_translated.{}", stem, extension)
}

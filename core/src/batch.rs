/// Batch groups: lightweight bookkeeping over task ids for collective
/// progress reporting and packaged download. Groups live in memory only;
/// the task store stays authoritative for every task's lifecycle.
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ServiceError, ServiceResult};
use crate::store::TaskStore;
use crate::task::{BatchGroup, Task, TaskStatus};

#[derive(Default)]
pub struct BatchRegistry {
    groups: Mutex<HashMap<Uuid, BatchGroup>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task_ids: Vec<Uuid>) -> BatchGroup {
        let group = BatchGroup {
            batch_id: Uuid::new_v4(),
            task_ids,
            created_at: Utc::now(),
        };
        info!(
            "created batch {} with {} task(s)",
            group.batch_id,
            group.task_ids.len()
        );
        self.groups
            .lock()
            .expect("batch registry poisoned")
            .insert(group.batch_id, group.clone());
        group
    }

    pub fn get(&self, batch_id: Uuid) -> Option<BatchGroup> {
        self.groups
            .lock()
            .expect("batch registry poisoned")
            .get(&batch_id)
            .cloned()
    }

    pub fn delete(&self, batch_id: Uuid) -> bool {
        self.groups
            .lock()
            .expect("batch registry poisoned")
            .remove(&batch_id)
            .is_some()
    }
}

/// Aggregate view over a set of tasks: per-status counts plus an overall
/// percentage of fully completed tasks.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub processing_tasks: usize,
    pub pending_tasks: usize,
    pub overall_progress: u8,
    pub tasks: Vec<Task>,
}

/// Collect progress over the requested ids, silently excluding tasks the
/// caller does not own or that no longer exist.
pub fn aggregate_progress(store: &TaskStore, task_ids: &[Uuid], owner_token: &str) -> BatchProgress {
    let tasks: Vec<Task> = task_ids
        .iter()
        .filter_map(|id| store.get(*id))
        .filter(|task| task.is_owned_by(owner_token))
        .collect();

    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
    let total_tasks = tasks.len();
    let completed_tasks = count(TaskStatus::Completed);
    let overall_progress = if total_tasks > 0 {
        ((completed_tasks * 100 + total_tasks / 2) / total_tasks) as u8
    } else {
        0
    };

    BatchProgress {
        total_tasks,
        completed_tasks,
        failed_tasks: count(TaskStatus::Failed),
        processing_tasks: count(TaskStatus::Processing),
        pending_tasks: count(TaskStatus::Pending),
        overall_progress,
        tasks,
    }
}

/// Completed, caller-owned tasks whose output artifact still exists on
/// disk.
pub fn downloadable_tasks(store: &TaskStore, task_ids: &[Uuid], owner_token: &str) -> Vec<Task> {
    task_ids
        .iter()
        .filter_map(|id| store.get(*id))
        .filter(|task| {
            task.is_owned_by(owner_token)
                && task.status == TaskStatus::Completed
                && task
                    .output_path
                    .as_deref()
                    .map(Path::exists)
                    .unwrap_or(false)
        })
        .collect()
}

/// Package the output artifacts of the given tasks into one zip archive.
/// Duplicate output filenames get a `_N` suffix before the extension so
/// every artifact survives the packing.
pub fn zip_outputs(tasks: &[Task]) -> ServiceResult<Vec<u8>> {
    if tasks.is_empty() {
        return Err(ServiceError::NotFound(
            "no completed translation artifacts to download".into(),
        ));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut name_counts: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        let Some(output) = &task.output_path else {
            continue;
        };
        let bytes = match std::fs::read(output) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("skipping missing artifact {}: {}", output.display(), e);
                continue;
            }
        };

        let base = output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("translated");
        let entry_name = dedup_entry_name(&mut name_counts, base);

        writer
            .start_file(entry_name, options)
            .map_err(zip_io_error)?;
        writer.write_all(&bytes)?;
    }

    let cursor = writer.finish().map_err(zip_io_error)?;
    Ok(cursor.into_inner())
}

fn zip_io_error(e: zip::result::ZipError) -> ServiceError {
    ServiceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// `report.txt` stays `report.txt` on first use, then becomes
/// `report_1.txt`, `report_2.txt` for later occurrences.
fn dedup_entry_name(counts: &mut HashMap<String, usize>, name: &str) -> String {
    let seen = counts.entry(name.to_string()).or_insert(0);
    let entry = if *seen == 0 {
        name.to_string()
    } else {
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{}_{}.{}", stem, seen, ext),
            None => format!("{}_{}", name, seen),
        }
    };
    *seen += 1;
    entry
}

/// Periodic and on-demand removal of expired tasks and orphaned scratch
/// files. A failed deletion is logged and the sweep continues with the
/// remaining tasks.
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::config::AppConfig;
use crate::store::TaskStore;

pub struct CleanupSweeper {
    store: Arc<TaskStore>,
    temp_dir: PathBuf,
    max_age: chrono::Duration,
    period: Duration,
}

impl CleanupSweeper {
    pub fn new(store: Arc<TaskStore>, config: &AppConfig) -> Self {
        Self {
            store,
            temp_dir: config.files.temp_dir.clone(),
            max_age: chrono::Duration::hours(config.tasks.task_expiry_hours),
            period: Duration::from_secs(config.tasks.cleanup_interval_secs),
        }
    }

    /// Delete every task older than `max_age` measured from its creation
    /// time, regardless of status. Returns the number of removed tasks.
    pub fn sweep_expired(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0usize;

        for task in self.store.list_all() {
            if task.created_at >= cutoff {
                continue;
            }
            match self.store.delete(task.id) {
                Ok(true) => {
                    info!(
                        "removed expired task {} ({})",
                        task.id, task.file_info.original_name
                    );
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("failed to remove expired task {}: {}", task.id, e),
            }
        }

        info!("expiry sweep removed {} task(s)", removed);
        removed
    }

    /// Empty the scratch directory used for intermediate binary artifacts.
    /// Returns the number of removed entries.
    pub fn clear_temp_directory(&self) -> usize {
        let entries = match fs::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("cannot read temp dir {}: {}", self.temp_dir.display(), e);
                }
                return 0;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }

        info!("temp sweep removed {} entries", removed);
        removed
    }

    /// One full pass: expired tasks first, then the scratch directory.
    pub fn run_once(&self) {
        self.sweep_expired(self.max_age);
        self.clear_temp_directory();
    }

    /// Recurring schedule on the configured period. The first pass runs one
    /// full period after startup.
    pub fn spawn_schedule(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(
            "cleanup schedule: every {}s, expiry {}h",
            self.period.as_secs(),
            self.max_age.num_hours()
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.run_once();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{DocumentFormat, FileInfo, TranslationOptions};
    use tempfile::TempDir;

    fn sweeper_with_store(dir: &TempDir) -> (CleanupSweeper, Arc<TaskStore>) {
        let mut config = AppConfig::default();
        config.files.temp_dir = dir.path().join("temp");
        config.files.data_dir = dir.path().join("data");
        fs::create_dir_all(&config.files.temp_dir).unwrap();

        let store = Arc::new(TaskStore::new(config.tasks_dir()).unwrap());
        (CleanupSweeper::new(store.clone(), &config), store)
    }

    fn create_task(store: &TaskStore, dir: &TempDir, name: &str) -> uuid::Uuid {
        store
            .create(
                FileInfo {
                    original_name: name.to_string(),
                    stored_path: dir.path().join(name),
                    size: 1,
                    mime_type: "text/plain".into(),
                    extension: "txt".into(),
                    format: DocumentFormat::Txt,
                },
                TranslationOptions::default(),
                "owner".into(),
            )
            .unwrap()
            .id
    }

    #[test]
    fn sweep_removes_old_tasks_and_keeps_new_ones() {
        let dir = TempDir::new().unwrap();
        let (sweeper, store) = sweeper_with_store(&dir);

        let old = create_task(&store, &dir, "old.txt");
        let fresh = create_task(&store, &dir, "fresh.txt");
        store
            .update(old, |t| t.created_at = Utc::now() - chrono::Duration::hours(48))
            .unwrap();

        let removed = sweeper.sweep_expired(chrono::Duration::hours(24));
        assert_eq!(removed, 1);
        assert!(store.get(old).is_none());
        assert!(store.get(fresh).is_some());
    }

    #[test]
    fn sweep_ignores_status() {
        let dir = TempDir::new().unwrap();
        let (sweeper, store) = sweeper_with_store(&dir);

        let id = create_task(&store, &dir, "done.txt");
        store
            .update(id, |t| {
                t.status = crate::task::TaskStatus::Completed;
                t.created_at = Utc::now() - chrono::Duration::hours(48);
            })
            .unwrap();

        assert_eq!(sweeper.sweep_expired(chrono::Duration::hours(24)), 1);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn temp_clear_removes_files_and_directories() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _store) = sweeper_with_store(&dir);

        let temp = dir.path().join("temp");
        fs::write(temp.join("staging.xlsx"), b"bytes").unwrap();
        fs::create_dir_all(temp.join("nested")).unwrap();
        fs::write(temp.join("nested/part.bin"), b"bytes").unwrap();

        assert_eq!(sweeper.clear_temp_directory(), 2);
        assert_eq!(fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn missing_temp_dir_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _store) = sweeper_with_store(&dir);
        fs::remove_dir(dir.path().join("temp")).unwrap();
        assert_eq!(sweeper.clear_temp_directory(), 0);
    }
}

/// Durable task repository: one JSON record per task id under the data
/// directory, mirrored by an in-memory index. The index mutex is the
/// serialization point for every read-modify-write, so concurrent progress
/// updates and scheduler transitions cannot lose writes.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::task::{FileInfo, Task, TaskStatus, TranslationOptions};

pub struct TaskStore {
    dir: PathBuf,
    index: Mutex<HashMap<Uuid, Task>>,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> ServiceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            index: Mutex::new(HashMap::new()),
        })
    }

    /// Load every persisted record into the index. Called once at startup,
    /// before the scheduler resumes queue processing. Unreadable records
    /// are skipped with a log line rather than failing the boot.
    pub fn reload(&self) -> ServiceResult<usize> {
        let mut loaded = HashMap::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Task>(&raw).map_err(|e| e.to_string()))
            {
                Ok(task) => {
                    loaded.insert(task.id, task);
                }
                Err(e) => {
                    error!("skipping unreadable task record {}: {}", path.display(), e);
                }
            }
        }

        let count = loaded.len();
        *self.index.lock().expect("task index poisoned") = loaded;
        info!("restored {} task records from {}", count, self.dir.display());
        Ok(count)
    }

    pub fn create(
        &self,
        file_info: FileInfo,
        options: TranslationOptions,
        owner_token: String,
    ) -> ServiceResult<Task> {
        let task = Task::new(file_info, options, owner_token);

        let mut index = self.index.lock().expect("task index poisoned");
        self.persist(&task)?;
        index.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.index.lock().expect("task index poisoned").get(&id).cloned()
    }

    /// All tasks, newest first.
    pub fn list_all(&self) -> Vec<Task> {
        let index = self.index.lock().expect("task index poisoned");
        let mut tasks: Vec<Task> = index.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn list_by_owner(&self, owner_token: &str) -> Vec<Task> {
        self.list_all()
            .into_iter()
            .filter(|task| task.is_owned_by(owner_token))
            .collect()
    }

    /// Idempotent upsert of a full record.
    pub fn save(&self, task: &Task) -> ServiceResult<()> {
        let mut index = self.index.lock().expect("task index poisoned");
        self.persist(task)?;
        index.insert(task.id, task.clone());
        Ok(())
    }

    /// Atomic read-modify-write of one record. The closure runs under the
    /// index lock and the mutated record is persisted before the lock is
    /// released.
    pub fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Task)) -> ServiceResult<Task> {
        let mut index = self.index.lock().expect("task index poisoned");
        let task = index
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))?;

        mutate(task);
        task.touch();
        let snapshot = task.clone();
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// Remove the record together with its uploaded source and output
    /// artifact. Missing files are ignored; a missing record returns
    /// `false`.
    pub fn delete(&self, id: Uuid) -> ServiceResult<bool> {
        let mut index = self.index.lock().expect("task index poisoned");
        let Some(task) = index.remove(&id) else {
            return Ok(false);
        };

        remove_file_if_present(&task.file_info.stored_path);
        if let Some(output) = &task.output_path {
            remove_file_if_present(output);
        }

        let record = self.record_path(id);
        if let Err(e) = fs::remove_file(&record) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove task record {}: {}", record.display(), e);
            }
        }

        Ok(true)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.index
            .lock()
            .expect("task index poisoned")
            .values()
            .filter(|task| task.status == status)
            .count()
    }

    /// Oldest pending task by creation time; retried tasks keep their
    /// original timestamp and therefore their original queue position.
    pub fn oldest_pending(&self) -> Option<Task> {
        self.index
            .lock()
            .expect("task index poisoned")
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .min_by_key(|task| task.created_at)
            .cloned()
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn persist(&self, task: &Task) -> ServiceResult<()> {
        let raw = serde_json::to_vec_pretty(task)
            .map_err(|e| ServiceError::Validation(format!("task serialize error: {}", e)))?;
        fs::write(self.record_path(task.id), raw)?;
        Ok(())
    }
}

fn remove_file_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DocumentFormat;
    use tempfile::TempDir;

    fn file_info(dir: &Path, name: &str) -> FileInfo {
        FileInfo {
            original_name: name.to_string(),
            stored_path: dir.join(name),
            size: 10,
            mime_type: "text/plain".into(),
            extension: "txt".into(),
            format: DocumentFormat::Txt,
        }
    }

    #[test]
    fn created_tasks_survive_reload() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();
        let task = store
            .create(file_info(dir.path(), "a.txt"), TranslationOptions::default(), "owner".into())
            .unwrap();

        let fresh = TaskStore::new(dir.path().join("tasks")).unwrap();
        assert!(fresh.get(task.id).is_none());
        assert_eq!(fresh.reload().unwrap(), 1);

        let restored = fresh.get(task.id).expect("restored task");
        assert_eq!(restored.id, task.id);
        assert_eq!(restored.status, TaskStatus::Pending);
        assert_eq!(restored.owner_token, "owner");
    }

    #[test]
    fn update_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();
        let task = store
            .create(file_info(dir.path(), "a.txt"), TranslationOptions::default(), "o".into())
            .unwrap();

        store
            .update(task.id, |t| {
                t.status = TaskStatus::Processing;
                t.progress = 40;
            })
            .unwrap();

        let fresh = TaskStore::new(dir.path().join("tasks")).unwrap();
        fresh.reload().unwrap();
        let restored = fresh.get(task.id).unwrap();
        assert_eq!(restored.status, TaskStatus::Processing);
        assert_eq!(restored.progress, 40);
        assert!(restored.updated_at >= task.updated_at);
    }

    #[test]
    fn save_upserts_full_records() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();

        let mut task = Task::new(
            file_info(dir.path(), "a.txt"),
            TranslationOptions::default(),
            "o".into(),
        );
        store.save(&task).unwrap();
        assert_eq!(store.get(task.id).unwrap().progress, 0);

        task.progress = 70;
        store.save(&task).unwrap();
        assert_eq!(store.get(task.id).unwrap().progress, 70);
        assert_eq!(store.list_all().len(), 1);
    }

    #[test]
    fn update_missing_task_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();
        let result = store.update(Uuid::new_v4(), |_| {});
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn delete_removes_record_and_files() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();

        let info = file_info(dir.path(), "a.txt");
        fs::write(&info.stored_path, b"source").unwrap();
        let output = dir.path().join("a_translated.txt");
        fs::write(&output, b"translated").unwrap();

        let task = store
            .create(info, TranslationOptions::default(), "o".into())
            .unwrap();
        store
            .update(task.id, |t| t.output_path = Some(output.clone()))
            .unwrap();

        assert!(store.delete(task.id).unwrap());
        assert!(store.get(task.id).is_none());
        assert!(!output.exists());
        assert!(!dir.path().join("a.txt").exists());

        // Absent record: false, not an error.
        assert!(!store.delete(task.id).unwrap());
    }

    #[test]
    fn delete_tolerates_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();
        let task = store
            .create(file_info(dir.path(), "gone.txt"), TranslationOptions::default(), "o".into())
            .unwrap();

        // Neither the upload nor any output exists on disk.
        assert!(store.delete(task.id).unwrap());
    }

    #[test]
    fn listing_is_newest_first_and_owner_scoped() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();

        let first = store
            .create(file_info(dir.path(), "a.txt"), TranslationOptions::default(), "alice".into())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store
            .create(file_info(dir.path(), "b.txt"), TranslationOptions::default(), "bob".into())
            .unwrap();

        let all = store.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let bobs = store.list_by_owner("bob");
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].id, second.id);
        assert!(store.list_by_owner("carol").is_empty());
    }

    #[test]
    fn oldest_pending_respects_creation_order() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks")).unwrap();

        let first = store
            .create(file_info(dir.path(), "a.txt"), TranslationOptions::default(), "o".into())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store
            .create(file_info(dir.path(), "b.txt"), TranslationOptions::default(), "o".into())
            .unwrap();

        assert_eq!(store.oldest_pending().unwrap().id, first.id);

        // A retried task keeps its original position in the queue.
        store
            .update(first.id, |t| t.status = TaskStatus::Processing)
            .unwrap();
        assert_eq!(store.oldest_pending().unwrap().id, second.id);
        store
            .update(first.id, |t| t.status = TaskStatus::Pending)
            .unwrap();
        assert_eq!(store.oldest_pending().unwrap().id, first.id);
    }
}

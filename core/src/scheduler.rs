/// Global admission controller for translation tasks. At most
/// `max_concurrent_tasks` tasks hold Processing at any time; admission is
/// strict FIFO by creation time, and a retried task keeps its original
/// timestamp and therefore its original place in the queue.
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use uuid::Uuid;

use crate::client::Translator;
use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::executor::ProgressSink;
use crate::pipeline;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};

pub struct Scheduler {
    store: Arc<TaskStore>,
    config: Arc<AppConfig>,
    translator: Arc<dyn Translator>,
    /// Number of tasks currently Processing. Mutated only in the admit and
    /// release transitions, under this lock.
    processing: Mutex<usize>,
}

impl Scheduler {
    pub fn new(
        store: Arc<TaskStore>,
        config: Arc<AppConfig>,
        translator: Arc<dyn Translator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            translator,
            processing: Mutex::new(0),
        })
    }

    /// Recover from a previous process run: tasks left in Processing by a
    /// crash are returned to Pending (the attempt restarts from scratch),
    /// then the queue is pumped. Call once after `TaskStore::reload`.
    pub fn resume(self: &Arc<Self>) {
        for task in self.store.list_all() {
            if task.status != TaskStatus::Processing {
                continue;
            }
            let requeued = self.store.update(task.id, |t| {
                t.status = TaskStatus::Pending;
                t.progress = 0;
            });
            match requeued {
                Ok(_) => info!("requeued interrupted task {}", task.id),
                Err(e) => error!("failed to requeue interrupted task {}: {}", task.id, e),
            }
        }
        self.kick();
    }

    /// Admit pending tasks until the concurrency limit is reached or the
    /// queue is empty. Re-evaluated on every task arrival and every
    /// departure from Processing.
    pub fn kick(self: &Arc<Self>) {
        loop {
            let mut processing = self.processing.lock().expect("processing counter poisoned");
            if *processing >= self.config.tasks.max_concurrent_tasks {
                return;
            }
            let Some(task) = self.store.oldest_pending() else {
                return;
            };

            match self.store.update(task.id, |t| {
                t.status = TaskStatus::Processing;
                t.progress = 0;
            }) {
                Ok(admitted) => {
                    *processing += 1;
                    info!(
                        "admitted task {} ({} of {} slots in use)",
                        admitted.id, *processing, self.config.tasks.max_concurrent_tasks
                    );
                    drop(processing);

                    let scheduler = Arc::clone(self);
                    tokio::spawn(async move {
                        scheduler.run_attempt(admitted).await;
                    });
                }
                Err(e) => {
                    // The task was deleted between the queue peek and the
                    // admission write; move on to the next candidate.
                    warn!("could not admit task {}: {}", task.id, e);
                }
            }
        }
    }

    async fn run_attempt(self: Arc<Self>, task: Task) {
        let sink = StoreProgress {
            store: Arc::clone(&self.store),
            id: task.id,
        };

        let result =
            pipeline::process_task(&task, &self.config, self.translator.as_ref(), &sink).await;

        match result {
            Ok(output_path) => {
                let completed = self.store.update(task.id, |t| {
                    t.status = TaskStatus::Completed;
                    t.progress = 100;
                    t.output_path = Some(output_path.clone());
                    t.error_message = None;
                });
                match completed {
                    Ok(_) => info!("task {} completed", task.id),
                    Err(e) => warn!("completed task {} no longer exists: {}", task.id, e),
                }
            }
            Err(error) => self.handle_failure(&task, error),
        }

        self.release();
    }

    /// Failure path for one processing attempt. Recoverable errors consume
    /// one retry and put the task back into the queue; exhausted or fatal
    /// errors mark it Failed with the last message preserved verbatim.
    fn handle_failure(&self, task: &Task, error: ServiceError) {
        let max_retry = self.config.tasks.max_retry_count;
        let retryable = error.is_retryable();
        let message = error.to_string();

        let outcome = self.store.update(task.id, |t| {
            if retryable {
                t.retry_count += 1;
                if t.retry_count < max_retry {
                    t.status = TaskStatus::Pending;
                    t.progress = 0;
                    t.error_message = Some(message.clone());
                    return;
                }
            } else {
                // Fatal errors (rejected credential) skip the remaining
                // attempts; the spent count still reaches the ceiling so a
                // Failed record always carries retryCount == maxRetryCount.
                t.retry_count = max_retry;
            }
            t.status = TaskStatus::Failed;
            t.error_message = Some(message.clone());
        });

        match outcome {
            Ok(updated) if updated.status == TaskStatus::Pending => {
                info!(
                    "task {} failed ({}), retry {}/{} queued",
                    task.id, message, updated.retry_count, max_retry
                );
            }
            Ok(updated) => {
                error!(
                    "task {} failed permanently after {} attempts: {}",
                    task.id, updated.retry_count, message
                );
            }
            Err(e) => warn!("failed task {} no longer exists: {}", task.id, e),
        }
    }

    fn release(self: &Arc<Self>) {
        {
            let mut processing = self.processing.lock().expect("processing counter poisoned");
            *processing = processing.saturating_sub(1);
        }
        self.kick();
    }

    /// Explicit user-initiated retry of a Completed or Failed task: a fresh
    /// attempt, independent of the internal failure-retry ceiling. Any
    /// stale output artifact is removed before the task re-enters the
    /// queue.
    pub fn user_retry(self: &Arc<Self>, id: Uuid, owner_token: &str) -> ServiceResult<Task> {
        let task = self
            .store
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))?;

        if !task.is_owned_by(owner_token) {
            return Err(ServiceError::Ownership);
        }
        if !matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(ServiceError::Validation(
                "only completed or failed tasks can be retried".into(),
            ));
        }

        if let Some(output) = &task.output_path {
            remove_stale_output(output);
        }

        let refreshed = self.store.update(id, |t| {
            t.status = TaskStatus::Pending;
            t.progress = 0;
            t.retry_count = 0;
            t.error_message = None;
            t.output_path = None;
        })?;

        info!("task {} reset to pending by user retry", id);
        self.kick();
        Ok(refreshed)
    }

    pub fn processing_count(&self) -> usize {
        *self.processing.lock().expect("processing counter poisoned")
    }
}

/// Progress sink that writes back into the task record. Percentages only
/// ever rise within an attempt; stale reports racing a state transition are
/// dropped by the status check.
struct StoreProgress {
    store: Arc<TaskStore>,
    id: Uuid,
}

impl ProgressSink for StoreProgress {
    fn report(&self, percent: u8) {
        let result = self.store.update(self.id, |t| {
            if t.status == TaskStatus::Processing && percent > t.progress {
                t.progress = percent.min(100);
            }
        });
        if let Err(e) = result {
            warn!("progress update for {} dropped: {}", self.id, e);
        }
    }
}

fn remove_stale_output(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove stale output {}: {}", path.display(), e);
        }
    }
}

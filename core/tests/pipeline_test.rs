//! End-to-end pipeline tests: fixture uploads go through the task store,
//! the scheduler drives a mock translator, and the reassembled artifacts
//! are checked for structure preservation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use doc_translator_core::{
    AppConfig, CleanupSweeper, DocumentFormat, FileInfo, Scheduler, ServiceResult, Task,
    TaskStatus, TaskStore, TranslateRequest, TranslationOptions, Translator,
};

const FIXTURE_MARKDOWN: &str = include_str!("fixtures/sample.md");
const FIXTURE_JSON: &str = include_str!("fixtures/sample.json");
const FIXTURE_SRT: &str = include_str!("fixtures/sample.srt");
const FIXTURE_CSV: &str = include_str!("fixtures/sample.csv");

/// Records every request and marks translations with a `[T]` prefix so the
/// output is easy to tell apart from passed-through content.
struct MarkingTranslator {
    calls: Mutex<Vec<String>>,
}

impl MarkingTranslator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_for(&self, text: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == text)
            .count()
    }
}

#[async_trait]
impl Translator for MarkingTranslator {
    async fn translate(&self, request: &TranslateRequest) -> ServiceResult<String> {
        self.calls.lock().unwrap().push(request.text.clone());
        Ok(format!("[T] {}", request.text))
    }
}

/// Returns the source unchanged, for round-trip identity checks.
struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, request: &TranslateRequest) -> ServiceResult<String> {
        Ok(request.text.clone())
    }
}

fn environment(dir: &TempDir) -> (Arc<AppConfig>, Arc<TaskStore>) {
    let mut config = AppConfig::default();
    config.files.upload_dir = dir.path().join("uploads");
    config.files.temp_dir = dir.path().join("temp");
    config.files.output_dir = dir.path().join("outputs");
    config.files.data_dir = dir.path().join("data");
    for d in [
        &config.files.upload_dir,
        &config.files.temp_dir,
        &config.files.output_dir,
    ] {
        std::fs::create_dir_all(d).unwrap();
    }

    let config = Arc::new(config);
    let store = Arc::new(TaskStore::new(config.tasks_dir()).unwrap());
    (config, store)
}

fn submit(
    store: &TaskStore,
    config: &AppConfig,
    name: &str,
    format: DocumentFormat,
    content: &str,
) -> Task {
    let stored = config.files.upload_dir.join(name);
    std::fs::write(&stored, content).unwrap();
    store
        .create(
            FileInfo {
                original_name: name.to_string(),
                stored_path: stored,
                size: content.len() as u64,
                mime_type: "application/octet-stream".into(),
                extension: name.rsplit('.').next().unwrap().to_string(),
                format,
            },
            TranslationOptions::default(),
            "owner".into(),
        )
        .unwrap()
}

async fn wait_for(store: &TaskStore, id: Uuid, wanted: TaskStatus) -> Task {
    for _ in 0..400 {
        if let Some(task) = store.get(id) {
            if task.status == wanted {
                return task;
            }
            if wanted != TaskStatus::Failed && task.status == TaskStatus::Failed {
                panic!("task {} failed: {:?}", id, task.error_message);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached {:?}", id, wanted);
}

fn artifact(task: &Task) -> String {
    std::fs::read_to_string(task.output_path.as_ref().expect("output path")).unwrap()
}

#[tokio::test]
async fn markdown_identity_translation_reproduces_the_source() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let scheduler = Scheduler::new(store.clone(), config.clone(), Arc::new(IdentityTranslator));

    let task = submit(&store, &config, "guide.md", DocumentFormat::Markdown, FIXTURE_MARKDOWN);
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;

    assert_eq!(artifact(&done), FIXTURE_MARKDOWN);
}

#[tokio::test]
async fn json_structure_survives_translation() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let translator = MarkingTranslator::new();
    let scheduler = Scheduler::new(store.clone(), config.clone(), translator.clone());

    let task = submit(&store, &config, "report.json", DocumentFormat::Json, FIXTURE_JSON);
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;

    let output: serde_json::Value = serde_json::from_str(&artifact(&done)).unwrap();

    // Translated leaves carry the marker.
    assert_eq!(output["title"], "[T] Daily report");
    assert_eq!(output["items"][0]["label"], "[T] First entry");
    assert_eq!(output["items"][1]["label"], "[T] Second entry");

    // Non-string values and skip-classified strings are untouched.
    assert_eq!(output["count"], 42);
    assert_eq!(output["url"], "https://example.com/reports/daily");
    assert_eq!(output["created"], "2024-01-15");
    assert_eq!(output["contact"], "team@example.com");
    assert_eq!(output["id"], "550e8400-e29b-41d4-a716-446655440000");
    assert_eq!(output["items"][0]["done"], false);
    assert_eq!(output["items"][1]["done"], true);
}

#[tokio::test]
async fn csv_translates_text_columns_and_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let translator = MarkingTranslator::new();
    let scheduler = Scheduler::new(store.clone(), config.clone(), translator.clone());

    let task = submit(&store, &config, "items.csv", DocumentFormat::Csv, FIXTURE_CSV);
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;

    let output = artifact(&done);
    let lines: Vec<&str> = output.lines().collect();

    // Header and row count unchanged.
    assert_eq!(lines[0], "name,price,notes");
    assert_eq!(lines.len(), FIXTURE_CSV.lines().count());

    // Text columns translated, the numeric column untouched.
    assert!(lines[1].contains("[T] red chair"));
    assert!(lines[1].contains("[T] solid oak frame"));
    assert!(lines[1].contains(",10,"));
}

#[tokio::test]
async fn duplicate_cells_share_one_translation_call() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let translator = MarkingTranslator::new();
    let scheduler = Scheduler::new(store.clone(), config.clone(), translator.clone());

    let csv = "comment\nneeds review\nneeds review\nneeds review\nneeds review\nneeds review\n";
    let task = submit(&store, &config, "dup.csv", DocumentFormat::Csv, csv);
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;

    assert_eq!(translator.calls_for("needs review"), 1);

    let output = artifact(&done);
    assert_eq!(output.matches("[T] needs review").count(), 5);
}

#[tokio::test]
async fn srt_keeps_indices_and_timecodes() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let translator = MarkingTranslator::new();
    let scheduler = Scheduler::new(store.clone(), config.clone(), translator.clone());

    let task = submit(&store, &config, "movie.srt", DocumentFormat::Srt, FIXTURE_SRT);
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;

    let output = artifact(&done);
    assert!(output.contains("1\n00:00:01,000 --> 00:00:04,000"));
    assert!(output.contains("2\n00:00:05,000 --> 00:00:08,000"));
    assert!(output.contains("[T] Hello there."));
    assert!(output.contains("[T] This is the second subtitle."));
}

#[tokio::test]
async fn pending_tasks_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);

    // First process life: tasks are created but never admitted.
    let first = submit(&store, &config, "one.txt", DocumentFormat::Txt, "first document");
    let second = submit(&store, &config, "two.txt", DocumentFormat::Txt, "second document");
    drop(store);

    // Second life: reload the records, then resume the queue.
    let store = Arc::new(TaskStore::new(config.tasks_dir()).unwrap());
    assert_eq!(store.reload().unwrap(), 2);

    let scheduler = Scheduler::new(store.clone(), config.clone(), MarkingTranslator::new());
    scheduler.resume();

    let one = wait_for(&store, first.id, TaskStatus::Completed).await;
    let two = wait_for(&store, second.id, TaskStatus::Completed).await;
    assert!(artifact(&one).contains("[T] first document"));
    assert!(artifact(&two).contains("[T] second document"));
}

#[tokio::test]
async fn expiry_sweep_deletes_old_tasks_with_their_files() {
    let dir = TempDir::new().unwrap();
    let (config, store) = environment(&dir);
    let scheduler = Scheduler::new(store.clone(), config.clone(), MarkingTranslator::new());

    let task = submit(&store, &config, "old.txt", DocumentFormat::Txt, "aging text");
    scheduler.kick();
    let done = wait_for(&store, task.id, TaskStatus::Completed).await;
    let output_path = done.output_path.clone().unwrap();
    assert!(output_path.exists());

    store
        .update(task.id, |t| {
            t.created_at = chrono::Utc::now() - chrono::Duration::hours(48);
        })
        .unwrap();

    let sweeper = CleanupSweeper::new(store.clone(), &config);
    assert_eq!(sweeper.sweep_expired(chrono::Duration::hours(24)), 1);

    assert!(store.get(task.id).is_none());
    assert!(!output_path.exists());
    assert!(!done.file_info.stored_path.exists());
}

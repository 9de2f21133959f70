pub mod batch;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod formats;
pub mod pipeline;
pub mod prompts;
pub mod scheduler;
pub mod store;
pub mod task;

pub use batch::{BatchProgress, BatchRegistry};
pub use cleanup::CleanupSweeper;
pub use client::{HttpTranslator, TranslateRequest, Translator};
pub use config::AppConfig;
pub use error::{ServiceError, ServiceResult};
pub use executor::{BatchExecutor, NullSink, ProgressSink};
pub use scheduler::Scheduler;
pub use store::TaskStore;
pub use task::{
    BatchGroup, DocumentFormat, FileInfo, Task, TaskStatus, TranslationOptions, TranslationUnit,
    UnitPosition, UnitStatus,
};

/// Configuration for the translation service
use std::env;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    pub upload_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Root of the durable task records.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    pub max_concurrent_tasks: usize,
    pub max_retry_count: u32,
    pub max_concurrent_translations: usize,
    /// Tasks older than this many hours are removed by the sweeper.
    pub task_expiry_hours: i64,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub openai: OpenAiOptions,
    pub server_port: u16,
    pub environment: String,
    pub files: FileOptions,
    pub tasks: TaskOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiOptions {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".into(),
                model: "gpt-3.5-turbo".into(),
            },
            server_port: 3000,
            environment: "development".into(),
            files: FileOptions {
                max_file_size: 10 * 1024 * 1024,
                upload_dir: PathBuf::from("uploads"),
                temp_dir: PathBuf::from("temp"),
                output_dir: PathBuf::from("outputs"),
                data_dir: PathBuf::from("data"),
            },
            tasks: TaskOptions {
                max_concurrent_tasks: 3,
                max_retry_count: 3,
                max_concurrent_translations: 5,
                task_expiry_hours: 24,
                cleanup_interval_secs: 86_400,
            },
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables, loading `.env`
    /// first when present.
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_ok() {
            info!("loaded environment from .env");
        }

        let defaults = Self::default();

        Self {
            openai: OpenAiOptions {
                api_key: env_or("OPENAI_API_KEY", ""),
                base_url: env_or("OPENAI_BASE_URL", &defaults.openai.base_url),
                model: env_or("OPENAI_MODEL", &defaults.openai.model),
            },
            server_port: env_parse("PORT", defaults.server_port),
            environment: env_or("APP_ENV", &defaults.environment),
            files: FileOptions {
                max_file_size: env_parse::<u64>("MAX_FILE_SIZE", 10) * 1024 * 1024,
                upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
                temp_dir: PathBuf::from(env_or("TEMP_DIR", "temp")),
                output_dir: PathBuf::from(env_or("OUTPUT_DIR", "outputs")),
                data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
            },
            tasks: TaskOptions {
                max_concurrent_tasks: env_parse(
                    "MAX_CONCURRENT_TASKS",
                    defaults.tasks.max_concurrent_tasks,
                ),
                max_retry_count: env_parse("MAX_RETRY_COUNT", defaults.tasks.max_retry_count),
                max_concurrent_translations: env_parse(
                    "MAX_CONCURRENT_TRANSLATIONS",
                    defaults.tasks.max_concurrent_translations,
                ),
                task_expiry_hours: env_parse(
                    "TASK_EXPIRY_HOURS",
                    defaults.tasks.task_expiry_hours,
                ),
                cleanup_interval_secs: env_parse(
                    "CLEANUP_INTERVAL_SECS",
                    defaults.tasks.cleanup_interval_secs,
                ),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.files.data_dir.join("tasks")
    }

    /// Validate credentials and URL shape, and create the working
    /// directories. Called once at startup.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.openai.api_key.trim().is_empty() {
            return Err(ServiceError::Validation(
                "OPENAI_API_KEY is not set; configure it in the environment or .env".into(),
            ));
        }

        if !self.openai.base_url.starts_with("http") {
            return Err(ServiceError::Validation(format!(
                "invalid OPENAI_BASE_URL: {} (must start with http or https)",
                self.openai.base_url
            )));
        }

        if self.tasks.max_concurrent_tasks == 0 || self.tasks.max_concurrent_translations == 0 {
            return Err(ServiceError::Validation(
                "concurrency limits must be at least 1".into(),
            ));
        }

        for dir in [
            self.files.upload_dir.clone(),
            self.files.temp_dir.clone(),
            self.files.output_dir.clone(),
            self.tasks_dir(),
        ] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                info!("created directory {}", dir.display());
            }
        }

        if self.openai.model.trim().is_empty() {
            warn!("OPENAI_MODEL is empty; requests will be rejected upstream");
        }

        info!(
            "translation API: url={} model={}",
            self.openai.base_url, self.openai.model
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.tasks.max_concurrent_tasks, 3);
        assert_eq!(config.tasks.max_retry_count, 3);
        assert_eq!(config.tasks.max_concurrent_translations, 5);
        assert_eq!(config.files.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.tasks_dir(), PathBuf::from("data/tasks"));
        assert!(!config.is_production());
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn bad_base_url_fails_validation() {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".into();
        config.openai.base_url = "ftp://nowhere".into();
        assert!(matches!(config.validate(), Err(ServiceError::Validation(_))));
    }
}

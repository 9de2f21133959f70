/// Bounded-concurrency execution of a task's translation units. Identical
/// unit text is deduplicated ahead of the calls and the one result fans out
/// to every matching position, so completion order never affects placement.
use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};

use crate::client::{TranslateRequest, Translator};
use crate::error::{ServiceError, ServiceResult};
use crate::task::{DocumentFormat, TranslationOptions, TranslationUnit, UnitStatus};

pub const DEFAULT_MAX_CONCURRENT_TRANSLATIONS: usize = 5;
/// Pause between concurrency windows, a coarse brake for upstream rate
/// limits.
pub const WINDOW_DELAY: Duration = Duration::from_millis(500);

/// Failed units in tolerant formats are replaced with this marker around
/// the original text instead of failing the task.
pub const FAILURE_PLACEHOLDER_PREFIX: &str = "[translation failed]";

/// Observer for progress percentages. The pipeline hands progress to the
/// caller through this seam only; the traversal code stays pure over its
/// data.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

/// Sink that ignores everything; used where progress has no consumer.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _percent: u8) {}
}

/// A fixed percentage band owned by one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageBand {
    pub start: u8,
    pub end: u8,
}

pub const DECODE_BAND: StageBand = StageBand { start: 0, end: 20 };
pub const TRANSLATE_BAND: StageBand = StageBand { start: 20, end: 90 };
pub const ENCODE_BAND: StageBand = StageBand { start: 90, end: 100 };

impl StageBand {
    /// Map `done/total` into this band. A zero total maps to the band end.
    pub fn at(&self, done: usize, total: usize) -> u8 {
        if total == 0 || done >= total {
            return self.end;
        }
        let span = (self.end - self.start) as usize;
        self.start + ((done * span) / total) as u8
    }
}

pub struct BatchExecutor {
    max_concurrent: usize,
    window_delay: Duration,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_TRANSLATIONS,
            window_delay: WINDOW_DELAY,
        }
    }
}

impl BatchExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            window_delay: WINDOW_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_window_delay(mut self, delay: Duration) -> Self {
        self.window_delay = delay;
        self
    }

    /// Translate every unit in place. For sequential-prose formats the
    /// first failure aborts the batch; tabular/JSON formats substitute a
    /// placeholder and continue.
    pub async fn execute(
        &self,
        translator: &dyn Translator,
        format: DocumentFormat,
        options: &TranslationOptions,
        units: &mut [TranslationUnit],
        sink: &dyn ProgressSink,
    ) -> ServiceResult<()> {
        if units.is_empty() {
            sink.report(TRANSLATE_BAND.end);
            return Ok(());
        }

        let groups = dedup_groups(format, units);
        let total_units = units.len();
        let mut processed_units = 0usize;

        debug!(
            "translating {} units ({} unique) for {:?}",
            total_units,
            groups.len(),
            format
        );

        for (window_index, window) in groups.chunks(self.max_concurrent).enumerate() {
            if window_index > 0 && !self.window_delay.is_zero() {
                tokio::time::sleep(self.window_delay).await;
            }

            let calls = window.iter().map(|group| {
                let request = TranslateRequest {
                    text: units[group.representative].source_text.clone(),
                    target_language: options.target_language.clone(),
                    source_language: options.source_language.clone(),
                    preserve_formatting: options.preserve_formatting,
                    format: Some(format),
                };
                async move { translator.translate(&request).await }
            });

            let results = join_all(calls).await;

            for (group, result) in window.iter().zip(results) {
                match result {
                    Ok(translated) => {
                        for &index in &group.members {
                            units[index].translated_text = Some(translated.clone());
                            units[index].status = UnitStatus::Done;
                        }
                    }
                    Err(error) if format.fails_fast() => {
                        warn!("unit translation failed, aborting attempt: {}", error);
                        return Err(error);
                    }
                    Err(error) => {
                        warn!(
                            "unit translation failed, substituting placeholder: {}",
                            error
                        );
                        if matches!(error, ServiceError::Auth(_)) {
                            // A rejected credential fails every remaining
                            // call too; stop burning requests.
                            return Err(error);
                        }
                        for &index in &group.members {
                            units[index].translated_text = Some(format!(
                                "{} {}",
                                FAILURE_PLACEHOLDER_PREFIX, units[index].source_text
                            ));
                            units[index].status = UnitStatus::Failed;
                        }
                    }
                }
                processed_units += group.members.len();
            }

            sink.report(TRANSLATE_BAND.at(processed_units, total_units));
        }

        Ok(())
    }
}

struct DedupGroup {
    representative: usize,
    members: Vec<usize>,
}

/// Group unit indices by deduplication key. Tabular formats normalize the
/// text (trim, collapse whitespace, case-fold) so matching cells cost one
/// call; other formats deduplicate on exact text.
fn dedup_groups(format: DocumentFormat, units: &[TranslationUnit]) -> Vec<DedupGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();

    for (index, unit) in units.iter().enumerate() {
        let key = match format {
            DocumentFormat::Csv | DocumentFormat::Excel => {
                crate::formats::table::normalize_cell_text(&unit.source_text)
            }
            _ => unit.source_text.clone(),
        };

        let entry = by_key.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(index);
    }

    order
        .into_iter()
        .map(|key| {
            let members = by_key.remove(&key).unwrap_or_default();
            DedupGroup {
                representative: members[0],
                members,
            }
        })
        .collect()
}

// batch.rs - Sequential multi-file processing

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::codec::ProcessedResult;
use crate::intake::{display_name, SourceImage};
use crate::orchestrator::Orchestrator;
use crate::resize::ResizePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    Completed,
    /// Stopped between items; unattempted items have no outcome.
    Cancelled,
}

/// Lifecycle of one item inside a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Decoding,
    Dispatched,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded(ProcessedResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub file_name: String,
    pub outcome: ItemOutcome,
}

impl BatchItem {
    pub fn result(&self) -> Option<&ProcessedResult> {
        match &self.outcome {
            ItemOutcome::Succeeded(result) => Some(result),
            ItemOutcome::Failed(_) => None,
        }
    }
}

/// Shared stop request, honoured only between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchState {
    pub total: usize,
    /// Index of the item being processed, or of the next one to start.
    pub current: usize,
    pub cancelled: bool,
    pub status: BatchStatus,
    pub items: Vec<BatchItem>,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ProcessedResult> {
        self.items.iter().filter_map(BatchItem::result)
    }

    pub fn totals(&self) -> BatchTotals {
        BatchTotals::from_items(&self.items)
    }
}

/// Aggregates shown in the batch summary. Failed items count toward
/// `failed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchTotals {
    pub original_bytes: u64,
    /// Sum of the lightest output per item.
    pub optimized_bytes: u64,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchTotals {
    pub fn from_items(items: &[BatchItem]) -> Self {
        items.iter().fold(Self::default(), |mut totals, item| {
            match &item.outcome {
                ItemOutcome::Succeeded(result) => {
                    totals.original_bytes += result.original.size;
                    totals.optimized_bytes += result.best_output_size();
                    totals.succeeded += 1;
                }
                ItemOutcome::Failed(_) => totals.failed += 1,
            }
            totals
        })
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    ItemStarted { index: usize, file_name: String },
    ItemPhase { index: usize, phase: ItemPhase },
    Progress { index: usize, label: String },
    ItemFinished { index: usize, item: BatchItem },
}

/// Processes `paths` one at a time, in order.
///
/// Each file is read, measured and sent through the worker on its own; a
/// failure is recorded and the loop moves on. `cancel` is checked before
/// each item.
pub async fn run_batch<F>(
    orchestrator: &Orchestrator,
    paths: &[PathBuf],
    policy: ResizePolicy,
    cancel: &CancelFlag,
    mut observer: F,
) -> BatchState
where
    F: FnMut(BatchEvent),
{
    let mut state = BatchState::new(paths.len());
    state.status = BatchStatus::Running;
    log::info!("Batch started: {} files at {}", paths.len(), policy);

    for (index, path) in paths.iter().enumerate() {
        state.current = index;
        if cancel.is_cancelled() {
            state.cancelled = true;
            break;
        }

        let file_name = display_name(path);
        observer(BatchEvent::ItemStarted {
            index,
            file_name: file_name.clone(),
        });
        observer(BatchEvent::ItemPhase {
            index,
            phase: ItemPhase::Decoding,
        });

        let outcome = match SourceImage::load(path).await {
            Ok(source) => {
                observer(BatchEvent::ItemPhase {
                    index,
                    phase: ItemPhase::Dispatched,
                });
                orchestrator
                    .process(&source, policy, |label| {
                        observer(BatchEvent::Progress {
                            index,
                            label: label.to_string(),
                        })
                    })
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        let (phase, outcome) = match outcome {
            Ok(result) => (ItemPhase::Succeeded, ItemOutcome::Succeeded(result)),
            Err(message) => {
                log::warn!("{} failed: {}", file_name, message);
                (ItemPhase::Failed, ItemOutcome::Failed(message))
            }
        };
        let item = BatchItem { file_name, outcome };

        observer(BatchEvent::ItemPhase { index, phase });
        observer(BatchEvent::ItemFinished {
            index,
            item: item.clone(),
        });
        state.items.push(item);
        state.current = index + 1;
    }

    state.status = if state.cancelled {
        BatchStatus::Cancelled
    } else {
        BatchStatus::Completed
    };

    let totals = state.totals();
    log::info!(
        "Batch {:?}: {}/{} succeeded, {} -> {} bytes",
        state.status,
        totals.succeeded,
        state.total,
        totals.original_bytes,
        totals.optimized_bytes
    );
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ImageMeta, Variant};
    use crate::mime::MimeType;

    fn result(original: u64, primary: usize, webp: Option<usize>) -> ProcessedResult {
        ProcessedResult {
            file_name: "x.jpg".into(),
            original: ImageMeta {
                size: original,
                width: 10,
                height: 10,
                mime: MimeType::jpeg(),
            },
            processed: ImageMeta {
                size: primary as u64,
                width: 10,
                height: 10,
                mime: MimeType::jpeg(),
            },
            primary: Variant::new(vec![0; primary], MimeType::jpeg()),
            webp: webp.map(|size| Variant::new(vec![0; size], MimeType::webp())),
        }
    }

    fn item(outcome: ItemOutcome) -> BatchItem {
        BatchItem {
            file_name: "x.jpg".into(),
            outcome,
        }
    }

    #[test]
    fn totals_take_lightest_output_and_skip_failures() {
        let items = vec![
            item(ItemOutcome::Succeeded(result(1000, 400, Some(300)))),
            item(ItemOutcome::Failed("broken".into())),
            item(ItemOutcome::Succeeded(result(500, 200, None))),
            item(ItemOutcome::Succeeded(result(100, 90, Some(120)))),
        ];
        let totals = BatchTotals::from_items(&items);

        assert_eq!(totals.original_bytes, 1600);
        assert_eq!(totals.optimized_bytes, 300 + 200 + 90);
        assert_eq!(totals.succeeded, 3);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.attempted(), 4);
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}

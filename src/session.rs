// session.rs - Application state behind the window
//
// Holds the one active submission, the current resize and display choices,
// and the status line. Rendering reads from here; nothing here touches the
// GUI toolkit.

use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::{BatchItem, BatchState, BatchStatus, CancelFlag};
use crate::codec::{ProcessedResult, Variant};
use crate::error::SaveError;
use crate::intake::SourceImage;
use crate::mime;
use crate::resize::ResizePolicy;

/// Which output is shown and downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayFormat {
    #[default]
    Primary,
    WebP,
}

impl DisplayFormat {
    /// The chosen variant of `result`, falling back to primary when no WebP
    /// was produced.
    pub fn variant_of(self, result: &ProcessedResult) -> &Variant {
        match (self, &result.webp) {
            (Self::WebP, Some(webp)) => webp,
            _ => &result.primary,
        }
    }
}

impl std::fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "Same format"),
            Self::WebP => write!(f, "WebP"),
        }
    }
}

/// One row of the single-image download table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Original,
    Primary,
    WebP,
}

impl VariantKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Original => "Original",
            Self::Primary => "Compressed",
            Self::WebP => "WebP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRow {
    pub kind: VariantKind,
    pub file_name: String,
    pub size: u64,
    pub best: bool,
}

/// Download table for a single result; the smallest non-empty row is
/// flagged best.
pub fn download_rows(source: &SourceImage, result: &ProcessedResult) -> Vec<DownloadRow> {
    let mut rows = vec![
        DownloadRow {
            kind: VariantKind::Original,
            file_name: result.file_name.clone(),
            size: source.size(),
            best: false,
        },
        DownloadRow {
            kind: VariantKind::Primary,
            file_name: mime::derive_file_name(&result.file_name, &result.primary.mime),
            size: result.primary.size(),
            best: false,
        },
    ];
    if let Some(webp) = &result.webp {
        rows.push(DownloadRow {
            kind: VariantKind::WebP,
            file_name: mime::derive_file_name(&result.file_name, &webp.mime),
            size: webp.size(),
            best: false,
        });
    }

    let best = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.size > 0)
        .min_by_key(|(_, row)| row.size)
        .map(|(i, _)| i);
    if let Some(i) = best {
        rows[i].best = true;
    }
    rows
}

/// Writes one variant into `dir` under its download name.
pub fn save_variant(
    dir: &Path,
    source: &SourceImage,
    result: &ProcessedResult,
    kind: VariantKind,
) -> Result<PathBuf, SaveError> {
    let (file_name, bytes) = match kind {
        VariantKind::Original => (source.file_name.clone(), &source.bytes),
        VariantKind::Primary => (
            mime::derive_file_name(&result.file_name, &result.primary.mime),
            &result.primary.bytes,
        ),
        VariantKind::WebP => {
            let webp = result
                .webp
                .as_ref()
                .ok_or(SaveError::MissingVariant("WebP"))?;
            (mime::derive_file_name(&result.file_name, &webp.mime), &webp.bytes)
        }
    };
    write_into(dir, &file_name, bytes)
}

/// Writes `bytes` to `dir/file_name`, creating `dir` first.
pub fn write_into(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, SaveError> {
    fs::create_dir_all(dir).map_err(|source| SaveError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(file_name);
    fs::write(&path, bytes).map_err(|source| SaveError::Write {
        path: path.clone(),
        source,
    })?;
    log::info!("Saved {}", path.display());
    Ok(path)
}

/// Single-image submission and its latest result.
#[derive(Debug, Clone)]
pub struct SingleSession {
    pub source: SourceImage,
    pub result: Option<ProcessedResult>,
}

/// Multi-file submission. The paths are kept so the batch can be replayed
/// when the resize choice changes.
#[derive(Debug, Clone)]
pub struct BatchSession {
    pub paths: Vec<PathBuf>,
    pub state: BatchState,
    pub cancel: CancelFlag,
}

#[derive(Debug, Clone)]
pub enum ActiveSubmission {
    /// A single file is being read; no source yet.
    Loading,
    Single(SingleSession),
    Batch(BatchSession),
}

/// Counts submissions. Every asynchronous reply carries the generation it
/// was started under and is dropped once a newer submission exists.
pub type Generation = u64;

/// A batch run that has just been started.
#[derive(Debug, Clone)]
pub struct BatchLaunch {
    pub generation: Generation,
    pub paths: Vec<PathBuf>,
    pub cancel: CancelFlag,
}

/// The one explicit state struct the window renders from.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub policy: ResizePolicy,
    pub format: DisplayFormat,
    pub active: Option<ActiveSubmission>,
    pub status: String,
    pub busy: bool,
    generation: Generation,
}

impl AppState {
    pub fn new(policy: ResizePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    fn is_current(&self, generation: Generation) -> bool {
        if generation != self.generation {
            log::debug!(
                "Dropping reply from submission {} (current is {})",
                generation,
                self.generation
            );
            return false;
        }
        true
    }

    /// Supersedes whatever is in flight: a running batch is told to stop
    /// and every reply tagged with an older generation is ignored from now.
    fn next_generation(&mut self) -> Generation {
        if let Some(ActiveSubmission::Batch(batch)) = &self.active {
            batch.cancel.cancel();
        }
        self.generation += 1;
        self.generation
    }

    fn set_status(&mut self, status: impl Into<String>, busy: bool) {
        self.status = status.into();
        self.busy = busy;
    }

    /// Starts a single-file submission, discarding whatever was shown.
    pub fn begin_single(&mut self) -> Generation {
        let generation = self.next_generation();
        self.active = Some(ActiveSubmission::Loading);
        self.set_status("Reading file…", true);
        generation
    }

    /// Source read; a request is about to be dispatched. Returns `false`
    /// when the read belongs to a superseded submission.
    pub fn source_loaded(&mut self, generation: Generation, source: SourceImage) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.active = Some(ActiveSubmission::Single(SingleSession {
            source,
            result: None,
        }));
        self.set_status("Image loaded, compressing…", true);
        true
    }

    /// A single file could not be read. Nothing stale stays on screen.
    pub fn read_failed(&mut self, generation: Generation, message: &str) {
        if !self.is_current(generation) {
            return;
        }
        log::warn!("Read failed: {}", message);
        if matches!(self.active, Some(ActiveSubmission::Loading)) {
            self.active = None;
        }
        self.set_status(format!("Read failed: {}", message), false);
    }

    /// Re-running the single source with the current policy. The previous
    /// result stays visible until the new one arrives; replies to earlier
    /// runs are ignored.
    pub fn begin_reprocess(&mut self) -> Option<(Generation, SourceImage)> {
        let source = match &self.active {
            Some(ActiveSubmission::Single(single)) => single.source.clone(),
            _ => return None,
        };
        let generation = self.next_generation();
        self.set_status("Preparing…", true);
        Some((generation, source))
    }

    /// Informational status that does not change the busy flag.
    pub fn notice(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    pub fn progress(&mut self, generation: Generation, label: &str) {
        if self.is_current(generation) {
            self.set_status(label, true);
        }
    }

    /// Stores the result of the current single request, replacing (and
    /// releasing) the previous one.
    pub fn single_finished(
        &mut self,
        generation: Generation,
        outcome: Result<ProcessedResult, String>,
    ) {
        if !self.is_current(generation) {
            return;
        }
        let Some(ActiveSubmission::Single(single)) = &mut self.active else {
            return;
        };
        match outcome {
            Ok(result) => {
                single.result = Some(result);
                self.set_status("Compression done", false);
            }
            Err(message) => {
                self.set_status(format!("Worker error: {}", message), false);
            }
        }
    }

    /// Starts a batch over `paths`, discarding whatever was shown.
    pub fn begin_batch(&mut self, paths: Vec<PathBuf>) -> BatchLaunch {
        let generation = self.next_generation();
        let cancel = CancelFlag::new();
        let mut state = BatchState::new(paths.len());
        state.status = BatchStatus::Running;
        self.active = Some(ActiveSubmission::Batch(BatchSession {
            paths: paths.clone(),
            state,
            cancel: cancel.clone(),
        }));
        self.set_status(format!("Processing {} images…", paths.len()), true);
        BatchLaunch {
            generation,
            paths,
            cancel,
        }
    }

    /// Restarts the retained batch with the current policy. A run still in
    /// progress is cancelled and its remaining replies are ignored.
    pub fn begin_batch_replay(&mut self) -> Option<BatchLaunch> {
        let paths = match &self.active {
            Some(ActiveSubmission::Batch(batch)) => batch.paths.clone(),
            _ => return None,
        };
        Some(self.begin_batch(paths))
    }

    pub fn batch_item_started(&mut self, generation: Generation, index: usize, file_name: &str) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(ActiveSubmission::Batch(batch)) = &mut self.active {
            batch.state.current = index;
            let status = format!("{}/{}: {}", index + 1, batch.state.total, file_name);
            self.set_status(status, true);
        }
    }

    /// Ignored once the batch has settled; the final state arrives whole.
    pub fn batch_item_finished(&mut self, generation: Generation, item: BatchItem) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(ActiveSubmission::Batch(batch)) = &mut self.active {
            if batch.state.status != BatchStatus::Running {
                return;
            }
            batch.state.items.push(item);
            batch.state.current = batch.state.items.len();
        }
    }

    /// Final state from the loop replaces the incrementally built one.
    pub fn batch_finished(&mut self, generation: Generation, state: BatchState) {
        if !self.is_current(generation) {
            return;
        }
        let Some(ActiveSubmission::Batch(batch)) = &mut self.active else {
            return;
        };
        let totals = state.totals();
        let status = match state.status {
            BatchStatus::Cancelled => format!(
                "Cancelled after {} of {} images",
                totals.attempted(),
                state.total
            ),
            _ => format!("{}/{} images compressed", totals.succeeded, state.total),
        };
        batch.state = state;
        self.set_status(status, false);
    }

    pub fn cancel_batch(&mut self) {
        if let Some(ActiveSubmission::Batch(batch)) = &self.active {
            if batch.state.status != BatchStatus::Running {
                return;
            }
            batch.cancel.cancel();
            self.set_status("Cancelling after the current image…", true);
        }
    }

    /// Display toggle; never triggers reprocessing.
    pub fn select_format(&mut self, format: DisplayFormat) {
        self.format = format;
    }

    pub fn has_results(&self) -> bool {
        match &self.active {
            Some(ActiveSubmission::Single(single)) => single.result.is_some(),
            Some(ActiveSubmission::Batch(batch)) => batch.state.succeeded().next().is_some(),
            _ => false,
        }
    }

    pub fn batch(&self) -> Option<&BatchSession> {
        match &self.active {
            Some(ActiveSubmission::Batch(batch)) => Some(batch),
            _ => None,
        }
    }

    pub fn single(&self) -> Option<&SingleSession> {
        match &self.active {
            Some(ActiveSubmission::Single(single)) => Some(single),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.next_generation();
        self.active = None;
        self.set_status("", false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ItemOutcome;
    use crate::codec::ImageMeta;
    use crate::mime::MimeType;

    fn source(name: &str) -> SourceImage {
        SourceImage {
            bytes: vec![0u8; 1000].into(),
            mime: MimeType::jpeg(),
            width: 100,
            height: 100,
            file_name: name.into(),
        }
    }

    fn result(name: &str, primary: usize, webp: Option<usize>) -> ProcessedResult {
        let meta = |size| ImageMeta {
            size,
            width: 50,
            height: 50,
            mime: MimeType::jpeg(),
        };
        ProcessedResult {
            file_name: name.into(),
            original: meta(1000),
            processed: meta(primary as u64),
            primary: Variant::new(vec![1; primary], MimeType::jpeg()),
            webp: webp.map(|n| Variant::new(vec![2; n], MimeType::webp())),
        }
    }

    fn item(name: &str) -> BatchItem {
        BatchItem {
            file_name: name.into(),
            outcome: ItemOutcome::Succeeded(result(name, 400, None)),
        }
    }

    fn finished(names: &[&str]) -> BatchState {
        let mut state = BatchState::new(names.len());
        state.status = BatchStatus::Completed;
        state.items = names.iter().map(|n| item(n)).collect();
        state
    }

    fn item_names(state: &AppState) -> Vec<String> {
        let batch = state.batch().unwrap();
        batch.state.items.iter().map(|i| i.file_name.clone()).collect()
    }

    #[test]
    fn new_submission_replaces_previous_results() {
        let mut state = AppState::new(ResizePolicy::MaxSide(1200));
        let generation = state.begin_single();
        assert!(state.source_loaded(generation, source("a.jpg")));
        state.single_finished(generation, Ok(result("a.jpg", 400, None)));
        assert!(state.has_results());

        state.begin_batch(vec!["x.png".into(), "y.png".into()]);
        assert!(!state.has_results());
        assert!(state.single().is_none());

        state.begin_single();
        assert!(state.batch().is_none());
        assert!(state.busy);
    }

    #[test]
    fn replies_from_a_replaced_batch_are_dropped() {
        let mut state = AppState::default();
        let old = state.begin_batch(vec!["old1.png".into(), "old2.png".into()]);
        let new = state.begin_batch(vec!["new1.png".into(), "new2.png".into(), "new3.png".into()]);
        assert!(old.cancel.is_cancelled(), "the replaced run is told to stop");
        assert!(!new.cancel.is_cancelled());

        state.batch_item_started(old.generation, 0, "old1.png");
        state.batch_item_finished(old.generation, item("old1.png"));
        assert!(item_names(&state).is_empty());

        state.batch_item_finished(new.generation, item("new1.png"));
        state.batch_finished(old.generation, finished(&["old1.png", "old2.png"]));
        assert_eq!(item_names(&state), ["new1.png"]);
        assert_eq!(state.batch().unwrap().state.status, BatchStatus::Running);
        assert!(state.busy);

        state.batch_finished(new.generation, finished(&["new1.png", "new2.png", "new3.png"]));
        assert_eq!(item_names(&state), ["new1.png", "new2.png", "new3.png"]);
        assert_eq!(state.status, "3/3 images compressed");
        assert!(!state.busy);
    }

    #[test]
    fn late_read_does_not_replace_a_running_batch() {
        let mut state = AppState::default();
        let single = state.begin_single();
        let batch = state.begin_batch(vec!["a.png".into(), "b.png".into()]);

        assert!(!state.source_loaded(single, source("late.jpg")));
        state.read_failed(single, "gone");
        state.progress(single, "encoding");

        assert!(state.batch().is_some());
        assert_eq!(state.status, "Processing 2 images…");

        state.batch_finished(batch.generation, finished(&["a.png", "b.png"]));
        assert!(state.has_results());
    }

    #[test]
    fn result_for_a_replaced_source_with_the_same_name_is_dropped() {
        let mut state = AppState::default();
        let first = state.begin_single();
        assert!(state.source_loaded(first, source("photo.jpg")));

        let second = state.begin_single();
        assert!(state.source_loaded(second, source("photo.jpg")));
        state.single_finished(first, Ok(result("photo.jpg", 111, None)));
        assert!(!state.has_results());
        assert!(state.busy);

        state.single_finished(second, Ok(result("photo.jpg", 222, None)));
        let shown = state.single().unwrap().result.as_ref().unwrap();
        assert_eq!(shown.primary.size(), 222);
    }

    #[test]
    fn leftover_batch_progress_does_not_touch_a_finished_single() {
        let mut state = AppState::default();
        let batch = state.begin_batch(vec!["a.png".into(), "b.png".into(), "c.png".into()]);
        let single = state.begin_single();
        state.source_loaded(single, source("a.jpg"));
        state.single_finished(single, Ok(result("a.jpg", 400, None)));

        state.progress(batch.generation, "3: encoding");
        assert_eq!(state.status, "Compression done");
        assert!(!state.busy);
    }

    #[test]
    fn reprocess_drops_replies_from_the_earlier_run() {
        let mut state = AppState::default();
        let first = state.begin_single();
        state.source_loaded(first, source("a.jpg"));

        let (second, source_again) = state.begin_reprocess().unwrap();
        assert_eq!(source_again.file_name, "a.jpg");
        state.single_finished(first, Ok(result("a.jpg", 999, None)));
        assert!(!state.has_results());

        state.single_finished(second, Ok(result("a.jpg", 400, None)));
        assert!(state.has_results());
    }

    #[test]
    fn worker_error_keeps_last_good_result() {
        let mut state = AppState::default();
        let first = state.begin_single();
        state.source_loaded(first, source("a.jpg"));
        state.single_finished(first, Ok(result("a.jpg", 400, None)));
        let (second, _) = state.begin_reprocess().unwrap();
        state.single_finished(second, Err("boom".into()));

        assert!(state.has_results());
        assert_eq!(state.status, "Worker error: boom");
        assert!(!state.busy);
    }

    #[test]
    fn format_toggle_falls_back_to_primary() {
        let with_webp = result("a.jpg", 400, Some(300));
        let without = result("b.jpg", 400, None);
        assert_eq!(DisplayFormat::WebP.variant_of(&with_webp).mime, MimeType::webp());
        assert_eq!(DisplayFormat::WebP.variant_of(&without).mime, MimeType::jpeg());
        assert_eq!(DisplayFormat::Primary.variant_of(&with_webp).mime, MimeType::jpeg());
    }

    #[test]
    fn smallest_download_is_best() {
        let rows = download_rows(&source("photo.jpeg"), &result("photo.jpeg", 400, Some(300)));
        let names: Vec<&str> = rows.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, ["photo.jpeg", "photo.jpg", "photo.webp"]);
        assert_eq!(rows.iter().filter(|r| r.best).count(), 1);
        assert!(rows[2].best);
    }

    #[test]
    fn batch_replay_uses_retained_paths() {
        let mut state = AppState::default();
        let first = state.begin_batch(vec!["a.png".into(), "b.png".into()]);
        state.batch_finished(first.generation, finished(&["a.png"]));

        let replay = state.begin_batch_replay().unwrap();
        assert_eq!(replay.paths, first.paths);
        assert!(replay.generation > first.generation);
        assert!(state.batch().unwrap().state.items.is_empty());
    }

    #[test]
    fn replay_while_running_restarts_the_batch() {
        let mut state = AppState::default();
        let running = state.begin_batch(vec!["a.png".into(), "b.png".into()]);
        state.batch_item_finished(running.generation, item("a.png"));

        let replay = state.begin_batch_replay().unwrap();
        assert!(running.cancel.is_cancelled());
        assert!(item_names(&state).is_empty());

        state.batch_finished(running.generation, finished(&["a.png"]));
        assert_eq!(state.batch().unwrap().state.status, BatchStatus::Running);
        state.batch_finished(replay.generation, finished(&["a.png", "b.png"]));
        assert_eq!(item_names(&state), ["a.png", "b.png"]);
    }

    #[test]
    fn clear_drops_in_flight_replies() {
        let mut state = AppState::default();
        let single = state.begin_single();
        state.source_loaded(single, source("a.jpg"));
        state.clear();

        state.single_finished(single, Ok(result("a.jpg", 400, None)));
        assert!(state.active.is_none());
        assert!(!state.busy);
    }

    #[test]
    fn save_writes_download_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = source("photo.jpeg");
        let res = result("photo.jpeg", 4, Some(3));

        let path = save_variant(dir.path(), &src, &res, VariantKind::WebP).unwrap();
        assert_eq!(path.file_name().unwrap(), "photo.webp");
        assert_eq!(fs::read(&path).unwrap(), vec![2; 3]);

        let no_webp = result("photo.jpeg", 4, None);
        assert!(matches!(
            save_variant(dir.path(), &src, &no_webp, VariantKind::WebP),
            Err(SaveError::MissingVariant(_))
        ));
    }
}

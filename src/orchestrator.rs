// orchestrator.rs - Turning a source image into a worker request

use crate::codec::{EncodeOptions, ProcessedResult};
use crate::config::Settings;
use crate::error::CodecError;
use crate::intake::SourceImage;
use crate::resize::ResizePolicy;
use crate::worker::CodecWorker;

/// Foreground side of the codec worker: builds requests and awaits them.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    worker: CodecWorker,
    quality: f32,
    export_webp: bool,
}

impl Orchestrator {
    pub fn new(worker: CodecWorker, settings: &Settings) -> Self {
        Self {
            worker,
            quality: settings.quality,
            export_webp: settings.export_webp,
        }
    }

    pub fn worker(&self) -> &CodecWorker {
        &self.worker
    }

    /// Fresh options for one request against `source`.
    pub fn encode_options(&self, source: &SourceImage, policy: ResizePolicy) -> EncodeOptions {
        let (target_width, target_height) = policy.target_dimensions(source.width, source.height);
        EncodeOptions {
            quality: self.quality,
            target_width,
            target_height,
            export_webp: self.export_webp,
            original_mime: source.mime.clone(),
            file_name: source.file_name.clone(),
        }
    }

    /// One decode → resize → encode round trip on the worker.
    pub async fn process<P>(
        &self,
        source: &SourceImage,
        policy: ResizePolicy,
        on_progress: P,
    ) -> Result<ProcessedResult, CodecError>
    where
        P: FnMut(&str),
    {
        let options = self.encode_options(source, policy);
        log::info!(
            "Processing {} ({}x{} -> {}x{})",
            source.file_name,
            source.width,
            source.height,
            options.target_width,
            options.target_height
        );
        self.worker
            .process(source.bytes.clone(), options, on_progress)
            .await
    }
}

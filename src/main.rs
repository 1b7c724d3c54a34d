// Image Squeezer - pick or drop images, compare and download lighter versions
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use iced::font::{Family, Weight};
use iced::widget::image::{Handle, Image};
use iced::widget::{button, column, container, progress_bar, radio, row, scrollable, text, Space};
use iced::{executor, Application, Command, Element, Event, Font, Length, Subscription, Theme};

use image_squeezer::archive;
use image_squeezer::batch::{self, BatchEvent, BatchState, BatchStatus, ItemOutcome};
use image_squeezer::codec::ProcessedResult;
use image_squeezer::config::Settings;
use image_squeezer::intake::{self, SourceImage, Submission};
use image_squeezer::metrics::{self, GainLabel, ResultMetrics};
use image_squeezer::session::{
    self, ActiveSubmission, AppState, BatchLaunch, DisplayFormat, Generation, VariantKind,
};
use image_squeezer::{CodecWorker, Orchestrator, ResizePolicy};

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const ZIP_NAME: &str = "compressed-images.zip";

// Drop events arrive one file at a time; wait this long for the rest.
const DROP_SETTLE: Duration = Duration::from_millis(150);

pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env().unwrap_or_else(|e| {
        log::error!("Ignoring invalid settings: {}", e);
        Settings::default()
    });

    ImageSqueezer::run(iced::Settings {
        flags: settings,
        window: iced::window::Settings {
            size: (760, 820),
            min_size: Some((560, 600)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        ..Default::default()
    })
}

/// Updates produced off the UI thread, drained on every tick.
enum UiEvent {
    Progress(Generation, String),
    Batch(Generation, BatchEvent),
}

#[derive(Default)]
struct Previews {
    original: Option<Handle>,
    processed: Option<Handle>,
}

struct ImageSqueezer {
    settings: Settings,
    orchestrator: Orchestrator,
    state: AppState,
    previews: Previews,
    events_tx: mpsc::Sender<UiEvent>,
    events_rx: mpsc::Receiver<UiEvent>,
    dropped: Vec<PathBuf>,
    exporting: bool,
}

#[derive(Debug, Clone)]
enum Message {
    SelectFiles,
    SelectFolder,
    FilesSelected(Vec<PathBuf>),
    FileDropped(PathBuf),
    DropSettled,
    LoadSample,
    SourceLoaded(Generation, Result<SourceImage, String>),
    SingleFinished(Generation, Result<ProcessedResult, String>),
    BatchFinished(Generation, BatchState),
    PolicyChanged(ResizePolicy),
    FormatChanged(DisplayFormat),
    CancelBatch,
    Save(VariantKind),
    ExportZip,
    ZipExported(Result<PathBuf, String>),
    OpenOutputFolder,
    ClearResults,
    Tick,
    Noop,
}

impl Application for ImageSqueezer {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = Settings;

    fn new(settings: Settings) -> (Self, Command<Message>) {
        let worker = CodecWorker::with_codec(image_squeezer::codec::NativeCodec::new(
            settings.resize_filter,
        ));
        let orchestrator = Orchestrator::new(worker, &settings);
        let (events_tx, events_rx) = mpsc::channel();
        let app = Self {
            state: AppState::new(settings.default_policy),
            settings,
            orchestrator,
            previews: Previews::default(),
            events_tx,
            events_rx,
            dropped: Vec::new(),
            exporting: false,
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("Image Squeezer")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::SelectFiles => {
                return Command::perform(select_files(), Message::FilesSelected);
            }
            Message::SelectFolder => {
                return Command::perform(select_folder(), Message::FilesSelected);
            }
            Message::FilesSelected(paths) => {
                return self.submit(paths);
            }
            Message::FileDropped(path) => {
                let first = self.dropped.is_empty();
                self.dropped.push(path);
                if first {
                    return Command::perform(tokio::time::sleep(DROP_SETTLE), |_| {
                        Message::DropSettled
                    });
                }
            }
            Message::DropSettled => {
                let paths = std::mem::take(&mut self.dropped);
                return self.submit(paths);
            }
            Message::LoadSample => {
                self.start_submission();
                let generation = self.state.begin_single();
                self.state.notice("Loading the sample…");
                let path = self.settings.sample_path.clone();
                return Command::perform(
                    async move { intake::load_sample(&path).await.map_err(|e| e.to_string()) },
                    move |loaded| Message::SourceLoaded(generation, loaded),
                );
            }
            Message::SourceLoaded(generation, Ok(source)) => {
                if self.state.source_loaded(generation, source.clone()) {
                    self.previews.original = Some(Handle::from_memory(source.bytes.to_vec()));
                    return self.dispatch_single(generation, source);
                }
            }
            Message::SourceLoaded(generation, Err(message)) => {
                self.state.read_failed(generation, &message);
            }
            Message::SingleFinished(generation, outcome) => {
                self.drain_events();
                self.state.single_finished(generation, outcome);
                self.refresh_processed_preview();
            }
            Message::BatchFinished(generation, state) => {
                self.drain_events();
                self.state.batch_finished(generation, state);
            }
            Message::PolicyChanged(policy) => {
                self.state.policy = policy;
                if let Some((generation, source)) = self.state.begin_reprocess() {
                    return self.dispatch_single(generation, source);
                }
                self.drain_events();
                if let Some(launch) = self.state.begin_batch_replay() {
                    return self.start_batch(launch);
                }
            }
            Message::FormatChanged(format) => {
                self.state.select_format(format);
                self.refresh_processed_preview();
            }
            Message::CancelBatch => {
                self.state.cancel_batch();
            }
            Message::Save(kind) => {
                if let Some(single) = self.state.single() {
                    if let Some(result) = &single.result {
                        let saved = session::save_variant(
                            &self.settings.output_dir,
                            &single.source,
                            result,
                            kind,
                        );
                        match saved {
                            Ok(path) => self.state.notice(format!("Saved {}", path.display())),
                            Err(e) => self.state.notice(e.to_string()),
                        }
                    }
                }
            }
            Message::ExportZip => {
                if let Some(batch) = self.state.batch() {
                    self.exporting = true;
                    let items = batch.state.items.clone();
                    let format = self.state.format;
                    let output_dir = self.settings.output_dir.clone();
                    return Command::perform(export_zip(items, format, output_dir), Message::ZipExported);
                }
            }
            Message::ZipExported(Ok(path)) => {
                self.exporting = false;
                self.state.notice(format!("Saved {}", path.display()));
            }
            Message::ZipExported(Err(message)) => {
                self.exporting = false;
                log::error!("ZIP export failed: {}", message);
                return Command::perform(show_error("ZIP export failed", message), |_| {
                    Message::Noop
                });
            }
            Message::OpenOutputFolder => {
                let output_dir = &self.settings.output_dir;
                if output_dir.exists() {
                    let _ = open::that(output_dir);
                }
            }
            Message::ClearResults => {
                self.state.clear();
                self.previews = Previews::default();
            }
            Message::Tick => {
                self.drain_events();
            }
            Message::Noop => {}
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let drops = iced::subscription::events_with(|event, _status| match event {
            Event::Window(iced::window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        if self.state.busy {
            Subscription::batch(vec![
                drops,
                iced::time::every(Duration::from_millis(100)).map(|_| Message::Tick),
            ])
        } else {
            drops
        }
    }

    fn view(&self) -> Element<Message> {
        let title = text("Image Squeezer").size(22).font(HEADING_FONT);

        let intake_section = column![
            text("Select Images").size(16).font(HEADING_FONT),
            row![
                button("Select Files").on_press(Message::SelectFiles).padding([6, 12]),
                button("Select Folder").on_press(Message::SelectFolder).padding([6, 12]),
                button("Load Sample").on_press(Message::LoadSample).padding([6, 12]),
            ]
            .spacing(8),
            text("…or drop images onto the window").size(12),
        ]
        .spacing(8);

        let presets: Vec<Element<Message>> = self
            .settings
            .presets
            .iter()
            .map(|policy| {
                radio(
                    policy.to_string(),
                    *policy,
                    Some(self.state.policy),
                    Message::PolicyChanged,
                )
                .size(13)
                .spacing(8)
                .into()
            })
            .collect();

        let resize_section = column![
            text("Maximum Side").size(16).font(HEADING_FONT),
            iced::widget::Row::with_children(presets).spacing(16),
        ]
        .spacing(8);

        let format_section: Element<Message> = if self.state.has_results() {
            column![
                text("Output Format").size(16).font(HEADING_FONT),
                row![
                    radio(
                        DisplayFormat::Primary.to_string(),
                        DisplayFormat::Primary,
                        Some(self.state.format),
                        Message::FormatChanged,
                    )
                    .size(13)
                    .spacing(8),
                    radio(
                        DisplayFormat::WebP.to_string(),
                        DisplayFormat::WebP,
                        Some(self.state.format),
                        Message::FormatChanged,
                    )
                    .size(13)
                    .spacing(8),
                ]
                .spacing(16),
            ]
            .spacing(8)
            .into()
        } else {
            Space::with_height(0).into()
        };

        let status = text(&self.state.status).size(12).font(BODY_FONT);

        let results: Element<Message> = match &self.state.active {
            Some(ActiveSubmission::Single(single)) => self.view_single(single),
            Some(ActiveSubmission::Batch(batch)) => self.view_batch(batch),
            _ => Space::with_height(0).into(),
        };

        let content = column![
            title,
            Space::with_height(12),
            intake_section,
            Space::with_height(12),
            resize_section,
            Space::with_height(12),
            format_section,
            Space::with_height(8),
            status,
            Space::with_height(8),
            results,
        ]
        .padding(16);

        container(scrollable(content))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }
}

impl ImageSqueezer {
    /// Drops whatever the previous submission left behind.
    fn start_submission(&mut self) {
        self.drain_events();
        self.previews = Previews::default();
    }

    fn submit(&mut self, paths: Vec<PathBuf>) -> Command<Message> {
        let images = intake::collect_images(&paths);
        match Submission::classify(images) {
            None => {
                self.state.notice("No images found");
                Command::none()
            }
            Some(Submission::Single(path)) => {
                self.start_submission();
                let generation = self.state.begin_single();
                Command::perform(
                    async move { SourceImage::load(&path).await.map_err(|e| e.to_string()) },
                    move |loaded| Message::SourceLoaded(generation, loaded),
                )
            }
            Some(Submission::Batch(paths)) => {
                self.start_submission();
                let launch = self.state.begin_batch(paths);
                self.start_batch(launch)
            }
        }
    }

    fn dispatch_single(&self, generation: Generation, source: SourceImage) -> Command<Message> {
        let orchestrator = self.orchestrator.clone();
        let policy = self.state.policy;
        let events = self.events_tx.clone();

        Command::perform(
            async move {
                orchestrator
                    .process(&source, policy, move |label| {
                        let _ = events.send(UiEvent::Progress(generation, label.to_string()));
                    })
                    .await
                    .map_err(|e| e.to_string())
            },
            move |outcome| Message::SingleFinished(generation, outcome),
        )
    }

    fn start_batch(&self, launch: BatchLaunch) -> Command<Message> {
        let orchestrator = self.orchestrator.clone();
        let policy = self.state.policy;
        let events = self.events_tx.clone();
        let BatchLaunch {
            generation,
            paths,
            cancel,
        } = launch;

        Command::perform(
            async move {
                batch::run_batch(&orchestrator, &paths, policy, &cancel, move |event| {
                    let _ = events.send(UiEvent::Batch(generation, event));
                })
                .await
            },
            move |state| Message::BatchFinished(generation, state),
        )
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                UiEvent::Progress(generation, label) => self.state.progress(generation, &label),
                UiEvent::Batch(generation, BatchEvent::ItemStarted { index, file_name }) => {
                    self.state.batch_item_started(generation, index, &file_name)
                }
                UiEvent::Batch(generation, BatchEvent::Progress { index, label }) => self
                    .state
                    .progress(generation, &format!("{}: {}", index + 1, label)),
                UiEvent::Batch(_, BatchEvent::ItemPhase { index, phase }) => {
                    log::debug!("Item {} is {:?}", index + 1, phase)
                }
                UiEvent::Batch(generation, BatchEvent::ItemFinished { item, .. }) => {
                    self.state.batch_item_finished(generation, item)
                }
            }
        }
    }

    /// Rebuilds the compressed preview from the selected variant. The old
    /// handle is released here.
    fn refresh_processed_preview(&mut self) {
        self.previews.processed = self
            .state
            .single()
            .and_then(|single| single.result.as_ref())
            .map(|result| {
                let variant = self.state.format.variant_of(result);
                Handle::from_memory(variant.bytes.to_vec())
            });
    }

    fn view_single<'a>(&'a self, single: &'a session::SingleSession) -> Element<'a, Message> {
        let source = &single.source;

        let original_caption = text(format!(
            "Original ({}×{}, {})",
            source.width,
            source.height,
            metrics::format_bytes(source.size())
        ))
        .size(12);

        let original_preview: Element<Message> = match &self.previews.original {
            Some(handle) => Image::new(handle.clone()).width(Length::Fixed(320.0)).into(),
            None => Space::with_height(0).into(),
        };

        let Some(result) = &single.result else {
            return column![original_caption, original_preview].spacing(6).into();
        };

        let shown = self.state.format.variant_of(result);
        let gain = GainLabel::new(result.original.size, shown.size());
        let processed_caption = text(format!(
            "Compressed ({}×{} pixels, {}, {})",
            result.processed.width,
            result.processed.height,
            metrics::format_bytes(shown.size()),
            gain
        ))
        .size(12);

        let processed_preview: Element<Message> = match &self.previews.processed {
            Some(handle) => Image::new(handle.clone()).width(Length::Fixed(320.0)).into(),
            None => Space::with_height(0).into(),
        };

        let stats = ResultMetrics::for_variant(result, shown);
        let metrics_row = row![
            text(format!("Original: {:.2} bpp", stats.original_bpp)).size(12),
            text(format!("Compressed: {:.2} bpp", stats.processed_bpp)).size(12),
            text(format!("Saved: {}", metrics::format_bytes(stats.bytes_saved))).size(12),
            text(format!("CO₂: {}", metrics::format_co2(stats.co2_grams))).size(12),
            text(stats.gain.description()).size(12),
        ]
        .spacing(16);

        let downloads: Vec<Element<Message>> = session::download_rows(source, result)
            .into_iter()
            .map(|download| {
                row![
                    text(download.kind.label()).size(12).font(HEADING_FONT).width(90),
                    text(metrics::format_bytes(download.size)).size(12).width(80),
                    text(download.file_name).size(12).width(Length::Fill),
                    text(if download.best { "✔ best" } else { "" }).size(12).width(50),
                    button("Save").on_press(Message::Save(download.kind)).padding([4, 10]),
                ]
                .spacing(8)
                .into()
            })
            .collect();

        column![
            row![
                column![original_caption, original_preview].spacing(6),
                column![processed_caption, processed_preview].spacing(6),
            ]
            .spacing(16),
            metrics_row,
            text("Downloads").size(16).font(HEADING_FONT),
            container(iced::widget::Column::with_children(downloads).spacing(4))
                .style(iced::theme::Container::Box)
                .padding(8),
            row![
                button("Open Output").on_press(Message::OpenOutputFolder).padding([6, 12]),
                button("Clear").on_press(Message::ClearResults).padding([6, 12]),
            ]
            .spacing(8),
        ]
        .spacing(10)
        .into()
    }

    fn view_batch<'a>(&'a self, batch: &'a session::BatchSession) -> Element<'a, Message> {
        let state = &batch.state;
        let running = state.status == BatchStatus::Running;
        let done = state.items.len() as f32;
        let progress = if state.total > 0 { done / state.total as f32 } else { 0.0 };

        let results_list: Vec<Element<Message>> = state
            .items
            .iter()
            .map(|item| {
                let (status, detail) = match &item.outcome {
                    ItemOutcome::Succeeded(result) => {
                        let shown = self.state.format.variant_of(result);
                        (
                            "[OK]",
                            format!(
                                "{} → {} ({}, {})",
                                metrics::format_bytes(result.original.size),
                                metrics::format_bytes(shown.size()),
                                shown.mime.extension(),
                                GainLabel::new(result.original.size, shown.size())
                            ),
                        )
                    }
                    ItemOutcome::Failed(message) => ("[FAIL]", message.clone()),
                };

                row![
                    text(status)
                        .size(12)
                        .font(if status == "[OK]" { BODY_FONT } else { HEADING_FONT })
                        .width(40),
                    text(&item.file_name).size(12).font(BODY_FONT).width(Length::Fill),
                    text(detail).size(12).font(BODY_FONT),
                ]
                .spacing(8)
                .into()
            })
            .collect();

        let totals = state.totals();
        let summary = text(format!(
            "{}/{} succeeded · {} → {} ({}) · CO₂ {}",
            totals.succeeded,
            state.total,
            metrics::format_bytes(totals.original_bytes),
            metrics::format_bytes(totals.optimized_bytes),
            GainLabel::new(totals.original_bytes, totals.optimized_bytes),
            metrics::format_co2(metrics::co2_saved_grams(
                totals.original_bytes,
                totals.optimized_bytes
            ))
        ))
        .size(12);

        let zip_button = if running || self.exporting || totals.succeeded == 0 {
            button("Download ZIP").padding([6, 12])
        } else {
            button("Download ZIP").on_press(Message::ExportZip).padding([6, 12])
        };

        let cancel_button = if running && !batch.cancel.is_cancelled() {
            button("Cancel").on_press(Message::CancelBatch).padding([6, 12])
        } else {
            button("Cancel").padding([6, 12])
        };

        column![
            progress_bar(0.0..=1.0, progress).height(Length::Fixed(6.0)),
            text("Results").size(16).font(HEADING_FONT),
            container(
                scrollable(iced::widget::Column::with_children(results_list).spacing(3))
                    .height(Length::Fixed(220.0))
            )
            .style(iced::theme::Container::Box)
            .padding(8),
            summary,
            row![
                zip_button,
                cancel_button,
                button("Open Output").on_press(Message::OpenOutputFolder).padding([6, 12]),
                button("Clear").on_press(Message::ClearResults).padding([6, 12]),
            ]
            .spacing(8),
        ]
        .spacing(8)
        .into()
    }
}

// Helper functions
async fn select_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .add_filter("Images", &["jpg", "jpeg", "png", "gif", "bmp", "webp"])
        .pick_files()
        .await
        .map(|handles| handles.iter().map(|h| h.path().to_path_buf()).collect())
        .unwrap_or_default()
}

async fn select_folder() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .pick_folder()
        .await
        .map(|handle| vec![handle.path().to_path_buf()])
        .unwrap_or_default()
}

async fn export_zip(
    items: Vec<batch::BatchItem>,
    format: DisplayFormat,
    output_dir: PathBuf,
) -> Result<PathBuf, String> {
    tokio::task::spawn_blocking(move || {
        let bytes = archive::build_zip(&items, format).map_err(|e| e.to_string())?;
        session::write_into(&output_dir, ZIP_NAME, &bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

async fn show_error(title: &'static str, message: String) {
    rfd::AsyncMessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(&message)
        .show()
        .await;
}

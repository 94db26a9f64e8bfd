use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Receiver;
use iced::widget::{button, column, container, image, pick_list, row, scrollable, text};
use iced::{Element, Length, Subscription, Task, Theme};

use facefeed_core::capture::domain::uploaded_file::{UploadPolicy, UploadedFile};
use facefeed_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use facefeed_core::config::app_config::{AppConfig, Engine};
use facefeed_core::overlay::domain::overlay_renderer::{OverlayMode, OverlayRenderer, OverlayStyle};
use facefeed_core::overlay::infrastructure::raster_surface::RasterSurface;
use facefeed_core::pipeline::detection_worker::DetectionWorker;
use facefeed_core::pipeline::notifier::{ChannelNotifier, Notice};
use facefeed_core::pipeline::orchestrator::{DetectionJob, DetectionOutcome, Orchestrator};
use facefeed_core::session::result_store::BatchStatus;
use facefeed_core::shared::constants::IMAGE_EXTENSIONS;
use facefeed_core::shared::error::FaceFeedError;

use crate::theme;
use crate::workers::engine_loader::{self, EngineMessage};

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub enum Message {
    StartWebcam,
    StopWebcam,
    CaptureFrame,
    SelectImage,
    ImageSelected(Option<PathBuf>),
    EngineChanged(Engine),
    PollTick,
    DrainWorker,
}

enum EngineState {
    Loading {
        rx: Receiver<EngineMessage>,
        progress: Option<(String, u64, u64)>,
    },
    Ready(DetectionWorker),
    Failed(String),
}

pub struct App {
    config: AppConfig,
    orchestrator: Orchestrator,
    notices: Receiver<Notice>,
    engine: EngineState,
    renderer: OverlayRenderer,
    frame: Option<image::Handle>,
    rendered: Option<(u64, BatchStatus, OverlayMode)>,
    latest_notice: Option<Notice>,
    outstanding: usize,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let config = AppConfig::load();
        let renderer = match OverlayStyle::from_config(&config.overlay) {
            Ok(style) => OverlayRenderer::new(style),
            Err(e) => {
                log::warn!("Using default overlay style: {e}");
                OverlayRenderer::default()
            }
        };
        let (tx, notices) = crossbeam_channel::unbounded();
        let orchestrator = Orchestrator::new(
            UploadPolicy::new(config.max_upload_bytes),
            Box::new(ChannelNotifier::new(tx)),
        );
        let engine = load_engine(&config);

        (
            Self {
                config,
                orchestrator,
                notices,
                engine,
                renderer,
                frame: None,
                rendered: None,
                latest_notice: None,
                outstanding: 0,
            },
            Task::none(),
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::StartWebcam => {
                let camera = FfmpegCamera::new(
                    self.config.camera.device.clone(),
                    self.config.camera.input_format.clone(),
                );
                if self.orchestrator.start_stream(Box::new(camera)).is_ok() {
                    self.poll();
                }
            }
            Message::StopWebcam => {
                self.orchestrator.stop_stream();
            }
            Message::CaptureFrame => {
                if self.engine_ready() {
                    if let Ok(job) = self.orchestrator.capture_now() {
                        self.dispatch(job);
                    }
                }
            }
            Message::SelectImage => {
                return Task::perform(
                    async {
                        rfd::AsyncFileDialog::new()
                            .set_title("Select an image")
                            .add_filter("Images", IMAGE_EXTENSIONS)
                            .pick_file()
                            .await
                            .map(|h| h.path().to_path_buf())
                    },
                    Message::ImageSelected,
                );
            }
            Message::ImageSelected(Some(path)) => self.analyze_file(path),
            Message::ImageSelected(None) => {}
            Message::EngineChanged(engine) => {
                if engine != self.config.engine {
                    self.config.engine = engine;
                    if let Err(e) = self.config.save() {
                        log::warn!("Failed to save config: {e}");
                    }
                    self.orchestrator.reset();
                    self.outstanding = 0;
                    let previous = std::mem::replace(&mut self.engine, load_engine(&self.config));
                    if let EngineState::Ready(worker) = previous {
                        worker.shutdown_detached();
                    }
                }
            }
            Message::PollTick => self.poll(),
            Message::DrainWorker => {
                self.drain_engine();
                self.drain_outcomes();
            }
        }

        self.drain_notices();
        self.refresh_frame();
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let streaming = self.orchestrator.is_streaming();
        let ready = matches!(self.engine, EngineState::Ready(_));

        let webcam_btn = if streaming {
            button(text("Stop Webcam")).on_press(Message::StopWebcam)
        } else {
            button(text("Start Webcam")).on_press(Message::StartWebcam)
        };
        let capture_btn = button(text("Capture Frame"))
            .on_press_maybe((streaming && ready).then_some(Message::CaptureFrame))
            .style(button::secondary);
        let select_btn = button(text("Select Image"))
            .on_press_maybe(ready.then_some(Message::SelectImage))
            .style(button::secondary);
        let engine_pick = pick_list(Engine::ALL, Some(self.config.engine), Message::EngineChanged);

        let toolbar = row![webcam_btn, capture_btn, select_btn, engine_pick]
            .spacing(8)
            .align_y(iced::Alignment::Center);

        let viewport: Element<'_, Message> = match &self.frame {
            Some(handle) => image(handle.clone())
                .content_fit(iced::ContentFit::Contain)
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => container(text("Start the webcam or select an image").size(16))
                .center(Length::Fill)
                .into(),
        };

        let state = self.orchestrator.state();
        let status = text(self.status_line())
            .size(14)
            .style(move |theme: &Theme| text::Style {
                color: Some(theme::status_color(theme, state.status())),
            });

        let faces = column(
            state
                .faces()
                .iter()
                .enumerate()
                .map(|(i, face)| {
                    text(format!(
                        "Face {}: {}, ~{} yrs",
                        i + 1,
                        face.gender,
                        face.rounded_age()
                    ))
                    .size(13)
                    .into()
                })
                .collect::<Vec<_>>(),
        )
        .spacing(4);

        let notice: Element<'_, Message> = match &self.latest_notice {
            Some(n) => {
                let is_error = n.is_error();
                text(format!("{}: {}", n.title, n.description))
                    .size(13)
                    .style(move |theme: &Theme| text::Style {
                        color: Some(if is_error {
                            theme.palette().danger
                        } else {
                            theme::muted_color(theme)
                        }),
                    })
                    .into()
            }
            None => text("").into(),
        };

        let sidebar = container(scrollable(faces).height(Length::Fill))
            .width(220)
            .height(Length::Fill)
            .padding([0, 8]);

        column![
            toolbar,
            row![viewport, sidebar].height(Length::Fill).spacing(8),
            status,
            notice,
        ]
        .spacing(10)
        .padding(16)
        .into()
    }

    pub fn theme(&self) -> Theme {
        theme::resolve_theme()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let mut subs = Vec::new();
        if self.orchestrator.is_streaming() && matches!(self.engine, EngineState::Ready(_)) {
            subs.push(iced::time::every(self.config.poll_interval()).map(|_| Message::PollTick));
        }
        if self.outstanding > 0 || matches!(self.engine, EngineState::Loading { .. }) {
            subs.push(iced::time::every(DRAIN_INTERVAL).map(|_| Message::DrainWorker));
        }
        Subscription::batch(subs)
    }

    fn engine_ready(&mut self) -> bool {
        match &self.engine {
            EngineState::Ready(_) => true,
            EngineState::Loading { .. } => {
                self.latest_notice = Some(Notice::info(
                    "Engine Loading",
                    "The detection engine is still starting. Please wait.",
                ));
                false
            }
            EngineState::Failed(e) => {
                self.latest_notice = Some(Notice::from_error(&FaceFeedError::DetectionFailure(
                    e.clone(),
                )));
                false
            }
        }
    }

    fn analyze_file(&mut self, path: PathBuf) {
        if !self.engine_ready() {
            return;
        }
        let file = match UploadedFile::from_path(&path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Failed to read {}: {e}", path.display());
                self.latest_notice = Some(Notice::from_error(&FaceFeedError::DecodeFailure(
                    e.to_string(),
                )));
                return;
            }
        };
        if let Ok(job) = self.orchestrator.submit_upload(file) {
            self.dispatch(job);
        }
    }

    fn poll(&mut self) {
        if !matches!(self.engine, EngineState::Ready(_)) {
            return;
        }
        if let Ok(Some(job)) = self.orchestrator.poll_tick() {
            self.dispatch(job);
        }
    }

    fn dispatch(&mut self, job: DetectionJob) {
        let EngineState::Ready(worker) = &self.engine else {
            return;
        };
        let (ticket, origin) = (job.ticket, job.origin);
        match worker.submit(job) {
            Ok(()) => self.outstanding += 1,
            Err(e) => {
                self.orchestrator.complete(DetectionOutcome {
                    ticket,
                    origin,
                    result: Err(e),
                    elapsed: Duration::ZERO,
                });
            }
        }
    }

    fn drain_outcomes(&mut self) {
        let EngineState::Ready(worker) = &self.engine else {
            return;
        };
        while let Some(outcome) = worker.try_next() {
            self.outstanding = self.outstanding.saturating_sub(1);
            self.orchestrator.complete(outcome);
        }
    }

    fn drain_engine(&mut self) {
        let EngineState::Loading { rx, progress } = &mut self.engine else {
            return;
        };
        let mut next = None;
        while let Ok(message) = rx.try_recv() {
            match message {
                EngineMessage::DownloadProgress {
                    model,
                    downloaded,
                    total,
                } => *progress = Some((model, downloaded, total)),
                EngineMessage::Ready(detector) => {
                    next = Some(EngineState::Ready(DetectionWorker::spawn(detector)));
                }
                EngineMessage::Error(e) => next = Some(EngineState::Failed(e)),
            }
        }
        if let Some(state) = next {
            if let EngineState::Failed(e) = &state {
                self.latest_notice = Some(Notice::from_error(&FaceFeedError::DetectionFailure(
                    e.clone(),
                )));
            }
            self.engine = state;
        }
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            self.latest_notice = Some(notice);
        }
    }

    fn refresh_frame(&mut self) {
        let state = self.orchestrator.state();
        let key = (
            state.generation(),
            state.status().clone(),
            self.orchestrator.overlay_mode(),
        );
        if self.rendered.as_ref() == Some(&key) {
            return;
        }
        self.rendered = Some(key);
        let Some(source) = state.source_image() else {
            self.frame = None;
            return;
        };
        let (width, height) = source.dimensions();
        let rendered = RasterSurface::new(width, height)
            .and_then(|surface| match &self.config.overlay.font_path {
                Some(font) => surface.with_font_file(font),
                None => Ok(surface),
            })
            .and_then(|mut surface| {
                self.renderer
                    .render(state, &mut surface, self.orchestrator.overlay_mode())?;
                Ok(surface)
            });
        match rendered {
            Ok(surface) => {
                self.frame = Some(image::Handle::from_rgba(
                    width,
                    height,
                    surface.into_image().into_raw(),
                ));
            }
            Err(e) => {
                log::warn!("Render failed: {e}");
                self.latest_notice = Some(Notice::from_error(&e));
            }
        }
    }

    fn status_line(&self) -> String {
        let live = if self.orchestrator.is_streaming() {
            "Live. "
        } else {
            ""
        };
        let engine = match &self.engine {
            EngineState::Loading {
                progress: Some((model, downloaded, total)),
                ..
            } if *total > 0 => {
                format!(
                    "Downloading {model}... {}%. ",
                    downloaded * 100 / total
                )
            }
            EngineState::Loading { .. } => format!("Loading {} engine... ", self.config.engine),
            EngineState::Failed(_) => "Engine unavailable. ".to_string(),
            EngineState::Ready(_) => String::new(),
        };
        let state = self.orchestrator.state();
        let batch = match state.status() {
            BatchStatus::Idle => "Idle".to_string(),
            BatchStatus::Processing => "Analyzing...".to_string(),
            BatchStatus::Ready => format!("Ready: {} face(s)", state.faces().len()),
            BatchStatus::Error(message) => format!("Error: {message}"),
        };
        format!("{live}{engine}{batch}")
    }
}

fn load_engine(config: &AppConfig) -> EngineState {
    EngineState::Loading {
        rx: engine_loader::spawn(config.clone()),
        progress: None,
    }
}

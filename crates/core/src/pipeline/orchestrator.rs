use std::sync::Arc;
use std::time::Duration;

use crate::capture::domain::camera_source::CameraSource;
use crate::capture::domain::uploaded_file::{UploadPolicy, UploadedFile};
use crate::capture::infrastructure::image_codec::decode_upload;
use crate::overlay::domain::overlay_renderer::OverlayMode;
use crate::session::result_store::{BatchTicket, DetectionBatchState, ResultStore};
use crate::shared::error::FaceFeedError;
use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

use super::notifier::{Notice, Notifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOrigin {
    Upload,
    Capture,
    Poll,
}

/// One detection request, ready to hand to a worker.
#[derive(Clone, Debug)]
pub struct DetectionJob {
    pub ticket: BatchTicket,
    pub frame: Arc<Frame>,
    pub origin: JobOrigin,
}

/// The worker's answer to a [`DetectionJob`].
#[derive(Clone, Debug)]
pub struct DetectionOutcome {
    pub ticket: BatchTicket,
    pub origin: JobOrigin,
    pub result: Result<Vec<DetectedFace>, FaceFeedError>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Applied { face_count: usize },
    Failed(FaceFeedError),
    /// A newer request (or a stop) superseded this one.
    Discarded,
}

/// Turns user actions and timer ticks into detection jobs, and applies
/// their outcomes to the result store.
///
/// Owns the camera while a stream is active. Every failure is reported to
/// the notifier and returned; none of them leave the store inconsistent.
pub struct Orchestrator {
    store: ResultStore,
    upload_policy: UploadPolicy,
    notifier: Box<dyn Notifier>,
    camera: Option<Box<dyn CameraSource>>,
    polling_in_flight: Option<BatchTicket>,
    /// Last polling failure already reported; repeats stay quiet.
    last_poll_error: Option<String>,
    overlay_mode: OverlayMode,
    uploads: usize,
}

impl Orchestrator {
    pub fn new(upload_policy: UploadPolicy, notifier: Box<dyn Notifier>) -> Self {
        Self {
            store: ResultStore::new(),
            upload_policy,
            notifier,
            camera: None,
            polling_in_flight: None,
            last_poll_error: None,
            overlay_mode: OverlayMode::Full,
            uploads: 0,
        }
    }

    pub fn state(&self) -> &DetectionBatchState {
        self.store.state()
    }

    /// How the shell should draw the current state.
    pub fn overlay_mode(&self) -> OverlayMode {
        self.overlay_mode
    }

    pub fn is_streaming(&self) -> bool {
        self.camera.is_some()
    }

    pub fn polling_in_flight(&self) -> bool {
        self.polling_in_flight.is_some()
    }

    /// Validates and decodes an upload and starts a detection on it.
    ///
    /// A rejected or unreadable file leaves the store untouched. An accepted
    /// one stops any active stream first.
    pub fn submit_upload(&mut self, file: UploadedFile) -> Result<DetectionJob, FaceFeedError> {
        if let Err(e) = self.upload_policy.validate(&file) {
            log::info!("Rejected upload {}: {e}", file.name);
            return Err(self.report(e));
        }
        let frame = match decode_upload(&file, self.uploads) {
            Ok(frame) => frame,
            Err(e) => {
                self.overlay_mode = OverlayMode::ImageOnly;
                return Err(self.report(e));
            }
        };
        self.uploads += 1;

        if self.is_streaming() {
            self.stop_stream();
        }
        log::info!(
            "Analyzing upload {} ({}x{})",
            file.name,
            frame.width(),
            frame.height()
        );
        Ok(self.begin(Arc::new(frame), JobOrigin::Upload))
    }

    /// Takes ownership of `camera` and opens it. No-op while a stream is
    /// already active.
    pub fn start_stream(&mut self, mut camera: Box<dyn CameraSource>) -> Result<(), FaceFeedError> {
        if self.is_streaming() {
            log::debug!("Stream already active");
            return Ok(());
        }
        if let Err(e) = camera.open() {
            return Err(self.report(e));
        }
        self.store.clear();
        self.overlay_mode = OverlayMode::Full;
        self.last_poll_error = None;
        self.camera = Some(camera);
        log::info!("Stream started");
        Ok(())
    }

    /// Releases the camera and clears the overlay. Results still in flight
    /// are discarded when they arrive.
    pub fn stop_stream(&mut self) {
        let Some(mut camera) = self.camera.take() else {
            return;
        };
        camera.close();
        self.polling_in_flight = None;
        self.store.clear();
        log::info!("Stream stopped");
    }

    /// Stops any stream and forgets the current batch, including one still
    /// being processed.
    pub fn reset(&mut self) {
        self.stop_stream();
        self.polling_in_flight = None;
        self.overlay_mode = OverlayMode::Full;
        self.store.clear();
    }

    /// Samples the stream once and starts a detection on the frame.
    pub fn capture_now(&mut self) -> Result<DetectionJob, FaceFeedError> {
        let frame = self.sample()?;
        Ok(self.begin(frame, JobOrigin::Capture))
    }

    /// Timer tick while streaming. Returns `None` when not streaming or when
    /// the previous polling request is still running.
    pub fn poll_tick(&mut self) -> Result<Option<DetectionJob>, FaceFeedError> {
        if !self.is_streaming() {
            return Ok(None);
        }
        if let Some(ticket) = self.polling_in_flight {
            log::debug!("Skipping tick: poll {} still in flight", ticket.generation());
            return Ok(None);
        }
        let frame = self.sample()?;
        let job = self.begin(frame, JobOrigin::Poll);
        self.polling_in_flight = Some(job.ticket);
        Ok(Some(job))
    }

    /// Applies a worker outcome if it is still the newest request.
    pub fn complete(&mut self, outcome: DetectionOutcome) -> Completion {
        if self.polling_in_flight == Some(outcome.ticket) {
            self.polling_in_flight = None;
        }
        let polling = outcome.origin == JobOrigin::Poll;

        match outcome.result {
            Ok(faces) => {
                let face_count = faces.len();
                if !self.store.commit_success(outcome.ticket, faces) {
                    return Completion::Discarded;
                }
                log::debug!(
                    "Batch {} applied: {face_count} face(s) in {:.0?}",
                    outcome.ticket.generation(),
                    outcome.elapsed
                );
                if polling {
                    self.last_poll_error = None;
                } else {
                    self.notifier.notify(Notice::batch_complete(face_count));
                }
                Completion::Applied { face_count }
            }
            Err(e) => {
                if !self.store.commit_error(outcome.ticket, e.to_string()) {
                    return Completion::Discarded;
                }
                log::warn!("Batch {} failed: {e}", outcome.ticket.generation());
                let message = e.to_string();
                let repeated = polling && self.last_poll_error.as_deref() == Some(message.as_str());
                if !repeated {
                    self.notifier.notify(Notice::from_error(&e));
                }
                if polling {
                    self.last_poll_error = Some(message);
                }
                Completion::Failed(e)
            }
        }
    }

    fn begin(&mut self, frame: Arc<Frame>, origin: JobOrigin) -> DetectionJob {
        self.overlay_mode = OverlayMode::Full;
        let ticket = self.store.begin_processing(frame.clone());
        DetectionJob {
            ticket,
            frame,
            origin,
        }
    }

    fn sample(&mut self) -> Result<Arc<Frame>, FaceFeedError> {
        let Some(camera) = self.camera.as_mut() else {
            return Err(self.report(FaceFeedError::DeviceUnavailable(
                "no active stream".into(),
            )));
        };
        match camera.sample() {
            Ok(frame) => Ok(Arc::new(frame)),
            Err(e) => {
                log::warn!("Camera failed mid-stream: {e}");
                self.stop_stream();
                Err(self.report(e))
            }
        }
    }

    fn report(&mut self, error: FaceFeedError) -> FaceFeedError {
        self.notifier.notify(Notice::from_error(&error));
        error
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::capture::domain::camera_source::CameraSource;
    use crate::shared::error::FaceFeedError;
    use crate::shared::frame::Frame;

    /// Camera that replays scripted samples, then repeats a blank frame.
    pub struct ScriptedCamera {
        pub open_result: Result<(), FaceFeedError>,
        pub samples: VecDeque<Result<Frame, FaceFeedError>>,
        pub opened: bool,
        pub closed: Arc<AtomicBool>,
    }

    impl ScriptedCamera {
        pub fn working() -> Self {
            Self {
                open_result: Ok(()),
                samples: VecDeque::new(),
                opened: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl CameraSource for ScriptedCamera {
        fn open(&mut self) -> Result<(), FaceFeedError> {
            self.open_result.clone()?;
            self.opened = true;
            Ok(())
        }

        fn sample(&mut self) -> Result<Frame, FaceFeedError> {
            self.samples
                .pop_front()
                .unwrap_or_else(|| Ok(Frame::new(vec![0u8; 8 * 6 * 3], 8, 6, 3, 0)))
        }

        fn close(&mut self) {
            self.opened = false;
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.opened
        }
    }

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{png_bytes, ScriptedCamera};
    use super::*;
    use crate::pipeline::notifier::ChannelNotifier;
    use crate::session::result_store::BatchStatus;
    use crate::shared::face::BoundingBox;
    use crossbeam_channel::Receiver;
    use std::sync::atomic::Ordering;

    fn orchestrator() -> (Orchestrator, Receiver<Notice>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Orchestrator::new(UploadPolicy::default(), Box::new(ChannelNotifier::new(tx))),
            rx,
        )
    }

    fn outcome(job: &DetectionJob, result: Result<Vec<DetectedFace>, FaceFeedError>) -> DetectionOutcome {
        DetectionOutcome {
            ticket: job.ticket,
            origin: job.origin,
            result,
            elapsed: Duration::from_millis(5),
        }
    }

    fn face(age: f64, gender: &str) -> DetectedFace {
        DetectedFace {
            id: "face-0".into(),
            bounding_box: BoundingBox::new(1.0, 1.0, 3.0, 3.0),
            age,
            gender: gender.into(),
            emotion: None,
        }
    }

    fn upload(name: &str) -> UploadedFile {
        UploadedFile::new(name, "image/png", png_bytes(8, 6))
    }

    #[test]
    fn test_text_upload_rejected_and_state_untouched() {
        let (mut orch, notices) = orchestrator();
        let before = orch.state().clone();
        let result = orch.submit_upload(UploadedFile::new("a.txt", "text/plain", vec![1, 2]));

        assert!(matches!(result, Err(FaceFeedError::InvalidInput { .. })));
        assert_eq!(orch.state(), &before);
        assert_eq!(notices.try_recv().unwrap().title, "Invalid File Type");
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let (mut orch, notices) = orchestrator();
        let file = UploadedFile::new("big.jpg", "image/jpeg", vec![0; 10 * 1024 * 1024]);
        assert!(matches!(
            orch.submit_upload(file),
            Err(FaceFeedError::TooLarge { .. })
        ));
        assert_eq!(orch.state().status(), &BatchStatus::Idle);
        assert_eq!(
            notices.try_recv().unwrap().description,
            "Image size should be less than 5MB."
        );
    }

    #[test]
    fn test_undecodable_upload_keeps_previous_image() {
        let (mut orch, _notices) = orchestrator();
        let job = orch.submit_upload(upload("a.png")).unwrap();
        orch.complete(outcome(&job, Ok(vec![face(30.0, "female")])));

        let broken = UploadedFile::new("b.png", "image/png", b"garbage".to_vec());
        assert!(matches!(
            orch.submit_upload(broken),
            Err(FaceFeedError::DecodeFailure(_))
        ));
        assert_eq!(orch.state().status(), &BatchStatus::Ready);
        assert_eq!(orch.state().faces().len(), 1);
        assert_eq!(orch.overlay_mode(), OverlayMode::ImageOnly);
    }

    #[test]
    fn test_empty_result_is_ready_with_summary() {
        let (mut orch, notices) = orchestrator();
        let job = orch.submit_upload(upload("a.png")).unwrap();
        assert!(orch.state().is_processing());

        assert_eq!(
            orch.complete(outcome(&job, Ok(vec![]))),
            Completion::Applied { face_count: 0 }
        );
        assert_eq!(orch.state().status(), &BatchStatus::Ready);
        assert!(orch.state().faces().is_empty());
        assert_eq!(
            notices.try_recv().unwrap().description,
            "No faces were detected in the image."
        );
    }

    #[test]
    fn test_detection_failure_clears_faces_and_notifies() {
        let (mut orch, notices) = orchestrator();
        let job = orch.submit_upload(upload("a.png")).unwrap();
        let completion = orch.complete(outcome(
            &job,
            Err(FaceFeedError::DetectionFailure("timeout".into())),
        ));

        assert!(matches!(completion, Completion::Failed(_)));
        assert!(matches!(orch.state().status(), BatchStatus::Error(_)));
        assert!(orch.state().faces().is_empty());
        assert_eq!(notices.try_recv().unwrap().title, "Analysis Error");
    }

    #[test]
    fn test_later_request_wins() {
        let (mut orch, _notices) = orchestrator();
        let a = orch.submit_upload(upload("a.png")).unwrap();
        let b = orch.submit_upload(upload("b.png")).unwrap();

        assert_eq!(
            orch.complete(outcome(&b, Ok(vec![face(20.0, "male")]))),
            Completion::Applied { face_count: 1 }
        );
        assert_eq!(
            orch.complete(outcome(&a, Ok(vec![face(60.0, "female"), face(1.0, "x")]))),
            Completion::Discarded
        );
        assert_eq!(orch.state().faces()[0].gender, "male");
        assert!(Arc::ptr_eq(orch.state().source_image().unwrap(), &b.frame));
    }

    #[test]
    fn test_start_stream_failure_leaves_stream_inactive() {
        let (mut orch, notices) = orchestrator();
        let mut camera = ScriptedCamera::working();
        camera.open_result = Err(FaceFeedError::DeviceUnavailable("denied".into()));

        assert!(orch.start_stream(Box::new(camera)).is_err());
        assert!(!orch.is_streaming());
        assert_eq!(notices.try_recv().unwrap().title, "Webcam Error");
    }

    #[test]
    fn test_start_stream_twice_is_noop() {
        let (mut orch, _notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();
        let job = orch.poll_tick().unwrap().unwrap();

        let mut second = ScriptedCamera::working();
        second.open_result = Err(FaceFeedError::DeviceBusy("cam".into()));
        assert!(orch.start_stream(Box::new(second)).is_ok());
        assert!(orch.is_streaming());
        assert!(orch.state().is_processing());
        assert_eq!(orch.state().generation(), job.ticket.generation());
    }

    #[test]
    fn test_tick_skipped_while_poll_in_flight() {
        let (mut orch, _notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();

        let first = orch.poll_tick().unwrap().expect("first tick polls");
        assert!(orch.polling_in_flight());
        assert!(orch.poll_tick().unwrap().is_none());
        assert!(orch.poll_tick().unwrap().is_none());

        orch.complete(outcome(&first, Ok(vec![])));
        assert!(!orch.polling_in_flight());
        assert!(orch.poll_tick().unwrap().is_some());
    }

    #[test]
    fn test_poll_results_do_not_post_summaries() {
        let (mut orch, notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();
        let job = orch.poll_tick().unwrap().unwrap();
        orch.complete(outcome(&job, Ok(vec![face(30.0, "female")])));
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn test_poll_failure_posts_error_notice() {
        let (mut orch, notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();
        let job = orch.poll_tick().unwrap().unwrap();
        let completion = orch.complete(outcome(
            &job,
            Err(FaceFeedError::DetectionFailure("model crashed".into())),
        ));

        assert!(matches!(completion, Completion::Failed(_)));
        assert!(matches!(orch.state().status(), BatchStatus::Error(_)));
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.title, "Analysis Error");
        assert!(notice.is_error());
    }

    #[test]
    fn test_repeated_poll_failure_notifies_once_until_recovery() {
        let (mut orch, notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();
        let fail = |orch: &mut Orchestrator, msg: &str| {
            let job = orch.poll_tick().unwrap().unwrap();
            orch.complete(outcome(&job, Err(FaceFeedError::DetectionFailure(msg.into()))));
        };

        fail(&mut orch, "offline");
        fail(&mut orch, "offline");
        assert_eq!(notices.try_iter().count(), 1);

        fail(&mut orch, "quota exceeded");
        assert_eq!(notices.try_iter().count(), 1);

        let job = orch.poll_tick().unwrap().unwrap();
        orch.complete(outcome(&job, Ok(vec![])));
        fail(&mut orch, "quota exceeded");
        assert_eq!(notices.try_iter().count(), 1);
    }

    #[test]
    fn test_capture_now_requires_stream() {
        let (mut orch, _notices) = orchestrator();
        assert!(matches!(
            orch.capture_now(),
            Err(FaceFeedError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_capture_now_supersedes_in_flight_poll() {
        let (mut orch, _notices) = orchestrator();
        orch.start_stream(Box::new(ScriptedCamera::working())).unwrap();
        let poll = orch.poll_tick().unwrap().unwrap();
        let capture = orch.capture_now().unwrap();

        assert_eq!(orch.complete(outcome(&poll, Ok(vec![]))), Completion::Discarded);
        assert!(!orch.polling_in_flight());
        assert_eq!(
            orch.complete(outcome(&capture, Ok(vec![face(10.0, "male")]))),
            Completion::Applied { face_count: 1 }
        );
    }

    #[test]
    fn test_camera_revoked_mid_stream() {
        let (mut orch, notices) = orchestrator();
        let mut camera = ScriptedCamera::working();
        camera
            .samples
            .push_back(Ok(Frame::new(vec![0u8; 8 * 6 * 3], 8, 6, 3, 0)));
        camera
            .samples
            .push_back(Err(FaceFeedError::DeviceUnavailable("revoked".into())));
        let closed = camera.closed.clone();
        orch.start_stream(Box::new(camera)).unwrap();

        let first = orch.poll_tick().unwrap().unwrap();
        orch.complete(outcome(&first, Ok(vec![face(30.0, "female")])));
        assert_eq!(orch.state().faces().len(), 1);

        assert!(matches!(
            orch.poll_tick(),
            Err(FaceFeedError::DeviceUnavailable(_))
        ));
        assert!(!orch.is_streaming());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(orch.state().status(), &BatchStatus::Idle);
        assert!(orch.state().faces().is_empty());
        assert!(orch.state().source_image().is_none());
        assert_eq!(notices.try_recv().unwrap().title, "Webcam Error");
        assert!(orch.poll_tick().unwrap().is_none());
    }

    #[test]
    fn test_stop_stream_discards_in_flight_result() {
        let (mut orch, _notices) = orchestrator();
        let camera = ScriptedCamera::working();
        let closed = camera.closed.clone();
        orch.start_stream(Box::new(camera)).unwrap();
        let job = orch.poll_tick().unwrap().unwrap();

        orch.stop_stream();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!orch.is_streaming());
        assert_eq!(orch.complete(outcome(&job, Ok(vec![face(1.0, "x")]))), Completion::Discarded);
        assert_eq!(orch.state().status(), &BatchStatus::Idle);
    }

    #[test]
    fn test_upload_stops_active_stream() {
        let (mut orch, _notices) = orchestrator();
        let camera = ScriptedCamera::working();
        let closed = camera.closed.clone();
        orch.start_stream(Box::new(camera)).unwrap();
        let poll = orch.poll_tick().unwrap().unwrap();

        let job = orch.submit_upload(upload("a.png")).unwrap();
        assert!(!orch.is_streaming());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(orch.complete(outcome(&poll, Ok(vec![]))), Completion::Discarded);
        assert_eq!(
            orch.complete(outcome(&job, Ok(vec![]))),
            Completion::Applied { face_count: 0 }
        );
    }

    #[test]
    fn test_reset_abandons_pending_upload() {
        let (mut orch, _notices) = orchestrator();
        let job = orch.submit_upload(upload("a.png")).unwrap();
        orch.reset();

        assert_eq!(orch.state().status(), &BatchStatus::Idle);
        assert_eq!(orch.complete(outcome(&job, Ok(vec![]))), Completion::Discarded);
    }

    #[test]
    fn test_label_for_female_29_6() {
        let (mut orch, _notices) = orchestrator();
        let job = orch.submit_upload(upload("a.png")).unwrap();
        orch.complete(outcome(&job, Ok(vec![face(29.6, "female")])));
        assert_eq!(orch.state().faces()[0].label(), "female, ~30 yrs");
    }
}

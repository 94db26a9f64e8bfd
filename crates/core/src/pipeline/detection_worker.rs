use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::error::FaceFeedError;

use super::orchestrator::{DetectionJob, DetectionOutcome};

/// Runs detection jobs on a dedicated thread, one at a time, in
/// submission order.
///
/// Dropping the worker closes the job queue and joins the thread after the
/// job in progress finishes. Use [`DetectionWorker::shutdown_detached`] where
/// blocking on that job is not acceptable.
pub struct DetectionWorker {
    jobs: Option<Sender<DetectionJob>>,
    outcomes: Receiver<DetectionOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    pub fn spawn(mut detector: Box<dyn FaceDetector>) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DetectionJob>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<DetectionOutcome>();

        let handle = std::thread::spawn(move || {
            for job in job_rx {
                let started = Instant::now();
                let result = detector.detect(&job.frame);
                let outcome = DetectionOutcome {
                    ticket: job.ticket,
                    origin: job.origin,
                    result,
                    elapsed: started.elapsed(),
                };
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
            log::debug!("Detection worker exiting");
        });

        Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            handle: Some(handle),
        }
    }

    pub fn submit(&self, job: DetectionJob) -> Result<(), FaceFeedError> {
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| FaceFeedError::DetectionFailure("detection worker stopped".into()))?;
        sender
            .send(job)
            .map_err(|_| FaceFeedError::DetectionFailure("detection worker stopped".into()))
    }

    /// Completed jobs, for use with `crossbeam_channel::select!`.
    pub fn outcomes(&self) -> &Receiver<DetectionOutcome> {
        &self.outcomes
    }

    pub fn try_next(&self) -> Option<DetectionOutcome> {
        self.outcomes.try_recv().ok()
    }

    /// Closes the job queue and returns without waiting. The thread exits
    /// once the job in progress finishes; its outcome is dropped.
    pub fn shutdown_detached(mut self) {
        drop(self.jobs.take());
        if self.handle.take().is_some() {
            log::debug!("Detection worker detached");
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Detection worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::JobOrigin;
    use crate::session::result_store::ResultStore;
    use crate::shared::face::{BoundingBox, DetectedFace};
    use crate::shared::frame::Frame;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingDetector;

    impl FaceDetector for CountingDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, FaceFeedError> {
            if frame.width() == 0 {
                return Err(FaceFeedError::DetectionFailure("empty".into()));
            }
            Ok((0..frame.index())
                .map(|i| DetectedFace {
                    id: format!("face-{i}"),
                    bounding_box: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    age: 30.0,
                    gender: "female".into(),
                    emotion: None,
                })
                .collect())
        }
    }

    fn job(store: &mut ResultStore, frame: Frame) -> DetectionJob {
        let frame = Arc::new(frame);
        DetectionJob {
            ticket: store.begin_processing(frame.clone()),
            frame,
            origin: JobOrigin::Capture,
        }
    }

    #[test]
    fn test_outcomes_arrive_in_submission_order() {
        let worker = DetectionWorker::spawn(Box::new(CountingDetector));
        let mut store = ResultStore::new();
        let a = job(&mut store, Frame::new(vec![0; 3], 1, 1, 3, 2));
        let b = job(&mut store, Frame::new(vec![0; 3], 1, 1, 3, 3));
        worker.submit(a.clone()).unwrap();
        worker.submit(b.clone()).unwrap();

        let timeout = Duration::from_secs(5);
        let first = worker.outcomes().recv_timeout(timeout).unwrap();
        let second = worker.outcomes().recv_timeout(timeout).unwrap();
        assert_eq!(first.ticket, a.ticket);
        assert_eq!(first.result.unwrap().len(), 2);
        assert_eq!(second.ticket, b.ticket);
        assert_eq!(second.result.unwrap().len(), 3);
    }

    #[test]
    fn test_detector_errors_are_forwarded() {
        let worker = DetectionWorker::spawn(Box::new(CountingDetector));
        let mut store = ResultStore::new();
        worker
            .submit(job(&mut store, Frame::new(vec![], 0, 0, 3, 0)))
            .unwrap();

        let outcome = worker
            .outcomes()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(matches!(
            outcome.result,
            Err(FaceFeedError::DetectionFailure(_))
        ));
    }

    struct SleepyDetector {
        delay: Duration,
        dropped: Arc<AtomicBool>,
    }

    impl FaceDetector for SleepyDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, FaceFeedError> {
            std::thread::sleep(self.delay);
            Ok(vec![])
        }
    }

    impl Drop for SleepyDetector {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_shutdown_detached_does_not_wait_for_running_job() {
        let dropped = Arc::new(AtomicBool::new(false));
        let worker = DetectionWorker::spawn(Box::new(SleepyDetector {
            delay: Duration::from_millis(400),
            dropped: dropped.clone(),
        }));
        let mut store = ResultStore::new();
        worker
            .submit(job(&mut store, Frame::new(vec![0; 3], 1, 1, 3, 0)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        worker.shutdown_detached();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!dropped.load(Ordering::SeqCst));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_waits_for_running_job() {
        let dropped = Arc::new(AtomicBool::new(false));
        let worker = DetectionWorker::spawn(Box::new(SleepyDetector {
            delay: Duration::from_millis(100),
            dropped: dropped.clone(),
        }));
        let mut store = ResultStore::new();
        worker
            .submit(job(&mut store, Frame::new(vec![0; 3], 1, 1, 3, 0)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        drop(worker);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_try_next_is_empty_before_any_job() {
        let worker = DetectionWorker::spawn(Box::new(CountingDetector));
        assert!(worker.try_next().is_none());
    }
}

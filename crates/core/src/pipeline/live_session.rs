use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::select;

use crate::shared::error::FaceFeedError;

use super::detection_worker::DetectionWorker;
use super::orchestrator::{Completion, DetectionJob, DetectionOutcome, Orchestrator};

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

enum Event {
    Tick,
    Outcome(DetectionOutcome),
    WorkerGone,
    Idle,
}

/// Counters for one live session run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: usize,
    pub polls_submitted: usize,
    pub polls_skipped: usize,
    pub batches_applied: usize,
    pub batches_failed: usize,
    pub batches_discarded: usize,
}

impl SessionStats {
    fn record(&mut self, completion: &Completion) {
        match completion {
            Completion::Applied { .. } => self.batches_applied += 1,
            Completion::Failed(_) => self.batches_failed += 1,
            Completion::Discarded => self.batches_discarded += 1,
        }
    }
}

/// Drives continuous polling of an already started stream.
///
/// Each tick asks the orchestrator for a polling job and hands it to the
/// worker; ticks that land while a poll is in flight are dropped. Runs until
/// the stop flag is raised, `max_ticks` ticks have fired, or the camera
/// fails. The stream is stopped on return.
pub struct LiveSession<'a> {
    orchestrator: &'a mut Orchestrator,
    worker: &'a DetectionWorker,
    interval: Duration,
    stop: Arc<AtomicBool>,
    max_ticks: Option<usize>,
}

impl<'a> LiveSession<'a> {
    pub fn new(
        orchestrator: &'a mut Orchestrator,
        worker: &'a DetectionWorker,
        interval: Duration,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            orchestrator,
            worker,
            interval,
            stop,
            max_ticks: None,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<usize>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// `on_change` runs after every state change: a poll starting and a
    /// batch being applied.
    pub fn run(
        mut self,
        mut on_change: impl FnMut(&Orchestrator),
    ) -> Result<SessionStats, FaceFeedError> {
        let mut stats = SessionStats::default();
        let ticker = crossbeam_channel::tick(self.interval);

        let result = loop {
            if self.stop.load(Ordering::Relaxed) {
                log::info!("Live session stopped");
                break Ok(());
            }
            let ticks_done = self.max_ticks.is_some_and(|max| stats.ticks >= max);
            if ticks_done && !self.orchestrator.polling_in_flight() {
                break Ok(());
            }
            if !self.orchestrator.is_streaming() {
                break Ok(());
            }

            let event = select! {
                recv(ticker) -> _ => Event::Tick,
                recv(self.worker.outcomes()) -> outcome => match outcome {
                    Ok(outcome) => Event::Outcome(outcome),
                    Err(_) => Event::WorkerGone,
                },
                default(STOP_CHECK_INTERVAL) => Event::Idle,
            };

            match event {
                Event::Tick if !ticks_done => {
                    if let Err(e) = self.tick(&mut stats, &mut on_change) {
                        break Err(e);
                    }
                }
                Event::Outcome(outcome) => {
                    let completion = self.orchestrator.complete(outcome);
                    stats.record(&completion);
                    if !matches!(completion, Completion::Discarded) {
                        on_change(self.orchestrator);
                    }
                }
                Event::WorkerGone => {
                    break Err(FaceFeedError::DetectionFailure(
                        "detection worker stopped".into(),
                    ));
                }
                Event::Tick | Event::Idle => {}
            }
        };

        self.orchestrator.stop_stream();
        log::info!(
            "Live session: {} tick(s), {} poll(s), {} skipped, {} applied",
            stats.ticks,
            stats.polls_submitted,
            stats.polls_skipped,
            stats.batches_applied
        );
        result.map(|()| stats)
    }

    fn tick(
        &mut self,
        stats: &mut SessionStats,
        on_change: &mut impl FnMut(&Orchestrator),
    ) -> Result<(), FaceFeedError> {
        stats.ticks += 1;
        match self.orchestrator.poll_tick()? {
            Some(job) => {
                self.worker.submit(job)?;
                stats.polls_submitted += 1;
                on_change(self.orchestrator);
            }
            None => stats.polls_skipped += 1,
        }
        Ok(())
    }
}

/// Submits one on-demand job and waits for its outcome.
///
/// Outcomes of earlier jobs that arrive first are applied (or discarded)
/// along the way.
pub fn run_job(
    orchestrator: &mut Orchestrator,
    worker: &DetectionWorker,
    job: DetectionJob,
    timeout: Duration,
) -> Result<Completion, FaceFeedError> {
    let ticket = job.ticket;
    worker.submit(job)?;
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = worker.outcomes().recv_timeout(remaining).map_err(|_| {
            FaceFeedError::DetectionFailure(format!("no result within {timeout:?}"))
        })?;
        let is_target = outcome.ticket == ticket;
        let completion = orchestrator.complete(outcome);
        if is_target {
            return Ok(completion);
        }
    }
}

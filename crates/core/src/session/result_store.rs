use std::sync::Arc;

use crate::shared::face::DetectedFace;
use crate::shared::frame::Frame;

/// Identifies one detection request. Only the newest ticket can commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchTicket(u64);

impl BatchTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchStatus {
    Idle,
    Processing,
    Ready,
    Error(String),
}

/// What the overlay draws: the current still and its latest face batch.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBatchState {
    source_image: Option<Arc<Frame>>,
    faces: Vec<DetectedFace>,
    faces_frame_size: Option<(u32, u32)>,
    status: BatchStatus,
    generation: u64,
}

impl DetectionBatchState {
    fn idle(generation: u64) -> Self {
        Self {
            source_image: None,
            faces: Vec::new(),
            faces_frame_size: None,
            status: BatchStatus::Idle,
            generation,
        }
    }

    pub fn source_image(&self) -> Option<&Arc<Frame>> {
        self.source_image.as_ref()
    }

    /// Faces in engine order. While processing these belong to the
    /// previous batch; see [`faces_frame_size`](Self::faces_frame_size).
    pub fn faces(&self) -> &[DetectedFace] {
        &self.faces
    }

    /// Dimensions of the frame `faces` were computed on.
    pub fn faces_frame_size(&self) -> Option<(u32, u32)> {
        self.faces_frame_size
    }

    pub fn status(&self) -> &BatchStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_processing(&self) -> bool {
        self.status == BatchStatus::Processing
    }
}

/// Single owner of the current detection state.
///
/// Each `begin_processing` issues a new ticket; a commit carrying any other
/// ticket is stale and ignored. `clear` invalidates every outstanding ticket.
#[derive(Debug)]
pub struct ResultStore {
    state: DetectionBatchState,
    next_generation: u64,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            state: DetectionBatchState::idle(0),
            next_generation: 1,
        }
    }

    pub fn state(&self) -> &DetectionBatchState {
        &self.state
    }

    /// Replaces the source image and marks the store busy.
    ///
    /// The previous batch's faces stay in place until this request commits,
    /// so the overlay can keep showing them.
    pub fn begin_processing(&mut self, image: Arc<Frame>) -> BatchTicket {
        let ticket = BatchTicket(self.bump_generation());
        self.state.source_image = Some(image);
        self.state.status = BatchStatus::Processing;
        ticket
    }

    /// Publishes a batch. Returns `false` when the ticket is stale.
    pub fn commit_success(&mut self, ticket: BatchTicket, faces: Vec<DetectedFace>) -> bool {
        if !self.accepts(ticket) {
            log::debug!(
                "Discarding stale batch {} (current {})",
                ticket.0,
                self.state.generation
            );
            return false;
        }
        self.state.faces_frame_size = self.state.source_image.as_ref().map(|f| f.dimensions());
        self.state.faces = faces;
        self.state.status = BatchStatus::Ready;
        true
    }

    /// Records a failed request and drops the faces. Returns `false` when
    /// the ticket is stale.
    pub fn commit_error(&mut self, ticket: BatchTicket, message: impl Into<String>) -> bool {
        if !self.accepts(ticket) {
            log::debug!("Discarding stale error for batch {}", ticket.0);
            return false;
        }
        self.state.faces.clear();
        self.state.faces_frame_size = None;
        self.state.status = BatchStatus::Error(message.into());
        true
    }

    /// Back to idle with no image; outstanding tickets become stale.
    pub fn clear(&mut self) {
        let generation = self.bump_generation();
        self.state = DetectionBatchState::idle(generation);
    }

    fn accepts(&self, ticket: BatchTicket) -> bool {
        self.state.status == BatchStatus::Processing && ticket.0 == self.state.generation
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.state.generation = generation;
        generation
    }
}

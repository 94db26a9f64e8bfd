use crate::shared::error::FaceFeedError;
use crate::shared::frame::Frame;

/// A live capture device that can hand out still frames on request.
///
/// The device is held exclusively between `open` and `close`.
pub trait CameraSource: Send {
    /// Acquires the device. Fails with `DeviceUnavailable` or `DeviceBusy`.
    fn open(&mut self) -> Result<(), FaceFeedError>;

    /// Decodes the most recent frame at the device's native resolution.
    fn sample(&mut self) -> Result<Frame, FaceFeedError>;

    /// Releases the device. Safe to call when already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

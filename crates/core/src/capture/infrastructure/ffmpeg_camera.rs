use std::io::ErrorKind;
use std::time::{Duration, Instant};

use crate::capture::domain::camera_source::CameraSource;
use crate::shared::error::FaceFeedError;
use crate::shared::frame::Frame;

/// How long `sample` waits for the device to deliver a decodable frame.
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_DELAY: Duration = Duration::from_millis(5);
/// Upper bounds on skipping queued frames, for devices that never report
/// an empty queue.
const MAX_DRAINED_FRAMES: usize = 64;
const DRAIN_BUDGET: Duration = Duration::from_millis(100);

/// Decoded frames waiting in a device's capture queue.
trait FrameQueue {
    type Frame;

    /// Next queued frame, or `None` when nothing is waiting right now.
    fn poll(&mut self) -> Result<Option<Self::Frame>, FaceFeedError>;
}

/// Drains `queue` and returns the newest frame, waiting up to `timeout`
/// for one to arrive when the queue starts out empty.
fn newest_frame<Q: FrameQueue>(queue: &mut Q, timeout: Duration) -> Result<Option<Q::Frame>, FaceFeedError> {
    let deadline = Instant::now() + timeout;
    let mut newest = None;
    let mut drained = 0;
    let mut first_at = None;

    loop {
        match queue.poll()? {
            Some(frame) => {
                newest = Some(frame);
                drained += 1;
                let first = *first_at.get_or_insert_with(Instant::now);
                if drained >= MAX_DRAINED_FRAMES || first.elapsed() >= DRAIN_BUDGET {
                    break;
                }
            }
            None if newest.is_some() => break,
            None if Instant::now() >= deadline => break,
            None => std::thread::sleep(RETRY_DELAY),
        }
    }
    if drained > 1 {
        log::trace!("Skipped {} queued frame(s)", drained - 1);
    }
    Ok(newest)
}

/// Platform default libavdevice input for cameras.
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "video4linux2"
    }
}

struct OpenDevice {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<Scaler>,
    video_stream_index: usize,
}

struct Scaler {
    context: ffmpeg_next::software::scaling::Context,
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
}

/// Captures frames from a webcam through libavdevice.
///
/// The device is read without blocking. `sample` decodes everything queued
/// since the previous call and converts only the newest frame to RGB24 at
/// the device's native resolution.
pub struct FfmpegCamera {
    device: String,
    input_format: String,
    state: Option<OpenDevice>,
    next_index: usize,
}

// Safety: FfmpegCamera is owned by one thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(device: impl Into<String>, input_format: Option<String>) -> Self {
        Self {
            device: device.into(),
            input_format: input_format.unwrap_or_else(|| default_input_format().to_string()),
            state: None,
            next_index: 0,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn find_input_format(&self) -> Option<ffmpeg_next::format::format::Input> {
        ffmpeg_next::device::input::video().find_map(|format| match format {
            ffmpeg_next::format::Format::Input(input)
                if input.name().split(',').any(|n| n == self.input_format) =>
            {
                Some(input)
            }
            _ => None,
        })
    }

    fn open_device(&self) -> Result<OpenDevice, FaceFeedError> {
        ffmpeg_next::init().map_err(|e| FaceFeedError::DeviceUnavailable(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let input_format = self.find_input_format().ok_or_else(|| {
            FaceFeedError::DeviceUnavailable(format!(
                "capture backend '{}' is not available",
                self.input_format
            ))
        })?;

        let context = ffmpeg_next::format::open_with(
            &self.device,
            &ffmpeg_next::format::Format::Input(input_format),
            ffmpeg_next::Dictionary::new(),
        )
        .map_err(|e| map_open_error(&self.device, e))?;

        let mut ictx = match context {
            ffmpeg_next::format::context::Context::Input(ictx) => ictx,
            ffmpeg_next::format::context::Context::Output(_) => {
                return Err(FaceFeedError::DeviceUnavailable(format!(
                    "{} is not an input device",
                    self.device
                )))
            }
        };

        // Safety: the context is exclusively owned here and only its flags
        // field is written.
        unsafe {
            (*ictx.as_mut_ptr()).flags |=
                ffmpeg_next::ffi::AVFMT_FLAG_NONBLOCK as std::os::raw::c_int;
        }

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| {
                FaceFeedError::DeviceUnavailable(format!("{} has no video stream", self.device))
            })?;
        let video_stream_index = stream.index();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| FaceFeedError::DeviceUnavailable(format!("{}: {e}", self.device)))?;

        Ok(OpenDevice {
            ictx,
            decoder,
            scaler: None,
            video_stream_index,
        })
    }
}

impl CameraSource for FfmpegCamera {
    fn open(&mut self) -> Result<(), FaceFeedError> {
        if self.state.is_some() {
            return Ok(());
        }
        let device = self.open_device()?;
        log::info!(
            "Opened camera {} ({}x{})",
            self.device,
            device.decoder.width(),
            device.decoder.height()
        );
        self.state = Some(device);
        Ok(())
    }

    fn sample(&mut self) -> Result<Frame, FaceFeedError> {
        let Some(device) = self.state.as_mut() else {
            return Err(FaceFeedError::DeviceUnavailable("camera is not open".into()));
        };
        let mut queue = DeviceQueue {
            device: &mut *device,
            name: &self.device,
        };
        let decoded = newest_frame(&mut queue, SAMPLE_TIMEOUT)?.ok_or_else(|| {
            FaceFeedError::DeviceUnavailable(format!("{} stopped delivering frames", self.device))
        })?;

        let frame = convert_to_rgb(device, &decoded, self.next_index)
            .map_err(|e| FaceFeedError::DeviceUnavailable(format!("{}: {e}", self.device)))?;
        self.next_index += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("Closed camera {}", self.device);
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.close();
    }
}

struct DeviceQueue<'a> {
    device: &'a mut OpenDevice,
    name: &'a str,
}

impl FrameQueue for DeviceQueue<'_> {
    type Frame = ffmpeg_next::util::frame::video::Video;

    fn poll(&mut self) -> Result<Option<Self::Frame>, FaceFeedError> {
        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if self.device.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.device.ictx) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Other { errno }) if is_retryable(errno) => return Ok(None),
                Err(e) => return Err(map_read_error(self.name, e)),
            }
            if packet.stream() != self.device.video_stream_index {
                continue;
            }
            if let Err(e) = self.device.decoder.send_packet(&packet) {
                log::trace!("Dropped undecodable packet from {}: {e}", self.name);
            }
        }
    }
}

fn convert_to_rgb(
    device: &mut OpenDevice,
    decoded: &ffmpeg_next::util::frame::video::Video,
    index: usize,
) -> Result<Frame, ffmpeg_next::Error> {
    let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
    let stale = device
        .scaler
        .as_ref()
        .is_none_or(|s| s.format != format || s.width != width || s.height != height);
    if stale {
        let context = ffmpeg_next::software::scaling::Context::get(
            format,
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;
        device.scaler = Some(Scaler {
            context,
            format,
            width,
            height,
        });
    }
    let Some(scaler) = device.scaler.as_mut() else {
        return Err(ffmpeg_next::Error::Bug);
    };

    let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
    scaler.context.run(decoded, &mut rgb_frame)?;
    let pixels = extract_rgb_pixels(&rgb_frame, width, height);
    Ok(Frame::new(pixels, width, height, 3, index))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_len]);
    }
    pixels
}

fn is_retryable(errno: i32) -> bool {
    matches!(
        std::io::Error::from_raw_os_error(errno).kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn map_open_error(device: &str, error: ffmpeg_next::Error) -> FaceFeedError {
    match error {
        ffmpeg_next::Error::Other { errno } => {
            match std::io::Error::from_raw_os_error(errno).kind() {
                ErrorKind::ResourceBusy => FaceFeedError::DeviceBusy(device.to_string()),
                ErrorKind::PermissionDenied => {
                    FaceFeedError::DeviceUnavailable(format!("{device}: permission denied"))
                }
                ErrorKind::NotFound => {
                    FaceFeedError::DeviceUnavailable(format!("{device}: no such device"))
                }
                _ => FaceFeedError::DeviceUnavailable(format!("{device}: {error}")),
            }
        }
        other => FaceFeedError::DeviceUnavailable(format!("{device}: {other}")),
    }
}

fn map_read_error(device: &str, error: ffmpeg_next::Error) -> FaceFeedError {
    match error {
        ffmpeg_next::Error::Eof => {
            FaceFeedError::DeviceUnavailable(format!("{device}: stream ended"))
        }
        other => map_open_error(device, other),
    }
}

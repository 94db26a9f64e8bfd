use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use facefeed_core::config::app_config::AppConfig;
use facefeed_core::detection::domain::face_detector::FaceDetector;
use facefeed_core::detection::infrastructure::detector_factory::{build_detector, DownloadProgress};

pub enum EngineMessage {
    DownloadProgress {
        model: String,
        downloaded: u64,
        total: u64,
    },
    Ready(Box<dyn FaceDetector>),
    Error(String),
}

/// Builds the configured engine off the UI thread. Local models may need
/// downloading first; progress is reported on the returned channel.
pub fn spawn(config: AppConfig) -> Receiver<EngineMessage> {
    let (tx, rx) = crossbeam_channel::unbounded::<EngineMessage>();

    thread::spawn(move || {
        let progress_tx = tx.clone();
        let progress: DownloadProgress = Arc::new(move |model: &str, downloaded, total| {
            let _ = progress_tx.send(EngineMessage::DownloadProgress {
                model: model.to_string(),
                downloaded,
                total,
            });
        });

        let message = match build_detector(&config, Some(progress)) {
            Ok(detector) => EngineMessage::Ready(detector),
            Err(e) => {
                log::error!("Failed to build {} engine: {e}", config.engine);
                EngineMessage::Error(e.to_string())
            }
        };
        let _ = tx.send(message);
    });

    rx
}

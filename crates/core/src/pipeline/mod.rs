pub mod detection_worker;
pub mod live_session;
pub mod notifier;
pub mod orchestrator;

pub mod capture;
pub mod config;
pub mod detection;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod shared;

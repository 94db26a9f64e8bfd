pub mod constants;
pub mod data_uri;
pub mod error;
pub mod face;
pub mod frame;

pub mod engine_loader;

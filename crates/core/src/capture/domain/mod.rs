pub mod camera_source;
pub mod uploaded_file;

pub mod detector_factory;
pub mod gemini_face_detector;
pub mod model_resolver;
pub mod onnx_age_gender_estimator;
pub mod onnx_expression_scorer;
pub mod onnx_session;
pub mod onnx_yolo_localizer;
pub mod staged_face_analyzer;

pub mod box_prompt_refiner;
pub mod capability_factory;
pub mod energy_refiner;
mod execution_provider;
pub mod lucas_kanade_flow;
pub mod onnx_yolo_segmenter;

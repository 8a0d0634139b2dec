pub mod boundary_refiner;
pub mod flow_estimator;
pub mod interactive_refiner;
pub mod mask_fusion;
pub mod morphology;
pub mod person_segmenter;
pub mod raw_mask;
pub mod seeded_refiner;
pub mod temporal_smoother;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::segmentation::domain::interactive_refiner::InteractiveRefiner;
use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::bbox::BoundingBox;
use crate::shared::error::ProcessingError;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

use super::box_prompt_refiner::BoxPromptRefiner;
use super::energy_refiner::EnergyRefiner;
use super::execution_provider::execution_provider_names;
use super::onnx_yolo_segmenter::OnnxYoloSegmenter;

/// What a job asks the factory for. Only a different `model_path` reloads
/// the segmenter; the refiner is built once and handed out on request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SegmenterConfig {
    pub model_path: PathBuf,
    pub use_refiner: bool,
}

type SegmenterBuilder =
    Box<dyn Fn(&Path) -> Result<Box<dyn PersonSegmenter>, Box<dyn std::error::Error>> + Send + Sync>;
type RefinerBuilder = Box<dyn Fn() -> Box<dyn InteractiveRefiner> + Send + Sync>;
type SegmenterHandle = Arc<Mutex<Box<dyn PersonSegmenter>>>;
type RefinerHandle = Arc<Mutex<Box<dyn InteractiveRefiner>>>;

/// Handles to the loaded capabilities. Clones share the same model session.
#[derive(Clone)]
pub struct Capabilities {
    segmenter: SegmenterHandle,
    refiner: Option<RefinerHandle>,
}

impl Capabilities {
    pub fn segmenter(&self) -> Box<dyn PersonSegmenter> {
        Box::new(SharedSegmenter(self.segmenter.clone()))
    }

    pub fn refiner(&self) -> Option<Box<dyn InteractiveRefiner>> {
        self.refiner
            .as_ref()
            .map(|r| Box::new(SharedRefiner(r.clone())) as Box<dyn InteractiveRefiner>)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: &'static str,
    pub task: &'static str,
    pub model_path: String,
    pub execution_providers: Vec<&'static str>,
    pub refiner_enabled: bool,
}

#[derive(Default)]
struct Cache {
    segmenter: Option<(PathBuf, SegmenterHandle)>,
    refiner: Option<RefinerHandle>,
    last_config: Option<SegmenterConfig>,
}

/// Memoised detector/refiner construction. The segmenter is keyed by model
/// path, the refiner is cached on its own.
pub struct CapabilityFactory {
    build_segmenter: SegmenterBuilder,
    build_refiner: RefinerBuilder,
    cache: Mutex<Cache>,
}

impl CapabilityFactory {
    /// ONNX YOLO-seg detector and box-prompted graph-cut refiner.
    pub fn new() -> Self {
        Self::with_builders(
            Box::new(|path: &Path| -> Result<Box<dyn PersonSegmenter>, Box<dyn std::error::Error>> {
                Ok(Box::new(OnnxYoloSegmenter::new(path)?))
            }),
            Box::new(|| -> Box<dyn InteractiveRefiner> {
                Box::new(BoxPromptRefiner::new(Box::new(EnergyRefiner::default())))
            }),
        )
    }

    pub fn with_builders(build_segmenter: SegmenterBuilder, build_refiner: RefinerBuilder) -> Self {
        Self {
            build_segmenter,
            build_refiner,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Returns cached capabilities, loading the segmenter when the model
    /// path changed and building the refiner the first time one is wanted.
    pub fn get(&self, config: &SegmenterConfig) -> Result<Capabilities, ProcessingError> {
        let mut cache = lock(&self.cache);

        let cached = cache
            .segmenter
            .as_ref()
            .filter(|(path, _)| *path == config.model_path)
            .map(|(_, segmenter)| segmenter.clone());
        let segmenter = match cached {
            Some(segmenter) => segmenter,
            None => {
                if cache.segmenter.is_some() {
                    log::info!("Model path changed, reloading {}", config.model_path.display());
                }
                let built = (self.build_segmenter)(&config.model_path).map_err(|e| {
                    ProcessingError::Capability(format!(
                        "could not load {}: {e}",
                        config.model_path.display()
                    ))
                })?;
                let segmenter = Arc::new(Mutex::new(built));
                cache.segmenter = Some((config.model_path.clone(), segmenter.clone()));
                segmenter
            }
        };

        let refiner = if config.use_refiner {
            let build = &self.build_refiner;
            Some(
                cache
                    .refiner
                    .get_or_insert_with(|| Arc::new(Mutex::new(build())))
                    .clone(),
            )
        } else {
            None
        };

        cache.last_config = Some(config.clone());
        Ok(Capabilities { segmenter, refiner })
    }

    /// Drops everything cached; the next `get` rebuilds it.
    pub fn invalidate(&self) {
        *lock(&self.cache) = Cache::default();
    }

    /// Describes the configuration of the most recent successful `get`.
    pub fn model_info(&self) -> Option<ModelInfo> {
        lock(&self.cache).last_config.as_ref().map(|cfg| ModelInfo {
            model_type: "YOLO-seg",
            task: "instance_segmentation",
            model_path: cfg.model_path.display().to_string(),
            execution_providers: execution_provider_names(),
            refiner_enabled: cfg.use_refiner,
        })
    }
}

impl Default for CapabilityFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct SharedSegmenter(SegmenterHandle);

impl PersonSegmenter for SharedSegmenter {
    fn segment(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<RawMask>, Box<dyn std::error::Error>> {
        lock(&self.0).segment(frame, confidence)
    }
}

struct SharedRefiner(RefinerHandle);

impl InteractiveRefiner for SharedRefiner {
    fn refine(
        &mut self,
        frame: &Frame,
        bbox: BoundingBox,
        mask_hint: &Mask,
    ) -> Result<(Mask, f32), Box<dyn std::error::Error>> {
        lock(&self.0).refine(frame, bbox, mask_hint)
    }
}

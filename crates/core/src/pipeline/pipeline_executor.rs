use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::selective_filter_pipeline::SelectiveFilterPipeline;
use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

/// What the per-frame callback sees after a frame went through the pipeline.
pub struct FrameReport<'a> {
    /// 1-based count of frames processed so far.
    pub current: usize,
    /// Container frame count; 0 when unknown.
    pub total: usize,
    pub source: &'a Frame,
    pub raw_masks: &'a [RawMask],
}

pub type FrameCallback = Box<dyn FnMut(&FrameReport<'_>) + Send>;

/// Configuration for a pipeline execution run.
pub struct PipelineConfig {
    pub confidence: f32,
    pub on_frame: Option<FrameCallback>,
    pub cancelled: Arc<AtomicBool>,
    pub logger: Box<dyn PipelineLogger>,
}

/// Counters gathered while executing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionSummary {
    pub frames: usize,
    pub frames_with_person: usize,
    pub inference_time: Duration,
    pub cancelled: bool,
}

/// Abstracts how the read → segment → filter → write pipeline is executed.
///
/// This is a port (application-layer interface). Infrastructure provides
/// concrete implementations. The writer arrives already opened; the
/// executor closes both reader and writer.
pub trait PipelineExecutor: Send {
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        segmenter: Box<dyn PersonSegmenter>,
        pipeline: SelectiveFilterPipeline,
        metadata: &VideoMetadata,
        config: PipelineConfig,
    ) -> Result<ExecutionSummary, Box<dyn std::error::Error>>;
}

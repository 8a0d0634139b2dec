use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::filtering::domain::compositor::NoPersonBehavior;
use crate::pipeline::pipeline_executor::{
    ExecutionSummary, FrameReport, PipelineConfig, PipelineExecutor,
};
use crate::pipeline::selective_filter_pipeline::SelectiveFilterPipeline;
use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::shared::constants::LOG_INTERVAL_FRAMES;
use crate::shared::error::ProcessingError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Executes the filter pipeline with dedicated threads for decode and encode.
///
/// Layout: `reader → main [segment/fuse/refine/smooth/composite] → writer`
///
/// Segmentation and the stateful pipeline run sequentially on the calling
/// thread; decode and encode overlap with them through bounded queues.
pub struct ThreadedPipelineExecutor {
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        segmenter: Box<dyn PersonSegmenter>,
        pipeline: SelectiveFilterPipeline,
        metadata: &VideoMetadata,
        config: PipelineConfig,
    ) -> Result<ExecutionSummary, Box<dyn std::error::Error>> {
        let cap = self.channel_capacity;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Result<Frame, SendError>>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<Frame>(cap);

        let reader_handle = spawn_reader(reader, frame_tx, config.cancelled.clone());
        let writer_handle = spawn_writer(writer, write_rx);

        let mut main_loop = MainLoop {
            segmenter,
            pipeline,
            total: metadata.total_frames,
            config,
            summary: ExecutionSummary::default(),
        };
        let main_error = main_loop.run(frame_rx, &write_tx).err();
        main_loop.config.logger.summary();

        drop(write_tx);

        join_threads(reader_handle, writer_handle, main_error)?;
        Ok(main_loop.summary)
    }
}

fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    frame_tx: crossbeam_channel::Sender<Result<Frame, SendError>>,
    cancelled: Arc<AtomicBool>,
) -> std::thread::JoinHandle<Box<dyn VideoReader>> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let mapped = frame_result.map_err(|e| -> SendError { e.to_string().into() });
            if frame_tx.send(mapped).is_err() {
                break;
            }
        }
        reader.close();
        reader
    })
}

fn spawn_writer(
    mut writer: Box<dyn VideoWriter>,
    write_rx: crossbeam_channel::Receiver<Frame>,
) -> std::thread::JoinHandle<Result<Box<dyn VideoWriter>, SendError>> {
    std::thread::spawn(move || {
        for frame in write_rx {
            if let Err(e) = writer.write(&frame) {
                // Finalise what was written so far; the partial file stays on disk.
                let _ = writer.close();
                return Err(e.to_string().into());
            }
        }
        Ok(writer)
    })
}

struct MainLoop {
    segmenter: Box<dyn PersonSegmenter>,
    pipeline: SelectiveFilterPipeline,
    total: usize,
    config: PipelineConfig,
    summary: ExecutionSummary,
}

impl MainLoop {
    fn run(
        &mut self,
        frame_rx: crossbeam_channel::Receiver<Result<Frame, SendError>>,
        write_tx: &crossbeam_channel::Sender<Frame>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for frame_result in frame_rx {
            if self.config.cancelled.load(Ordering::Relaxed) {
                self.summary.cancelled = true;
                log::info!("Cancelled after {} frames", self.summary.frames);
                break;
            }

            let frame = frame_result.map_err(|e| ProcessingError::Frame {
                index: self.summary.frames,
                message: e.to_string(),
            })?;
            self.process_frame(frame, write_tx)?;
        }
        Ok(())
    }

    fn process_frame(
        &mut self,
        frame: Frame,
        write_tx: &crossbeam_channel::Sender<Frame>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let started = Instant::now();
        let raw_masks = self
            .segmenter
            .segment(&frame, self.config.confidence)
            .map_err(|e| ProcessingError::Frame {
                index: frame.index(),
                message: e.to_string(),
            })?;
        let inference = started.elapsed();

        let started = Instant::now();
        let outcome = self.pipeline.process(&frame, &raw_masks);
        let pipeline_time = started.elapsed();

        self.summary.frames += 1;
        self.summary.inference_time += inference;
        if outcome.has_person() {
            self.summary.frames_with_person += 1;
        }
        let current = self.summary.frames;

        let logger = &mut self.config.logger;
        logger.timing("segment", ms(inference));
        logger.timing("pipeline", ms(pipeline_time));
        logger.metric("persons", outcome.persons as f64);
        logger.progress(current, self.total);

        if current % LOG_INTERVAL_FRAMES == 0 {
            log_frame(current, outcome.persons, self.pipeline.settings().no_person_behavior);
        }

        if let Some(callback) = self.config.on_frame.as_mut() {
            callback(&FrameReport {
                current,
                total: self.total,
                source: &frame,
                raw_masks: &raw_masks,
            });
        }

        write_tx
            .send(outcome.frame)
            .map_err(|_| ProcessingError::Write("writer channel closed unexpectedly".into()))?;
        Ok(())
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn log_frame(current: usize, persons: usize, behavior: NoPersonBehavior) {
    match (persons, behavior) {
        (0, NoPersonBehavior::KeepOriginal) => {
            log::info!("Frame {current}: no person detected, keeping original")
        }
        (0, NoPersonBehavior::ApplyFilter) => {
            log::info!("Frame {current}: no person detected, applying full filter")
        }
        (n, _) => log::info!("Frame {current}: detected {n} person(s)"),
    }
}

/// Joins the I/O threads and coalesces the first error encountered.
fn join_threads(
    reader_handle: std::thread::JoinHandle<Box<dyn VideoReader>>,
    writer_handle: std::thread::JoinHandle<Result<Box<dyn VideoWriter>, SendError>>,
    mut first_error: Option<Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    fn set_if_none(slot: &mut Option<Box<dyn std::error::Error>>, err: Box<dyn std::error::Error>) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match reader_handle.join() {
        Ok(mut r) => r.close(),
        Err(_) => set_if_none(&mut first_error, "Reader thread panicked".into()),
    }

    match writer_handle.join() {
        Ok(Ok(mut w)) => {
            if let Err(e) = w.close() {
                set_if_none(&mut first_error, ProcessingError::Write(e.to_string()).into());
            }
        }
        Ok(Err(e)) => set_if_none(&mut first_error, ProcessingError::Write(e.to_string()).into()),
        Err(_) => set_if_none(&mut first_error, "Writer thread panicked".into()),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

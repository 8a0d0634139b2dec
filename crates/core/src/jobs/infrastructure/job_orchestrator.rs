use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::filtering::infrastructure::filter_factory::create_filter;
use crate::jobs::domain::job::{JobEvent, JobId, JobParams, JobStatus};
use crate::jobs::domain::job_error::JobError;
use crate::jobs::domain::job_registry::JobRegistry;
use crate::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use crate::pipeline::pipeline_executor::{FrameCallback, FrameReport};
use crate::pipeline::pipeline_logger::StdoutPipelineLogger;
use crate::pipeline::preview_pipeline::PreviewPipeline;
use crate::pipeline::process_video_use_case::ProcessVideoUseCase;
use crate::pipeline::selective_filter_pipeline::SelectiveFilterPipeline;
use crate::segmentation::domain::boundary_refiner::BoundaryRefiner;
use crate::segmentation::domain::temporal_smoother::{TemporalConfig, TemporalSmoother};
use crate::segmentation::infrastructure::capability_factory::{CapabilityFactory, SegmenterConfig};
use crate::segmentation::infrastructure::energy_refiner::EnergyRefiner;
use crate::segmentation::infrastructure::lucas_kanade_flow::LucasKanadeFlow;
use crate::shared::constants::{PREVIEW_INTERVAL_FRAMES, PROGRESS_INTERVAL_FRAMES};
use crate::video::domain::audio_remuxer::AudioRemuxer;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
use crate::video::infrastructure::ffmpeg_remuxer::FfmpegRemuxer;
use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use crate::video::infrastructure::image_file_writer::ImageFileWriter;

/// Builds fresh media adapters for each job.
pub trait MediaBackend: Send + Sync {
    fn reader(&self) -> Box<dyn VideoReader>;
    fn writer(&self) -> Box<dyn VideoWriter>;
    fn image_writer(&self) -> Box<dyn ImageWriter>;
    fn remuxer(&self) -> Box<dyn AudioRemuxer>;
}

/// ffmpeg-next for decode/encode, the `ffmpeg` binary for remuxing and the
/// `image` crate for preview JPEGs.
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn reader(&self) -> Box<dyn VideoReader> {
        Box::new(FfmpegReader::new())
    }

    fn writer(&self) -> Box<dyn VideoWriter> {
        Box::new(FfmpegWriter::new())
    }

    fn image_writer(&self) -> Box<dyn ImageWriter> {
        Box::new(ImageFileWriter::default())
    }

    fn remuxer(&self) -> Box<dyn AudioRemuxer> {
        Box::new(FfmpegRemuxer::new())
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Input videos are looked up here by video id.
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub model_path: PathBuf,
    pub progress_interval: usize,
    pub preview_interval: usize,
}

impl OrchestratorConfig {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf, preview_dir: PathBuf, model_path: PathBuf) -> Self {
        Self {
            upload_dir,
            output_dir,
            preview_dir,
            model_path,
            progress_interval: PROGRESS_INTERVAL_FRAMES,
            preview_interval: PREVIEW_INTERVAL_FRAMES,
        }
    }
}

/// Everything a worker thread needs, shared between all workers.
struct WorkerContext {
    registry: JobRegistry,
    capabilities: Arc<CapabilityFactory>,
    backend: Arc<dyn MediaBackend>,
    config: OrchestratorConfig,
}

/// Runs each job on its own worker thread.
///
/// `start` returns as soon as the worker is spawned. Workers nobody joins
/// are reaped by the next `start` once they have exited.
pub struct JobOrchestrator {
    context: Arc<WorkerContext>,
    workers: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl JobOrchestrator {
    pub fn new(
        registry: JobRegistry,
        capabilities: Arc<CapabilityFactory>,
        backend: Arc<dyn MediaBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                registry,
                capabilities,
                backend,
                config,
            }),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.context.registry
    }

    pub fn start(&self, video_id: &str, params: JobParams) -> Result<JobId, JobError> {
        params.validate()?;
        self.reap_finished();
        let id = self.context.registry.create(video_id, params);

        let context = self.context.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || run_job(&context, id));

        match spawned {
            Ok(handle) => {
                self.workers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, handle);
                Ok(id)
            }
            Err(e) => {
                let _ = self.context.registry.update_status(
                    id,
                    JobStatus::Failed,
                    Some(format!("could not start worker: {e}")),
                );
                Err(JobError::Spawn(e))
            }
        }
    }

    /// Waits for the job's worker to finish. Joining twice is a no-op.
    pub fn join(&self, id: JobId) -> Result<(), JobError> {
        if self.context.registry.status(id).is_none() {
            return Err(JobError::NotFound(id));
        }
        let handle = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some(handle) = handle {
            self.reap(id, handle);
        }
        Ok(())
    }

    pub fn cancel(&self, id: JobId) -> Result<(), JobError> {
        self.context.registry.cancel(id)
    }

    /// Joins workers that have already exited so detached jobs do not pile
    /// up handles.
    fn reap_finished(&self) {
        let finished: Vec<(JobId, JoinHandle<()>)> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<JobId> = workers
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| workers.remove(&id).map(|handle| (id, handle)))
                .collect()
        };
        for (id, handle) in finished {
            self.reap(id, handle);
        }
    }

    fn reap(&self, id: JobId, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            log::error!("Worker for job {id} panicked");
            let _ = self.context.registry.update_status(
                id,
                JobStatus::Failed,
                Some("worker panicked".into()),
            );
        }
    }

    #[cfg(test)]
    fn tracked_workers(&self) -> (usize, usize) {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let finished = workers.values().filter(|h| h.is_finished()).count();
        (workers.len(), finished)
    }
}

fn run_job(context: &WorkerContext, id: JobId) {
    if let Err(e) = context
        .registry
        .update_status(id, JobStatus::Processing, None)
    {
        log::info!("Job {id} not started: {e}");
        return;
    }

    match process_job(context, id) {
        Ok(()) => log::info!("Job {id} finished"),
        Err(e) => {
            log::error!("Job {id} failed: {e}");
            let _ = context
                .registry
                .update_status(id, JobStatus::Failed, Some(e.to_string()));
        }
    }
}

fn process_job(context: &WorkerContext, id: JobId) -> Result<(), Box<dyn std::error::Error>> {
    let registry = &context.registry;
    let config = &context.config;
    let view = registry.view(id).ok_or(JobError::NotFound(id))?;
    let cancelled = registry.cancel_token(id).ok_or(JobError::NotFound(id))?;
    let params = view.params;

    let input = config.upload_dir.join(&view.video_id);
    let output = config.output_dir.join(&view.output_video_id);
    let raw_output = config.output_dir.join(format!("processed_{id}_raw.mp4"));

    let capabilities = context.capabilities.get(&SegmenterConfig {
        model_path: config.model_path.clone(),
        use_refiner: params.use_refiner,
    })?;

    let pipeline = SelectiveFilterPipeline::new(
        create_filter(params.filter_type),
        params.pipeline_settings(),
        BoundaryRefiner::new(Box::new(EnergyRefiner::default())),
        TemporalSmoother::new(TemporalConfig::default(), Box::new(LucasKanadeFlow::default())),
        if params.use_refiner {
            capabilities.refiner()
        } else {
            None
        },
    );

    let on_frame = progress_callback(context, id, &params);

    let mut use_case = ProcessVideoUseCase::new(
        context.backend.reader(),
        context.backend.writer(),
        capabilities.segmenter(),
        pipeline,
        Box::new(ThreadedPipelineExecutor::new()),
        params.filter_settings(),
        Some(on_frame),
        Some(cancelled.clone()),
        Some(Box::new(StdoutPipelineLogger::default())),
    );
    let stats = use_case.execute(&input, &raw_output)?;

    if cancelled.load(Ordering::Relaxed) {
        log::info!(
            "Job {id} cancelled, leaving partial output at {}",
            raw_output.display()
        );
        return Ok(());
    }

    let outcome = context
        .backend
        .remuxer()
        .remux(&input, &raw_output, &output)?;
    log::info!("Job {id}: output {} ({outcome:?})", output.display());

    registry.set_stats(id, stats)?;
    registry.push_event(
        id,
        JobEvent::StreamReady {
            output_video_id: view.output_video_id.clone(),
            output_path: output.clone(),
        },
    )?;
    if let Err(e) = registry.update_status(id, JobStatus::Complete, None) {
        log::info!("Job {id} finished after it was closed: {e}");
    }
    Ok(())
}

/// Per-frame hook: previews every `preview_interval` frames, progress every
/// `progress_interval` frames and on the last frame, and one segment per
/// completed progress batch.
fn progress_callback(context: &WorkerContext, id: JobId, params: &JobParams) -> FrameCallback {
    let registry = context.registry.clone();
    let progress_interval = context.config.progress_interval.max(1);
    let preview_interval = context.config.preview_interval.max(1);
    let preview_path = context.config.preview_dir.join(format!("{id}_preview.jpg"));
    let preview = PreviewPipeline::new(
        create_filter(params.filter_type),
        params.apply_to,
        params.no_person_behavior,
    );
    let image_writer = context.backend.image_writer();
    let started = Instant::now();

    Box::new(move |report: &FrameReport<'_>| {
        let elapsed = started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            report.current as f64 / elapsed
        } else {
            0.0
        };

        let preview_written = report.current % preview_interval == 0
            && write_preview(&preview, image_writer.as_ref(), report, &preview_path);
        let batch_done = report.current % progress_interval == 0;

        if preview_written || batch_done || report.current == report.total {
            let _ = registry.update_progress(
                id,
                report.current,
                report.total,
                fps,
                preview_written.then(|| preview_path.clone()),
            );
        }
        if batch_done {
            let _ = registry.add_segment(id, report.current / progress_interval);
        }
    })
}

fn write_preview(
    preview: &PreviewPipeline,
    image_writer: &dyn ImageWriter,
    report: &FrameReport<'_>,
    path: &Path,
) -> bool {
    let rendered = preview.render(report.source, report.raw_masks);
    match image_writer.write(path, &rendered) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to save preview frame: {e}");
            false
        }
    }
}

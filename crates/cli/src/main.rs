use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use selective_filter_core::filtering::domain::compositor::{ApplyTo, NoPersonBehavior};
use selective_filter_core::filtering::domain::filter_type::FilterType;
use selective_filter_core::filtering::infrastructure::filter_factory::create_filter;
use selective_filter_core::jobs::domain::job::{JobEvent, JobParams, JobStatus};
use selective_filter_core::jobs::domain::job_registry::JobRegistry;
use selective_filter_core::jobs::infrastructure::event_stream::{EventStream, StreamItem};
use selective_filter_core::jobs::infrastructure::job_orchestrator::{
    FfmpegBackend, JobOrchestrator, OrchestratorConfig,
};
use selective_filter_core::pipeline::filter_previews_use_case::FilterPreviewsUseCase;
use selective_filter_core::segmentation::domain::boundary_refiner::RefinementPolicy;
use selective_filter_core::segmentation::infrastructure::capability_factory::{
    CapabilityFactory, SegmenterConfig,
};
use selective_filter_core::shared::constants::{VIDEO_EXTENSIONS, YOLO_SEG_MODEL_NAME};
use selective_filter_core::shared::model_resolver;
use selective_filter_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use selective_filter_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Applies a visual filter to either the people or the background of a video.
#[derive(Parser)]
#[command(name = "selective-filter")]
struct Cli {
    /// Input video file.
    #[arg(required_unless_present = "list_filters")]
    input: Option<PathBuf>,

    /// Output file (defaults to processed_<job id>.mp4 in --output-dir).
    output: Option<PathBuf>,

    /// Filter: grayscale, blur or sepia.
    #[arg(long, default_value = "grayscale")]
    filter: FilterType,

    /// Which part of the frame is filtered: background or person.
    #[arg(long, default_value = "background")]
    apply_to: ApplyTo,

    /// Frames without a person: keep_original or apply_filter.
    #[arg(long, default_value = "keep_original")]
    no_person: NoPersonBehavior,

    /// Person detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f32,

    /// Filter the whole frame instead of the tracked person's half.
    #[arg(long)]
    full_frame: bool,

    /// Padding around the person box as a fraction of its size (0.0-1.0).
    #[arg(long, default_value = "0.3")]
    roi_expansion: f64,

    /// Mask edge refinement: minimal, balanced or aggressive.
    #[arg(long, default_value = "balanced")]
    boundary_refinement: RefinementPolicy,

    /// Refine each person mask with the box-prompted refiner.
    #[arg(long)]
    use_refiner: bool,

    /// Segmentation model (ONNX). Resolved from the model cache when omitted.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Download URL for the segmentation model when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Directory for processed videos.
    #[arg(long, default_value = "processed")]
    output_dir: PathBuf,

    /// Directory for preview frames.
    #[arg(long, default_value = "previews")]
    preview_dir: PathBuf,

    /// Render the first frame once per filter into --preview-dir and exit.
    #[arg(long)]
    filter_previews: bool,

    /// Print job events to stdout as server-sent events.
    #[arg(long)]
    events: bool,

    /// Print the available filters as JSON and exit.
    #[arg(long)]
    list_filters: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.list_filters {
        println!("{}", serde_json::to_string_pretty(&FilterType::catalog())?);
        return Ok(());
    }

    let input = cli.input.clone().ok_or("Input file is required")?;
    let params = job_params(&cli);
    validate(&input, &params)?;
    fs::create_dir_all(&cli.preview_dir)?;

    let model_path = resolve_model(&cli)?;

    if cli.filter_previews {
        run_filter_previews(&cli, &input, &model_path, &params)
    } else {
        run_job(&cli, &input, model_path, params)
    }
}

fn run_filter_previews(
    cli: &Cli,
    input: &Path,
    model_path: &Path,
    params: &JobParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let capabilities = CapabilityFactory::new().get(&SegmenterConfig {
        model_path: model_path.to_path_buf(),
        use_refiner: false,
    })?;
    let mut use_case = FilterPreviewsUseCase::new(
        Box::new(FfmpegReader::new()),
        capabilities.segmenter(),
        Box::new(ImageFileWriter::default()),
        create_filter,
        cli.preview_dir.clone(),
    );
    let previews = use_case.execute(
        input,
        &video_id(input)?,
        params.apply_to,
        params.confidence_threshold,
    )?;
    println!("{}", serde_json::to_string_pretty(&previews)?);
    Ok(())
}

fn run_job(
    cli: &Cli,
    input: &Path,
    model_path: PathBuf,
    params: JobParams,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&cli.output_dir)?;
    let upload_dir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let registry = JobRegistry::default();
    let orchestrator = JobOrchestrator::new(
        registry.clone(),
        Arc::new(CapabilityFactory::new()),
        Arc::new(FfmpegBackend),
        OrchestratorConfig::new(
            upload_dir,
            cli.output_dir.clone(),
            cli.preview_dir.clone(),
            model_path,
        ),
    );

    let id = orchestrator.start(&video_id(input)?, params)?;
    log::info!("Started job {id}");

    for item in EventStream::open(registry.clone(), id)? {
        if cli.events {
            print!("{}", item.to_sse());
        } else {
            report(&item);
        }
    }
    orchestrator.join(id)?;

    let view = registry.view(id).ok_or("job disappeared")?;
    match view.status {
        JobStatus::Complete => {
            let produced = cli.output_dir.join(&view.output_video_id);
            let final_path = match &cli.output {
                Some(output) => {
                    move_file(&produced, output)?;
                    output.clone()
                }
                None => produced,
            };
            log::info!("Output written to {}", final_path.display());
            if !cli.events {
                if let Some(stats) = &view.stats {
                    println!("{}", serde_json::to_string_pretty(stats)?);
                }
            }
            Ok(())
        }
        JobStatus::Cancelled => Err("job was cancelled".into()),
        _ => Err(view
            .error
            .unwrap_or_else(|| format!("job ended as {}", view.status))
            .into()),
    }
}

fn report(item: &StreamItem) {
    match item {
        StreamItem::Event(JobEvent::Progress(p)) => {
            eprint!(
                "\rProcessing frame {}/{} ({:.1} fps, ETA {:.0}s)",
                p.current, p.total, p.fps, p.eta_seconds
            );
        }
        StreamItem::Event(JobEvent::Status { status, error }) => match error {
            Some(e) => log::error!("Job {status}: {e}"),
            None => log::info!("Job {status}"),
        },
        StreamItem::Event(JobEvent::StreamReady { output_path, .. }) => {
            eprintln!();
            log::info!("Stream ready: {}", output_path.display());
        }
        StreamItem::Keepalive => {}
    }
}

fn job_params(cli: &Cli) -> JobParams {
    JobParams {
        filter_type: cli.filter,
        apply_to: cli.apply_to,
        no_person_behavior: cli.no_person,
        confidence_threshold: cli.confidence,
        region_aware: !cli.full_frame,
        roi_expansion: cli.roi_expansion,
        boundary_refinement: cli.boundary_refinement,
        use_refiner: cli.use_refiner,
    }
}

fn validate(input: &Path, params: &JobParams) -> Result<(), Box<dyn std::error::Error>> {
    if !input.is_file() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if !is_video(input) {
        return Err(format!(
            "Unsupported file type: {} (expected one of: {})",
            input.display(),
            VIDEO_EXTENSIONS.join(", ")
        )
        .into());
    }
    params.validate()?;
    Ok(())
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn video_id(input: &Path) -> Result<String, Box<dyn std::error::Error>> {
    input
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Invalid input file name: {}", input.display()).into())
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(model) = &cli.model {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
        return Ok(model.clone());
    }
    log::info!("Resolving model: {YOLO_SEG_MODEL_NAME}");
    let path = model_resolver::resolve(
        YOLO_SEG_MODEL_NAME,
        cli.model_url.as_deref(),
        None,
        Some(Box::new(download_progress)),
    )?;
    Ok(path)
}

/// Renames, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading segmentation model... {pct}%");
    } else {
        eprint!("\rDownloading segmentation model... {downloaded} bytes");
    }
}

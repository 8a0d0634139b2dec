use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filtering::domain::compositor::{ApplyTo, NoPersonBehavior};
use crate::filtering::domain::filter_type::FilterType;
use crate::jobs::domain::event_channel::EventChannel;
use crate::jobs::domain::job_error::JobError;
use crate::pipeline::processing_stats::{FilterSettings, ProcessingStats};
use crate::pipeline::selective_filter_pipeline::PipelineSettings;
use crate::segmentation::domain::boundary_refiner::RefinementPolicy;

pub type JobId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one processing request. Missing fields take defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobParams {
    pub filter_type: FilterType,
    pub apply_to: ApplyTo,
    pub no_person_behavior: NoPersonBehavior,
    pub confidence_threshold: f32,
    pub region_aware: bool,
    pub roi_expansion: f64,
    pub boundary_refinement: RefinementPolicy,
    #[serde(alias = "use_sam")]
    pub use_refiner: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Grayscale,
            apply_to: ApplyTo::Background,
            no_person_behavior: NoPersonBehavior::KeepOriginal,
            confidence_threshold: 0.5,
            region_aware: true,
            roi_expansion: 0.3,
            boundary_refinement: RefinementPolicy::Balanced,
            use_refiner: false,
        }
    }
}

impl JobParams {
    pub fn validate(&self) -> Result<(), JobError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(JobError::InvalidParams(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.roi_expansion) {
            return Err(JobError::InvalidParams(format!(
                "roi_expansion must be within [0, 1], got {}",
                self.roi_expansion
            )));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            apply_to: self.apply_to,
            no_person_behavior: self.no_person_behavior,
            region_aware: self.region_aware,
            roi_expansion: self.roi_expansion,
            refinement: self.boundary_refinement,
        }
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            filter_type: self.filter_type,
            apply_to: self.apply_to,
            no_person_behavior: self.no_person_behavior,
            confidence_threshold: self.confidence_threshold,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub fps: f64,
    pub eta_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PathBuf>,
}

impl ProgressSnapshot {
    /// Percentage and ETA are 0 when total or fps are unknown; all floats
    /// are rounded to two decimals.
    pub fn compute(current: usize, total: usize, fps: f64, preview: Option<PathBuf>) -> Self {
        let percentage = if total > 0 {
            current as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let remaining = total.saturating_sub(current) as f64;
        let eta_seconds = if fps > 0.0 { remaining / fps } else { 0.0 };

        Self {
            current,
            total,
            percentage: round2(percentage),
            fps: round2(fps),
            eta_seconds: round2(eta_seconds),
            preview,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One entry of a job's event stream, serialised as
/// `{"type": "...", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressSnapshot),
    Status {
        status: JobStatus,
        error: Option<String>,
    },
    StreamReady {
        output_video_id: String,
        output_path: PathBuf,
    },
}

/// A processing run and everything readers may ask about it.
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub video_id: String,
    pub params: JobParams,
    pub progress: ProgressSnapshot,
    pub segments: Vec<usize>,
    pub output_video_id: String,
    pub latest_preview: Option<PathBuf>,
    pub error: Option<String>,
    pub stats: Option<ProcessingStats>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub events: EventChannel,
    pub cancel: Arc<AtomicBool>,
}

impl Job {
    pub fn new(video_id: &str, params: JobParams, event_capacity: usize) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            status: JobStatus::Queued,
            video_id: video_id.to_string(),
            params,
            progress: ProgressSnapshot::default(),
            segments: Vec::new(),
            output_video_id: format!("processed_{id}.mp4"),
            latest_preview: None,
            error: None,
            stats: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            events: EventChannel::new(event_capacity),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            status: self.status,
            video_id: self.video_id.clone(),
            params: self.params.clone(),
            progress: self.progress.clone(),
            segments: self.segments.clone(),
            output_video_id: self.output_video_id.clone(),
            latest_preview: self.latest_preview.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            stats: match self.status {
                JobStatus::Complete => self.stats.clone(),
                _ => None,
            },
        }
    }
}

/// Serialisable snapshot of a [`Job`] without its channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub video_id: String,
    pub params: JobParams,
    pub progress: ProgressSnapshot,
    pub segments: Vec<usize>,
    pub output_video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_preview: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessingStats>,
}

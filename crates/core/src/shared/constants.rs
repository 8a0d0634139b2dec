use std::time::Duration;

/// YOLO instance-segmentation model exported to ONNX (COCO classes).
pub const YOLO_SEG_MODEL_NAME: &str = "yolo11n-seg.onnx";

/// COCO class id of "person".
pub const PERSON_CLASS_ID: usize = 0;

/// Progress snapshots are pushed once per batch of this many frames.
pub const PROGRESS_INTERVAL_FRAMES: usize = 30;

/// A preview frame is rendered every this many frames.
pub const PREVIEW_INTERVAL_FRAMES: usize = 10;

/// Per-frame log lines are emitted every this many frames.
pub const LOG_INTERVAL_FRAMES: usize = 100;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub const STREAM_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on one external transcoder run.
pub const REMUX_TIMEOUT: Duration = Duration::from_secs(300);

pub const PREVIEW_JPEG_QUALITY: u8 = 85;

/// Side length of the square Gaussian kernel used by the blur filter.
pub const BLUR_KERNEL_SIZE: usize = 21;

/// Side length of the mask hint handed to the interactive refiner.
pub const REFINER_HINT_SIZE: u32 = 256;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Clip length in seconds, 0 when the frame rate is unknown.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(fps: f64, total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            fps,
            total_frames,
            codec: "h264".to_string(),
            source_path: Some(PathBuf::from("/tmp/test.mp4")),
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(meta(30.0, 900).duration_seconds(), 30.0);
        assert_eq!(meta(25.0, 50).duration_seconds(), 2.0);
    }

    #[test]
    fn test_duration_without_frame_rate() {
        assert_eq!(meta(0.0, 900).duration_seconds(), 0.0);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = meta(24.0, 100);
        let mut cloned = original.clone();
        cloned.codec = "vp9".to_string();
        assert_eq!(original.codec, "h264");
    }
}

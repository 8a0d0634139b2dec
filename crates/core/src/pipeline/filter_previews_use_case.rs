use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::filtering::domain::compositor::{ApplyTo, NoPersonBehavior};
use crate::filtering::domain::filter_type::FilterType;
use crate::filtering::domain::frame_filter::FrameFilter;
use crate::pipeline::preview_pipeline::PreviewPipeline;
use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::shared::error::ProcessingError;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::VideoReader;

pub type FilterFactory = fn(FilterType) -> Box<dyn FrameFilter>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterPreview {
    pub filter_id: FilterType,
    pub filter_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterPreviews {
    pub video_id: String,
    pub person_detected: bool,
    pub frame_size: FrameSize,
    pub previews: Vec<FilterPreview>,
}

/// Renders the first frame of a video once per available filter.
///
/// One detection pass is shared by all filters. Without a person the whole
/// frame is filtered, so every thumbnail shows its effect. A failing filter
/// is reported in its own entry and does not stop the others.
pub struct FilterPreviewsUseCase {
    reader: Box<dyn VideoReader>,
    segmenter: Box<dyn PersonSegmenter>,
    image_writer: Box<dyn ImageWriter>,
    create_filter: FilterFactory,
    preview_dir: PathBuf,
}

impl FilterPreviewsUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        segmenter: Box<dyn PersonSegmenter>,
        image_writer: Box<dyn ImageWriter>,
        create_filter: FilterFactory,
        preview_dir: PathBuf,
    ) -> Self {
        Self {
            reader,
            segmenter,
            image_writer,
            create_filter,
            preview_dir,
        }
    }

    pub fn execute(
        &mut self,
        input: &Path,
        video_id: &str,
        apply_to: ApplyTo,
        confidence: f32,
    ) -> Result<FilterPreviews, ProcessingError> {
        if !input.exists() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }

        self.reader
            .open(input)
            .map_err(|e| ProcessingError::DecodeOpen {
                path: input.to_path_buf(),
                message: e.to_string(),
            })?;
        let first = self.reader.frames().next();
        self.reader.close();

        let frame = match first {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                return Err(ProcessingError::Frame {
                    index: 0,
                    message: e.to_string(),
                })
            }
            None => return Err(ProcessingError::Pipeline("video has no frames".into())),
        };

        let raw_masks = self
            .segmenter
            .segment(&frame, confidence)
            .map_err(|e| ProcessingError::Frame {
                index: frame.index(),
                message: e.to_string(),
            })?;
        log::info!(
            "Filter previews for {video_id}: {} person(s) in first frame",
            raw_masks.len()
        );

        let previews = FilterType::ALL
            .iter()
            .map(|&filter_type| {
                let pipeline = PreviewPipeline::new(
                    (self.create_filter)(filter_type),
                    apply_to,
                    NoPersonBehavior::ApplyFilter,
                );
                let rendered = pipeline.render(&frame, &raw_masks);
                let path = self
                    .preview_dir
                    .join(format!("{video_id}_{filter_type}_preview.jpg"));

                let (preview_path, error) = match self.image_writer.write(&path, &rendered) {
                    Ok(()) => {
                        log::debug!("Wrote {filter_type} preview to {}", path.display());
                        (Some(path), None)
                    }
                    Err(e) => {
                        log::error!("Could not write {filter_type} preview: {e}");
                        (None, Some(e.to_string()))
                    }
                };
                FilterPreview {
                    filter_id: filter_type,
                    filter_name: filter_type.display_name(),
                    preview_path,
                    error,
                }
            })
            .collect();

        Ok(FilterPreviews {
            video_id: video_id.to_string(),
            person_detected: !raw_masks.is_empty(),
            frame_size: FrameSize {
                width: frame.width(),
                height: frame.height(),
            },
            previews,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::infrastructure::filter_factory::create_filter;
    use crate::segmentation::domain::raw_mask::RawMask;
    use crate::shared::frame::Frame;
    use crate::shared::mask::Mask;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use std::sync::{Arc, Mutex};

    struct OneFrameReader {
        frames: Vec<Frame>,
    }

    impl VideoReader for OneFrameReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            Ok(VideoMetadata {
                width: 8,
                height: 6,
                fps: 30.0,
                total_frames: self.frames.len(),
                codec: String::new(),
                source_path: None,
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new(self.frames.drain(..).map(Ok))
        }

        fn close(&mut self) {}
    }

    struct FixedSegmenter(Vec<RawMask>);

    impl PersonSegmenter for FixedSegmenter {
        fn segment(
            &mut self,
            _frame: &Frame,
            _confidence: f32,
        ) -> Result<Vec<RawMask>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    /// Records written paths and rejects blur previews.
    struct PickyWriter {
        written: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl ImageWriter for PickyWriter {
        fn write(&self, path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if path.to_string_lossy().contains("_blur_") {
                return Err("disk full".into());
            }
            self.written.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn frame() -> Frame {
        Frame::from_fn(8, 6, 0, |x, y| [(x * 30) as u8, (y * 40) as u8, 60])
    }

    #[test]
    fn test_one_entry_per_filter_with_errors_isolated() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let mut uc = FilterPreviewsUseCase::new(
            Box::new(OneFrameReader { frames: vec![frame()] }),
            Box::new(FixedSegmenter(Vec::new())),
            Box::new(PickyWriter {
                written: written.clone(),
            }),
            create_filter,
            PathBuf::from("/previews"),
        );

        let result = uc.execute(input.path(), "clip.mp4", ApplyTo::Background, 0.5).unwrap();

        assert!(!result.person_detected);
        assert_eq!(result.frame_size, FrameSize { width: 8, height: 6 });
        assert_eq!(result.previews.len(), 3);
        assert_eq!(
            result.previews[0].preview_path,
            Some(PathBuf::from("/previews/clip.mp4_grayscale_preview.jpg"))
        );
        assert_eq!(result.previews[1].filter_id, FilterType::Blur);
        assert_eq!(result.previews[1].error.as_deref(), Some("disk full"));
        assert!(result.previews[1].preview_path.is_none());
        assert_eq!(result.previews[2].filter_name, "Sepia");
        assert_eq!(written.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_writes_real_jpegs() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let person = RawMask::new(
            Mask::from_fn(8, 6, |x, _| if x < 4 { 1.0 } else { 0.0 }),
            0.9,
        );
        let mut uc = FilterPreviewsUseCase::new(
            Box::new(OneFrameReader { frames: vec![frame()] }),
            Box::new(FixedSegmenter(vec![person])),
            Box::new(ImageFileWriter::default()),
            create_filter,
            dir.path().to_path_buf(),
        );

        let result = uc.execute(input.path(), "v1", ApplyTo::Person, 0.5).unwrap();

        assert!(result.person_detected);
        for preview in &result.previews {
            let path = preview.preview_path.as_ref().unwrap();
            assert!(path.exists());
            assert!(path.starts_with(dir.path()));
        }
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["previews"][0].get("error").is_none());
    }

    #[test]
    fn test_empty_video_is_an_error() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let mut uc = FilterPreviewsUseCase::new(
            Box::new(OneFrameReader { frames: Vec::new() }),
            Box::new(FixedSegmenter(Vec::new())),
            Box::new(ImageFileWriter::default()),
            create_filter,
            PathBuf::from("/tmp"),
        );
        let err = uc.execute(input.path(), "v1", ApplyTo::Background, 0.5).unwrap_err();
        assert!(matches!(err, ProcessingError::Pipeline(_)));
    }

    #[test]
    fn test_missing_input() {
        let mut uc = FilterPreviewsUseCase::new(
            Box::new(OneFrameReader { frames: vec![frame()] }),
            Box::new(FixedSegmenter(Vec::new())),
            Box::new(ImageFileWriter::default()),
            create_filter,
            PathBuf::from("/tmp"),
        );
        let err = uc
            .execute(Path::new("/nonexistent/v.mp4"), "v", ApplyTo::Background, 0.5)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::InputNotFound(_)));
    }
}

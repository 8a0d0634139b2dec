use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::pipeline_executor::{FrameCallback, PipelineConfig, PipelineExecutor};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::processing_stats::{FilterSettings, ProcessingStats};
use crate::pipeline::selective_filter_pipeline::SelectiveFilterPipeline;
use crate::segmentation::domain::person_segmenter::PersonSegmenter;
use crate::shared::error::ProcessingError;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

const ALREADY_EXECUTED: &str = "use case already executed";

/// Runs one video through segmentation and the primary pipeline.
///
/// Opens the input and output up front so that open failures surface as
/// their own error kinds, then hands the components to a
/// `PipelineExecutor`. Single-use: `execute` consumes the owned components.
pub struct ProcessVideoUseCase {
    reader: Option<Box<dyn VideoReader>>,
    writer: Option<Box<dyn VideoWriter>>,
    segmenter: Option<Box<dyn PersonSegmenter>>,
    pipeline: Option<SelectiveFilterPipeline>,
    executor: Box<dyn PipelineExecutor>,
    filter_settings: FilterSettings,
    on_frame: Option<FrameCallback>,
    cancelled: Arc<AtomicBool>,
    logger: Option<Box<dyn PipelineLogger>>,
}

impl ProcessVideoUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        segmenter: Box<dyn PersonSegmenter>,
        pipeline: SelectiveFilterPipeline,
        executor: Box<dyn PipelineExecutor>,
        filter_settings: FilterSettings,
        on_frame: Option<FrameCallback>,
        cancelled: Option<Arc<AtomicBool>>,
        logger: Option<Box<dyn PipelineLogger>>,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            segmenter: Some(segmenter),
            pipeline: Some(pipeline),
            executor,
            filter_settings,
            on_frame,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
            logger,
        }
    }

    pub fn execute(
        &mut self,
        input: &Path,
        output: &Path,
    ) -> Result<ProcessingStats, ProcessingError> {
        let started = Instant::now();

        if !input.exists() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }

        let mut reader = self.reader.take().ok_or_else(already_executed)?;
        let mut writer = self.writer.take().ok_or_else(already_executed)?;
        let segmenter = self.segmenter.take().ok_or_else(already_executed)?;
        let pipeline = self.pipeline.take().ok_or_else(already_executed)?;

        let metadata = reader.open(input).map_err(|e| ProcessingError::DecodeOpen {
            path: input.to_path_buf(),
            message: e.to_string(),
        })?;
        log::info!(
            "Video properties: {}x{} @ {:.2} fps, {} frames",
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames
        );

        if let Err(e) = writer.open(output, &metadata) {
            reader.close();
            return Err(ProcessingError::EncodeOpen {
                path: output.to_path_buf(),
                message: e.to_string(),
            });
        }

        let config = PipelineConfig {
            confidence: self.filter_settings.confidence_threshold,
            on_frame: self.on_frame.take(),
            cancelled: self.cancelled.clone(),
            logger: self
                .logger
                .take()
                .unwrap_or_else(|| Box::new(NullPipelineLogger)),
        };

        let summary = self
            .executor
            .execute(reader, writer, segmenter, pipeline, &metadata, config)
            .map_err(|e| match e.downcast::<ProcessingError>() {
                Ok(known) => *known,
                Err(other) => ProcessingError::Pipeline(other.to_string()),
            })?;

        let stats = ProcessingStats::new(
            summary.frames,
            summary.frames_with_person,
            summary.inference_time,
            started.elapsed(),
            &metadata,
            self.filter_settings.clone(),
        );

        log::info!(
            "Processing complete: {} frames in {:.2}s ({:.2} fps, {:.2}ms/frame inference)",
            stats.total_frames,
            stats.processing_time,
            stats.avg_fps,
            stats.avg_inference_time_ms
        );
        log::info!(
            "Person detected in {}/{} frames ({:.1}%)",
            stats.frames_with_person,
            stats.total_frames,
            stats.detection_rate
        );

        Ok(stats)
    }
}

fn already_executed() -> ProcessingError {
    ProcessingError::Pipeline(ALREADY_EXECUTED.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::domain::compositor::{ApplyTo, NoPersonBehavior};
    use crate::filtering::domain::filter_type::FilterType;
    use crate::filtering::domain::frame_filter::FrameFilter;
    use crate::filtering::infrastructure::grayscale_filter::GrayscaleFilter;
    use crate::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
    use crate::pipeline::selective_filter_pipeline::tests::test_pipeline;
    use crate::pipeline::selective_filter_pipeline::PipelineSettings;
    use crate::segmentation::domain::boundary_refiner::RefinementPolicy;
    use crate::segmentation::domain::raw_mask::RawMask;
    use crate::shared::bbox::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::shared::mask::Mask;
    use crate::shared::video_metadata::VideoMetadata;
    use std::sync::Mutex;

    const W: u32 = 12;
    const H: u32 = 8;
    /// Person occupies this rectangle in frames 3 to 7 (indices 2..=6).
    const PERSON: BoundingBox = BoundingBox {
        x1: 2,
        y1: 1,
        x2: 6,
        y2: 7,
    };

    struct StubReader {
        frames: Vec<Frame>,
        fail_open: bool,
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("invalid data found when processing input".into());
            }
            Ok(VideoMetadata {
                width: W,
                height: H,
                fps: 10.0,
                total_frames: self.frames.len(),
                codec: "mpeg4".into(),
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

    struct StubWriter {
        written: Arc<Mutex<Vec<Frame>>>,
        fail_open: bool,
    }

    impl VideoWriter for StubWriter {
        fn open(
            &mut self,
            _path: &Path,
            _metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("permission denied".into());
            }
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.written.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    struct ScriptedSegmenter;

    impl PersonSegmenter for ScriptedSegmenter {
        fn segment(
            &mut self,
            frame: &Frame,
            _confidence: f32,
        ) -> Result<Vec<RawMask>, Box<dyn std::error::Error>> {
            if (2..=6).contains(&frame.index()) {
                Ok(vec![RawMask::new(Mask::from_rect(W, H, PERSON), 0.88)])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn clip() -> Vec<Frame> {
        (0..10)
            .map(|i| {
                Frame::from_fn(W, H, i, |x, y| {
                    [(x * 20 + i as u32) as u8, (y * 30) as u8, (255 - x * 10) as u8]
                })
            })
            .collect()
    }

    fn settings(no_person_behavior: NoPersonBehavior) -> FilterSettings {
        FilterSettings {
            filter_type: FilterType::Grayscale,
            apply_to: ApplyTo::Background,
            no_person_behavior,
            confidence_threshold: 0.5,
        }
    }

    fn use_case(
        no_person_behavior: NoPersonBehavior,
        reader_fails: bool,
        writer_fails: bool,
    ) -> (ProcessVideoUseCase, Arc<Mutex<Vec<Frame>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = test_pipeline(
            PipelineSettings {
                apply_to: ApplyTo::Background,
                no_person_behavior,
                region_aware: false,
                roi_expansion: 0.3,
                refinement: RefinementPolicy::Minimal,
            },
            None,
        );
        let uc = ProcessVideoUseCase::new(
            Box::new(StubReader {
                frames: clip(),
                fail_open: reader_fails,
            }),
            Box::new(StubWriter {
                written: written.clone(),
                fail_open: writer_fails,
            }),
            Box::new(ScriptedSegmenter),
            pipeline,
            Box::new(ThreadedPipelineExecutor::new()),
            settings(no_person_behavior),
            None,
            None,
            None,
        );
        (uc, written)
    }

    fn inside_person(x: u32, y: u32) -> bool {
        (x as i32) >= PERSON.x1 && (x as i32) < PERSON.x2 && (y as i32) >= PERSON.y1 && (y as i32) < PERSON.y2
    }

    #[test]
    fn test_person_frames_filter_background_only() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let (mut uc, written) = use_case(NoPersonBehavior::KeepOriginal, false, false);
        let stats = uc.execute(input.path(), Path::new("out.mp4")).unwrap();

        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.frames_with_person, 5);
        assert_eq!(stats.detection_rate, 50.0);

        let source = clip();
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 10);
        for (i, (out, src)) in written.iter().zip(&source).enumerate() {
            if !(2..=6).contains(&i) {
                assert_eq!(out, src, "frame {i} should be untouched");
                continue;
            }
            let gray = GrayscaleFilter.filtered(src);
            for y in 0..H {
                for x in 0..W {
                    let expected = if inside_person(x, y) {
                        src.pixel(x, y)
                    } else {
                        gray.pixel(x, y)
                    };
                    assert_eq!(out.pixel(x, y), expected, "frame {i} pixel ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_no_person_frames_can_be_filtered() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let (mut uc, written) = use_case(NoPersonBehavior::ApplyFilter, false, false);
        uc.execute(input.path(), Path::new("out.mp4")).unwrap();

        let source = clip();
        let written = written.lock().unwrap();
        for i in [0, 1, 7, 8, 9] {
            assert_eq!(written[i], GrayscaleFilter.filtered(&source[i]));
        }
        assert_eq!(written[4].pixel(3, 3), source[4].pixel(3, 3));
    }

    #[test]
    fn test_missing_input() {
        let (mut uc, written) = use_case(NoPersonBehavior::KeepOriginal, false, false);
        let err = uc
            .execute(Path::new("/nonexistent/input.mp4"), Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, ProcessingError::InputNotFound(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decode_open_failure() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let (mut uc, _) = use_case(NoPersonBehavior::KeepOriginal, true, false);
        let err = uc.execute(input.path(), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, ProcessingError::DecodeOpen { .. }));
    }

    #[test]
    fn test_encode_open_failure() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let (mut uc, written) = use_case(NoPersonBehavior::KeepOriginal, false, true);
        let err = uc.execute(input.path(), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, ProcessingError::EncodeOpen { .. }));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_second_execute_fails() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let (mut uc, _) = use_case(NoPersonBehavior::KeepOriginal, false, false);
        uc.execute(input.path(), Path::new("out.mp4")).unwrap();
        let err = uc.execute(input.path(), Path::new("out.mp4")).unwrap_err();
        assert!(err.to_string().contains(ALREADY_EXECUTED));
    }
}

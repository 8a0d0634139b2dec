use std::path::{Path, PathBuf};

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// libavformat reports container durations in microseconds.
const CONTAINER_TIME_BASE: f64 = 1_000_000.0;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("reader is not open")]
    NotOpened,
    #[error("video stream {0} is missing from the container")]
    StreamMissing(usize),
}

struct OpenedInput {
    ictx: Input,
    stream_index: usize,
}

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec) into
/// RGB24 [`Frame`]s.
///
/// Containers that do not record a frame count get one estimated from their
/// duration, so progress and ETA stay meaningful.
pub struct FfmpegReader {
    input: Option<OpenedInput>,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self { input: None }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| ReaderError::NoVideoStream(path.to_path_buf()))?;
        let stream_index = stream.index();
        let decoder = open_decoder(&stream)?;

        let fps = rational_to_f64(stream.rate());
        let total_frames = match stream.frames() {
            n if n > 0 => n as usize,
            _ => estimate_frame_count(&stream, ictx.duration(), fps),
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        drop(stream);

        log::info!(
            "Video properties: {}x{} @ {:.2} fps, {} frames ({})",
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames,
            metadata.codec
        );

        self.input = Some(OpenedInput { ictx, stream_index });
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(input) = self.input.as_mut() else {
            return Box::new(std::iter::once(Err(ReaderError::NotOpened.into())));
        };

        match DecodedFrames::new(&mut input.ictx, input.stream_index) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input = None;
    }
}

fn open_decoder(
    stream: &ffmpeg_next::format::stream::Stream<'_>,
) -> Result<ffmpeg_next::decoder::Video, ffmpeg_next::Error> {
    ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()
}

fn rational_to_f64(r: ffmpeg_next::Rational) -> f64 {
    if r.denominator() == 0 {
        0.0
    } else {
        r.numerator() as f64 / r.denominator() as f64
    }
}

/// Stream duration wins over the container duration; 0 when neither is known.
fn estimate_frame_count(
    stream: &ffmpeg_next::format::stream::Stream<'_>,
    container_duration: i64,
    fps: f64,
) -> usize {
    let seconds = if stream.duration() > 0 {
        stream.duration() as f64 * rational_to_f64(stream.time_base())
    } else if container_duration > 0 {
        container_duration as f64 / CONTAINER_TIME_BASE
    } else {
        0.0
    };
    let estimate = (seconds * fps).round();
    if estimate > 0.0 {
        log::debug!("Frame count not recorded, estimated {estimate} from duration");
        estimate as usize
    } else {
        0
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Draining,
    Finished,
}

/// Lazily decodes one frame at a time.
///
/// Packets the decoder rejects are skipped; the count is logged once the
/// stream ends.
struct DecodedFrames<'a> {
    ictx: &'a mut Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    stream_index: usize,
    next_index: usize,
    rejected_packets: usize,
    phase: Phase,
}

impl<'a> DecodedFrames<'a> {
    fn new(ictx: &'a mut Input, stream_index: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = ictx
            .stream(stream_index)
            .ok_or(ReaderError::StreamMissing(stream_index))?;
        let decoder = open_decoder(&stream)?;
        drop(stream);

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            width,
            height,
            stream_index,
            next_index: 0,
            rejected_packets: 0,
            phase: Phase::Reading,
        })
    }

    fn receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = VideoFrame::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb = VideoFrame::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
            return Some(Err(Box::new(e)));
        }
        let frame = Frame::new(
            packed_rgb(&rgb, self.width, self.height),
            self.width,
            self.height,
            self.next_index,
        );
        self.next_index += 1;
        Some(Ok(frame))
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        if self.rejected_packets > 0 {
            log::warn!(
                "Skipped {} undecodable packet(s) after {} frames",
                self.rejected_packets,
                self.next_index
            );
        }
    }
}

impl Iterator for DecodedFrames<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Finished => return None,
                Phase::Draining => {
                    let frame = self.receive();
                    if frame.is_none() {
                        self.finish();
                    }
                    return frame;
                }
                Phase::Reading => {
                    if let Some(frame) = self.receive() {
                        return Some(frame);
                    }
                    match self.ictx.packets().next() {
                        Some((stream, packet)) => {
                            if stream.index() == self.stream_index
                                && self.decoder.send_packet(&packet).is_err()
                            {
                                self.rejected_packets += 1;
                            }
                        }
                        None => {
                            let _ = self.decoder.send_eof();
                            self.phase = Phase::Draining;
                        }
                    }
                }
            }
        }
    }
}

/// Drops the per-row padding ffmpeg may add (stride > width * 3).
fn packed_rgb(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;
    frame
        .data(0)
        .chunks(stride)
        .take(height as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect()
}

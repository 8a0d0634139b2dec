use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Abstracts video encoding so the pipeline can write output without
/// depending on a specific codec library. The written file carries video
/// only; audio is restored afterwards by an [`AudioRemuxer`].
///
/// [`AudioRemuxer`]: crate::video::domain::audio_remuxer::AudioRemuxer
pub trait VideoWriter: Send {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes the encoder and finalises the container.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

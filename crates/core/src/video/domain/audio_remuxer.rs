use std::path::Path;

use serde::Serialize;

/// How the final output file was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemuxOutcome {
    /// Re-encoded with the source's audio track.
    WithAudio,
    /// Re-encoded without audio.
    Silent,
    /// The raw encoder output was moved into place as-is.
    Untouched,
}

/// Turns the raw, video-only encoder output into the deliverable file.
///
/// Implementations degrade step by step and only fail when not even the
/// raw file can be moved to `output`.
pub trait AudioRemuxer: Send {
    fn remux(
        &self,
        source: &Path,
        processed: &Path,
        output: &Path,
    ) -> Result<RemuxOutcome, Box<dyn std::error::Error>>;
}

//! Locating the playable asset in audio command output.

/// Path prefix of assets written by the generation script.
pub const GENERATED_PREFIX: &str = "/generated/";

/// Return the first line starting with [`GENERATED_PREFIX`], trimmed.
///
/// The rest of the output is diagnostic text and is ignored. `None` means
/// there is nothing to play.
#[must_use]
pub fn extract_audio_source(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(GENERATED_PREFIX))
}

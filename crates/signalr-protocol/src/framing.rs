//! Record-separator framing.
//!
//! Every JSON hub frame is terminated by a single `0x1E` (ASCII record
//! separator) byte. A stream may contain zero or more concatenated frames.
//! Frames are never split across input buffers at this layer — callers must
//! deliver complete buffers (the WebSocket transport already preserves
//! message boundaries).

use thiserror::Error;

/// ASCII record separator terminating every hub frame.
pub const RECORD_SEPARATOR: u8 = 0x1E;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("input does not end in the record separator (0x1E)")]
    IncompleteFrame,
}

/// Append the record separator to `payload`, returning a complete frame.
pub fn write_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(RECORD_SEPARATOR);
    framed
}

/// Split `input` into frames, discarding the trailing empty segment produced
/// by the final separator.
///
/// Empty input yields an empty sequence. Fails with [`FramingError::IncompleteFrame`]
/// unless `input` ends in the record separator.
pub fn parse_frames(input: &[u8]) -> Result<Vec<&[u8]>, FramingError> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if *input.last().expect("checked non-empty above") != RECORD_SEPARATOR {
        return Err(FramingError::IncompleteFrame);
    }

    let mut frames = Vec::new();
    let mut start = 0;
    for (i, &byte) in input.iter().enumerate() {
        if byte == RECORD_SEPARATOR {
            frames.push(&input[start..i]);
            start = i + 1;
        }
    }
    Ok(frames)
}

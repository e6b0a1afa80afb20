use thiserror::Error;

/// Failures while setting up the host window and its render surface.
///
/// Timing contract breaches (a non-positive timescale, a regressing
/// timestamp) are deliberately not represented here: those are programming
/// errors in the caller and panic instead of being handed back.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("failed to create render surface: {0}")]
    Surface(#[from] pixels::Error),
}

//! Refresh-driven cycle pacing for emulated machines.
//!
//! An emulated machine advances in whole cycles; a host display advances in
//! refresh ticks. This crate converts the latter into the former: feed a
//! [`Session`] timestamped refresh notifications and it works out exactly how
//! many cycles to run, carrying rounding remainders forward so the long-run
//! rate is exact, and capping catch-up work once the machine has fallen
//! behind. Implement [`Machine`] for your emulation core and hand it to
//! [`run_machine`] for a window, or drive a [`Session`] yourself.

/// Width in pixels of the video canvas machines paint into.
pub const WIDTH: u32 = 320;
/// Height in pixels of the video canvas machines paint into.
pub const HEIGHT: u32 = 240;

mod error;
mod machine;
mod run;
mod scheduler;
mod screen;
mod session;

pub use error::Error;
pub use machine::{DigitalInput, Machine};
pub use run::{run_machine, run_machine_headless_for, WindowConfig};
pub use scheduler::{CycleScheduler, RefreshEvent, ThrottlePolicy};
pub use screen::{FrameSink, Message, Surface};
pub use session::Session;

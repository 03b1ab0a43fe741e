//! Encoder invocation: argv construction, hardware detection, and process
//! supervision (spec.md §4.3, and the "Encoder (child process)" interface
//! in §6).

pub mod command;
pub mod hwaccel;
pub mod process;

pub use command::{build, EncoderParams, InputMode};
pub use hwaccel::{detect_hw_accel, HwAccelProbe};
pub use process::{ExitOutcome, SpawnedEncoder};

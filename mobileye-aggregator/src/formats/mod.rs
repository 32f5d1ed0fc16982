//! Log file formats
//!
//! Readers that replay recorded CAN traffic through the [`FrameSource`]
//! interface.
//!
//! [`FrameSource`]: crate::source::FrameSource

pub mod candump;

pub use candump::CandumpSource;

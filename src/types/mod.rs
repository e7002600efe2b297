//! Core types shared by both stream paths.
//!
//! - [`Frame`] is one interleaved 16-bit I/Q pair, the atomic transfer unit
//! - [`StreamStatus`] is a point-in-time endpoint status snapshot
//! - [`ErrorAccumulator`] builds running error totals under an explicit
//!   [`AccumulationPolicy`]
//! - [`Direction`] and [`StreamOperation`] label endpoint failures

mod direction;
mod sample;
mod status;

pub use direction::{Direction, StreamOperation};
pub use sample::{Frame, decode_frames, encode_frames};
pub use status::{AccumulationPolicy, ErrorAccumulator, ErrorCounters, StreamStatus};

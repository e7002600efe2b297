//! Software stream endpoints
//!
//! Stand-ins for the radio driver: a capture-file replay for the receive side
//! and a rate-limited sink for the transmit side. Both implement the same
//! endpoint traits a hardware binding would.

mod replay;
mod sink;

pub use replay::{REPLAY_FIFO_FRAMES, ReplayRx};
pub use sink::SinkTx;

//! Stream direction and operation labels used in diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which endpoint of the radio a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Receive path (radio to host)
    Rx,
    /// Transmit path (host to radio)
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => f.write_str("RX"),
            Direction::Tx => f.write_str("TX"),
        }
    }
}

/// Operation on a stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOperation {
    Pull,
    Push,
    Status,
    Teardown,
}

impl fmt::Display for StreamOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamOperation::Pull => "pull",
            StreamOperation::Push => "push",
            StreamOperation::Status => "status",
            StreamOperation::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

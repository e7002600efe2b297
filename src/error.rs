//! Error types for the bridge.
//!
//! Every failure the bridge can hit is a [`BridgeError`]. Errors carry structured
//! context so the single fatal log line emitted when the loop terminates is enough
//! to diagnose the fault.
//!
//! ## Error Classes
//!
//! [`BridgeError::class`] maps each variant onto the bridge's failure taxonomy:
//!
//! - **Configuration**: bad parameters or unreachable collaborators, raised before
//!   the loop starts
//! - **Cycle-fatal**: driver, clock or socket failures that end the loop
//! - **Protocol-fatal**: framing or capacity invariants violated by a collaborator
//! - **Service**: failures in the auxiliary TCP services, which never touch the loop
//!
//! Conditions the loop treats as steady state (transmit source empty, transmit
//! FIFO full) are not errors at all; see [`crate::feeder::FeedOutcome`].
//!
//! ```rust
//! use linrad_bridge::{BridgeError, ErrorClass};
//!
//! let error = BridgeError::UnalignedRead { bytes: 3, frame_size: 4 };
//! assert_eq!(error.class(), ErrorClass::ProtocolFatal);
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Direction, StreamOperation};

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Failure taxonomy used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Raised before the loop starts; the process exits.
    Configuration,
    /// Ends the bridge loop and triggers endpoint teardown.
    CycleFatal,
    /// A collaborator broke a framing or capacity invariant. Ends the loop.
    ProtocolFatal,
    /// Auxiliary control service failure.
    Service,
}

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Failed to open {what} at {path}")]
    Open {
        what: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file {path} is invalid")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Failed to set up UDP transport: {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{direction} stream {operation} failed: {reason}")]
    Stream {
        direction: Direction,
        operation: StreamOperation,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Receive path timed out after {elapsed:?} with {assembled}/{expected} frames assembled")]
    PullTimeout { assembled: usize, expected: usize, elapsed: Duration },

    #[error("Transmit byte source read failed")]
    ByteSource {
        #[source]
        source: std::io::Error,
    },

    #[error("Read {bytes} bytes from the transmit source, not a multiple of the {frame_size}-byte frame")]
    UnalignedRead { bytes: usize, frame_size: usize },

    #[error("Transmit stream accepted {accepted} of {submitted} frames")]
    ShortWrite { submitted: usize, accepted: usize },

    #[error("System clock unavailable: {reason}")]
    Clock { reason: String },

    #[error("Failed to send Linrad packet to {destination}")]
    Send {
        destination: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Sent {sent} of {expected} bytes to {destination}")]
    ShortSend { destination: SocketAddr, sent: usize, expected: usize },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Control service error: {context}")]
    Service {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PTT line error on {path}")]
    Ptt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    /// Classify this error according to the bridge's failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::Configuration { .. } => ErrorClass::Configuration,
            BridgeError::Open { .. } => ErrorClass::Configuration,
            BridgeError::ConfigFile { .. } => ErrorClass::Configuration,
            BridgeError::Transport { .. } => ErrorClass::Configuration,
            BridgeError::Stream { .. } => ErrorClass::CycleFatal,
            BridgeError::PullTimeout { .. } => ErrorClass::CycleFatal,
            BridgeError::ByteSource { .. } => ErrorClass::CycleFatal,
            BridgeError::Clock { .. } => ErrorClass::CycleFatal,
            BridgeError::Send { .. } => ErrorClass::CycleFatal,
            BridgeError::UnalignedRead { .. } => ErrorClass::ProtocolFatal,
            BridgeError::ShortWrite { .. } => ErrorClass::ProtocolFatal,
            BridgeError::ShortSend { .. } => ErrorClass::ProtocolFatal,
            BridgeError::Parse { .. } => ErrorClass::ProtocolFatal,
            BridgeError::Service { .. } => ErrorClass::Service,
            BridgeError::Ptt { .. } => ErrorClass::Service,
        }
    }

    /// Returns whether this error must end the bridge loop.
    ///
    /// Nothing inside the loop is retried, so everything except service errors
    /// is terminal once the loop is running.
    pub fn is_fatal_to_loop(&self) -> bool {
        matches!(self.class(), ErrorClass::CycleFatal | ErrorClass::ProtocolFatal)
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Configuration { .. } | BridgeError::ConfigFile { .. } => vec![
                "Check the command line flags and configuration file",
                "Receive and transmit frequencies must be non-zero",
                "Receive-only mode needs an explicit destination address",
            ],
            BridgeError::Open { .. } => vec![
                "Create the transmit FIFO before starting (mkfifo /tmp/txfifo)",
                "Check the path exists and is readable",
                "Check file permissions",
            ],
            BridgeError::Transport { .. } => vec![
                "Check the destination address is a valid IPv4 address",
                "Verify a route exists for multicast destinations",
            ],
            BridgeError::Stream { .. } | BridgeError::PullTimeout { .. } => vec![
                "Check the radio is still connected",
                "Lower the sample rate if the host cannot keep up",
                "Restart the bridge to re-open the device",
            ],
            BridgeError::ByteSource { .. } => vec![
                "Check the process writing the transmit FIFO",
                "Recreate the FIFO and restart the bridge",
            ],
            BridgeError::UnalignedRead { .. } => vec![
                "Make sure the transmit writer emits whole 16-bit I/Q frames",
                "Restart the writer and the bridge to resynchronise",
            ],
            BridgeError::ShortWrite { .. } => vec![
                "The transmit driver misreported its free capacity",
                "Restart the bridge",
            ],
            BridgeError::Clock { .. } => vec![
                "Check the system clock is set after the Unix epoch",
                "Verify NTP or GPS time synchronisation",
            ],
            BridgeError::Send { .. } | BridgeError::ShortSend { .. } => vec![
                "Check the network interface is up",
                "Verify the destination address and port",
            ],
            BridgeError::Parse { .. } => vec![
                "Verify the datagram is a complete Linrad packet",
                "Check sender and receiver agree on the payload size",
            ],
            BridgeError::Service { .. } => vec![
                "Check the listen address is not already in use",
                "Use a different port for the control service",
            ],
            BridgeError::Ptt { .. } => vec![
                "Export the GPIO line and set its direction to out",
                "Check write permissions on the GPIO value file",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn configuration(reason: impl Into<String>) -> Self {
        BridgeError::Configuration { reason: reason.into() }
    }

    /// Helper constructor for open failures with path context.
    pub fn open(what: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BridgeError::Open { what: what.into(), path: path.into(), source }
    }

    /// Helper constructor for stream endpoint failures.
    pub fn stream(
        direction: Direction,
        operation: StreamOperation,
        reason: impl Into<String>,
    ) -> Self {
        BridgeError::Stream { direction, operation, reason: reason.into(), source: None }
    }

    /// Helper constructor for stream endpoint failures with source.
    pub fn stream_with_source(
        direction: Direction,
        operation: StreamOperation,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::Stream { direction, operation, reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for clock failures.
    pub fn clock(reason: impl Into<String>) -> Self {
        BridgeError::Clock { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for control service errors.
    pub fn service(context: impl Into<String>, source: std::io::Error) -> Self {
        BridgeError::Service { context: context.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn messages_carry_their_context(
                reason in ".*",
                bytes in 1usize..100_000,
                submitted in 1usize..10_000,
                accepted in 0usize..10_000,
            ) {
                let config = BridgeError::configuration(reason.clone());
                prop_assert!(config.to_string().contains(&reason));

                let unaligned = BridgeError::UnalignedRead { bytes, frame_size: 4 };
                prop_assert!(unaligned.to_string().contains(&bytes.to_string()));

                let short = BridgeError::ShortWrite { submitted, accepted };
                let msg = short.to_string();
                prop_assert!(msg.contains(&submitted.to_string()));
                prop_assert!(msg.contains(&accepted.to_string()));
            }

            #[test]
            fn stream_errors_keep_their_source(reason in ".*", inner in ".*") {
                let source: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(std::io::Error::other(inner.clone()));
                let err = BridgeError::stream_with_source(
                    Direction::Rx,
                    StreamOperation::Pull,
                    reason,
                    source,
                );

                let chained = std::error::Error::source(&err).map(|s| s.to_string());
                prop_assert_eq!(chained, Some(inner));
                prop_assert_eq!(err.class(), ErrorClass::CycleFatal);
            }
        }
    }

    #[test]
    fn classification_matches_taxonomy() {
        assert_eq!(BridgeError::configuration("x").class(), ErrorClass::Configuration);
        assert_eq!(
            BridgeError::open("FIFO", "/tmp/txfifo", std::io::Error::other("missing")).class(),
            ErrorClass::Configuration
        );
        assert_eq!(BridgeError::clock("before epoch").class(), ErrorClass::CycleFatal);
        assert_eq!(
            BridgeError::stream(Direction::Tx, StreamOperation::Status, "gone").class(),
            ErrorClass::CycleFatal
        );
        assert_eq!(
            BridgeError::UnalignedRead { bytes: 3, frame_size: 4 }.class(),
            ErrorClass::ProtocolFatal
        );
        assert_eq!(
            BridgeError::ShortWrite { submitted: 10, accepted: 9 }.class(),
            ErrorClass::ProtocolFatal
        );
        assert_eq!(
            BridgeError::service("bind", std::io::Error::other("in use")).class(),
            ErrorClass::Service
        );
    }

    #[test]
    fn only_loop_errors_are_fatal_to_loop() {
        assert!(BridgeError::clock("x").is_fatal_to_loop());
        assert!(BridgeError::ShortWrite { submitted: 2, accepted: 1 }.is_fatal_to_loop());
        assert!(!BridgeError::configuration("x").is_fatal_to_loop());
        assert!(!BridgeError::service("x", std::io::Error::other("y")).is_fatal_to_loop());
    }

    #[test]
    fn stream_error_display_names_direction_and_operation() {
        let err = BridgeError::stream(Direction::Rx, StreamOperation::Pull, "device unplugged");
        assert_eq!(err.to_string(), "RX stream pull failed: device unplugged");
    }

    #[test]
    fn recovery_suggestions_are_provided() {
        let errors = [
            BridgeError::configuration("x"),
            BridgeError::clock("x"),
            BridgeError::UnalignedRead { bytes: 3, frame_size: 4 },
            BridgeError::PullTimeout {
                assembled: 100,
                expected: 348,
                elapsed: Duration::from_secs(1),
            },
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<BridgeError>();
    }
}

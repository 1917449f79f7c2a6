//! RYLR998 radio link: line assembly, envelope framing and payload decoding
//!
//! Inbound UART bytes are cut into lines by [`LineBuffer`]. Each line is either
//! a `+RCV=` data envelope, decoded by [`parse_frame`], or a diagnostic reply
//! from the module (`+OK`, `+ERR=..`, `+READY`) that the pipeline only logs.
//! The envelope payload is then decoded into a [`PartialReading`] by
//! [`parse_payload`].

pub mod at;
pub mod frame;
pub mod line;
pub mod payload;

pub use at::{AtCommand, init_commands};
pub use frame::{FrameError, RCV_PREFIX, RadioFrame, parse_frame};
pub use line::LineBuffer;
pub use payload::{FieldValue, InvalidTokenPolicy, PartialReading, PayloadError, parse_payload};

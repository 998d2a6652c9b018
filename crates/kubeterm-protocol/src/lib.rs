//! Wire format spoken between the browser terminal and the bridge.
//!
//! Inbound messages are JSON control records (see [`decoder`]); outbound
//! messages are raw process output carried in text frames (see [`framer`]).

pub mod decoder;
pub mod framer;

pub use decoder::{decode, InboundEvent};
pub use framer::{closing_notice, Utf8Framer};

//! # anvil-stream
//!
//! The stream bridge between a model's output and the rest of the runtime.
//!
//! [`StreamBridge::process_stream`] consumes a stream of [`StreamPart`]s,
//! forwards each to [`StreamCallbacks`] in arrival order, and writes a
//! replayable [`Transcript`] in which reasoning sits inside `<think>` tags
//! and tool traffic is tagged by provenance.

#![deny(unsafe_code)]

pub mod bridge;
pub mod callbacks;
pub mod errors;
pub mod transcript;
pub mod types;

pub use bridge::{BridgeResult, StreamBridge};
pub use callbacks::{NoopCallbacks, StreamCallbacks};
pub use errors::StreamError;
pub use transcript::Transcript;
pub use types::{PartStream, StreamPart, Usage};

//! The mirrored delta pipelines.
//!
//! Sender side: partition a captured frame into tiles, fingerprint each
//! tile, decide keyframe / delta / empty, compress, serialize. Receiver
//! side: parse, sequence-check, decode, and paste into the persistent
//! canvas, requesting a resync on every anomaly.

pub mod canvas;
pub mod codec;
pub mod encoder;
pub mod fingerprint;
pub mod grid;
pub mod planner;
pub mod receiver;
pub mod sequence;
pub mod service;
pub mod source;
pub mod types;

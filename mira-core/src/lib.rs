//! Core library for MIRA, a tile-based screen mirroring system.
//!
//! The sender pipeline captures frames, detects changed tiles via
//! content fingerprints, and ships sparse deltas (or keyframes when too
//! much changed) over a persistent binary channel. The receiver
//! reconstructs a coherent canvas from those updates and requests a
//! resync whenever it cannot. Everything here is per-connection state;
//! the binaries in this workspace are thin shells around it.

pub mod config;
pub mod error;
pub mod input;
pub mod net;
pub mod stream;
pub mod wire;

pub use config::SessionConfig;
pub use error::MirrorError;
pub use input::{InputEvent, MouseButton};
pub use net::client::{CanvasSnapshot, MirrorClient, ViewerStats};
pub use net::link::MessageLink;
pub use net::manager::{BoxedDialer, ConnectionManager, LinkEvent};
pub use net::queue::{OutboundQueue, PushOutcome};
pub use net::status::LinkStatus;
pub use stream::canvas::Canvas;
pub use stream::codec::{DecodedImage, FrameCodec, JpegFrameCodec, TileCodec, WebpTileCodec};
pub use stream::encoder::StreamEncoder;
pub use stream::grid::TileGrid;
pub use stream::receiver::{ApplyOutcome, CanvasSession};
pub use stream::sequence::{SeqVerdict, SequenceMonitor};
pub use stream::service::MirrorService;
pub use stream::source::{FrameSource, SyntheticSource};
pub use stream::types::RawFrame;
pub use wire::{TilePatch, WireFrame};

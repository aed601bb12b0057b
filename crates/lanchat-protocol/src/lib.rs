//! lanchat Protocol - Wire protocol for chat traffic
//!
//! This crate provides the records exchanged between chat clients and the
//! broadcast server, and the newline-delimited JSON framing that carries
//! them over a TCP stream.

pub mod codec;
pub mod message;

pub use codec::{encode_frame, CodecError, DecodeError, EncodeError, FrameCodec, MAX_FRAME_LEN};
pub use message::{ClientMessage, ServerMessage, DEFAULT_USERNAME};

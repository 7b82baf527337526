//! Wire-level handling of the completion byte stream: UTF-8 decoding, line
//! framing and payload extraction.

pub mod decoder;
pub mod frame;

pub use decoder::Utf8ChunkDecoder;
pub use frame::{Frame, FrameEvent, FrameReader, MalformedFramePolicy, ReaderLimits};

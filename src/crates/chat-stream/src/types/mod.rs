pub mod completion;

pub use completion::{ChatCompletionChunk, DirectReply};

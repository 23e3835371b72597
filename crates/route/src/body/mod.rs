//! Request body ingestion and response bodies.
//!
//! - [`BodyReader`]: feeds request body chunks to the route's streaming handler or buffers
//!   them, enforcing the route's length cap
//! - [`ResponseBody`]: the body handed back to the transport, sent at once or streamed

mod reader;
mod response;

pub use reader::{BodyReader, ChunkOutcome};
pub use response::ResponseBody;

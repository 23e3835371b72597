use crate::config::OverflowNotify;
use crate::context::{Flow, RequestContext};
use crate::error::ExecError;
use crate::handler::{HandlerDescriptor, HandlerRunner, OverflowFn, Stage};
use bytes::{Bytes, BytesMut};
use tracing::debug;

/// What happened to a chunk handed to [`BodyReader::on_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// delivered to the streaming handler
    Streamed,
    /// appended to the body buffer
    Buffered,
    /// over the cap, the overflow handler was told
    Overflowed,
    /// over the cap, dropped without notification
    Discarded,
}

/// Consumes the body of one request.
///
/// Chunks are delivered while the bytes seen so far plus the chunk fit in `max_length`.
/// The first chunk that doesn't fit switches the reader to overflow: that chunk and every
/// later one are never delivered, they go to the overflow handler instead (every chunk, or
/// only the first one with [`OverflowNotify::Once`]).
pub struct BodyReader<'p> {
    max_length: usize,
    seen: usize,
    received: usize,
    streaming: Option<&'p HandlerDescriptor>,
    overflow: &'p OverflowFn,
    notify: OverflowNotify,
    overflowed: bool,
    buffer: BytesMut,
}

impl<'p> BodyReader<'p> {
    pub fn new(
        max_length: usize,
        streaming: Option<&'p HandlerDescriptor>,
        overflow: &'p OverflowFn,
        notify: OverflowNotify,
    ) -> Self {
        Self { max_length, seen: 0, received: 0, streaming, overflow, notify, overflowed: false, buffer: BytesMut::new() }
    }

    /// Bytes delivered or buffered so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Bytes received from the transport so far, including the ones over the cap.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn on_chunk(&mut self, chunk: Bytes, ctx: &mut RequestContext) -> Result<ChunkOutcome, ExecError> {
        self.received = self.received.saturating_add(chunk.len());

        if !self.overflowed && self.seen.saturating_add(chunk.len()) <= self.max_length {
            self.seen += chunk.len();
            return match self.streaming {
                Some(descriptor) => {
                    if let Some(stream) = descriptor.as_stream() {
                        stream
                            .on_chunk(&mut ctx.asked, &mut ctx.answer, &ctx.route, chunk)
                            .map_err(|e| ExecError::handler(descriptor.name(), e))?;
                    }
                    Ok(ChunkOutcome::Streamed)
                }
                None => {
                    self.buffer.extend_from_slice(&chunk);
                    Ok(ChunkOutcome::Buffered)
                }
            };
        }

        let first = !self.overflowed;
        self.overflowed = true;
        if first || self.notify == OverflowNotify::EveryChunk {
            debug!(
                request_id = ctx.asked.id(),
                received = self.received,
                max_length = self.max_length,
                "request body exceeds max length"
            );
            (self.overflow)(&ctx.asked, &mut ctx.answer, &ctx.route);
            Ok(ChunkOutcome::Overflowed)
        } else {
            Ok(ChunkOutcome::Discarded)
        }
    }

    /// Finishes body reading.
    ///
    /// With a streaming handler its `after` hook runs; otherwise the buffered chunks become
    /// the request body.
    pub fn on_end(self, ctx: &mut RequestContext, runner: &HandlerRunner, stage: Stage) -> Result<Flow, ExecError> {
        match self.streaming {
            Some(descriptor) => match descriptor.as_stream().and_then(|stream| stream.after_hook()) {
                Some(after) => runner.run_with(stage, descriptor, ctx, after),
                None => Ok(Flow::of(&ctx.answer)),
            },
            None => {
                debug!(request_id = ctx.asked.id(), size = self.buffer.len(), "request body read");
                ctx.asked.set_body(self.buffer.freeze());
                Ok(Flow::of(&ctx.answer))
            }
        }
    }
}

impl std::fmt::Debug for BodyReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyReader")
            .field("max_length", &self.max_length)
            .field("seen", &self.seen)
            .field("received", &self.received)
            .field("streaming", &self.streaming.map(HandlerDescriptor::name))
            .field("overflowed", &self.overflowed)
            .finish_non_exhaustive()
    }
}

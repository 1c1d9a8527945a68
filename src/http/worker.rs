//! Segment worker
//!
//! Fetches one byte range with a single GET and writes it into the shared
//! output file at the segment's offsets. The control signal is checked
//! before the request and before every read; a stop request also races any
//! read that is already pending.

use crate::control::ControlReceiver;
use crate::error::{EngineError, NetworkErrorKind, Result};
use crate::http::connection::ConnectionPool;
use crate::http::segment::Segment;
use crate::output::OutputFile;
use crate::progress::ProgressAggregator;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Response, StatusCode};
use std::sync::Arc;

/// How a worker left its loop without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every byte of the segment was written
    Completed,
    /// The job was stopped; bytes already written stay on disk
    Cancelled,
}

/// Everything a worker shares with its siblings
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub pool: Arc<ConnectionPool>,
    pub url: String,
    pub output: OutputFile,
    pub progress: Arc<ProgressAggregator>,
    /// Write buffer size
    pub chunk_size: usize,
    /// Send a `Range` header (false when one segment covers the whole resource)
    pub ranged: bool,
}

/// Fetches and writes a single segment
pub struct SegmentWorker {
    ctx: WorkerContext,
    segment: Segment,
    control: ControlReceiver,
}

impl SegmentWorker {
    pub fn new(ctx: WorkerContext, segment: Segment, control: ControlReceiver) -> Self {
        Self {
            ctx,
            segment,
            control,
        }
    }

    /// Run to completion, cancellation or failure.
    ///
    /// Every error is reported as [`EngineError::SegmentFailed`] carrying this
    /// segment's index. The worker never retries.
    pub async fn run(mut self) -> Result<WorkerExit> {
        let index = self.segment.index;
        match self.fetch().await {
            Ok(()) => {
                tracing::debug!(
                    "Segment {} finished ({} bytes)",
                    index,
                    self.segment.bytes_written
                );
                Ok(WorkerExit::Completed)
            }
            Err(EngineError::Cancelled) => {
                tracing::debug!(
                    "Segment {} cancelled after {} bytes",
                    index,
                    self.segment.bytes_written
                );
                Ok(WorkerExit::Cancelled)
            }
            Err(e) => Err(e.for_segment(index)),
        }
    }

    async fn fetch(&mut self) -> Result<()> {
        self.control.wait_until_running().await?;

        let index = self.segment.index;
        let range = if self.ctx.ranged {
            self.segment.range_header()
        } else {
            None
        };

        let mut request = self
            .ctx
            .pool
            .client()
            .get(&self.ctx.url)
            .header("User-Agent", self.ctx.pool.user_agent());
        if let Some(ref value) = range {
            request = request.header("Range", value.as_str());
        }

        tracing::debug!(
            "Segment {} requesting {}",
            index,
            range.as_deref().unwrap_or("whole resource")
        );

        let _connection = ActiveConnection::new(Arc::clone(&self.ctx.pool));
        let response = tokio::select! {
            response = request.send() => response?,
            _ = self.control.stopped() => return Err(EngineError::Cancelled),
        };

        self.check_response(&response, range.is_some())?;

        let chunk_size = self.ctx.chunk_size;
        let mut stream = response.bytes_stream();
        let mut buffer = BytesMut::with_capacity(chunk_size);

        loop {
            self.control.wait_until_running().await?;

            let next = tokio::select! {
                next = stream.next() => next,
                _ = self.control.stopped() => return Err(EngineError::Cancelled),
            };

            match next {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while buffer.len() >= chunk_size {
                        let chunk = buffer.split_to(chunk_size).freeze();
                        self.write_chunk(chunk).await?;
                    }
                }
                Some(Err(e)) => {
                    let err = EngineError::from(e);
                    return Err(err.for_segment(index));
                }
                None => break,
            }
        }

        if !buffer.is_empty() {
            self.write_chunk(buffer.freeze()).await?;
        }

        if let Some(size) = self.segment.size() {
            if self.segment.bytes_written < size {
                return Err(EngineError::segment_failed(
                    index,
                    NetworkErrorKind::InvalidResponse,
                    format!(
                        "Incomplete segment: received {} of {} bytes",
                        self.segment.bytes_written, size
                    ),
                ));
            }
        }

        Ok(())
    }

    fn check_response(&self, response: &Response, ranged: bool) -> Result<()> {
        let index = self.segment.index;
        let status = response.status();

        // Handle 416 Range Not Satisfiable - file may have changed on server
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(EngineError::segment_failed(
                index,
                NetworkErrorKind::RangeNotSatisfiable,
                "Range not satisfiable (file may have changed on server)",
            ));
        }

        if !status.is_success() {
            return Err(EngineError::segment_failed(
                index,
                NetworkErrorKind::HttpStatus(status.as_u16()),
                format!("HTTP error: {}", status),
            ));
        }

        if !ranged {
            return Ok(());
        }

        // A 200 here would be the whole body, which must not land at this offset
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(EngineError::segment_failed(
                index,
                NetworkErrorKind::InvalidResponse,
                format!("Server ignored range request (status {})", status),
            ));
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        if let (Some((got_start, got_end)), Some(end)) = (content_range, self.segment.end) {
            let start = self.segment.next_offset();
            if got_start != start || got_end != end {
                return Err(EngineError::segment_failed(
                    index,
                    NetworkErrorKind::InvalidResponse,
                    format!(
                        "Content-Range mismatch: requested {}-{}, got {}-{}",
                        start, end, got_start, got_end
                    ),
                ));
            }
        }

        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        let len = chunk.len() as u64;

        if let Some(remaining) = self.segment.remaining() {
            if len > remaining {
                return Err(EngineError::segment_failed(
                    self.segment.index,
                    NetworkErrorKind::InvalidResponse,
                    format!(
                        "Server sent more data than requested ({} bytes over)",
                        len - remaining
                    ),
                ));
            }
        }

        self.ctx
            .output
            .write_at(self.segment.next_offset(), chunk)
            .await?;

        self.segment.bytes_written += len;
        self.ctx.pool.record_download(len);
        self.ctx
            .progress
            .report(self.segment.index, self.segment.bytes_written);
        Ok(())
    }
}

/// Keeps the pool's active connection count accurate on every exit path
struct ActiveConnection(Arc<ConnectionPool>);

impl ActiveConnection {
    fn new(pool: Arc<ConnectionPool>) -> Self {
        pool.connection_started();
        Self(pool)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_finished();
    }
}

/// Parse `bytes START-END/TOTAL` (or `/*`) into `(START, END)`
pub fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let range = value.trim().strip_prefix("bytes ")?;
    let (range, _) = range.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 0-249/1000"), Some((0, 249)));
        assert_eq!(parse_content_range("bytes 750-999/*"), Some((750, 999)));
        assert_eq!(parse_content_range("bytes */1000"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }
}

//! HTTP Transfer Layer
//!
//! This module handles the HTTP side of a job:
//! - Client construction with timeouts, redirects and proxy support
//! - Size and range-support probing via HEAD
//! - Byte-range segment planning
//! - Per-segment fetch workers writing into the shared output file

pub mod connection;
pub mod probe;
pub mod segment;
pub mod worker;

pub use connection::ConnectionPool;
pub use probe::{extract_filename_from_url, probe_server, ServerCapabilities};
pub use segment::{plan_segments, Segment};
pub use worker::{SegmentWorker, WorkerContext, WorkerExit};

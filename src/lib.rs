//! # rangedl
//!
//! A concurrent, segmented HTTP download engine.
//!
//! ## Features
//!
//! - **Segmented transfers**: the resource is split into byte ranges fetched in parallel
//! - **Positioned writes**: every segment writes straight to its offset in the destination file
//! - **Pause / resume / stop**: cooperative control that parks workers without busy-waiting
//! - **Live progress**: aggregated bytes, throughput and ETA as a stream of snapshots
//! - **Async**: Built on Tokio; independent jobs run side by side
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use rangedl::{DownloadEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = DownloadEngine::new(EngineConfig::default())?;
//!
//!     let handle = engine
//!         .start("https://example.com/file.zip", "file.zip", 8)
//!         .await?;
//!
//!     let mut progress = Box::pin(handle.subscribe());
//!     while let Some(snapshot) = progress.next().await {
//!         println!("{} bytes, {} B/s", snapshot.bytes_written, snapshot.throughput);
//!     }
//!
//!     println!("{:?}", handle.wait().await);
//!     Ok(())
//! }
//! ```

// Modules
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod http;
pub mod output;
pub mod progress;
pub mod types;

// Re-exports for convenience
pub use config::{EngineConfig, HttpConfig};
pub use control::{ControlReceiver, ControlSignal, ControlState};
pub use engine::{DownloadEngine, DownloadHandle};
pub use error::{EngineError, NetworkErrorKind, Result, StorageErrorKind};
pub use output::OutputFile;
pub use progress::ProgressAggregator;
pub use types::{DownloadEvent, DownloadId, DownloadJob, DownloadOutcome, JobState, ProgressSnapshot};

// HTTP module exports
pub use http::{
    plan_segments, probe_server, ConnectionPool, Segment, SegmentWorker, ServerCapabilities,
    WorkerContext, WorkerExit,
};

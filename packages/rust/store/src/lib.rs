//! S3-compatible blob store for expanded descriptors.
//!
//! This crate provides:
//! - [`S3Store`] — bucket client (store, retrieve, list, delete, clean)
//! - [`BlobSink`] — the narrow storage seam the pipeline publishes through

pub mod s3;
pub mod sink;

pub use s3::{S3Options, S3Store};
pub use sink::BlobSink;

//! Booster catalog download and scan.
//!
//! This crate provides:
//! - [`CatalogClient`] — downloads the catalog zip snapshot over HTTP
//! - [`CatalogArchive`] — lazily yields (repository, ref) pairs from the
//!   `booster.yaml` / `common.yaml` descriptors inside the snapshot

pub mod archive;
pub mod client;

pub use archive::{CatalogArchive, Entries};
pub use client::CatalogClient;

//! GitHub REST API client for the pomwatch pipeline.
//!
//! This crate provides [`GithubClient`]:
//! - repository identifier normalization into `owner/name` form
//! - recency checks via the `Last-Modified` repository header
//! - raw file fetch at a ref
//! - zipball snapshots for local fallback expansion

pub mod client;

pub use client::GithubClient;

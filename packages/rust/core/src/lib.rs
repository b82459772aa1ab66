//! Core pipeline orchestration for pomwatch.
//!
//! This crate ties the repository client, the descriptor expander, and the
//! blob store together into the end-to-end publish run: gate each catalog
//! entry on recent activity, fetch its descriptor, expand it, and store the
//! result, falling back to a full repository snapshot when in-place
//! expansion fails.

pub mod pipeline;

mod snapshot;

//! Upstream acquisition: the retrying transport client and the two-phase
//! enrichment fan-out built on top of it.
//!
//! Every outbound request is a [`task::FetchTask`] and every task resolves
//! to exactly one [`task::FetchOutcome`]. Nothing in this module touches
//! the filesystem.

pub mod enrich;
pub mod http_client;
pub mod payload;
pub mod placeholder;
pub mod retry;
pub mod task;

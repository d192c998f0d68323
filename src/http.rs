pub mod client;
pub mod detail;
pub mod listing;
pub mod options;
pub(crate) mod retry;

pub use client::{FailureClass, HttpJsonClient, UpstreamError};
pub use detail::{DetailClient, DetailSource};
pub use listing::{ListingClient, ListingSource};
pub use options::{HttpClientOptions, DEFAULT_USER_AGENT};

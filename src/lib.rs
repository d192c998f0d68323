pub mod http;
pub mod listing;
pub mod model;
pub mod pool;
pub mod queue;
pub mod runtime;

pub use http::{
    DetailClient, DetailSource, FailureClass, HttpClientOptions, ListingClient, ListingSource,
    UpstreamError,
};
pub use listing::{ListingPage, PageRequest, PaginatedFetcher};
pub use model::{DeadLetter, FetchFailure, FetchResult, RawUnspent, Utxo, WorkItem};
pub use pool::{BackoffState, FetchReport, ItemFetcher};
pub use queue::{ResultCollection, SharedLog, WorkQueue};
pub use runtime::config::{
    AcquisitionConfig, AcquisitionConfigBuilder, AcquisitionConfigParams, ShardEndpoint,
};
pub use runtime::error::AcquisitionError;
pub use runtime::progress::{BarProgress, ProgressReporter, SilentProgress};
pub use runtime::runner::{Acquisition, Runner};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};

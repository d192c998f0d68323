pub mod page;
pub mod paginator;

pub use page::{ListingPage, PageRequest};
pub use paginator::PaginatedFetcher;

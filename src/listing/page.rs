use crate::model::RawUnspent;
use serde::Deserialize;

/// One page request against the listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub skip: u64,
}

impl PageRequest {
    pub fn new(limit: usize, skip: u64) -> Self {
        Self { limit, skip }
    }

    /// Same offset, half the size. Never goes below 1.
    pub fn halved(self) -> Self {
        Self {
            limit: (self.limit / 2).max(1),
            skip: self.skip,
        }
    }
}

/// Decoded listing response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage {
    pub start: u64,
    pub count: u64,
    #[serde(default)]
    pub total: Option<u64>,
    pub unspents: Vec<RawUnspent>,
}

impl ListingPage {
    /// Offset of the first item not covered by this page.
    pub fn next_skip(&self) -> u64 {
        self.start.saturating_add(self.count)
    }

    /// A page shorter than requested is the last one.
    pub fn is_last(&self, request: PageRequest) -> bool {
        self.count < request.limit as u64
    }
}

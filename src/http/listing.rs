use crate::http::client::HttpJsonClient;
use crate::http::options::HttpClientOptions;
use crate::listing::page::{ListingPage, PageRequest};
use anyhow::Result;
use futures::future::BoxFuture;

/// Source of paginated unspent listings for an address.
pub trait ListingSource: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        address: &'a str,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<ListingPage>>;
}

/// HTTP listing source speaking the BitGo v1 `unspents` API.
#[derive(Debug, Clone)]
pub struct ListingClient {
    http: HttpJsonClient,
    base_url: String,
}

impl ListingClient {
    pub fn new(base_url: impl Into<String>, options: HttpClientOptions) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http: HttpJsonClient::new(options)?,
            base_url,
        })
    }

    pub fn page_url(&self, address: &str, request: PageRequest) -> String {
        format!(
            "{}/address/{}/unspents?limit={}&skip={}",
            self.base_url, address, request.limit, request.skip
        )
    }
}

impl ListingSource for ListingClient {
    fn fetch_page<'a>(
        &'a self,
        address: &'a str,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<ListingPage>> {
        Box::pin(async move {
            let url = self.page_url(address, request);
            self.http.get_json::<ListingPage>(&url).await
        })
    }
}

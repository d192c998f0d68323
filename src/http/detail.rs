use crate::http::client::HttpJsonClient;
use crate::http::options::HttpClientOptions;
use crate::model::WorkItem;
use crate::runtime::config::ShardEndpoint;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;

/// One upstream shard able to return the parent transaction of a work item.
///
/// Records are opaque JSON; the only structural requirement is that the body
/// decodes as a JSON object.
pub trait DetailSource: Send + Sync {
    fn shard_id(&self) -> &str;

    fn fetch_detail<'a>(&'a self, item: &'a WorkItem) -> BoxFuture<'a, Result<Value>>;
}

/// HTTP detail source for a blockbook-style `tx-specific` endpoint.
#[derive(Debug, Clone)]
pub struct DetailClient {
    shard: ShardEndpoint,
    http: HttpJsonClient,
}

impl DetailClient {
    pub fn new(shard: ShardEndpoint, options: HttpClientOptions) -> Result<Self> {
        Ok(Self {
            shard,
            http: HttpJsonClient::new(options)?,
        })
    }

    pub fn detail_url(&self, item: &WorkItem) -> String {
        format!(
            "{}/{}",
            self.shard.base_url().trim_end_matches('/'),
            item.txid()
        )
    }
}

impl DetailSource for DetailClient {
    fn shard_id(&self) -> &str {
        self.shard.id()
    }

    fn fetch_detail<'a>(&'a self, item: &'a WorkItem) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = self.detail_url(item);
            let record = self.http.get_json::<Value>(&url).await?;
            if !record.is_object() {
                return Err(crate::http::UpstreamError::Malformed {
                    url,
                    message: "expected a JSON object".to_string(),
                }
                .into());
            }
            Ok(record)
        })
    }
}

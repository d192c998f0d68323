use std::{str::FromStr, time::Duration};

use anyhow::Result;
use bitcoin::{OutPoint, Txid};
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;
use utxofetch::{AcquisitionConfig, Utxo};

use super::mock_http::{mock_txid, MockHttpServer, MOCK_ADDRESS};

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Config pointed at `server` with `shards` detail shards and short timings.
pub fn mock_config(server: &MockHttpServer, shards: usize, fetch_limit: usize) -> Result<AcquisitionConfig> {
    AcquisitionConfig::builder()
        .listing_url(server.listing_url())
        .shard_urls((0..shards).map(|index| (format!("mock{index}"), server.shard_url(index))))?
        .fetch_limit(fetch_limit)
        .request_timeout(Duration::from_millis(250))
        .listing_timeout(Duration::from_secs(2))
        .min_backoff(Duration::from_millis(5))
        .max_backoff(Duration::from_millis(40))
        .poll_interval(Duration::from_millis(10))
        .metrics_interval(Duration::from_secs(60))
        .build()
}

/// Unspents matching the first `count` entries served by the mock listing.
pub fn mock_utxos(count: usize) -> Result<Vec<Utxo>> {
    (0..count)
        .map(|index| {
            let txid = Txid::from_str(&mock_txid(index))?;
            Ok(Utxo {
                address: MOCK_ADDRESS.to_string(),
                outpoint: OutPoint::new(txid, (index % 4) as u32),
                value_sat: 1_000 * (index as u64 + 1),
                confirmations: 6,
                block_height: Some(800_000 + index as u64),
                script: String::new(),
                date: None,
            })
        })
        .collect()
}

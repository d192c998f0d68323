use std::collections::HashSet;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, mock_config, mock_utxos},
    mock_http::{mock_txid, MockHttpServer, MockUpstream},
};
use anyhow::{bail, Result};
use utxofetch::{AcquisitionError, FailureClass, ItemFetcher, WorkItem};

fn work_items(count: usize) -> Result<Vec<WorkItem>> {
    Ok(mock_utxos(count)?.into_iter().map(WorkItem::from).collect())
}

#[tokio::test]
async fn fetches_every_item_across_shards() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(0);
    let server = MockHttpServer::start(upstream.clone()).await?;
    let config = mock_config(&server, 3, 10)?;

    let report = ItemFetcher::new(&config)?.fetch_all(work_items(24)?).await?;

    assert_eq!(report.results.len(), 24);
    assert!(report.failures.is_empty());
    assert_eq!(report.duplicates, 0);

    let mut shards = HashSet::new();
    for result in &report.results {
        assert_eq!(
            result.record["txid"].as_str(),
            Some(result.item.txid().to_string().as_str())
        );
        if let Some(shard) = result.record["served_by"].as_str() {
            shards.insert(shard.to_string());
        }
    }
    assert!(shards.len() > 1, "work should spread over shards: {shards:?}");

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn retries_transient_failures_until_success() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(0);
    let flaky = mock_txid(0);
    upstream.fail_detail(&flaky, 2);
    let server = MockHttpServer::start(upstream.clone()).await?;
    let config = mock_config(&server, 2, 10)?;

    let fetcher = ItemFetcher::new(&config)?;
    let report = fetcher.fetch_all(work_items(6)?).await?;

    assert_eq!(report.results.len(), 6);
    assert_eq!(report.failures.len(), 2);
    for failure in &report.failures {
        assert_eq!(failure.item.txid.to_string(), flaky);
        assert_eq!(failure.class, FailureClass::Transient);
    }
    assert_eq!(upstream.detail_hits(&flaky), 3);

    let snapshot = fetcher.telemetry().snapshot();
    assert_eq!(snapshot.detail_successes, 6);
    assert_eq!(snapshot.detail_failures, 2);
    assert_eq!(snapshot.requeues, 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn dead_letters_items_with_repeated_malformed_bodies() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(0);
    let broken = mock_txid(3);
    upstream.malformed_detail(&broken);
    let server = MockHttpServer::start(upstream.clone()).await?;
    let config = mock_config(&server, 2, 10)?;

    let err = match ItemFetcher::new(&config)?.fetch_all(work_items(5)?).await {
        Ok(report) => bail!("fetch unexpectedly succeeded with {} results", report.results.len()),
        Err(err) => err,
    };

    let Some(acquisition_err) = err.downcast_ref::<AcquisitionError>() else {
        bail!("unexpected error: {err:#}");
    };
    let dead_letters = acquisition_err.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].item.txid().to_string(), broken);
    assert_eq!(dead_letters[0].attempts, 3);
    assert_eq!(dead_letters[0].class, FailureClass::Structural);
    assert_eq!(upstream.detail_hits(&broken), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn slow_responses_time_out_and_are_retried() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(0);
    let slow = mock_txid(1);
    upstream.delay_detail(&slow, Duration::from_secs(2));
    let server = MockHttpServer::start(upstream.clone()).await?;
    let config = mock_config(&server, 1, 10)?;

    let fetcher = ItemFetcher::new(&config)?;
    let report = fetcher.fetch_all(work_items(3)?).await?;

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item.txid.to_string(), slow);
    assert!(fetcher.telemetry().snapshot().timeouts >= 1);

    server.shutdown().await;
    Ok(())
}

use std::sync::Arc;

use crate::support::{
    helpers::{init_tracing, mock_config},
    mock_http::{mock_txid, MockHttpServer, MockUpstream, MOCK_ADDRESS},
};
use anyhow::{bail, Result};
use utxofetch::{
    AcquisitionError, HttpClientOptions, ListingClient, ListingSource, PaginatedFetcher, Runner,
    Telemetry,
};

fn listing_client(server: &MockHttpServer) -> Result<Arc<dyn ListingSource>> {
    let client = ListingClient::new(server.listing_url(), HttpClientOptions::default())?;
    Ok(Arc::new(client))
}

#[tokio::test]
async fn lists_unspents_up_to_the_fetch_limit() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(12);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 1, 10)?)?;
    let utxos = runner.list_unspents(MOCK_ADDRESS).await?;

    assert_eq!(utxos.len(), 10);
    for (index, utxo) in utxos.iter().enumerate() {
        assert_eq!(utxo.txid().to_string(), mock_txid(index));
        assert_eq!(utxo.vout(), (index % 4) as u32);
        assert_eq!(utxo.value_sat, 1_000 * (index as u64 + 1));
        assert_eq!(utxo.address, MOCK_ADDRESS);
    }
    assert_eq!(utxos[0].block_height, Some(800_000));
    assert_eq!(utxos[1].block_height, Some(800_001));
    assert_eq!(utxos[2].block_height, None);
    assert_eq!(upstream.listing_requests(), vec![(5_000, 0)]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn walks_pages_until_a_short_page() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(10);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let telemetry = Arc::new(Telemetry::default());
    let utxos = PaginatedFetcher::new(listing_client(&server)?, 4)
        .with_telemetry(Arc::clone(&telemetry))
        .fetch(MOCK_ADDRESS, 100)
        .await?;

    assert_eq!(utxos.len(), 10);
    assert_eq!(upstream.listing_requests(), vec![(4, 0), (4, 4), (4, 8)]);
    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.listing_pages, 3);
    assert_eq!(snapshot.listed_items, 10);
    assert_eq!(snapshot.page_shrinks, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn halves_the_page_size_until_the_endpoint_accepts_it() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(30);
    upstream.set_max_page_size(1_000);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let telemetry = Arc::new(Telemetry::default());
    let utxos = PaginatedFetcher::new(listing_client(&server)?, 5_000)
        .with_telemetry(Arc::clone(&telemetry))
        .fetch(MOCK_ADDRESS, 30)
        .await?;

    assert_eq!(utxos.len(), 30);
    assert_eq!(
        upstream.listing_requests(),
        vec![(5_000, 0), (2_500, 0), (1_250, 0), (625, 0)]
    );
    assert_eq!(telemetry.snapshot().page_shrinks, 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn gives_up_after_single_item_pages_fail() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(5);
    upstream.set_max_page_size(0);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let err = match PaginatedFetcher::new(listing_client(&server)?, 5_000)
        .fetch(MOCK_ADDRESS, 5)
        .await
    {
        Ok(utxos) => bail!("listing unexpectedly succeeded with {} unspents", utxos.len()),
        Err(err) => err,
    };

    match err.downcast_ref::<AcquisitionError>() {
        Some(AcquisitionError::ListingExhausted { address, skip, .. }) => {
            assert_eq!(address, MOCK_ADDRESS);
            assert_eq!(*skip, 0);
        }
        other => bail!("unexpected listing error: {other:?}"),
    }

    let sizes: Vec<usize> = upstream
        .listing_requests()
        .into_iter()
        .map(|(limit, _)| limit)
        .collect();
    assert_eq!(
        sizes,
        vec![5_000, 2_500, 1_250, 625, 312, 156, 78, 39, 19, 9, 4, 2, 1]
    );

    server.shutdown().await;
    Ok(())
}

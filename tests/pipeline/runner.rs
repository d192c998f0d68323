use std::cmp::Reverse;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, mock_config},
    mock_http::{mock_txid, MockHttpServer, MockUpstream, MOCK_ADDRESS},
};
use anyhow::{bail, Result};
use utxofetch::{AcquisitionError, Runner, Utxo};

fn largest_three(mut utxos: Vec<Utxo>) -> Vec<Utxo> {
    utxos.sort_by_key(|utxo| Reverse(utxo.value_sat));
    utxos.truncate(3);
    utxos
}

#[tokio::test]
async fn acquires_selected_unspents_and_their_parents() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(12);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 2, 10)?)?;
    let acquisition = runner.acquire(MOCK_ADDRESS, largest_three).await?;

    let selected: Vec<String> = acquisition
        .utxos
        .iter()
        .map(|utxo| utxo.txid().to_string())
        .collect();
    assert_eq!(selected, vec![mock_txid(9), mock_txid(8), mock_txid(7)]);
    assert_eq!(acquisition.report.results.len(), 3);
    for index in 0..7 {
        assert_eq!(upstream.detail_hits(&mock_txid(index)), 0);
    }
    for index in 7..10 {
        assert_eq!(upstream.detail_hits(&mock_txid(index)), 1);
    }

    let snapshot = runner.telemetry().snapshot();
    assert_eq!(snapshot.listed_items, 12);
    assert_eq!(snapshot.detail_successes, 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_selection_skips_the_detail_stage() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(4);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 1, 10)?)?;
    let acquisition = runner.acquire(MOCK_ADDRESS, |_| Vec::new()).await?;

    assert!(acquisition.utxos.is_empty());
    assert!(acquisition.report.results.is_empty());
    assert_eq!(upstream.detail_hits(&mock_txid(0)), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cancelled_token_stops_the_acquisition() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(4);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 1, 10)?)?;
    runner.cancellation_token().cancel();

    match runner.acquire(MOCK_ADDRESS, largest_three).await {
        Ok(acquisition) => bail!(
            "acquisition unexpectedly finished with {} utxos",
            acquisition.utxos.len()
        ),
        Err(err) => assert!(AcquisitionError::is_cancelled(&err), "unexpected error: {err:#}"),
    }
    assert!(upstream.listing_requests().is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn run_until_ctrl_c_returns_the_finished_acquisition() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(6);
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 2, 10)?)?;
    let acquisition = runner
        .run_until_ctrl_c(MOCK_ADDRESS, |utxos| utxos)
        .await?;

    assert_eq!(acquisition.utxos.len(), 6);
    assert_eq!(acquisition.report.results.len(), 6);
    assert!(!runner.cancellation_token().is_cancelled());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stop_signal_cancels_only_that_run() -> Result<()> {
    init_tracing();
    let upstream = MockUpstream::new(6);
    upstream.delay_detail(&mock_txid(0), Duration::from_secs(2));
    let server = MockHttpServer::start(upstream.clone()).await?;

    let runner = Runner::new(mock_config(&server, 1, 10)?)?;
    let root = runner.cancellation_token();

    let stop = tokio::time::sleep(Duration::from_millis(50));
    match runner.run_until(MOCK_ADDRESS, |utxos| utxos, stop).await {
        Ok(acquisition) => bail!(
            "stopped run unexpectedly finished with {} results",
            acquisition.report.results.len()
        ),
        Err(err) => assert!(AcquisitionError::is_cancelled(&err), "unexpected error: {err:#}"),
    }
    assert!(!root.is_cancelled());

    let acquisition = runner.acquire(MOCK_ADDRESS, |utxos| utxos).await?;
    assert_eq!(acquisition.report.results.len(), 6);

    root.cancel();
    match runner.acquire(MOCK_ADDRESS, |utxos| utxos).await {
        Ok(_) => bail!("acquisition ignored the cancelled root token"),
        Err(err) => assert!(AcquisitionError::is_cancelled(&err), "unexpected error: {err:#}"),
    }

    server.shutdown().await;
    Ok(())
}

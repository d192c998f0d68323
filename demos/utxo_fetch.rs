use std::env;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use bitcoin::Amount;
use utxofetch::{AcquisitionConfig, AcquisitionError, Runner, Utxo};

const DEFAULT_ADDRESS: &str = "3QJmV3qfvL9SuYo34YihAf3sRCW3qSinyC";
const DEFAULT_LISTING_URL: &str = "https://www.bitgo.com/api/v1";
const DEFAULT_FETCH_LIMIT: usize = 10;
const DEFAULT_MAX_COUNT: usize = 5;
const DEFAULT_MAX_VALUE_SAT: u64 = u64::MAX;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    println!(
        "Listing up to {} unspents of {} via {}",
        args.fetch_limit, args.address, args.listing_url
    );

    let config = args.to_config()?;
    let workers = config.workers();
    let runner = Runner::new(config)?.with_progress_bars(true);

    let started = Instant::now();
    let max_count = args.max_count;
    let max_value = args.max_value_sat;
    let result = runner
        .run_until_ctrl_c(&args.address, |utxos| {
            select_consolidation(utxos, max_count, max_value)
        })
        .await;

    let acquisition = match result {
        Ok(acquisition) => acquisition,
        Err(err) if AcquisitionError::is_cancelled(&err) => {
            println!("stopped by Ctrl-C after {:.1?}", started.elapsed());
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let total: u64 = acquisition.utxos.iter().map(|utxo| utxo.value_sat).sum();
    let snapshot = runner.telemetry().snapshot();
    println!("---------------- Summary ----------------");
    println!("Selected UTXOs:       {}", acquisition.utxos.len());
    println!("Selected value:       {}", Amount::from_sat(total));
    println!("Parent transactions:  {}", acquisition.report.results.len());
    println!("Failed attempts:      {}", acquisition.report.failures.len());
    println!("Timeouts:             {}", snapshot.timeouts);
    println!("Page shrinks:         {}", snapshot.page_shrinks);
    println!("Workers:              {workers}");
    println!("Elapsed:              {:.2?}", started.elapsed());

    Ok(())
}

/// Largest outputs first, capped by count, skipping anything above `max_value_sat`.
fn select_consolidation(mut utxos: Vec<Utxo>, max_count: usize, max_value_sat: u64) -> Vec<Utxo> {
    utxos.retain(|utxo| utxo.value_sat <= max_value_sat);
    utxos.sort_by(|a, b| b.value_sat.cmp(&a.value_sat));
    utxos.truncate(max_count);
    utxos
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    utxofetch::init_tracing();
}

struct ExampleArgs {
    address: String,
    listing_url: String,
    fetch_limit: usize,
    workers: Option<usize>,
    max_count: usize,
    max_value_sat: u64,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let address = read_env_or_default("UTXOFETCH_ADDRESS", DEFAULT_ADDRESS);
        let listing_url = read_env_or_default("UTXOFETCH_LISTING_URL", DEFAULT_LISTING_URL);
        let fetch_limit =
            parse_env_with_default::<usize>("UTXOFETCH_FETCH_LIMIT", DEFAULT_FETCH_LIMIT)?;
        let workers = match env::var("UTXOFETCH_WORKERS") {
            Ok(value) => Some(
                value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("failed to parse UTXOFETCH_WORKERS='{value}'"))?,
            ),
            Err(_) => None,
        };
        let max_count = parse_env_with_default::<usize>("UTXOFETCH_MAX_COUNT", DEFAULT_MAX_COUNT)?;
        let max_value_sat =
            parse_env_with_default::<u64>("UTXOFETCH_MAX_VALUE_SAT", DEFAULT_MAX_VALUE_SAT)?;

        Ok(Self {
            address,
            listing_url,
            fetch_limit,
            workers,
            max_count,
            max_value_sat,
        })
    }

    fn to_config(&self) -> Result<AcquisitionConfig> {
        let mut builder = AcquisitionConfig::builder()
            .listing_url(self.listing_url.clone())
            .fetch_limit(self.fetch_limit);
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(_) => Ok(default),
    }
}

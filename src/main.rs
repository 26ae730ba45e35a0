//! `vagueplaces` command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vagueplaces::error::AppError;
use vagueplaces::geometry::{self, AlphaShaper};
use vagueplaces::harvest::{read_places_csv, PlaceSet, RecordSink, SinkSchema};
use vagueplaces::progress::{ConsoleProgress, NullProgress, ProgressObserver, ProgressUpdate};
use vagueplaces::report::RunReport;
use vagueplaces::sparql::fetch::{FetchConfig, DEFAULT_PAGE_SIZE, DEFAULT_RETRY_COOLDOWN};
use vagueplaces::sparql::{
    european_countries_query, place_count_query, PagedFetcher, PlaceQuery, SparqlClient,
};
use vagueplaces::split::{split_file, SplitConfig, DEFAULT_MIN_COUNT, DEFAULT_RESOURCE_PREFIX};

#[derive(Parser)]
#[command(name = "vagueplaces", version)]
#[command(about = "Harvest geocoded places from DBpedia and derive vague place boundaries")]
struct Cli {
    /// Disable the console spinner.
    #[arg(long, global = true)]
    no_spinner: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keyword harvest over European countries plus boundary geometry.
    Vague {
        /// Retrieved points file, written as `name;WKT` CSV.
        output: PathBuf,

        /// Keywords matched against place abstracts, as a disjunction.
        #[arg(long = "query", num_args = 1..)]
        keywords: Vec<String>,

        /// Alpha value for the concave outline.
        #[arg(long, default_value_t = 0.1)]
        alpha: f64,

        /// Query the live endpoint instead of the last released snapshot.
        #[arg(long)]
        live: bool,

        /// Path to the alpha-shape engine executable.
        #[arg(long, default_value = "alpha_shaper")]
        engine: PathBuf,

        /// Also write the report to this file.
        #[arg(long)]
        report_file: Option<PathBuf>,
    },

    /// Full-schema streaming harvest of every geocoded place.
    Harvest {
        /// Output file, written as `name;country;url;x;y;WKT` CSV.
        #[arg(long)]
        output: PathBuf,

        /// Query the live endpoint instead of the last released snapshot.
        #[arg(long)]
        live: bool,

        /// Rows requested per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u64,
    },

    /// Partition a harvested file into per-country point files.
    Split {
        /// Harvested input file.
        #[arg(long)]
        point_file: PathBuf,

        /// Directory receiving one `{country}_points.csv` per group.
        #[arg(long)]
        out_dir: PathBuf,

        /// A country must occur strictly more than this to get a file.
        #[arg(long, default_value_t = DEFAULT_MIN_COUNT)]
        min_count: u64,
    },

    /// List the countries of a harvested file that survive the threshold.
    Countries {
        /// Harvested input file.
        #[arg(long)]
        point_file: PathBuf,

        /// A country must occur strictly more than this to be listed.
        #[arg(long, default_value_t = DEFAULT_MIN_COUNT)]
        min_count: u64,
    },

    /// Batch alpha shapes for a partition file at several alpha values.
    Shape {
        /// Partition or harvest file to shape.
        #[arg(long)]
        point_file: PathBuf,

        /// Directory receiving one `alphaShape_{alpha}.csv` per alpha.
        #[arg(long)]
        out_dir: PathBuf,

        /// Path to the alpha-shape engine executable.
        #[arg(long, default_value = "alpha_shaper")]
        engine: PathBuf,

        /// Alpha values to generate.
        #[arg(required = true)]
        alphas: Vec<f64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let observer: Arc<dyn ProgressObserver> = if cli.no_spinner {
        Arc::new(NullProgress)
    } else {
        Arc::new(ConsoleProgress::spinner())
    };

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            watcher.cancel();
        }
    });

    let result = match cli.command {
        Command::Vague {
            output,
            keywords,
            alpha,
            live,
            engine,
            report_file,
        } => {
            run_vague(
                output,
                keywords,
                alpha,
                live,
                engine,
                report_file,
                observer.clone(),
                &cancel,
            )
            .await
        }
        Command::Harvest {
            output,
            live,
            page_size,
        } => run_harvest(output, live, page_size, observer.clone(), &cancel).await,
        Command::Split {
            point_file,
            out_dir,
            min_count,
        } => run_split(point_file, out_dir, min_count, observer.clone()).await,
        Command::Countries {
            point_file,
            min_count,
        } => run_countries(point_file, min_count, observer.clone()).await,
        Command::Shape {
            point_file,
            out_dir,
            engine,
            alphas,
        } => run_shape(point_file, out_dir, engine, alphas, observer.clone()).await,
    };

    observer.finish();

    if let Err(e) = result {
        match e {
            AppError::Cancelled => info!("stopped by operator"),
            ref e => eprintln!("error: {}", e),
        }
        std::process::exit(e.exit_code());
    }
}

/// Per-country keyword harvest, then geometry and report.
#[allow(clippy::too_many_arguments)]
async fn run_vague(
    output: PathBuf,
    keywords: Vec<String>,
    alpha: f64,
    live: bool,
    engine: PathBuf,
    report_file: Option<PathBuf>,
    observer: Arc<dyn ProgressObserver>,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let client = SparqlClient::new(live)?;
    let fetcher = PagedFetcher::new(client.clone());

    let mut report = RunReport::new();
    report.set_live(live);
    report.set_query(keywords.join(", "));
    report.set_points_file(output.display().to_string());

    let mut sink = RecordSink::create(&output, SinkSchema::Compact)?;
    let mut places = PlaceSet::new();
    let mut retrieved: u64 = 0;

    let countries = client.select(&european_countries_query()).await?;
    info!(countries = countries.len(), "country list retrieved");

    let mut outcome = Ok(());
    for country in &countries {
        let Some(uri) = country.value("place") else {
            continue;
        };
        let label = uri.rsplit('/').next().unwrap_or(uri).to_string();
        observer.update(ProgressUpdate::message(label.clone()));

        let query = match PlaceQuery::for_country(uri) {
            Ok(query) => query.with_keywords(keywords.clone()),
            Err(e) => {
                warn!(uri, error = %e, "skipping country with unusable URI");
                continue;
            }
        };

        let fetched = fetcher
            .fetch_all(
                &query,
                Some(&label),
                |place| {
                    sink.write_place(&place)?;
                    places.push(place);
                    Ok(())
                },
                &*observer,
                cancel,
            )
            .await;
        match fetched {
            Ok(summary) => retrieved += summary.retrieved,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    // Flush whatever was harvested before deciding how the run ends. An
    // interrupt still gets the report for the partial accumulation.
    sink.finish()?;
    let interrupted = match outcome {
        Ok(()) => false,
        Err(AppError::Cancelled) => true,
        Err(e) => return Err(e),
    };

    if places.is_empty() {
        println!("No results for this query");
        return if interrupted {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        };
    }

    report.set_retrieved(retrieved);
    let shaper = AlphaShaper::new(engine);
    geometry::orchestrate(&places, alpha, &shaper, &mut report).await?;

    observer.finish();
    println!("{}", report.render());
    if let Some(path) = report_file {
        report.persist(&path);
    }

    if interrupted {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// Full-schema streaming harvest of all geocoded places.
async fn run_harvest(
    output: PathBuf,
    live: bool,
    page_size: u64,
    observer: Arc<dyn ProgressObserver>,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let client = SparqlClient::new(live)?;

    // Best effort only; the harvest runs fine without a known total.
    match client.select(&place_count_query()).await {
        Ok(bindings) => {
            if let Some(total) = bindings
                .first()
                .and_then(|b| b.value("count"))
                .and_then(|v| v.parse::<u64>().ok())
            {
                observer.update(ProgressUpdate::total(total));
            }
        }
        Err(e) => warn!(error = %e, "count pre-query failed"),
    }

    let fetcher = PagedFetcher::new(client).with_config(FetchConfig {
        page_size,
        cooldown: DEFAULT_RETRY_COOLDOWN,
    });

    let mut sink = RecordSink::create(&output, SinkSchema::Full)?;
    let fetched = fetcher
        .fetch_all(
            &PlaceQuery::all_places(),
            None,
            |place| sink.write_place(&place),
            &*observer,
            cancel,
        )
        .await;

    let rows = sink.rows_written();
    let path = sink.finish()?;

    match fetched {
        Ok(summary) => {
            println!(
                "Retrieved {} rows ({} skipped) into {}",
                summary.retrieved,
                summary.skipped,
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            if matches!(e, AppError::Cancelled) {
                println!("Interrupted; {} rows flushed to {}", rows, path.display());
            }
            Err(e)
        }
    }
}

/// Two-pass partitioning of a harvested file by country.
async fn run_split(
    point_file: PathBuf,
    out_dir: PathBuf,
    min_count: u64,
    observer: Arc<dyn ProgressObserver>,
) -> Result<(), AppError> {
    let config = SplitConfig {
        min_count,
        resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
    };
    let (catalogue, result) = split_file(&point_file, &out_dir, config, observer).await?;

    println!(
        "{} partitions from {} rows ({} routed, {} dropped, {} malformed)",
        result.files.len(),
        catalogue.total_rows,
        result.rows_routed,
        result.rows_dropped,
        catalogue.failed_rows
    );
    for file in &result.files {
        println!("  {}", file.display());
    }
    Ok(())
}

/// Prints the surviving group keys of a harvested file, one per line.
async fn run_countries(
    point_file: PathBuf,
    min_count: u64,
    observer: Arc<dyn ProgressObserver>,
) -> Result<(), AppError> {
    let config = SplitConfig {
        min_count,
        ..SplitConfig::default()
    };
    let catalogue = tokio::task::spawn_blocking(move || {
        vagueplaces::split::discover_groups(&point_file, &config, &*observer)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Discovery task join error: {}", e)))??;

    for key in catalogue.surviving(min_count) {
        println!("{}", key);
    }
    Ok(())
}

/// Batch alpha shapes for a partition file, grouped by country.
async fn run_shape(
    point_file: PathBuf,
    out_dir: PathBuf,
    engine: PathBuf,
    alphas: Vec<f64>,
    observer: Arc<dyn ProgressObserver>,
) -> Result<(), AppError> {
    let (places, skipped) = read_places_csv(&point_file)?;
    if skipped > 0 {
        warn!(skipped, "rows without a parseable point were ignored");
    }
    if places.is_empty() {
        println!("No parseable points in {}", point_file.display());
        return Ok(());
    }

    let shaper = AlphaShaper::new(engine);
    let files = geometry::batch_shapes(&places, &alphas, &shaper, &out_dir, &*observer).await?;
    for file in &files {
        println!("{}", file.display());
    }
    Ok(())
}

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pagedump::browser::chromium::ChromiumBrowser;
use pagedump::core::{output_file_path, parse_target, print_error_message};
use pagedump::env::{self, EnvVar};
use pagedump::{
    Blocklist, DumpOptions, DumpResult, DumpResults, Dumper, DumperConfig, HttpFetcher,
    NamingPolicy,
};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    after_help = env::generate_env_docs()
)]
struct Cli {
    /// Directory the snapshot is written to; recreated on every run
    #[arg(short, long, default_value = "./out/")]
    out: PathBuf,

    /// Replace resource paths with random ids
    #[arg(short, long)]
    rewrite_path: bool,

    /// Do not capture resources from other origins
    #[arg(short, long)]
    same_origin: bool,

    /// Time in milliseconds the page is kept open after it has loaded
    #[arg(long, default_value_t = 10000)]
    settle_time: u64,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// URL of the page to capture
    url: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let colored = !env::core::NoColor::get_or_default(false) && atty::is(atty::Stream::Stderr);

    if let Err(e) = run(cli).await {
        print_error_message(&format!("Error: {e}"), colored);
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(env::core::LogLevel::get_or_default("info".to_string()))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> DumpResult<()> {
    // Reject bad input before a browser is started
    let target = parse_target(&cli.url)?;
    let config = DumperConfig::load(cli.config.as_deref())?;

    let fetcher = Arc::new(HttpFetcher::new(
        &config.profile.user_agent,
        config.request_timeout,
    )?);

    let blocklist = if config.blocklist.enabled {
        Blocklist::load(
            fetcher.as_ref(),
            &config.blocklist.source,
            config.blocklist.cache_file().as_deref(),
        )
        .await
    } else {
        Blocklist::empty()
    };
    info!(hosts = blocklist.len(), "blocklist ready");

    let browser = Arc::new(ChromiumBrowser::launch(&config.browser, &config.profile).await?);
    let dumper = Dumper::new(browser.clone(), fetcher, Arc::new(blocklist), config);

    let options = DumpOptions {
        settle_time: Some(Duration::from_millis(cli.settle_time)),
        naming: if cli.rewrite_path {
            NamingPolicy::Anonymize
        } else {
            NamingPolicy::Preserve
        },
        cross_origin: !cli.same_origin,
    };

    let result = dumper.capture(target.as_str(), &options).await;

    if let Err(e) = browser.close().await {
        warn!(error = %e, "failed to close browser");
    }

    let results = result?;
    write_results(&cli.out, &results).await?;

    info!(
        out = %cli.out.display(),
        files = results.len(),
        title = %results.title,
        "snapshot written"
    );
    Ok(())
}

async fn write_results(out: &Path, results: &DumpResults) -> DumpResult<()> {
    if tokio::fs::try_exists(out).await? {
        tokio::fs::remove_dir_all(out).await?;
    }
    tokio::fs::create_dir_all(out).await?;

    for (path, resource) in &results.resources {
        let Some(file_path) = output_file_path(out, path) else {
            warn!(path = %path, "skipping resource with unusable output path");
            continue;
        };

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, &resource.data).await?;
    }

    Ok(())
}

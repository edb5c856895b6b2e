use std::{path::PathBuf, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use site_mapper::{CrawlTarget, Crawler, CrawlerConfig, SiteMapWriter};

/// Builds a site map for each given URL: every page on the same scheme and host reachable within
/// the depth limit is listed in <output-dir>/<host>.txt, and one summary row per site is appended
/// to <output-dir>/summary.csv
#[derive(Parser, Debug)]
#[clap(name = "site-mapper", author, version, about, long_about = None)]
pub struct Args {
    /// Seed URLs, crawled one after another
    #[clap(value_parser, required = true)]
    urls: Vec<String>,

    /// Deepest level to crawl; the seed page is level 1
    #[clap(short = 'd', long, value_parser, default_value_t = 3)]
    max_depth: usize,

    /// Number of pages fetched concurrently
    #[clap(short, long, value_parser = clap::value_parser!(u16).range(1..), default_value_t = 6)]
    workers: u16,

    /// Per-request timeout in seconds
    #[clap(short, long, value_parser, default_value_t = 5.0)]
    timeout: f64,

    /// Give up on a site after this many seconds and save what was found so far
    #[clap(long, value_parser)]
    crawl_timeout: Option<f64>,

    /// Directory receiving the page lists and summary.csv
    #[clap(short, long, value_parser, default_value = "data")]
    output_dir: PathBuf,
}

fn seconds(value: f64, flag: &str) -> eyre::Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        eyre::bail!("--{flag} must be a positive number of seconds, got {value}");
    }
    Ok(Duration::from_secs_f64(value))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();

    let args = Args::parse();

    // Every seed is checked before the first crawl starts.
    let targets = args
        .urls
        .iter()
        .map(|url| CrawlTarget::new(url, args.max_depth))
        .collect::<site_mapper::Result<Vec<_>>>()?;

    let config = CrawlerConfig {
        workers: args.workers.into(),
        fetch_timeout: seconds(args.timeout, "timeout")?,
        crawl_timeout: args
            .crawl_timeout
            .map(|limit| seconds(limit, "crawl-timeout"))
            .transpose()?,
        ..CrawlerConfig::default()
    };
    let crawler = Crawler::new(config)?;
    let writer = SiteMapWriter::new(args.output_dir);

    for target in &targets {
        let result = crawler.crawl(target).await;
        let path = writer.save(&result)?;
        println!(
            "{}: {} pages in {:.2}s -> {}{}",
            target.seed(),
            result.page_count(),
            result.elapsed.as_secs_f64(),
            path.display(),
            if result.cancelled { " (partial)" } else { "" }
        );
    }

    Ok(())
}

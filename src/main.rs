//! Command-line entry point for the `volley` load generator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;
use yansi::Paint;

use volley::config::Config;
use volley::transport::HttpTransport;

/// Bounded HTTP load generator with proxy rotation.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = argh::from_env();
    let file = std::fs::File::open(&args.config).context("failed to open config file")?;
    let config: Config = serde_yaml::from_reader(file).context("failed to parse config YAML")?;

    let transport = HttpTransport::new(&config.target, config.timeout, &config.proxies)
        .context("failed to build HTTP transport")?;

    banner(&config);

    let report = volley::run(&config, Arc::new(transport)).await?;
    report.render();

    Ok(())
}

fn banner(config: &Config) {
    println!("{}", "## volley".bold());
    println!("  target: {}", config.target.bold());
    println!(
        "  workers: {}, requests per worker: {} ({} total)",
        config.workers.bold(),
        config.requests_per_worker.bold(),
        config.total_requests().bold(),
    );
    match config.proxies.len() {
        0 => println!("  proxy rotation: {}", "disabled".dim()),
        count => println!("  proxy rotation: {} endpoints", count.bold()),
    }
    println!("  max retries: {}", config.max_retries.bold());
    println!();
}

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use secure_connect::{open_secure_connect_bundle_with, BundleOptions, SecureConnectBundle};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOG_FILTER: &str = "info,secure_connect=info";

/// Opens a secure connect bundle and prints the connection parameters it
/// resolves to.
#[derive(Parser, Debug, Clone)]
struct Cli {
    /// Path to the secure connect bundle zip
    #[arg(long)]
    bundle: PathBuf,

    /// Metadata request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Parent directory for the temporary staging area (defaults to the system temp dir)
    #[arg(long)]
    staging_root: Option<PathBuf>,

    /// env_logger-style filter string (e.g. "info,secure_connect=debug"); overrides RUST_LOG/defaults
    #[arg(long)]
    log_filter: Option<String>,
}

#[derive(Serialize)]
struct Summary<'a> {
    contact_points: &'a [String],
    proxy_address: &'a str,
    local_dc: Option<&'a str>,
    region: &'a str,
    version: i64,
}

impl<'a> From<&'a SecureConnectBundle> for Summary<'a> {
    fn from(bundle: &'a SecureConnectBundle) -> Self {
        Self {
            contact_points: &bundle.contact_points,
            proxy_address: bundle.sni.proxy_address(),
            local_dc: bundle.local_dc(),
            region: &bundle.metadata.region,
            version: bundle.metadata.version,
        }
    }
}

fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format_timestamp_secs();
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    let mut options =
        BundleOptions::default().with_metadata_timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(root) = &cli.staging_root {
        options = options.with_staging_root(root.clone());
    }
    let bundle = open_secure_connect_bundle_with(&cli.bundle, &options)
        .with_context(|| format!("failed to open bundle {}", cli.bundle.display()))?;

    let summary = serde_json::to_string_pretty(&Summary::from(&bundle))
        .context("failed to encode bundle summary")?;
    println!("{summary}");
    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use livelist::fetch::Fetcher;
use livelist::settings::Settings;
use livelist::{load_template_file, write_outputs};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Channel template (overrides config)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Output directory (overrides config)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run everything but don't write the playlists
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    report_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(template) = args.template {
        settings.template.path = template;
    }
    if let Some(dir) = args.output_dir {
        settings.output.dir = dir;
    }
    info!("Configuration loaded from {}: {:?}", args.config.display(), settings);

    let pipeline = settings.pipeline()?;
    let template = load_template_file(&settings.template.path)?;
    info!(
        "Loaded template {}: categories={} channels={}",
        settings.template.path.display(),
        template.categories.len(),
        template.channel_count()
    );

    if settings.sources.urls.is_empty() {
        warn!("No sources configured; every template channel will be unmatched");
    }
    let fetcher = Fetcher::new(&settings.network)?;
    let sources = fetcher.fetch_all(&settings.sources.urls).await;
    if sources.is_empty() && !settings.sources.urls.is_empty() {
        error!("None of the {} configured sources could be fetched", settings.sources.urls.len());
    }

    let run = pipeline.run(&template, &sources);

    if args.dry_run {
        info!("Dry run: not writing playlists");
    } else {
        let paths = write_outputs(
            &settings.output.dir,
            &settings.output.m3u_filename,
            &settings.output.txt_filename,
            &run.m3u,
            &run.txt,
        )?;
        info!("Wrote {} and {}", paths.m3u.display(), paths.txt.display());
    }

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
    }

    info!(
        "Channel list updated: resolved={} unmatched={} dropped={} (malformed={} invalid_url={} blacklisted={})",
        run.report.channels_resolved,
        run.report.channels_unmatched,
        run.report.dropped(),
        run.report.malformed,
        run.report.invalid_url,
        run.report.blacklisted
    );
    Ok(())
}

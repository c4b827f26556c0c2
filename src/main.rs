use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use celebmatch::{config, corpus, ranking, server, ImageSource};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "celebmatch")]
#[command(version, about = "Find the celebrities whose faces look most like yours")]
struct Cli {
    /// Config file (defaults to the system or per-user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank catalog faces against a local image
    Analyze {
        /// Image containing the query face
        image: PathBuf,
        /// Number of matches to return
        #[arg(short, long, allow_negative_numbers = true)]
        num_results: Option<i64>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve POST /analyze over HTTP
    Serve,
    /// Copy the remote catalog into a local snapshot file
    Snapshot {
        /// Output file
        out: PathBuf,
    },
    /// Open config file in editor
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            image,
            num_results,
            json,
        } => {
            let num_results = num_results.unwrap_or(cfg.server.default_num_results);
            analyze(&cfg, image, num_results, json).await
        }
        Commands::Serve => serve(&cfg).await,
        Commands::Snapshot { out } => snapshot(&cfg, out).await,
        Commands::Config => open_config(cli.config),
    }
}

async fn analyze(cfg: &config::Config, image: PathBuf, num_results: i64, json: bool) -> Result<()> {
    info!("Analyzing {}", image.display());
    let analyzer = celebmatch::build_analyzer(cfg)?;

    let response = analyzer
        .analyze(ImageSource::FilePath(image), num_results)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    for r in &response.results {
        println!("{:>2}. {} (similarity {:.2})", r.rank, r.name, r.similarity);
        println!("    {}", r.reference_url);
    }
    Ok(())
}

async fn serve(cfg: &config::Config) -> Result<()> {
    let analyzer = celebmatch::build_analyzer(cfg)?;
    let state = server::AppState {
        analyzer: Arc::new(analyzer),
        default_num_results: cfg.server.default_num_results,
    };
    server::serve(state, &cfg.server.bind, cfg.server.max_upload_bytes).await
}

async fn snapshot(cfg: &config::Config, out: PathBuf) -> Result<()> {
    cfg.validate_remote()?;
    if cfg.corpus.page_size == 0 {
        anyhow::bail!("corpus.page_size must be greater than 0");
    }
    let remote = corpus::RestCorpus::new(&cfg.corpus.remote).context("building catalog client")?;

    let total = corpus::CorpusAccessor::count(&remote)
        .await
        .context("Failed to fetch record count")?;
    info!("Catalog reports {} record(s)", total);

    let mut entries = Vec::new();
    let pages = ranking::scan_pages(&remote, total, cfg.corpus.page_size, |entry| {
        entries.push(entry)
    })
    .await?;

    corpus::snapshot::save_entries(&out, &entries)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(
        "✓ Wrote {} entries from {} page(s) to {}",
        entries.len(),
        pages,
        out.display()
    );
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = config::resolve_path(path.as_deref());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), &config_path)
            .with_context(|| format!("creating {}", config_path.display()))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

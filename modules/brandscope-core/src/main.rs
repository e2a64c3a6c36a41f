use std::path::PathBuf;
use std::sync::Arc;

use ai_client::OpenAi;
use anyhow::Result;
use clap::{Parser, Subcommand};
use serper_client::SerperClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use brandscope_core::{
    load_config, AnalysisOutcome, AnalysisRequest, AppConfig, DuelRequest, EntityCategory,
    FileConfig, IdentitySelection, PipelineCaches, ReputationPipeline,
};

#[derive(Parser)]
#[command(name = "brandscope", about = "Search-backed brand reputation analysis")]
struct Cli {
    /// TOML tuning file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score one entity
    Analyze {
        name: String,
        /// Claim about the entity to check for coherence
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long, value_enum)]
        category: Option<EntityCategory>,
        /// Candidate identity to use if the name turns out to be ambiguous
        #[arg(long, conflicts_with = "skip_disambiguation")]
        select: Option<String>,
        /// Score the full result set even if the name is ambiguous
        #[arg(long)]
        skip_disambiguation: bool,
    },
    /// Compare two entities head to head
    Duel {
        first: String,
        second: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("brandscope=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let app = AppConfig::from_env()?;
    let file_config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    let mut openai = OpenAi::new(&app.openai_api_key, &app.model)
        .with_timeout(file_config.scoring.timeout());
    if let Some(base_url) = &app.openai_base_url {
        openai = openai.with_base_url(base_url);
    }
    let serper = SerperClient::with_timeout(&app.serper_api_key, file_config.search.query_timeout())?;

    let caches = PipelineCaches::new(file_config.cache.ttl());
    let pipeline = ReputationPipeline::new(Arc::new(serper), Arc::new(openai), caches, &file_config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let output = match cli.command {
        Command::Analyze {
            name,
            message,
            language,
            region,
            category,
            select,
            skip_disambiguation,
        } => {
            let request = AnalysisRequest {
                name,
                message,
                language,
                region,
                category,
            };
            match pipeline.analyze_entity(request, &cancel).await? {
                AnalysisOutcome::Scored(analysis) => serde_json::to_string_pretty(&analysis)?,
                AnalysisOutcome::NeedsDisambiguation(ticket) => {
                    let selection = match (select, skip_disambiguation) {
                        (Some(candidate), _) => Some(IdentitySelection::Candidate(candidate)),
                        (None, true) => Some(IdentitySelection::ContinueWithout),
                        (None, false) => None,
                    };
                    match selection {
                        Some(selection) => {
                            let analysis = pipeline.select_identity(ticket, selection, &cancel).await?;
                            serde_json::to_string_pretty(&analysis)?
                        }
                        None => {
                            info!("Ambiguous name; rerun with --select <CANDIDATE> or --skip-disambiguation");
                            serde_json::to_string_pretty(&AnalysisOutcome::NeedsDisambiguation(ticket))?
                        }
                    }
                }
            }
        }
        Command::Duel {
            first,
            second,
            message,
            language,
            region,
        } => {
            let request = DuelRequest {
                first,
                second,
                message,
                language,
                region,
            };
            let result = pipeline.analyze_duel(request, &cancel).await?;
            serde_json::to_string_pretty(&result)?
        }
    };

    println!("{output}");
    Ok(())
}

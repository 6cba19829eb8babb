use anyhow::Result;
use clap::Parser;
use switchboard::cli::{Cli, Commands};
use switchboard::config::settings::required_var;
use switchboard::knowledge::{KnowledgeSource, Ranker, SheetsSource};
use switchboard::{server, utils, Secrets, Settings, System};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => handle_serve(settings, port).await,
        Commands::Search { query, k } => handle_search(&settings, &query, k).await,
        Commands::Knowledge { limit } => handle_knowledge(&settings, limit).await,
    }
}

async fn handle_serve(settings: Settings, port: Option<u16>) -> Result<()> {
    let secrets = Secrets::from_env()?;
    let system = System::new(&settings, &secrets);
    let port = port.unwrap_or(settings.server.port);

    let served = server::serve(system.app_state(), &settings.server.host, port).await;
    system.shutdown().await?;
    served
}

fn sheets_source(settings: &Settings) -> Result<SheetsSource> {
    Ok(SheetsSource::from_config(
        &settings.knowledge,
        required_var("SPREADSHEET_ID")?,
        required_var("SHEETS_API_KEY")?,
    ))
}

async fn handle_search(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let rows = sheets_source(settings)?.fetch_rows().await?;
    let k = k.unwrap_or(settings.knowledge.top_k);

    utils::display::print_header(&format!("Results for \"{}\"", query));
    let ranked = Ranker::new(settings.knowledge.min_token_chars).rank(query, &rows, k);
    if ranked.is_empty() {
        utils::display::print_warning(&format!(
            "No row matched; {:?} fallback would supply:",
            settings.knowledge.fallback
        ));
        utils::display::print_rows(&settings.knowledge.fallback.apply(&rows, k));
    } else {
        utils::display::print_rows(&ranked);
    }
    Ok(())
}

async fn handle_knowledge(settings: &Settings, limit: usize) -> Result<()> {
    let rows = sheets_source(settings)?.fetch_rows().await?;

    utils::display::print_header("Knowledge table");
    utils::display::print_info(&format!("{} row(s) fetched", rows.len()));
    let shown = &rows[..rows.len().min(limit)];
    utils::display::print_rows(shown);
    if rows.len() > shown.len() {
        utils::display::print_info(&format!("... {} more", rows.len() - shown.len()));
    }
    Ok(())
}

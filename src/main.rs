use anyhow::{bail, Context};
use clap::Parser;
use homedir::my_home;

mod app;
mod cli;
mod config;
mod descriptions;
mod index;
mod lock;
mod query;
mod sync;
#[cfg(test)]
mod tests;

use config::Config;
use descriptions::CsvStore;
use index::IndexAdapter;

fn base_path(args: &cli::Args) -> anyhow::Result<String> {
    if let Some(dir) = &args.dir {
        return Ok(dir.clone());
    }

    if let Ok(dir) = std::env::var("PICSEARCH_BASE_PATH") {
        return Ok(dir);
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(format!("{}/.local/share/picsearch", home.to_string_lossy()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();

    let base_path = base_path(&args)?;
    std::fs::create_dir_all(&base_path).context("failed to create base directory")?;

    let config = Config::load_with(&base_path);
    let store = CsvStore::load(config.base_path())?;
    let adapter = IndexAdapter::new(config.index.clone(), config.base_path().to_path_buf());
    let app = app::App::new(
        store,
        adapter,
        config.base_path().to_path_buf(),
        config.pictures_path(),
    );

    match args.command {
        cli::Command::Sync {} => {
            let outcome = app.sync().await?;
            println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
        }

        cli::Command::Search { query, limit } => {
            if query.trim().is_empty() {
                bail!("query must not be empty");
            }
            let outcomes = app.search(&query, limit).await;
            println!("{}", serde_json::to_string_pretty(&outcomes).unwrap());
        }

        cli::Command::Add { name, description } => {
            let record = app.add(&name, &description).await?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap());
        }

        cli::Command::Stats {} => {
            let stats = app.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats).unwrap());
        }

        cli::Command::Clear {} => {
            app.clear_index().await?;
            println!("index cleared");
        }
    }

    Ok(())
}

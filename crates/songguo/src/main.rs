use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use songguo::engine::IntegrationContext;
use songguo::integrations::sgdz::entry::ConfigEntry;
use songguo::integrations::sgdz::flow::FlowResult;
use songguo::integrations::sgdz::flow::StepId;
use songguo::integrations::sgdz::flow::UserInput;
use songguo::Config;
use songguo::ConfigFlow;
use songguo::Engine;
use songguo::EntryStore;
use songguo::HttpVendorApi;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::io::Stdin;

#[derive(Debug, Parser)]
#[command(version, about = "Power control for SGDZ remote computers")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "songguo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the engine and HTTP API (default)
    Run,
    /// Add a device interactively
    Setup,
    /// List configured entries
    List,
    /// Remove a configured entry
    Remove { entry_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter())
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Setup => setup(config).await,
        Command::List => list(&config),
        Command::Remove { entry_id } => remove(&config, &entry_id),
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        eprintln!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn load_store(config: &Config) -> anyhow::Result<EntryStore> {
    EntryStore::load(&config.storage.path).with_context(|| {
        format!(
            "Failed to load entry store {}",
            config.storage.path.display()
        )
    })
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("songguo starting");

    let entries = load_store(&config)?;
    tracing::info!(
        "Loaded {} entries from {}",
        entries.entries().len(),
        entries.path().display()
    );

    let engine = Arc::new(Engine::new());
    let count = engine.register_integrations(&IntegrationContext {
        config: &config,
        entries: &entries,
    });
    tracing::info!("Registered {} integrations", count);

    let runner = engine.clone();
    let engine_handle = tokio::spawn(async move { runner.run().await });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_handle = if config.api.enabled {
        let engine = engine.clone();
        let listen = config.api.listen.clone();
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = songguo::api::serve(listen, port, engine, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        }))
    } else {
        None
    };

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    let _ = shutdown_tx.send(());
    if let Some(handle) = api_handle {
        if let Err(e) = handle.await {
            tracing::warn!("HTTP API task ended abnormally: {}", e);
        }
    }

    engine.shutdown().await;
    engine_handle.abort();

    tracing::info!("songguo shutdown complete");
    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{}: ", label).as_bytes()).await?;
    stdout.flush().await?;

    let line = lines
        .next_line()
        .await?
        .context("Input closed before setup finished")?;
    Ok(line.trim().to_string())
}

async fn setup(config: Config) -> anyhow::Result<()> {
    let mut store = load_store(&config)?;
    let api = Arc::new(HttpVendorApi::new(&config.vendor).context("Failed to create vendor client")?);
    let mut flow = ConfigFlow::new(api, store.unique_ids().collect::<Vec<_>>());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut result = flow.start();
    loop {
        let options = result.device_options().to_vec();
        result = match result {
            FlowResult::ShowForm {
                step_id: StepId::User,
                errors,
                ..
            } => {
                if let Some(error) = errors.base {
                    println!("Error ({}): {}", error, error.message());
                }
                for (field, error) in &errors.fields {
                    println!("{}: {}", field, error.message());
                }

                let account = prompt(&mut lines, "Account").await?;
                let password = prompt(&mut lines, "Password").await?;
                flow.step_user(UserInput { account, password }).await
            }
            FlowResult::ShowForm {
                step_id: StepId::SelectDevice,
                ..
            } => {
                println!("Devices on this account:");
                for (i, option) in options.iter().enumerate() {
                    println!("  {}) {}", i + 1, option.name());
                }

                let choice = loop {
                    let answer = prompt(&mut lines, "Select a device").await?;
                    match answer.parse::<usize>() {
                        Ok(n) if (1..=options.len()).contains(&n) => break options[n - 1].clone(),
                        _ => println!("Enter a number between 1 and {}", options.len()),
                    }
                };
                flow.step_select_device(choice)?
            }
            FlowResult::CreateEntry { title, data } => {
                let entry_id = store.add(ConfigEntry::new(title, data))?;
                store.save()?;
                println!(
                    "Added entry {} to {}",
                    entry_id,
                    store.path().display()
                );
                return Ok(());
            }
            FlowResult::Abort { reason } => {
                println!("Setup aborted: {}", reason);
                return Ok(());
            }
        };
    }
}

fn list(config: &Config) -> anyhow::Result<()> {
    let store = load_store(config)?;
    if store.entries().is_empty() {
        println!("No entries configured");
    }
    for entry in store.entries() {
        println!(
            "{}\t{}\t{}",
            entry.entry_id, entry.data.account, entry.data.device_name
        );
    }
    Ok(())
}

fn remove(config: &Config, entry_id: &str) -> anyhow::Result<()> {
    let mut store = load_store(config)?;
    match store.remove(entry_id) {
        Some(entry) => {
            store.save()?;
            println!("Removed {} ({})", entry.entry_id, entry.title);
            Ok(())
        }
        None => anyhow::bail!("No entry with id {}", entry_id),
    }
}

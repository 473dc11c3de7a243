//! Delve CLI - Command-line interface for research runs
//!
//! Runs a multi-step research pipeline against a locally hosted model server
//! and renders its progress in the terminal

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use delve_core::{init_logging, DelveConfig, ResearchConfig};
use delve_llm::GenerationClient;
use delve_research::{
    drive, fetcher_from_config, ResearchEvent, ResearchPipeline, ResearchReport, ResearchStage,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Multi-step research with a local language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and print the final report
    Research {
        /// Topic to research
        topic: String,

        /// Model identifier on the server
        #[arg(short, long)]
        model: Option<String>,

        /// Sampling temperature (0.0-1.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// Maximum tokens per model call
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Search iterations per research area
        #[arg(long)]
        depth: Option<usize>,

        /// Maximum sources collected per research area
        #[arg(long)]
        max_sources: Option<usize>,

        /// Maximum number of research areas
        #[arg(long)]
        max_areas: Option<usize>,

        /// Stream model replies instead of waiting for whole bodies
        #[arg(long)]
        stream: bool,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

/// Research flags that override the configured values
struct ResearchOverrides {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    depth: Option<usize>,
    max_sources: Option<usize>,
    max_areas: Option<usize>,
    stream: bool,
}

impl ResearchOverrides {
    fn apply(self, mut config: ResearchConfig) -> ResearchConfig {
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(depth) = self.depth {
            config.search_depth = depth;
        }
        if let Some(max_sources) = self.max_sources {
            config.max_sources = max_sources;
        }
        if let Some(max_areas) = self.max_areas {
            config.max_areas = max_areas;
        }
        config.stream |= self.stream;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (mut config, config_source) = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Delve CLI v{}", env!("CARGO_PKG_VERSION"));
    match &config_source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Research {
            topic,
            model,
            temperature,
            max_tokens,
            depth,
            max_sources,
            max_areas,
            stream,
            output,
            json,
        } => {
            let overrides = ResearchOverrides {
                model,
                temperature,
                max_tokens,
                depth,
                max_sources,
                max_areas,
                stream,
            };
            handle_research(topic, overrides, output, json, &config).await
        }
        Commands::Config {
            init,
            show,
            validate,
        } => handle_config(init, show, validate, &config, cli.config.as_deref()),
    }
}

/// Candidate config files, in lookup order
fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|d| d.join("delve").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".delve").join("config.toml")),
        Some(PathBuf::from("delve.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn load_config(config_path: Option<&Path>) -> Result<(DelveConfig, Option<PathBuf>)> {
    if let Some(path) = config_path {
        let config = DelveConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    for path in default_config_paths() {
        if path.exists() {
            let config = DelveConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            return Ok((config, Some(path)));
        }
    }

    Ok((DelveConfig::default(), None))
}

async fn handle_research(
    topic: String,
    overrides: ResearchOverrides,
    output: Option<PathBuf>,
    json: bool,
    config: &DelveConfig,
) -> Result<()> {
    let research_config = overrides.apply(config.research.clone());

    let client = GenerationClient::new(config.client.clone())?;
    let fetcher = fetcher_from_config(&config.search)?;
    let pipeline = ResearchPipeline::new(client, fetcher);

    let run = pipeline.run(topic.as_str(), research_config);
    info!(run_id = run.run_id(), topic = %topic, "Research started");
    println!("🔬 Researching: {}", topic);

    let mut render = |event: &ResearchEvent| render_event(event);
    let outcome = tokio::select! {
        outcome = drive(run, &mut render) => outcome,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the drive future drops the run and closes any open response.
            warn!("Research interrupted");
            bail!("Research interrupted");
        }
    };

    let report = match outcome {
        Ok(report) => report,
        Err(e) => bail!("Research failed: {}", e),
    };

    let rendered = render_report(&report, json)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            println!("📄 Report written to {:?}", path);
        }
        None => println!("\n{}", rendered),
    }

    Ok(())
}

/// Route events by stage tag, never by message text
fn render_event(event: &ResearchEvent) {
    let progress = event.progress();
    let percent = (progress.fraction * 100.0).round() as u32;

    match event {
        ResearchEvent::Progress(progress) => match progress.stage {
            ResearchStage::Planning => println!("[{:>3}%] 🧭 {}", percent, progress.message),
            ResearchStage::AreaSearch => println!("[{:>3}%] 🔎 {}", percent, progress.message),
            ResearchStage::AreaSummary => println!("[{:>3}%] 📝 {}", percent, progress.message),
            ResearchStage::Aggregating => println!("[{:>3}%] 🧩 {}", percent, progress.message),
            ResearchStage::Complete | ResearchStage::Error => {
                println!("[{:>3}%] {}", percent, progress.message)
            }
        },
        ResearchEvent::Complete { report, .. } => println!(
            "[{:>3}%] ✅ Research complete: {} areas, {} sources",
            percent,
            report.areas.len(),
            report.source_count()
        ),
        ResearchEvent::Failed {
            failed_stage,
            error,
            ..
        } => eprintln!("[{:>3}%] ❌ {} stage failed: {}", percent, failed_stage, error),
    }
}

fn render_report(report: &ResearchReport, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.to_markdown())
    }
}

fn handle_config(
    init: bool,
    show: bool,
    validate: bool,
    config: &DelveConfig,
    config_path: Option<&Path>,
) -> Result<()> {
    if init {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => default_config_paths()
                .into_iter()
                .next()
                .context("Could not determine a configuration directory")?,
        };
        if path.exists() {
            bail!("Configuration already exists at {:?}", path);
        }
        DelveConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {:?}", path);
        println!("📝 Edit the file to point at your model server and search endpoint.");
    }

    if show {
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    if !(init || show || validate) {
        println!("Nothing to do. Use --init, --show or --validate.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_values() {
        let base = ResearchConfig::default();
        let overrides = ResearchOverrides {
            model: Some("llama3".to_string()),
            temperature: None,
            max_tokens: None,
            depth: Some(1),
            max_sources: None,
            max_areas: Some(2),
            stream: true,
        };

        let merged = overrides.apply(base.clone());
        assert_eq!(merged.model, "llama3");
        assert_eq!(merged.search_depth, 1);
        assert_eq!(merged.max_areas, 2);
        assert!(merged.stream);
        assert_eq!(merged.temperature, base.temperature);
        assert_eq!(merged.max_sources, base.max_sources);
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let missing = std::env::temp_dir().join("delve-missing-config-for-test.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn cli_parses_research_flags() {
        let cli = Cli::parse_from([
            "delve",
            "research",
            "quantum computing",
            "--depth",
            "2",
            "--stream",
            "--json",
        ]);
        match cli.command {
            Commands::Research {
                topic,
                depth,
                stream,
                json,
                ..
            } => {
                assert_eq!(topic, "quantum computing");
                assert_eq!(depth, Some(2));
                assert!(stream);
                assert!(json);
            }
            Commands::Config { .. } => panic!("expected research command"),
        }
    }
}

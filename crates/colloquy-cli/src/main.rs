use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod chat;
mod config;
mod console;

use colloquy_core::settings::{self, Settings};
use colloquy_core::{LlmConfig, OpenAiProvider, ResponseCache, RetryingProvider};
use config::ColloquyConfig;
use console::ConsoleSink;

#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(version)]
#[command(about = "A Student agent interviews two expert agents about language models")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print LLM replies only once they are complete
    #[arg(short = 's', long = "nostream")]
    no_stream: bool,

    /// Don't reuse cached LLM responses
    #[arg(short = 'n', long = "nocache")]
    no_cache: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings::from_flags(self.debug, self.no_stream, self.no_cache)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    settings::set_global(cli.settings());
    debug!("Settings: {:?}", settings::global());

    let cfg = ColloquyConfig::load(&cli.config)?;
    debug!("Config: {:?}", cfg);
    cmd_chat(&cfg).await
}

async fn cmd_chat(cfg: &ColloquyConfig) -> Result<()> {
    if cfg.llm.api_key.is_empty() {
        bail!("No OpenAI API key. Set OPENAI_API_KEY or api_key under [llm] in the config file.");
    }

    let provider = OpenAiProvider::new(
        cfg.llm.api_key.clone(),
        cfg.llm.model.clone(),
        cfg.llm.base_url.clone(),
        cfg.llm.max_tokens,
        Duration::from_secs(cfg.llm.timeout_secs),
    )?;
    let provider = RetryingProvider::new(Box::new(provider)).with_max_attempts(cfg.llm.max_retries);
    let mut llm = LlmConfig::new(Arc::new(provider));

    let use_cache = settings::global().cache;
    let cache = if use_cache {
        let cache = ResponseCache::load(cfg.cache.resolved_path(), cfg.cache.capacity)
            .context("Failed to open response cache")?;
        let cache = Arc::new(cache);
        llm = llm.with_cache(cache.clone());
        Some(cache)
    } else {
        None
    };

    info!("Starting conversation with {}", cfg.llm.model);
    let sink = Arc::new(ConsoleSink::stdout());
    let mut student = chat::build_three_agent_chat(llm, sink, cfg.task.max_turns);

    let outcome = student.run(None).await;

    // keep whatever was cached even if the conversation failed part-way
    if let Some(cache) = &cache {
        if let Err(e) = cache.save() {
            warn!("Failed to save response cache: {:#}", e);
        }
    }

    let result = outcome.context("Conversation failed")?;
    let usage = student.total_usage();

    println!();
    match result {
        Some(doc) if !doc.content.is_empty() => {
            println!("{}", "Bullet points".bold().underline());
            println!("{}", doc.content);
        }
        _ => println!("{}", "The Student finished without a final answer.".yellow()),
    }
    println!(
        "\n{} {} turns, {} tokens ({} in, {} out), ended: {}",
        "Done:".green().bold(),
        student.turns(),
        usage.total(),
        usage.input_tokens,
        usage.output_tokens,
        student.status()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["colloquy"]).unwrap();
        assert_eq!(cli.settings(), Settings::new());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_each_flag_toggles_one_setting() {
        let debug = Cli::try_parse_from(["colloquy", "--debug"]).unwrap().settings();
        assert_eq!(debug, Settings { debug: true, ..Settings::new() });

        let no_stream = Cli::try_parse_from(["colloquy", "--nostream"]).unwrap().settings();
        assert_eq!(no_stream, Settings { stream: false, ..Settings::new() });

        let no_cache = Cli::try_parse_from(["colloquy", "--nocache"]).unwrap().settings();
        assert_eq!(no_cache, Settings { cache: false, ..Settings::new() });
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from(["colloquy", "-d", "-s", "-n", "-c", "/tmp/c.toml"]).unwrap();
        assert_eq!(
            cli.settings(),
            Settings {
                debug: true,
                cache: false,
                stream: false
            }
        );
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["colloquy", "--fast"]).is_err());
    }
}

//! `calbot` command-line front end.

use std::path::PathBuf;

use anyhow::{Context, Result};
use calbot_runtime::{GenerateTextRequest, ProviderCatalog, Runtime, RuntimeConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "calbot")]
#[command(about = "Calendar bot text generation with provider fallback", long_about = None)]
struct Cli {
    /// YAML configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate text, falling back across providers
    Ask {
        /// Provider to try first
        #[arg(short, long)]
        provider: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        #[arg(short, long, default_value_t = calbot_runtime::providers::DEFAULT_TEMPERATURE)]
        temperature: f32,

        #[arg(short, long, default_value_t = calbot_runtime::providers::DEFAULT_MAX_TOKENS)]
        max_tokens: u32,

        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// List capabilities, provider order and availability
    Providers,

    /// Validate and print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            provider,
            system,
            temperature,
            max_tokens,
            prompt,
        } => {
            let runtime = build_runtime(config)?;

            let mut request = GenerateTextRequest::new(prompt.join(" "))
                .with_temperature(temperature)
                .with_max_tokens(max_tokens);
            if let Some(system) = system {
                request = request.with_system_prompt(system);
            }

            let response = runtime
                .text_generator()
                .generate(&request, provider.as_deref())
                .await
                .context("text generation failed")?;

            println!("{}", response.content);
            eprintln!("[{} / {}]", response.provider, response.model);
        }
        Commands::Providers => {
            let runtime = build_runtime(config)?;
            let registry = runtime.registry();

            for capability in registry.capabilities() {
                println!("{}", capability);
                for (priority, registration) in registry.get_providers(capability).iter().enumerate() {
                    let status = if registration.is_available() {
                        "available"
                    } else {
                        "not configured"
                    };
                    println!(
                        "  {}. {:<12} {:<14} {}",
                        priority + 1,
                        registration.id(),
                        runtime.config().provider_type(registration.id()),
                        status
                    );
                }
            }
        }
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config).context("failed to render configuration")?;
            print!("{}", yaml);
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config
        .apply_env()
        .context("invalid environment override")?;

    tracing::debug!(
        capabilities = config.resilience.capabilities.len(),
        providers = config.providers.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn build_runtime(config: RuntimeConfig) -> Result<Runtime> {
    Runtime::from_config(config, &ProviderCatalog::with_defaults())
        .context("failed to initialise providers")
}

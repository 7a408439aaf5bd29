//! CLI binary for routing prompts across LLM providers.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ensemble_llm::{Prompt, ProviderResponse};
use ensemble_optimizer::{DefaultOptimizer, PromptOptimizer};
use ensemble_orchestrator::{GenerationRequest, LoggingMiddleware, Orchestrator};

use crate::config::{providers_from_env, CliConfig};

#[derive(Parser)]
#[command(name = "ensemble", version, about = "Route prompts across multiple LLM providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (limits, health, cache, providers)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct PromptArgs {
    /// Prompt text
    prompt: String,

    /// Goal metadata folded into the prompt
    #[arg(long)]
    goal: Option<String>,

    /// Role metadata folded into the prompt
    #[arg(long)]
    role: Option<String>,

    /// System message prepended to the prompt
    #[arg(long)]
    system: Option<String>,

    /// Preferred providers, in order (repeatable)
    #[arg(short, long = "provider")]
    providers: Vec<String>,

    /// Skip the response cache lookup
    #[arg(long)]
    no_cache: bool,
}

impl PromptArgs {
    fn request(&self) -> GenerationRequest {
        let mut prompt = Prompt::new(self.prompt.clone());
        if let Some(goal) = &self.goal {
            prompt = prompt.with_goal(goal.clone());
        }
        if let Some(role) = &self.role {
            prompt = prompt.with_role(role.clone());
        }
        if let Some(system) = &self.system {
            prompt = prompt.with_system_message(system.clone());
        }
        let mut request = GenerationRequest::new(prompt).with_bypass_cache(self.no_cache);
        for provider in &self.providers {
            request = request.prefer(provider.clone());
        }
        request
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate with the first eligible provider
    Generate(PromptArgs),

    /// Generate with every eligible provider concurrently
    All(PromptArgs),

    /// Generate with every eligible provider and print the best response
    Best(PromptArgs),

    /// Embed text
    Embed {
        text: String,

        /// Provider to embed with (default: first eligible)
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Rewrite a prompt for a goal and context
    Optimize {
        prompt: String,

        #[arg(long, default_value = "")]
        goal: String,

        #[arg(long, default_value = "")]
        context: String,

        /// Provider to run the rewrite on
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Probe providers and print their health
    Health {
        /// Keep probing on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let orchestrator = Arc::new(build_orchestrator(cli.config.as_deref())?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling in-flight requests");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Generate(args) => {
            let response = orchestrator.generate(&args.request(), &cancel).await?;
            print_response(&response);
        }
        Commands::All(args) => {
            let responses = orchestrator
                .generate_from_all(&args.request(), &cancel)
                .await?;
            for response in &responses {
                print_response(response);
                println!();
            }
        }
        Commands::Best(args) => {
            let response = orchestrator.generate_best(&args.request(), &cancel).await?;
            print_response(&response);
        }
        Commands::Embed { text, provider } => {
            let vector = orchestrator
                .embed(&text, provider.as_deref(), &cancel)
                .await?;
            println!("{}", serde_json::to_string(&vector)?);
        }
        Commands::Optimize {
            prompt,
            goal,
            context,
            provider,
        } => {
            let optimizer = DefaultOptimizer::new(orchestrator.clone(), provider)
                .with_cancellation(cancel.clone());
            let result = optimizer.optimize(&prompt, &goal, &context).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Health { watch } => {
            cmd_health(&orchestrator, watch, cancel).await?;
        }
    }

    Ok(())
}

fn build_orchestrator(config_path: Option<&std::path::Path>) -> anyhow::Result<Orchestrator> {
    let config = match config_path {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };

    let providers = if config.providers.is_empty() {
        providers_from_env()?
    } else {
        config
            .providers
            .iter()
            .map(|spec| spec.build())
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let builder = providers.into_iter().fold(
        Orchestrator::builder()
            .config(config.orchestrator)
            .middleware(LoggingMiddleware),
        |b, p| b.register_dyn(p),
    );
    Ok(builder.build()?)
}

fn print_response(response: &ProviderResponse) {
    println!(
        "[{}] ({}, {} tokens)",
        response.provider, response.response.model, response.response.usage.total_tokens
    );
    println!("{}", response.text());
}

async fn cmd_health(
    orchestrator: &Arc<Orchestrator>,
    watch: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if !watch {
        orchestrator.probe_all().await;
        print_health(orchestrator);
        return Ok(());
    }

    let prober = orchestrator.spawn_health_probes(cancel.clone());
    let mut tick = tokio::time::interval(orchestrator.config().health.probe_interval);
    loop {
        tokio::select! {
            _ = tick.tick() => print_health(orchestrator),
            _ = cancel.cancelled() => break,
        }
    }
    prober.await?;
    Ok(())
}

fn print_health(orchestrator: &Orchestrator) {
    let metrics = orchestrator.metrics();
    for report in orchestrator.health_snapshot() {
        let calls = metrics
            .iter()
            .find(|(name, _)| *name == report.provider)
            .map(|(_, m)| *m)
            .unwrap_or_default();
        println!(
            "{:<16} {:<10} failures(window)={} failures(total)={} calls={} avg_latency_ms={}",
            report.provider,
            report.status,
            report.failures_in_window,
            report.total_failures,
            calls.calls,
            calls.avg_latency_ms(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_with_preferences() {
        let cli = Cli::try_parse_from([
            "ensemble", "generate", "hello", "-p", "openai", "-p", "gemini", "--no-cache",
            "--goal", "greet",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let request = args.request();
        assert_eq!(request.preferred_providers, vec!["openai", "gemini"]);
        assert!(request.bypass_cache);
        assert_eq!(request.prompt.goal.as_deref(), Some("greet"));
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ensemble", "health", "--config", "x.json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("x.json")));
        assert!(matches!(cli.command, Commands::Health { watch: false }));
    }

    #[test]
    fn optimize_defaults_goal_and_context() {
        let cli = Cli::try_parse_from(["ensemble", "optimize", "draft"]).unwrap();
        let Commands::Optimize { goal, context, provider, .. } = cli.command else {
            panic!("expected optimize");
        };
        assert!(goal.is_empty());
        assert!(context.is_empty());
        assert!(provider.is_none());
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use layerstack::layer::builtin;
use layerstack::{
    BindingStatus, CodecConfig, EngineConfig, LayerRegistry, LoadedStack, RunState, StackCodec,
    StackRunner, StopSignal, VersionPolicy,
};

#[derive(Parser)]
#[command(name = "layerstack", version, about = "Inspect, repoint, and run layer stacks")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "warning_only")]
    debug: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    warning_only: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct StackArgs {
    /// Stack document (.json, .yaml, .yml, .toml, or .archive)
    stack_file: PathBuf,
    /// Layer library directory; earlier ones take precedence
    #[arg(short = 'l', long = "library")]
    libraries: Vec<PathBuf>,
    /// Refuse stacks saved against a different layer version
    #[arg(long)]
    strict_versions: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stack's layers and argument values
    List(StackArgs),
    /// Print every argument validation error
    Validate(StackArgs),
    /// Point the stack at a new run directory and/or model
    Repoint {
        #[command(flatten)]
        stack: StackArgs,
        #[arg(long)]
        run_dir: Option<PathBuf>,
        #[arg(long)]
        model_path: Option<PathBuf>,
        /// Output file (default: the input name prefixed with `_`)
        #[arg(short, long)]
        outfile: Option<PathBuf>,
    },
    /// Run the stack
    Run {
        #[command(flatten)]
        stack: StackArgs,
        /// Override the stack's run directory
        #[arg(long)]
        run_dir: Option<PathBuf>,
        /// Override the stack's model path
        #[arg(long)]
        model_path: Option<PathBuf>,
        /// Save the final model here
        #[arg(long)]
        save_path: Option<PathBuf>,
        /// Do not archive the stack into the run directory
        #[arg(long)]
        no_archive: bool,
        /// Save the model after every model layer
        #[arg(long)]
        checkpoint: bool,
        /// Resume at this binding index
        #[arg(long)]
        start_at: Option<usize>,
    },
}

fn registry(args: &StackArgs) -> anyhow::Result<LayerRegistry<Value>> {
    builtin::register_layers(LayerRegistry::builder())?
        .libraries(&args.libraries)
        .build()
        .context("Failed to build the layer registry")
}

fn codec(args: &StackArgs) -> StackCodec {
    StackCodec::new(CodecConfig {
        version_policy: if args.strict_versions {
            VersionPolicy::Deny
        } else {
            VersionPolicy::Warn
        },
    })
}

fn load(args: &StackArgs) -> anyhow::Result<(LoadedStack, LayerRegistry<Value>)> {
    let registry = registry(args)?;
    let loaded = codec(args)
        .load(&args.stack_file, &registry)
        .with_context(|| format!("Failed to load {}", args.stack_file.display()))?;
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok((loaded, registry))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.debug {
        "debug"
    } else if cli.warning_only {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::List(args) => {
            let (loaded, _) = load(&args)?;
            print!("{}", loaded.stack);
        }
        Command::Validate(args) => {
            let (loaded, _) = load(&args)?;
            let errors = loaded.stack.validate();
            if errors.is_empty() {
                println!("[OK] {} is valid", loaded.stack.name());
            } else {
                for error in &errors {
                    println!("{}", error);
                }
                bail!("{} validation error(s)", errors.len());
            }
        }
        Command::Repoint {
            stack,
            run_dir,
            model_path,
            outfile,
        } => {
            let registry = registry(&stack)?;
            let target = codec(&stack).repoint(
                &stack.stack_file,
                &registry,
                run_dir,
                model_path,
                outfile.as_deref(),
            )?;
            println!("Saved {}", target.display());
        }
        Command::Run {
            stack,
            run_dir,
            model_path,
            save_path,
            no_archive,
            checkpoint,
            start_at,
        } => {
            let (loaded, registry) = load(&stack)?;
            let signal = StopSignal::new();
            let ctrl_c = signal.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, stopping after the current layer");
                    ctrl_c.trigger();
                }
            });

            let mut builder = StackRunner::builder(loaded.stack, Arc::new(registry))
                .config(EngineConfig {
                    checkpoint,
                    archive: !no_archive,
                    ..EngineConfig::default()
                })
                .stop_signal(signal)
                .start_at(start_at.unwrap_or_default());
            if let Some(run_dir) = run_dir {
                builder = builder.run_dir(run_dir);
            }
            if let Some(model_path) = model_path {
                builder = builder.model_path(model_path);
            }
            if let Some(save_path) = save_path {
                builder = builder.save_path(save_path);
            }

            let report = builder.run().await?;
            for outcome in &report.record.outcomes {
                let status = match &outcome.status {
                    BindingStatus::Succeeded => "ok".to_string(),
                    BindingStatus::Failed { error } => format!("failed: {}", error),
                    BindingStatus::Skipped { reason } => format!("skipped ({:?})", reason),
                };
                println!("{:>3}. {}: {}", outcome.index, outcome.layer, status);
            }
            if let RunState::Stopped { next } = report.record.state {
                println!("Stopped before binding {}", next);
            }
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use voicebank::app;
use voicebank::cli::{Cli, Commands, ConfigAction, TimelineKind};
use voicebank::config::Config;
use voicebank::output;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let quiet = cli.quiet;
    match cli.command {
        Commands::Units { granularity } => {
            let mut config = load_config(cli.config.as_deref(), cli.root)?;
            if let Some(g) = granularity {
                config.units.granularity = g.into();
            }
            app::run_units(&config, quiet)?;
        }
        Commands::Timeline {
            kind,
            index_interval,
        } => {
            let mut config = load_config(cli.config.as_deref(), cli.root)?;
            if let Some(secs) = index_interval {
                config.timeline.index_interval_secs = secs;
            }
            match kind {
                TimelineKind::Wave => app::run_wave_timeline(&config, quiet)?,
                TimelineKind::Frames => app::run_frame_timeline(&config, quiet)?,
            };
        }
        Commands::Features => {
            let config = load_config(cli.config.as_deref(), cli.root)?;
            app::run_features(&config, quiet)?;
        }
        Commands::JoinFeatures { weights } => {
            let mut config = load_config(cli.config.as_deref(), cli.root)?;
            if let Some(path) = weights {
                config = config.with_weights_file(&path)?;
            }
            app::run_join_features(&config, quiet)?;
        }
        Commands::JoinCosts {
            workers,
            retain_percent,
            retain_min,
        } => {
            let mut config = load_config(cli.config.as_deref(), cli.root)?;
            if let Some(n) = workers {
                config.join_cost.workers = n;
            }
            if let Some(p) = retain_percent {
                config.join_cost.retain_percent = p;
            }
            if let Some(m) = retain_min {
                config.join_cost.retain_min = m;
            }
            app::run_join_costs(&config, quiet)?;
        }
        Commands::Verify => {
            let config = load_config(cli.config.as_deref(), cli.root)?;
            app::run_verify(&config, quiet)?;
        }
        Commands::Build { workers } => {
            let mut config = load_config(cli.config.as_deref(), cli.root)?;
            if let Some(n) = workers {
                config.join_cost.workers = n;
            }
            app::build_all(&config, quiet)?;
            if !quiet {
                eprintln!(
                    "{} {}",
                    "Voice database ready in".green(),
                    config
                        .database
                        .resolve(&config.database.output_dir)
                        .display()
                );
            }
        }
        Commands::Inspect { file, json } => {
            let inspection = output::inspect(&file)
                .with_context(|| format!("Failed to inspect {}", file.display()))?;
            if json {
                println!("{}", output::render_json(&inspection)?);
            } else {
                print!("{}", output::render_text(&inspection));
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref(), cli.root)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voicebank",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Default level from -q/-v; RUST_LOG wins when set.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voicebank={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(custom_path: Option<&Path>, root: Option<std::path::PathBuf>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else if let Some(default_path) = Config::default_path() {
        // Try default path, fall back to defaults
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides, then the command line
    let mut config = config.with_env_overrides();
    if let Some(root) = root {
        config.database.root = root;
    }
    Ok(config)
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&Path>,
    root: Option<std::path::PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Dump => {
            print!("{}", Config::dump_template());
        }
        ConfigAction::Show => {
            let config = load_config(custom_path, root)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

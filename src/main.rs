//! # DIMUON-SIM
//!
//! Command-line driver for simulation runs and their output files.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dimuon_sim::*;

#[derive(Parser, Debug)]
#[command(name = "dimuon-sim")]
#[command(version = VERSION)]
#[command(about = "Biased dimuon production in a thin target")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate NUM-EVENTS events and write the accepted ones to OUTPUT
    Simulate(SimulateArgs),
    /// Summarize a finished output file
    Inspect {
        output: PathBuf,
    },
    /// List the target materials
    Materials,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Number of events to request
    #[arg(value_name = "NUM-EVENTS")]
    events: u64,

    /// Output file (JSON Lines)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Event script the engine replays
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Photon beam instead of electrons
    #[arg(long)]
    photons: bool,

    /// Target depth (mm)
    #[arg(short, long)]
    depth: Option<f64>,

    /// Target material
    #[arg(short, long)]
    target: Option<String>,

    /// Keep only events with a muon above this energy (MeV)
    #[arg(short, long, value_name = "MeV")]
    filter: Option<f64>,

    /// Scale the muon conversion cross section by this factor
    #[arg(short, long)]
    bias: Option<f64>,

    /// Beam energy (GeV)
    #[arg(short = 'e', long)]
    beam: Option<f64>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run configuration (TOML); flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl SimulateArgs {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        config.events = self.events;
        config.output = self.output;
        if let Some(script) = self.script {
            config.script = script;
        }
        if self.photons {
            config.photons = true;
        }
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if self.filter.is_some() {
            config.filter_threshold = self.filter;
        }
        if self.bias.is_some() {
            config.bias_factor = self.bias;
        }
        if let Some(beam) = self.beam {
            config.beam_energy = beam;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        if config.script.as_os_str().is_empty() {
            bail!("no event script given, pass --script FILE");
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "dimuon_sim=debug" } else { "dimuon_sim=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match cli.command {
        Command::Simulate(args) => simulate(args),
        Command::Inspect { output } => inspect(output),
        Command::Materials => {
            for material in KNOWN_MATERIALS {
                println!("{}", material);
            }
            Ok(())
        }
    }
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = args.into_config()?;
    info!("{}", dimuon_sim::info().replace('\n', " | "));

    let library = ScriptLibrary::load(&config.script)
        .with_context(|| format!("loading event script {}", config.script.display()))?;
    let engine = ReplayEngine::new(library, config.seed, config.bias_operator());
    let sink = OutputSink::create(&config.output)?;
    let output = config.output.clone();

    let start = Instant::now();
    let (summary, _) = Simulation::new(config, engine, sink)?.run()?;
    let elapsed = start.elapsed();

    info!(
        output = %output.display(),
        rejected = summary.events_rejected,
        aborted = summary.events_aborted,
        "wall-clock time {:.3} s",
        elapsed.as_secs_f64()
    );
    Ok(())
}

fn inspect(output: PathBuf) -> Result<()> {
    let contents = OutputContents::read(&output)?;
    let run = &contents.run;

    println!("Output: {}", output.display());
    println!("  Version: {}", run.version);
    println!("  Beam: {:.3} GeV {}", run.beam_energy, if run.photons { "photons" } else { "electrons" });
    println!("  Target: {} ({} mm)", run.target, run.depth);
    if run.filter {
        println!("  Filter: {} MeV", run.filter_threshold);
    } else {
        println!("  Filter: off");
    }
    println!("  Bias factor: {}", run.bias_factor);
    println!("  Seed: {}", run.seed);
    println!();
    println!("Events requested: {}", run.events_requested);
    println!("Events completed: {}", run.events_completed);
    println!("Records read:     {}", contents.events.len());
    println!("Summed weight:    {:.6e}", contents.total_weight());

    if contents.events.len() as u64 != run.events_completed {
        bail!(
            "{} holds {} event records but its run record counts {}",
            output.display(),
            contents.events.len(),
            run.events_completed
        );
    }
    Ok(())
}

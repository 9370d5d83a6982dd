//! # NetEv CLI
//!
//! Screening of evolved reaction networks for oscillators.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use netev_antimony::{parse_antimony, to_antimony};
use netev_core::{Eigenvalue, SimulationEngine, SimulationWindow, Trajectory};
use netev_evolution::{best_models, BestModel, FitnessTrack};
use netev_oscillator::{
    check_eigens, has_oscillator_eigens, ClassifierConfig, OscillationClassifier,
};
use netev_reaction::NetworkSimulation;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netev")]
#[command(version)]
#[command(about = "Screen evolved reaction networks for oscillators", long_about = None)]
struct Cli {
    /// Classifier settings (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify Antimony model files
    Classify {
        /// Model files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Classify the best model of every evolution run
    Screen {
        /// Directory holding one sub-directory per run
        root: PathBuf,
        /// Copy oscillators here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Simulate a model and write its time course as CSV
    Simulate {
        /// Model file
        file: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        #[arg(long, default_value_t = 50.0)]
        end: f64,
        #[arg(long, default_value_t = 1000)]
        samples: usize,
        /// CSV file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Steady state and Jacobian eigenvalues of a model
    Eigen {
        /// Model file
        file: PathBuf,
    },

    /// Top-individual fitness of every evolution run
    Fitness {
        /// Directory holding one sub-directory per run
        root: PathBuf,
        /// Only runs whose top fitness drops, with the generation
        #[arg(long)]
        decreasing: bool,
    },

    /// Manually triage models
    Review {
        /// Directory of model files
        dir: PathBuf,
        /// Where accepted oscillators go
        #[arg(long)]
        accept: PathBuf,
        /// Where unsure and unsimulatable models go
        #[arg(long)]
        unsure: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClassifierConfig::default(),
    };
    let classifier = OscillationClassifier::new(config);

    match cli.command {
        Commands::Classify { files } => classify(&classifier, &files),
        Commands::Screen { root, output } => screen(&classifier, &root, output.as_deref()),
        Commands::Simulate {
            file,
            start,
            end,
            samples,
            output,
        } => simulate(&file, SimulationWindow::new(start, end, samples), output.as_deref()),
        Commands::Eigen { file } => eigen(&file),
        Commands::Fitness { root, decreasing } => fitness(&root, decreasing),
        Commands::Review {
            dir,
            accept,
            unsure,
        } => review(&classifier, &dir, &accept, &unsure),
    }
}

// =============================================================================
// SETUP
// =============================================================================

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<ClassifierConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: ClassifierConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn load_model(text: &str) -> anyhow::Result<NetworkSimulation> {
    let network = parse_antimony(text)?;
    Ok(NetworkSimulation::new(network)?)
}

fn load_model_file(path: &Path) -> anyhow::Result<NetworkSimulation> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading model {}", path.display()))?;
    load_model(&text).with_context(|| format!("loading model {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn format_eigenvalue(e: &Eigenvalue) -> String {
    if e.im == 0.0 {
        format!("{:.6}", e.re)
    } else {
        let sign = if e.im < 0.0 { '-' } else { '+' };
        format!("{:.6} {} {:.6}i", e.re, sign, e.im.abs())
    }
}

fn verdict(oscillator: bool) -> colored::ColoredString {
    if oscillator {
        "oscillator".green().bold()
    } else {
        "no".red()
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

fn classify(classifier: &OscillationClassifier, files: &[PathBuf]) -> anyhow::Result<()> {
    for path in files {
        let mut engine = match load_model_file(path) {
            Ok(engine) => engine,
            Err(e) => {
                println!("{} {:#}", path.display().to_string().yellow(), e);
                continue;
            }
        };

        let result = classifier.classify(&mut engine);
        let tier = result.decided_by.map_or("none", |t| t.name());
        println!(
            "{}: {} (tier: {}, strict: {}, absorbed failures: {})",
            path.display(),
            verdict(result.oscillator),
            tier.cyan(),
            has_oscillator_eigens(&result.eigenvalues),
            result.failures.len()
        );
    }
    Ok(())
}

fn screen(
    classifier: &OscillationClassifier,
    root: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let models = best_models(root).with_context(|| format!("scanning {}", root.display()))?;
    if let Some(dir) = output {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let progress = ProgressBar::new(models.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let tally = screen_models(classifier, &models, output, &progress)?;
    progress.finish_and_clear();

    println!(
        "{} {} evaluated, {} oscillators",
        "Screened:".green().bold(),
        tally.evaluated,
        tally.oscillators.to_string().cyan()
    );
    if tally.evaluated < models.len() {
        println!("{} {} unreadable", "Skipped:".yellow().bold(), models.len() - tally.evaluated);
    }
    Ok(())
}

/// Models classified and oscillators found by one screening pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScreenTally {
    evaluated: usize,
    oscillators: usize,
}

/// Classify each model; oscillators are copied into `output` when given.
/// Models that fail to load are skipped and not counted as evaluated.
fn screen_models(
    classifier: &OscillationClassifier,
    models: &[BestModel],
    output: Option<&Path>,
    progress: &ProgressBar,
) -> anyhow::Result<ScreenTally> {
    let mut tally = ScreenTally::default();
    for model in models {
        progress.set_message(model.label().to_string());

        match load_model(&model.text) {
            Ok(mut engine) => {
                tally.evaluated += 1;
                if classifier.is_oscillator(&mut engine) {
                    tally.oscillators += 1;
                    info!(run = %model.run, file = %model.name, "oscillator");
                    if let Some(dir) = output {
                        let target = dir.join(model.output_name());
                        fs::write(&target, &model.text)
                            .with_context(|| format!("writing {}", target.display()))?;
                    }
                }
            }
            Err(e) => warn!(path = %model.path.display(), error = %e, "skipping model"),
        }
        progress.inc(1);
    }
    Ok(tally)
}

fn simulate(path: &Path, window: SimulationWindow, output: Option<&Path>) -> anyhow::Result<()> {
    window.validate()?;
    let mut engine = load_model_file(path)?;
    let trajectory = engine.simulate(&window)?;

    match output {
        Some(target) => {
            let file = fs::File::create(target)
                .with_context(|| format!("creating {}", target.display()))?;
            trajectory.write_csv(BufWriter::new(file))?;
            println!(
                "{} {} samples to {}",
                "Wrote".green().bold(),
                trajectory.len(),
                target.display()
            );
        }
        None => trajectory.write_csv(io::stdout().lock())?,
    }
    Ok(())
}

fn eigen(path: &Path) -> anyhow::Result<()> {
    let mut engine = load_model_file(path)?;
    engine.steady_state().context("steady state")?;
    let eigenvalues = engine.eigenvalues().context("eigenvalues")?;

    println!("{}", "Steady state:".green().bold());
    for (id, value) in engine.species_ids().iter().zip(engine.concentrations()) {
        println!("  {} = {}", id.cyan(), value);
    }
    println!("{}", "Eigenvalues:".green().bold());
    for e in &eigenvalues {
        println!("  {}", format_eigenvalue(e));
    }
    println!("  re >= 0 complex pair: {}", check_eigens(&eigenvalues));
    println!("  re > 0 complex pair:  {}", has_oscillator_eigens(&eigenvalues));
    Ok(())
}

fn fitness(root: &Path, decreasing: bool) -> anyhow::Result<()> {
    let tracks = FitnessTrack::scan(root).with_context(|| format!("scanning {}", root.display()))?;

    for track in &tracks {
        if decreasing {
            if let Some(generation) = track.first_decrease() {
                println!("{} {}", track.run.cyan(), generation);
            }
        } else if let Some(s) = track.summary() {
            println!(
                "{}  generations {:>5}  first {:.6}  last {:.6}  min {:.6}  max {:.6}",
                track.label().cyan(),
                s.generations,
                s.first,
                s.last,
                s.min,
                s.max
            );
        }
    }
    Ok(())
}

/// Default-tolerance run, then one retry at the tightened tolerance
fn simulate_with_retry(
    engine: &mut NetworkSimulation,
    config: &ClassifierConfig,
) -> netev_core::Result<Trajectory> {
    match engine.simulate(&config.window) {
        Ok(trajectory) => Ok(trajectory),
        Err(e) => {
            info!(error = %e, "retrying with tightened tolerance");
            engine.set_relative_tolerance(config.tightened_tolerance);
            engine.reset();
            engine.simulate(&config.window)
        }
    }
}

fn write_model(engine: &mut NetworkSimulation, target: &Path) -> anyhow::Result<()> {
    engine.reset();
    fs::write(target, to_antimony(engine.network()))
        .with_context(|| format!("writing {}", target.display()))
}

fn review(
    classifier: &OscillationClassifier,
    dir: &Path,
    accept: &Path,
    unsure: &Path,
) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    for target in [accept, unsure] {
        fs::create_dir_all(target).with_context(|| format!("creating {}", target.display()))?;
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let theme = ColorfulTheme::default();
    let choices = ["yes", "unsure", "no", "quit"];

    for path in &files {
        let name = file_name(path);
        let mut engine = match load_model_file(path) {
            Ok(engine) => engine,
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(path = %path.display(), %error, "skipping model");
                continue;
            }
        };

        let trajectory = match simulate_with_retry(&mut engine, classifier.config()) {
            Ok(trajectory) => trajectory,
            Err(e) => {
                println!("{} {}: {}", "Cannot simulate".yellow(), name, e);
                write_model(&mut engine, &unsure.join(format!("cantsim_{}", name)))?;
                continue;
            }
        };

        println!();
        println!("{} {}", "Model:".green().bold(), name);
        if let Some(state) = trajectory.final_state() {
            for (id, value) in trajectory.species.iter().zip(state) {
                println!("  {} = {}", id.cyan(), value);
            }
        }
        engine.reset();
        let result = classifier.classify(&mut engine);
        println!("  classifier: {}", verdict(result.oscillator));

        let choice = Select::with_theme(&theme)
            .with_prompt("Is this an oscillator?")
            .items(&choices)
            .default(2)
            .interact()?;

        match choices[choice] {
            "yes" => write_model(&mut engine, &accept.join(&name))?,
            "unsure" => write_model(&mut engine, &unsure.join(&name))?,
            "quit" => break,
            _ => {}
        }
    }
    Ok(())
}

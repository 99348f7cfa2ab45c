//! Market-making fill simulator CLI.
//!
//! Snapshot mode (default):
//!   fillsim <tops-file> <fills-file> <output-file> <config-file>
//!
//! Queue mode (`simulation.use_queue_simulation = true` in the config):
//!   fillsim <events-file> <output-file> <config-file>
//!
//! The strategy is chosen interactively on stdin; its parameters come from
//! the `[strategy]` table of the config file.

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use fillsim::config::Config;
use fillsim::error::{Error, Result};
use fillsim::strategy::{self, Strategy};
use fillsim::Simulator;

#[derive(Parser)]
#[command(name = "fillsim")]
#[command(about = "Replay captured market data against a simulated market-making strategy")]
#[command(version)]
#[command(after_help = "\
Modes (selected by simulation.use_queue_simulation in the config):
  snapshot:  fillsim <tops-file> <fills-file> <output-file> <config-file>
  queue:     fillsim <events-file> <output-file> <config-file>")]
struct Cli {
    /// Input file(s), the output trace file, then the config file.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let Some(config_path) = cli.paths.last() else {
        return Err(Error::Config("missing config file argument".into()));
    };
    let config = Config::load(config_path)?;

    let queue_mode = config.simulation.use_queue_simulation;
    let expected = if queue_mode { 3 } else { 4 };
    if cli.paths.len() != expected {
        let usage = if queue_mode {
            "<events-file> <output-file> <config-file>"
        } else {
            "<tops-file> <fills-file> <output-file> <config-file>"
        };
        return Err(Error::Config(format!(
            "{} mode expects {} arguments: {}, got {}",
            if queue_mode { "queue" } else { "snapshot" },
            expected,
            usage,
            cli.paths.len()
        )));
    }

    let strategy = select_strategy(&config)?;
    println!("\nStarting simulation with '{}' strategy...", strategy.name());

    let output_path = &cli.paths[expected - 2];
    let output = File::create(output_path).map_err(|source| Error::OutputCreate {
        path: output_path.clone(),
        source,
    })?;

    let mut sim = Simulator::new(strategy, config.latency, BufWriter::new(output));
    if queue_mode {
        sim.run_queue(&cli.paths[0])?;
    } else {
        sim.run_snapshot(&cli.paths[0], &cli.paths[1])?;
    }

    println!("\n{}", sim.report());
    sim.finish()?;

    println!("\nSimulation completed successfully.");
    Ok(())
}

/// Show the strategy menu and build the user's choice.
fn select_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    println!("\nAvailable Strategies:");
    for (i, (name, description)) in strategy::available().iter().enumerate() {
        println!("{}. {} - {}", i + 1, name, description);
    }
    print!("\nEnter the number of the strategy you want to use: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let choice: usize = line
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid strategy choice '{}'", line.trim())))?;

    strategy::build(choice, config)?
        .ok_or_else(|| Error::Config(format!("no strategy numbered {choice}")))
}

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::warn;
use rust_pipeline::bot::{Dispatcher, Update};
use rust_pipeline::model::{Solver, TrainConfig};
use rust_pipeline::pipeline::{self, PipelineRequest, PipelineResponse};
use rust_pipeline::preprocess::MissingPolicy;
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline once and print the result as JSON
    Run(RunArgs),
    /// Answer chat updates read from stdin, one JSON object per line
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Solver used to fit the linear model
    #[arg(long, value_enum, default_value_t = Solver::NormalEquation)]
    solver: Solver,

    /// L2 penalty on the weights
    #[arg(long, default_value_t = 0.0)]
    l2: f64,

    /// Learning rate for gradient descent
    #[arg(short, long, default_value_t = 0.05)]
    learning_rate: f64,

    /// Batch size for gradient descent
    #[arg(short, long, default_value_t = 32)]
    batch_size: usize,

    /// Number of epochs to train for
    /// If this parameter is not provided, early stopping is used instead
    #[arg(short, long)]
    num_epochs: Option<usize>,

    /// Tolerance for early stopping
    #[arg(short, long, default_value_t = 1e-9)]
    epsilon: f64,
}

impl TrainArgs {
    fn config(&self) -> TrainConfig {
        TrainConfig {
            solver: self.solver,
            l2: self.l2,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            num_epochs: self.num_epochs,
            epsilon: self.epsilon,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// The path of the dataset
    #[arg(short, long)]
    source: PathBuf,

    /// Target column (defaults to the last column)
    #[arg(short, long)]
    target: Option<String>,

    /// Share of rows used for training
    #[arg(short, long, default_value_t = 0.8)]
    ratio: f64,

    /// Seed of the train/evaluation split
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Where to write the scatter plot
    #[arg(short, long, default_value = "plot.png")]
    output: PathBuf,

    /// How to handle missing values
    #[arg(short, long, value_enum, default_value_t = MissingPolicy::Drop)]
    policy: MissingPolicy,

    /// Export the fitted model in JSON format
    #[arg(short, long)]
    weight_path: Option<PathBuf>,

    /// Debug mode (save loss in a "epoch     loss" format)
    #[arg(short, long)]
    debug_path: Option<PathBuf>,

    #[command(flatten)]
    train: TrainArgs,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Directory holding the datasets chats may refer to
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Directory the per-chat plots are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Default share of rows used for training
    #[arg(short, long, default_value_t = 0.8)]
    ratio: f64,

    /// Default split seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[command(flatten)]
    train: TrainArgs,
}

/// Write the losses to a debug file
fn write_losses(debug_path: &Path, losses: &[(usize, f64)]) -> std::io::Result<()> {
    let mut file = File::create(debug_path)?;

    for (x, y) in losses {
        file.write_all(format!("{}    {}\n", x, y).as_bytes())?;
    }

    Ok(())
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let request = PipelineRequest {
        source: args.source,
        target: args.target,
        split_ratio: args.ratio,
        seed: args.seed,
        output_path: args.output,
        policy: args.policy,
        train: args.train.config(),
        export_path: args.weight_path,
    };

    let result = pipeline::run(&request);
    let response = PipelineResponse::from(&result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    match result {
        Ok(run) => {
            if let Some(debug_path) = args.debug_path {
                write_losses(&debug_path, &run.losses)
                    .with_context(|| format!("writing losses to {}", debug_path.display()))?;
            }
            Ok(())
        }
        Err(e) => bail!("{} stage failed: {}", e.stage(), e),
    }
}

fn chat(args: ChatArgs) -> anyhow::Result<()> {
    let mut dispatcher = Dispatcher::new(args.data_dir, args.output_dir);
    dispatcher.defaults.split_ratio = args.ratio;
    dispatcher.defaults.seed = args.seed;
    dispatcher.defaults.train = args.train.config();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let update: Update = match serde_json::from_str(&line) {
            Ok(update) => update,
            Err(e) => {
                warn!("skipping malformed update: {}", e);
                continue;
            }
        };

        if let Some(reply) = dispatcher.handle_update(&update) {
            writeln!(out, "{}", serde_json::to_string(&reply)?)?;
            out.flush()?;
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Chat(args) => chat(args),
    }
}

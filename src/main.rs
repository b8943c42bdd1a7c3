use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};
use sysinfo::{System, SystemExt};
use thiserror::Error;

use stroke_nutrition::inference::analyze;
use stroke_nutrition::pipeline::{self, load_or_train, write_metrics};
use stroke_nutrition::{
    BundleStore, ConfigError, JsonBundleStore, PatientInput, PersistenceError, PipelineError,
    TrainConfig, UnknownCategoryError,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(short, long, parse(from_occurrences), global = true, help = "Verbose level")]
    verbose: usize,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and save the bundle
    Train {
        #[clap(flatten)]
        opts: TrainOpts,
        #[clap(long, parse(from_os_str), help = "Write training metrics as JSON to this file")]
        metrics_out: Option<PathBuf>,
    },
    /// Score one patient given as JSON
    Predict {
        #[clap(flatten)]
        opts: TrainOpts,
        #[clap(short, long, parse(from_os_str), help = "Patient JSON file, stdin when absent")]
        input: Option<PathBuf>,
        #[clap(long, help = "Train a model first when none is stored")]
        train_if_missing: bool,
    },
    /// Report whether a model bundle is stored
    Status {
        #[clap(short, long, parse(from_os_str), default_value = "models", help = "Model directory")]
        model_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TrainOpts {
    #[clap(short, long, parse(from_os_str), help = "JSON training config")]
    config: Option<PathBuf>,
    #[clap(short, long, parse(from_os_str), help = "Training CSV")]
    data: Option<PathBuf>,
    #[clap(short, long, parse(from_os_str), help = "Model directory")]
    model_dir: Option<PathBuf>,
    #[clap(long, help = "Seed for augmentation, splitting and the forest")]
    seed: Option<u64>,
    #[clap(long, help = "Number of synthetic records")]
    samples: Option<usize>,
    #[clap(long, help = "Held-out fraction")]
    test_size: Option<f64>,
    #[clap(long, help = "Number of trees")]
    trees: Option<usize>,
    #[clap(long, parse(from_flag), help = "Train on the CSV only")]
    no_synthetic: bool,
}

impl TrainOpts {
    /// Config file first, then flags on top.
    fn resolve(&self) -> Result<TrainConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };
        if let Some(data) = &self.data {
            config.data_path = data.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.augment.seed = seed;
            config.trainer.seed = seed;
            config.trainer.forest.seed = seed;
        }
        if let Some(samples) = self.samples {
            config.augment.samples = samples;
        }
        if let Some(test_size) = self.test_size {
            config.trainer.test_size = test_size;
        }
        if let Some(trees) = self.trees {
            config.trainer.forest.n_trees = trees;
        }
        if self.no_synthetic {
            config.use_synthetic_data = false;
        }
        Ok(config)
    }
}

#[derive(Error, Debug)]
enum AppError {
    #[error("cannot read patient input {path:?}")]
    Input {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid patient input: {0}")]
    Patient(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Encoding(#[from] UnknownCategoryError),
}

fn used_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.used_memory()
}

fn read_patient(path: Option<&PathBuf>) -> Result<PatientInput, AppError> {
    let input_error = |source| AppError::Input {
        path: path.cloned(),
        source,
    };
    let json = match path {
        Some(path) => fs::read_to_string(path).map_err(input_error)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map_err(input_error)?;
            buf
        }
    };
    Ok(serde_json::from_str(&json)?)
}

async fn run_train(opts: &TrainOpts, metrics_out: Option<&PathBuf>) -> Result<(), AppError> {
    let config = opts.resolve()?;
    debug!("training config {:#?}", config);

    let start_time = Instant::now();
    let start_memory = used_memory();

    let (_, metrics) = pipeline::train(&config, &JsonBundleStore).await?;
    if let Some(path) = metrics_out {
        write_metrics(&metrics, path)?;
    }

    let end_memory = used_memory();
    info!("training took {:?}", start_time.elapsed());
    info!(
        "memory used: {} KiB",
        end_memory.saturating_sub(start_memory) / 1024
    );
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

async fn run_predict(
    opts: &TrainOpts,
    input: Option<&PathBuf>,
    train_if_missing: bool,
) -> Result<(), AppError> {
    let config = opts.resolve()?;
    let store = JsonBundleStore;
    let bundle = if train_if_missing {
        load_or_train(&config, &store).await?
    } else {
        store.load(&config.model_dir)?
    };

    let patient = read_patient(input)?;
    debug!("patient {:?}", patient);
    let analysis = analyze(&bundle, &patient)?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn run_status(model_dir: &Path) -> Result<(), AppError> {
    let store = JsonBundleStore;
    if !store.exists(model_dir) {
        println!("no model bundle in {:?}", model_dir);
        return Ok(());
    }
    let bundle = store.load(model_dir)?;
    println!(
        "model bundle in {:?}: {} trees over {} features",
        model_dir,
        bundle.classifier().n_trees(),
        bundle.classifier().n_features()
    );
    for column in bundle.encoders().columns() {
        if let Some(encoder) = bundle.encoders().get(column) {
            println!("  {}: {:?}", column, encoder.classes());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let env = Env::new().filter("STROKE_LOG");
    Builder::new()
        .filter(Some("stroke_nutrition"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    match &cli.command {
        Command::Train { opts, metrics_out } => run_train(opts, metrics_out.as_ref()).await,
        Command::Predict {
            opts,
            input,
            train_if_missing,
        } => run_predict(opts, input.as_ref(), *train_if_missing).await,
        Command::Status { model_dir } => run_status(model_dir),
    }
}

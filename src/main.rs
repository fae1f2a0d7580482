use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use snap_insight_engine::{
    describe, ClassificationPipeline, ClassifierKind, Dataset, ImportanceMethod, LabelBalance,
    MissingPolicy, PipelineConfig, PipelineOutcome, Statistics,
};

#[derive(Parser)]
#[command(name = "snap-insight-engine")]
#[command(author = "Hummer Team")]
#[command(version = "0.1.0")]
#[command(about = "Compare classifiers predicting food-stamp recipiency from census housing data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print per-column statistics and label balance
    Describe {
        #[command(flatten)]
        data: DataArgs,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Split, fit both classifiers, evaluate and print the comparison
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Only fit these variants (repeatable)
        #[arg(long = "variant", value_enum)]
        variants: Vec<VariantArg>,

        /// Directory for cached fitted models
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Path to CSV file
    #[arg(short, long)]
    file: PathBuf,

    /// JSON run config; explicit flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Label column name
    #[arg(short, long)]
    label: Option<String>,

    /// Label value that counts as positive
    #[arg(long)]
    positive_label: Option<String>,

    /// Column to exclude (repeatable)
    #[arg(short, long = "drop")]
    drop: Vec<String>,

    /// Header rename as OLD=NEW (repeatable)
    #[arg(long = "rename", value_parser = parse_rename)]
    rename: Vec<(String, String)>,

    /// Handling of rows with missing predictors
    #[arg(long, value_enum)]
    missing: Option<MissingArg>,

    /// Field delimiter
    #[arg(long)]
    delimiter: Option<char>,
}

#[derive(Args)]
struct ModelArgs {
    /// Share of records used for training, in (0, 1)
    #[arg(long)]
    train_fraction: Option<f64>,

    /// Seed for the split, the bootstrap draws and permutation importance
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the label ratio in both subsets
    #[arg(long)]
    stratify: bool,

    /// Probability at or above which a record is predicted positive
    #[arg(long)]
    cutoff: Option<f64>,

    /// L2 penalty for the linear variant
    #[arg(long = "l2")]
    l2: Option<f64>,

    /// Solver iteration limit for the linear variant
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Gradient tolerance for the linear variant
    #[arg(long)]
    tolerance: Option<f64>,

    /// Number of trees in the ensemble
    #[arg(long)]
    trees: Option<usize>,

    /// Candidate predictors per split (default: all)
    #[arg(long)]
    max_features: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    #[arg(long)]
    min_samples_leaf: Option<usize>,

    /// Importance measure reported for each variant
    #[arg(long, value_enum)]
    importance: Option<ImportanceArg>,

    /// Shuffles per predictor for permutation importance
    #[arg(long, default_value_t = 5)]
    permutation_repeats: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum MissingArg {
    Drop,
    Impute,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportanceArg {
    Intrinsic,
    Permutation,
}

#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    Linear,
    Ensemble,
}

impl From<VariantArg> for ClassifierKind {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Linear => ClassifierKind::Linear,
            VariantArg::Ensemble => ClassifierKind::Ensemble,
        }
    }
}

fn parse_rename(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => Ok((from.to_string(), to.to_string())),
        _ => Err(format!("expected OLD=NEW, got '{}'", s)),
    }
}

fn base_config(data: &DataArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &data.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let options = &mut config.data;
    if let Some(label) = &data.label {
        options.label_column = label.clone();
    }
    if let Some(positive) = &data.positive_label {
        options.positive_label = positive.clone();
    }
    if !data.drop.is_empty() {
        options.drop_columns = data.drop.clone();
    }
    if !data.rename.is_empty() {
        options.rename = data.rename.clone();
    }
    if let Some(missing) = data.missing {
        options.missing = match missing {
            MissingArg::Drop => MissingPolicy::Drop,
            MissingArg::Impute => MissingPolicy::ImputeMean,
        };
    }
    if let Some(delimiter) = data.delimiter {
        options.delimiter = delimiter;
    }
    Ok(config)
}

fn apply_model_args(config: &mut PipelineConfig, args: &ModelArgs) {
    if let Some(fraction) = args.train_fraction {
        config.split.train_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        config.split.seed = seed;
        config.model.seed = seed;
    }
    if args.stratify {
        config.split.stratify = true;
    }
    if let Some(cutoff) = args.cutoff {
        config.model.cutoff = cutoff;
    }

    let linear = &mut config.model.linear;
    if let Some(l2) = args.l2 {
        linear.l2_penalty = l2;
    }
    if let Some(iterations) = args.max_iterations {
        linear.max_iterations = iterations;
    }
    if let Some(tolerance) = args.tolerance {
        linear.tolerance = tolerance;
    }

    let ensemble = &mut config.model.ensemble;
    if let Some(trees) = args.trees {
        ensemble.n_trees = trees;
    }
    if args.max_features.is_some() {
        ensemble.max_features = args.max_features;
    }
    if args.max_depth.is_some() {
        ensemble.max_depth = args.max_depth;
    }
    if let Some(leaf) = args.min_samples_leaf {
        ensemble.min_samples_leaf = leaf;
    }

    match args.importance {
        Some(ImportanceArg::Intrinsic) => config.importance = ImportanceMethod::Intrinsic,
        Some(ImportanceArg::Permutation) => {
            config.importance = ImportanceMethod::Permutation {
                repeats: args.permutation_repeats,
                seed: config.model.seed,
            }
        }
        None => {}
    }
}

#[derive(Serialize)]
struct Description<'a> {
    dataset: &'a str,
    records: usize,
    label_balance: LabelBalance,
    columns: Vec<Statistics>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Describe { data, json } => {
            let config = base_config(&data)?;
            let dataset = Dataset::from_path(&data.file, &config.data)
                .with_context(|| format!("loading {}", data.file.display()))?;

            let description = Description {
                dataset: &dataset.name,
                records: dataset.len(),
                label_balance: LabelBalance::compute(dataset.labels()),
                columns: describe(&dataset),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&description)?);
            } else {
                print_description(&description);
            }
        }

        Commands::Evaluate {
            data,
            model,
            variants,
            cache_dir,
            json,
        } => {
            let mut config = base_config(&data)?;
            apply_model_args(&mut config, &model);
            if cache_dir.is_some() {
                config.cache_dir = cache_dir;
            }

            let mut pipeline = ClassificationPipeline::new(config)?;
            if !variants.is_empty() {
                let kinds: Vec<ClassifierKind> = variants.into_iter().map(Into::into).collect();
                pipeline = pipeline.with_variants(&kinds)?;
            }

            let outcome = pipeline.run(&data.file)?;
            if outcome.report.entries.is_empty() {
                bail!("no classifier variant was evaluated");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
    }

    Ok(())
}

fn print_description(description: &Description) {
    println!(
        "Loaded dataset '{}' with {} records",
        description.dataset, description.records
    );
    let balance = &description.label_balance;
    println!(
        "Label balance: {} positive / {} negative ({:.1}% positive)",
        balance.positives,
        balance.negatives,
        balance.positive_rate() * 100.0
    );

    println!("\n=== Column statistics ===");
    println!(
        "{:<24} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "column", "count", "mean", "std", "min", "max"
    );
    for stats in &description.columns {
        println!(
            "{:<24} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            stats.field, stats.count, stats.mean, stats.std, stats.min, stats.max
        );
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!(
        "Dataset '{}': {} records ({} train / {} eval)",
        outcome.dataset, outcome.n_records, outcome.n_train, outcome.n_eval
    );
    println!(
        "Positive rate: train {:.1}%, eval {:.1}%",
        outcome.train_balance.positive_rate() * 100.0,
        outcome.eval_balance.positive_rate() * 100.0
    );
    if !outcome.cached.is_empty() {
        let names: Vec<&str> = outcome.cached.iter().map(ClassifierKind::as_str).collect();
        println!("Loaded from cache: {}", names.join(", "));
    }
    println!();
    print!("{}", outcome.report.render_text());
}

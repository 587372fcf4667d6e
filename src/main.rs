use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use sparsetree_data::{
    PartitionConfig, RareClassPolicy, SampleReader, SplitPaths, SplitPrefix, SplitSize,
    SplitWriter,
};
use sparsetree_model::{ForestModel, ForestSummary, Format, TreeModel, TreeSummary};

#[derive(Parser)]
#[command(name = "sparsetree")]
#[command(about = "Export, inspect and evaluate sparse-format selection trees, and partition their training data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// How a model file is laid out.
#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// Serialized layout: "binary" or "text"
    #[arg(long, default_value = "binary")]
    format: String,

    /// Model kind: "tree" or "forest"
    #[arg(long, default_value = "tree")]
    kind: String,

    /// The file carries a feature-name section
    #[arg(long, default_value_t = false)]
    with_names: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load a model and print a JSON summary of its shape and size
    Inspect {
        /// Path to the model file
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        layout: ModelArgs,
    },

    /// Re-encode a model between the binary and text layouts
    Convert {
        /// Path to the input model file
        #[arg(long)]
        input: PathBuf,

        /// Path to the output model file
        #[arg(long)]
        output: PathBuf,

        /// Input layout: "binary" or "text"
        #[arg(long)]
        from: String,

        /// Output layout: "binary" or "text"
        #[arg(long)]
        to: String,

        /// Model kind: "tree" or "forest"
        #[arg(long, default_value = "tree")]
        kind: String,

        /// Read and write the feature-name section
        #[arg(long, default_value_t = false)]
        with_names: bool,
    },

    /// Evaluate every row of a sample CSV against a model
    Predict {
        /// Path to the model file
        #[arg(long)]
        model: PathBuf,

        /// Path to the sample CSV (first column is the row id)
        #[arg(long)]
        samples: PathBuf,

        /// Column holding true labels; enables an accuracy figure
        #[arg(long)]
        label_column: Option<String>,

        #[command(flatten)]
        layout: ModelArgs,
    },

    /// Partition a labeled CSV into train/validation/test files
    Split {
        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Column holding the class label
        #[arg(long)]
        label_column: String,

        /// Train size: a fraction ("0.6") or a row count ("120")
        #[arg(long)]
        train: String,

        /// Validation size: a fraction or a row count
        #[arg(long, default_value = "0.0")]
        val: String,

        /// Test size: a fraction or a row count
        #[arg(long)]
        test: String,

        /// Split each class separately
        #[arg(long, default_value_t = false)]
        per_class: bool,

        /// Small-class rule: "standard", "never", or "at-most=<rows>"
        #[arg(long, default_value = "standard")]
        rare_class_policy: String,

        /// Output directory for the split files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// File name prefix (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        prefix: String,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ModelSummary {
    Tree(TreeSummary),
    Forest(ForestSummary),
}

#[derive(Serialize)]
struct InspectOutput {
    path: PathBuf,
    format: Format,
    file_bytes: u64,
    #[serde(flatten)]
    model: ModelSummary,
}

#[derive(Serialize)]
struct ConvertOutput {
    input: PathBuf,
    output: PathBuf,
    from: Format,
    to: Format,
    bytes_written: u64,
}

#[derive(Serialize)]
struct PredictOutput {
    model: PathBuf,
    n_samples: usize,
    model_n_features: usize,
    model_n_classes: usize,
    accuracy: Option<f64>,
    predictions: BTreeMap<String, i32>,
}

#[derive(Serialize)]
struct SplitOutput {
    data: PathBuf,
    n_samples: usize,
    n_classes: usize,
    per_class: bool,
    seed: u64,
    train: usize,
    val: usize,
    test: usize,
    files: SplitPaths,
}

/// A model of either kind, as loaded from disk.
enum LoadedModel {
    Tree(TreeModel),
    Forest(ForestModel),
}

impl LoadedModel {
    fn load(path: &Path, kind: &str, with_names: bool, format: Format) -> Result<Self> {
        let model = match parse_kind(kind)? {
            ModelKind::Tree => Self::Tree(TreeModel::load(path, with_names, format)?),
            ModelKind::Forest => Self::Forest(ForestModel::load(path, with_names, format)?),
        };
        Ok(model)
    }

    fn save(&self, path: &Path, with_names: bool, format: Format) -> Result<()> {
        match self {
            Self::Tree(tree) => tree.save(path, with_names, format)?,
            Self::Forest(forest) => forest.save(path, with_names, format)?,
        }
        Ok(())
    }

    fn summary(&self) -> ModelSummary {
        match self {
            Self::Tree(tree) => ModelSummary::Tree(tree.summary()),
            Self::Forest(forest) => ModelSummary::Forest(forest.summary()),
        }
    }

    fn evaluate_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<i32>> {
        let labels = match self {
            Self::Tree(tree) => tree.evaluate_batch(samples)?,
            Self::Forest(forest) => forest.evaluate_batch(samples)?,
        };
        Ok(labels)
    }

    fn n_features(&self) -> usize {
        match self {
            Self::Tree(tree) => tree.n_features(),
            Self::Forest(forest) => forest.n_features(),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Self::Tree(tree) => tree.n_classes(),
            Self::Forest(forest) => forest.n_classes(),
        }
    }

    fn feature_names(&self) -> Option<&[String]> {
        match self {
            Self::Tree(tree) => tree.feature_names(),
            Self::Forest(forest) => forest.feature_names(),
        }
    }
}

enum ModelKind {
    Tree,
    Forest,
}

fn parse_kind(s: &str) -> Result<ModelKind> {
    match s {
        "tree" => Ok(ModelKind::Tree),
        "forest" => Ok(ModelKind::Forest),
        other => anyhow::bail!("unknown model kind: {other} (expected tree or forest)"),
    }
}

fn parse_format(s: &str) -> Result<Format> {
    match s {
        "binary" => Ok(Format::Binary),
        "text" => Ok(Format::Text),
        other => anyhow::bail!("unknown format: {other} (expected binary or text)"),
    }
}

fn parse_split_size(s: &str) -> Result<SplitSize> {
    if let Ok(rows) = s.parse::<usize>() {
        return Ok(SplitSize::Rows(rows));
    }
    let fraction = s
        .parse::<f64>()
        .with_context(|| format!("invalid split size: {s} (expected a fraction or a row count)"))?;
    Ok(SplitSize::Fraction(fraction))
}

fn parse_rare_class_policy(s: &str) -> Result<RareClassPolicy> {
    match s {
        "standard" => Ok(RareClassPolicy::Standard),
        "never" => Ok(RareClassPolicy::Never),
        other => match other.strip_prefix("at-most=") {
            Some(rows) => {
                let threshold = rows
                    .parse::<f64>()
                    .with_context(|| format!("invalid rare-class threshold: {rows}"))?;
                Ok(RareClassPolicy::HeldOutAtMost(threshold))
            }
            None => anyhow::bail!(
                "unknown rare-class policy: {other} (expected standard, never, or at-most=<rows>)"
            ),
        },
    }
}

fn file_len(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(meta.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Inspect { model, layout } => {
            let format = parse_format(&layout.format)?;
            let loaded = LoadedModel::load(&model, &layout.kind, layout.with_names, format)
                .context("failed to load model")?;

            let output = InspectOutput {
                file_bytes: file_len(&model)?,
                path: model,
                format,
                model: loaded.summary(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Convert {
            input,
            output,
            from,
            to,
            kind,
            with_names,
        } => {
            let from = parse_format(&from)?;
            let to = parse_format(&to)?;

            let loaded = LoadedModel::load(&input, &kind, with_names, from)
                .context("failed to load model")?;
            loaded
                .save(&output, with_names, to)
                .context("failed to write converted model")?;
            info!(from = ?from, to = ?to, "model converted");

            let summary = ConvertOutput {
                bytes_written: file_len(&output)?,
                input,
                output,
                from,
                to,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Predict {
            model,
            samples,
            label_column,
            layout,
        } => {
            let format = parse_format(&layout.format)?;

            // 1. Load model
            let loaded = LoadedModel::load(&model, &layout.kind, layout.with_names, format)
                .context("failed to load model")?;
            info!(
                n_features = loaded.n_features(),
                n_classes = loaded.n_classes(),
                "model loaded"
            );

            // 2. Read samples
            let mut reader = SampleReader::new(&samples);
            if let Some(column) = &label_column {
                reader = reader.with_label_column(column.clone());
            }
            let table = reader.read().context("failed to read samples CSV")?;
            if let Some(names) = loaded.feature_names()
                && names != table.feature_names()
            {
                warn!(
                    model = ?names,
                    samples = ?table.feature_names(),
                    "sample columns differ from model feature names"
                );
            }

            // 3. Predict
            let predicted = loaded
                .evaluate_batch(table.features())
                .context("prediction failed")?;

            let accuracy = table.labels().map(|truth| {
                let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
                correct as f64 / truth.len() as f64
            });
            if let Some(accuracy) = accuracy {
                info!(accuracy, "labels compared");
            }

            // 4. Print summary
            let output = PredictOutput {
                model,
                n_samples: table.n_samples(),
                model_n_features: loaded.n_features(),
                model_n_classes: loaded.n_classes(),
                accuracy,
                predictions: table
                    .ids()
                    .iter()
                    .map(|id| id.as_str().to_string())
                    .zip(predicted)
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Split {
            data,
            label_column,
            train,
            val,
            test,
            per_class,
            rare_class_policy,
            output_dir,
            prefix,
        } => {
            let prefix = SplitPrefix::new(prefix)?;

            // 1. Read dataset
            let table = SampleReader::new(&data)
                .with_label_column(label_column)
                .read()
                .context("failed to read input CSV")?;
            let labels = table
                .labels()
                .context("input CSV has no label column")?;

            // 2. Partition
            let config = PartitionConfig::new(
                parse_split_size(&train)?,
                parse_split_size(&test)?,
                parse_split_size(&val)?,
            )?
            .with_per_class(per_class)
            .with_seed(cli.seed)
            .with_rare_class_policy(parse_rare_class_policy(&rare_class_policy)?);

            let splits = config
                .partition(table.features(), labels, table.ids())
                .context("partitioning failed")?;

            // 3. Write CSVs
            let writer = SplitWriter::new(&output_dir, prefix)?;
            let files = writer.write(table.feature_names(), &splits)?;

            // 4. Print summary
            let output = SplitOutput {
                data,
                n_samples: table.n_samples(),
                n_classes: labels.iter().collect::<BTreeSet<_>>().len(),
                per_class,
                seed: cli.seed,
                train: splits.train.len(),
                val: splits.val.len(),
                test: splits.test.len(),
                files,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

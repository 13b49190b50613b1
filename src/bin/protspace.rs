//! protspace - protein embedding landscape CLI
//!
//! Command-line interface for projecting embeddings and editing the resulting
//! document.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use protspace::data::{InputFormat, PairwiseTable, ScoreTransform};
use protspace::document::{apply_feature_styles, DocumentStore, FeatureStyles};
use protspace::error::{ProtspaceError, Result};
use protspace::pipeline::{Pipeline, PipelineConfig};
use protspace::reduce::{Dissimilarity, Metric, PrecomputedKind, ReductionParams};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// CLI-friendly input format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInputFormat {
    /// Keyed JSON container of embedding arrays
    EmbeddingJson,
    /// Delimited rows: identifier, v1, ..., vD
    EmbeddingTable,
    /// Square labelled similarity or distance matrix
    SimilarityMatrix,
}

impl From<CliInputFormat> for InputFormat {
    fn from(format: CliInputFormat) -> Self {
        match format {
            CliInputFormat::EmbeddingJson => InputFormat::EmbeddingJson,
            CliInputFormat::EmbeddingTable => InputFormat::EmbeddingTable,
            CliInputFormat::SimilarityMatrix => InputFormat::SimilarityMatrix,
        }
    }
}

/// Protein embedding landscapes
#[derive(Parser)]
#[command(name = "protspace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce embeddings or a similarity matrix and merge into a document
    Prepare {
        /// Embeddings (.json) or similarity matrix (.csv/.tsv)
        #[arg(short, long)]
        input: PathBuf,

        /// Metadata table with an `identifier` column
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Output document (merged if it exists)
        #[arg(short, long)]
        output: PathBuf,

        /// Method specs, e.g. pca2 umap3
        #[arg(long, num_args = 1.., default_value = "pca2")]
        methods: Vec<String>,

        /// Custom projection names as spec=name
        #[arg(long = "custom-name", value_parser = parse_custom_name)]
        custom_names: Vec<(String, String)>,

        /// Pipeline YAML; its methods and parameters replace the flags above
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input format, inferred from the extension by default
        #[arg(long, value_enum)]
        format: Option<CliInputFormat>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Apply feature colors and marker shapes to a document
    Style {
        /// Document to update in place
        #[arg(short, long)]
        document: PathBuf,

        /// Styles as inline JSON or a path to a JSON file
        #[arg(short, long)]
        styles: String,
    },

    /// Print a summary of a document
    Inspect {
        /// Document to summarize
        document: PathBuf,
    },

    /// Convert a query/target/score table into a similarity matrix
    Pairwise {
        /// Pairwise score table (.tsv/.csv)
        #[arg(short, long)]
        input: PathBuf,

        /// Output similarity matrix CSV
        #[arg(short, long)]
        output: PathBuf,

        /// Score column to use
        #[arg(long, default_value = "evalue")]
        score_column: String,

        /// Score transform; implied by the column name by default
        #[arg(long)]
        transform: Option<ScoreTransform>,
    },

    /// Generate an example pipeline configuration
    ExampleConfig {
        /// Output path for example YAML (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Reducer parameter overrides.
#[derive(Args, Debug, Default)]
struct ParamArgs {
    /// UMAP neighborhood size
    #[arg(long)]
    n_neighbors: Option<usize>,
    /// Distance metric: euclidean, cosine, manhattan
    #[arg(long)]
    metric: Option<Metric>,
    /// Random seed
    #[arg(long)]
    random_state: Option<u64>,
    /// UMAP minimum distance
    #[arg(long)]
    min_dist: Option<f64>,
    /// UMAP spread
    #[arg(long)]
    spread: Option<f64>,
    /// UMAP epochs
    #[arg(long)]
    n_epochs: Option<usize>,
    /// t-SNE perplexity
    #[arg(long)]
    perplexity: Option<f64>,
    /// t-SNE learning rate
    #[arg(long)]
    learning_rate: Option<f64>,
    /// t-SNE iterations
    #[arg(long)]
    n_iter: Option<usize>,
    /// t-SNE early exaggeration
    #[arg(long)]
    early_exaggeration: Option<f64>,
    /// MDS random starts
    #[arg(long)]
    n_init: Option<usize>,
    /// MDS iterations per start
    #[arg(long)]
    max_iter: Option<usize>,
    /// MDS relative tolerance
    #[arg(long)]
    eps: Option<f64>,
    /// MDS input: euclidean or precomputed
    #[arg(long)]
    dissimilarity: Option<Dissimilarity>,
    /// Precomputed MDS matrix kind: dissimilarity, similarity, detect
    #[arg(long)]
    precomputed_kind: Option<PrecomputedKind>,
}

impl ParamArgs {
    fn apply(&self, params: &mut ReductionParams) {
        if let Some(v) = self.n_neighbors {
            params.n_neighbors = v;
        }
        if let Some(v) = self.metric {
            params.metric = v;
        }
        if let Some(v) = self.random_state {
            params.random_state = v;
        }
        if let Some(v) = self.min_dist {
            params.min_dist = v;
        }
        if let Some(v) = self.spread {
            params.spread = v;
        }
        if let Some(v) = self.n_epochs {
            params.n_epochs = v;
        }
        if let Some(v) = self.perplexity {
            params.perplexity = v;
        }
        if let Some(v) = self.learning_rate {
            params.learning_rate = v;
        }
        if let Some(v) = self.n_iter {
            params.n_iter = v;
        }
        if let Some(v) = self.early_exaggeration {
            params.early_exaggeration = v;
        }
        if let Some(v) = self.n_init {
            params.n_init = v;
        }
        if let Some(v) = self.max_iter {
            params.max_iter = v;
        }
        if let Some(v) = self.eps {
            params.eps = v;
        }
        if let Some(v) = self.dissimilarity {
            params.dissimilarity = v;
        }
        if let Some(v) = self.precomputed_kind {
            params.precomputed_kind = v;
        }
    }
}

fn parse_custom_name(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((spec, name)) if !spec.is_empty() && !name.is_empty() => {
            Ok((spec.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(format!("expected spec=name, got '{}'", s)),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Prepare {
            input,
            metadata,
            output,
            methods,
            custom_names,
            config,
            format,
            params,
        } => cmd_prepare(
            &input,
            metadata.as_deref(),
            &output,
            methods,
            custom_names,
            config.as_deref(),
            format,
            &params,
        ),
        Commands::Style { document, styles } => cmd_style(&document, &styles),
        Commands::Inspect { document } => cmd_inspect(&document),
        Commands::Pairwise {
            input,
            output,
            score_column,
            transform,
        } => cmd_pairwise(&input, &output, &score_column, transform),
        Commands::ExampleConfig { output } => cmd_example_config(output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[allow(clippy::too_many_arguments)]
fn cmd_prepare(
    input: &Path,
    metadata: Option<&Path>,
    output: &Path,
    methods: Vec<String>,
    custom_names: Vec<(String, String)>,
    config: Option<&Path>,
    format: Option<CliInputFormat>,
    param_args: &ParamArgs,
) -> Result<()> {
    let mut pipeline = match config {
        Some(path) => {
            eprintln!("Loading pipeline configuration from {:?}...", path);
            Pipeline::from_config(&PipelineConfig::from_path(path)?)
        }
        None => {
            let mut params = ReductionParams::default();
            param_args.apply(&mut params);
            let pipeline = methods
                .iter()
                .fold(Pipeline::new().name("cli"), |p, m| p.method(m));
            custom_names
                .iter()
                .fold(pipeline, |p, (spec, name)| p.custom_name(spec, name))
                .params(params)
        }
    };
    if let Some(format) = format {
        pipeline = pipeline.input_format(format.into());
    }

    eprintln!("Projecting {:?}...", input);
    let result = pipeline.run_and_save(input, metadata, output)?;
    for warning in &result.warnings {
        eprintln!("  warning: {}", warning);
    }

    let doc = &result.document;
    eprintln!(
        "Done! {} proteins, projections: {}",
        doc.protein_data.len(),
        doc.projection_names().join(", ")
    );
    eprintln!("Written to {:?}", output);
    Ok(())
}

fn cmd_style(document: &Path, styles: &str) -> Result<()> {
    let styles = FeatureStyles::from_json_or_path(styles)?;
    if styles.is_empty() {
        return Err(ProtspaceError::InvalidStyle("no styles given".to_string()));
    }
    let store = DocumentStore::new(document);
    let mut doc = store.load_existing()?;
    let written = apply_feature_styles(&mut doc, &styles)?;
    store.save(&doc)?;
    eprintln!("Applied {} style entries to {:?}", written, document);
    Ok(())
}

fn cmd_inspect(document: &Path) -> Result<()> {
    let doc = DocumentStore::new(document).load_existing()?;
    println!("{}", doc.summary());
    Ok(())
}

fn cmd_pairwise(
    input: &Path,
    output: &Path,
    score_column: &str,
    transform: Option<ScoreTransform>,
) -> Result<()> {
    let table = PairwiseTable::from_path(input, score_column)?;
    let transform = transform.unwrap_or_else(|| ScoreTransform::for_column(score_column));
    eprintln!(
        "Converting {} pairs ({} as {})...",
        table.n_pairs(),
        score_column,
        transform
    );

    let (matrix, warnings) = table.to_similarity(transform)?;
    for warning in &warnings {
        eprintln!("  warning: {}", warning);
    }
    matrix.to_csv(output)?;
    eprintln!("Wrote {}x{} similarity matrix to {:?}", matrix.n(), matrix.n(), output);
    Ok(())
}

fn cmd_example_config(output: Option<&Path>) -> Result<()> {
    let yaml = PipelineConfig::example().to_yaml()?;
    match output {
        Some(path) => {
            std::fs::write(path, yaml)?;
            eprintln!("Example configuration written to {:?}", path);
        }
        None => print!("{}", yaml),
    }
    Ok(())
}

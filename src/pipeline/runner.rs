//! Pipeline runner: load, reduce with every requested method, build, merge, save.

use crate::data::{load, load_with_format, InputFormat, LoadWarning, LoadedInput};
use crate::document::{build_document, merge_documents, Document, DocumentStore};
use crate::error::{ProtspaceError, Result};
use crate::reduce::{
    DimensionReducer, DimensionReductionConfig, MethodSpec, ReductionParams, ReductionResult,
    Reducer,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Method specs in run order, e.g. `pca2`, `umap3`.
    pub methods: Vec<String>,
    /// Method spec -> projection name overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_names: BTreeMap<String, String>,
    /// Input format; inferred from the file extension when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_format: Option<InputFormat>,
    /// Reducer parameters shared by all methods.
    #[serde(default)]
    pub params: ReductionParams,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ProtspaceError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ProtspaceError::from)
    }

    /// Load from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// A starting point listing every method with default parameters.
    pub fn example() -> Self {
        Pipeline::new()
            .name("protein-landscape")
            .method("pca2")
            .method("umap2")
            .method("tsne2")
            .method("mds3")
            .custom_name("umap2", "UMAP (15 neighbors)")
            .to_config(Some("Project embeddings with all four reducers"))
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The built (or merged) document.
    pub document: Document,
    /// Non-fatal corrections applied while loading.
    pub warnings: Vec<LoadWarning>,
}

/// One method ready to run.
#[derive(Debug, Clone)]
struct PlannedMethod {
    spec: MethodSpec,
    config: DimensionReductionConfig,
    name: String,
}

/// Builder for constructing and running projection pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    methods: Vec<String>,
    custom_names: BTreeMap<String, String>,
    input_format: Option<InputFormat>,
    params: ReductionParams,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            name: "unnamed".to_string(),
            methods: Vec::new(),
            custom_names: BTreeMap::new(),
            input_format: None,
            params: ReductionParams::default(),
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            name: config.name.clone(),
            methods: config.methods.clone(),
            custom_names: config.custom_names.clone(),
            input_format: config.input_format,
            params: config.params.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add a reduction method spec such as `pca2` or `tsne3`.
    pub fn method(mut self, spec: &str) -> Self {
        self.methods.push(spec.to_string());
        self
    }

    /// Name the projection produced by `spec`.
    pub fn custom_name(mut self, spec: &str, name: &str) -> Self {
        self.custom_names.insert(spec.to_string(), name.to_string());
        self
    }

    /// Force an input format instead of inferring it from the extension.
    pub fn input_format(mut self, format: InputFormat) -> Self {
        self.input_format = Some(format);
        self
    }

    /// Set reducer parameters.
    pub fn params(mut self, params: ReductionParams) -> Self {
        self.params = params;
        self
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            methods: self.methods.clone(),
            custom_names: self.custom_names.clone(),
            input_format: self.input_format,
            params: self.params.clone(),
        }
    }

    /// Parse every spec and validate every config before touching data.
    fn plan(&self) -> Result<Vec<PlannedMethod>> {
        if self.methods.is_empty() {
            return Err(ProtspaceError::InvalidConfig(
                "at least one reduction method is required".to_string(),
            ));
        }

        let mut custom_names = HashMap::new();
        for (spec, name) in &self.custom_names {
            custom_names.insert(MethodSpec::parse(spec)?, name.clone());
        }

        let mut planned = Vec::with_capacity(self.methods.len());
        let mut names = HashSet::new();
        for raw in &self.methods {
            let spec = MethodSpec::parse(raw)?;
            let config = spec.config(&self.params)?;
            let name = custom_names
                .get(&spec)
                .cloned()
                .unwrap_or_else(|| spec.default_name());
            if !names.insert(name.clone()) {
                return Err(ProtspaceError::InvalidConfig(format!(
                    "projection name '{}' is produced more than once",
                    name
                )));
            }
            planned.push(PlannedMethod { spec, config, name });
        }

        if let Some(unused) = custom_names
            .keys()
            .find(|spec| !planned.iter().any(|p| &p.spec == *spec))
        {
            return Err(ProtspaceError::InvalidConfig(format!(
                "custom name given for '{}', which is not a requested method",
                unused
            )));
        }
        Ok(planned)
    }

    fn load(&self, input: &Path, metadata: Option<&Path>) -> Result<LoadedInput> {
        match self.input_format {
            Some(format) => load_with_format(input, format, metadata),
            None => load(input, metadata),
        }
    }

    /// Run every method on `input` and build a fresh document.
    ///
    /// Nothing is written to disk.
    pub fn run(&self, input: &Path, metadata: Option<&Path>) -> Result<PipelineOutput> {
        let planned = self.plan()?;
        let loaded = self.load(input, metadata)?;
        info!(
            pipeline = %self.name,
            n = loaded.n_samples(),
            methods = planned.len(),
            "Running pipeline"
        );

        let mut results = Vec::with_capacity(planned.len());
        for (i, step) in planned.into_iter().enumerate() {
            let result = run_method(&step, &loaded.matrix).map_err(|e| {
                ProtspaceError::Pipeline(format!("Method {} ({}) failed: {}", i + 1, step.spec, e))
            })?;
            results.push(result);
        }

        let document = build_document(&loaded.metadata, &results, &loaded.identifiers)?;
        Ok(PipelineOutput {
            document,
            warnings: loaded.warnings,
        })
    }

    /// Run, merge into the document at `output` (if any) and save atomically.
    ///
    /// The file is untouched when any step fails.
    pub fn run_and_save(
        &self,
        input: &Path,
        metadata: Option<&Path>,
        output: &Path,
    ) -> Result<PipelineOutput> {
        let PipelineOutput { document, warnings } = self.run(input, metadata)?;

        let store = DocumentStore::new(output);
        let existing = store.load()?;
        if existing.is_some() {
            info!(path = %output.display(), "Merging into existing document");
        }
        let mut merged = merge_documents(existing, document);
        merged.pad_feature_schema();
        let pruned = merged.prune_visualization_state();
        if !pruned.is_empty() {
            warn!(n = pruned.len(), "Removed styles for values no longer present");
        }
        merged.validate()?;
        store.save(&merged)?;

        Ok(PipelineOutput {
            document: merged,
            warnings,
        })
    }
}

fn run_method(step: &PlannedMethod, data: &nalgebra::DMatrix<f64>) -> Result<ReductionResult> {
    let start = Instant::now();
    let mut reducer = Reducer::new(step.spec.method(), step.config.clone());
    let coordinates = reducer.fit_transform(data)?;
    info!(
        method = %step.spec,
        name = %step.name,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Reduction finished"
    );
    Ok(ReductionResult {
        name: step.name.clone(),
        dimensions: step.spec.dims(),
        coordinates,
        info: reducer.params(),
    })
}

//  KERNEL.rs
//
//  Description:
//!   Defines the `Kernel` capability and the plain data types it
//!   exchanges with the worker that drives it: a parsed expression
//!   matrix in, a pathway table out, an optional fold-change table,
//!   and a rate-limited progress callback threaded through `process`.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use specifications::catalog::DatasetType;
use specifications::param::Parameter;


/***** ERRORS *****/
/// A deterministic failure inside the inner statistical procedure:
/// captured verbatim in `status.description`, never retried.
#[derive(Debug)]
pub enum KernelError {
    /// The expression matrix could not be parsed.
    MalformedMatrix { reason: String },
    /// This kernel does not accept the given dataset type.
    UnsupportedDatasetType { dataset_type: DatasetType },
    /// A design was required for this method but none was supplied.
    DesignRequired,
    /// The gene-set (pathway) database required by this kernel failed to load.
    PathwayDatabaseError { reason: String },
    /// The underlying numerical procedure failed on these inputs.
    ComputationError { reason: String },
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use KernelError::*;
        match self {
            MalformedMatrix { reason } => write!(f, "Malformed expression matrix: {reason}"),
            UnsupportedDatasetType { dataset_type } => write!(f, "This method does not support dataset type '{dataset_type}'"),
            DesignRequired => write!(f, "This method requires a design but none was supplied"),
            PathwayDatabaseError { reason } => write!(f, "Failed to load pathway database: {reason}"),
            ComputationError { reason } => write!(f, "Computation failed: {reason}"),
        }
    }
}

impl std::error::Error for KernelError {}



/***** LIBRARY *****/
/// A parsed tab-delimited expression/abundance matrix: a header row of
/// sample labels (leading tab), then rows beginning with a gene/protein
/// identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionMatrix {
    pub sample_labels: Vec<String>,
    pub gene_ids: Vec<String>,
    /// Row-major: `values[gene_index][sample_index]`.
    pub values: Vec<Vec<f64>>,
}

impl ExpressionMatrix {
    /// Parses the tab-delimited text a `Dataset.data` field carries.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        let mut lines = raw.lines();
        let header = lines.next().ok_or_else(|| KernelError::MalformedMatrix { reason: "empty input".to_string() })?;
        let sample_labels: Vec<String> = header.split('\t').skip(1).map(str::to_string).collect();
        if sample_labels.is_empty() {
            return Err(KernelError::MalformedMatrix { reason: "header row declares zero samples".to_string() });
        }

        let mut gene_ids = Vec::new();
        let mut values = Vec::new();
        for (row_num, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let gene_id = fields.next().ok_or_else(|| KernelError::MalformedMatrix { reason: format!("row {row_num} is empty") })?;
            let row: Vec<f64> = fields
                .map(|f| f.parse::<f64>().map_err(|_| KernelError::MalformedMatrix { reason: format!("row {row_num}: non-numeric value '{f}'") }))
                .collect::<Result<_, _>>()?;
            if row.len() != sample_labels.len() {
                return Err(KernelError::MalformedMatrix {
                    reason: format!("row {row_num} ('{gene_id}') has {} values, expected {}", row.len(), sample_labels.len()),
                });
            }
            gene_ids.push(gene_id.to_string());
            values.push(row);
        }

        Ok(Self { sample_labels, gene_ids, values })
    }

    pub fn sample_index(&self, label: &str) -> Option<usize> {
        self.sample_labels.iter().position(|s| s == label)
    }
}



/// Per-sample group assignment, derived from a `Design`'s `comparison` and
/// `analysis_group` fields, resolved against a concrete `ExpressionMatrix`'s
/// sample ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct Groups {
    /// Sample indices (into the matrix) belonging to `comparison.group1`.
    pub group1_indices: Vec<usize>,
    /// Sample indices belonging to `comparison.group2`.
    pub group2_indices: Vec<usize>,
}

impl Groups {
    /// Resolves a `Design` against a matrix's sample ordering. Treats
    /// absence of a paired grouping (no `Design` supplied) as the "no
    /// paired design" case: callers that need a design must request it
    /// via `Kernel::prepare`, which returns `KernelError::DesignRequired`
    /// in that case.
    pub fn from_design(design: &specifications::analysis::Design, matrix: &ExpressionMatrix) -> Result<Self, KernelError> {
        let mut group1_indices = Vec::new();
        let mut group2_indices = Vec::new();
        for (sample, label) in design.samples.iter().zip(design.analysis_group.iter()) {
            let idx = matrix.sample_index(sample).ok_or_else(|| KernelError::MalformedMatrix {
                reason: format!("design references sample '{sample}' absent from the data matrix"),
            })?;
            if *label == design.comparison.group1 {
                group1_indices.push(idx);
            } else if *label == design.comparison.group2 {
                group2_indices.push(idx);
            }
        }
        Ok(Self { group1_indices, group2_indices })
    }
}



/// Kernel-internal state produced by `prepare` and consumed by `process`/
/// `gene_fold_changes`. Opaque to the worker; each kernel defines its own
/// shape via `downcast`-free storage of whatever it needs (here: the
/// parsed matrix plus any kernel-specific working data).
#[derive(Clone, Debug)]
pub struct Prepared {
    pub matrix: ExpressionMatrix,
    /// This dataset's fully resolved parameter set: analysis-scoped values
    /// apply as given, dataset-scoped values have already had any
    /// per-dataset override applied on top of the analysis-level default.
    pub parameters: HashMap<String, Parameter>,
}



/// A single row of a pathway result table: columns `Pathway`,
/// `Direction`, `FDR`, `PValue`.
#[derive(Clone, Debug, PartialEq)]
pub struct PathwayRow {
    pub pathway: String,
    pub direction: Direction,
    pub fdr: f64,
    pub p_value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// The pathway table a kernel's `process` step produces. Serializes to the
/// tab-delimited form `AnalysisResult.results` carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathwayTable {
    pub rows: Vec<PathwayRow>,
}

impl PathwayTable {
    /// Renders this table as the tab-delimited text stored in `DatasetResult.results`.
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("Pathway\tDirection\tFDR\tPValue\n");
        for row in &self.rows {
            out.push_str(&format!("{}\t{}\t{}\t{}\n", row.pathway, row.direction, row.fdr, row.p_value));
        }
        out
    }
}

/// Per-gene effect sizes, when a kernel's `gene_fold_changes` produces one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldChangeTable {
    pub values: HashMap<String, f64>,
}

impl FoldChangeTable {
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("Gene\tFoldChange\n");
        let mut genes: Vec<&String> = self.values.keys().collect();
        genes.sort();
        for gene in genes {
            out.push_str(&format!("{}\t{}\n", gene, self.values[gene]));
        }
        out
    }
}



/// Rate-limiting and transport of progress updates is the worker's job;
/// a kernel only needs something to call.
pub trait ProgressCallback: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

impl<F: Fn(f64, &str) + Send + Sync> ProgressCallback for F {
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}



/// The capability an analysis method is dispatched through.
/// Implementations are looked up by `method_name` via `KernelRegistry`;
/// the worker never matches on a concrete type.
pub trait Kernel: Send + Sync {
    /// The catalog method name this kernel implements, e.g. `"camera_ora"`.
    fn method_name(&self) -> &'static str;

    /// Performs any one-time setup the kernel needs (loading a pathway
    /// database, warming caches). Called once per worker process, not per job.
    fn load_libraries(&self) -> Result<(), KernelError>;

    /// Parses and validates the inputs this kernel needs from a raw matrix,
    /// optional design, declared dataset type, and this dataset's resolved
    /// parameter set (analysis-level defaults with per-dataset overrides
    /// already applied).
    fn prepare(
        &self,
        matrix: &str,
        design: Option<&specifications::analysis::Design>,
        dataset_type: &DatasetType,
        parameters: &HashMap<String, Parameter>,
    ) -> Result<Prepared, KernelError>;

    /// Runs the core procedure over the prepared inputs, restricted to
    /// `gene_indices`, reporting progress through `progress`.
    fn process(&self, prepared: &Prepared, gene_indices: &[usize], groups: &Groups, progress: &dyn ProgressCallback) -> Result<PathwayTable, KernelError>;

    /// Computes per-gene fold changes, if this method supports doing so.
    fn gene_fold_changes(&self, prepared: &Prepared, design: &specifications::analysis::Design, groups: &Groups) -> Option<FoldChangeTable>;
}

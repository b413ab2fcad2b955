//  ANALYSIS.rs
//
//  Description:
//!   Defines the core analysis data model: the `AnalysisInput` a client
//!   submits (normalized and validated by the time it is queued), its
//!   inline `Dataset`/`Design`, and the `AnalysisResult` a worker writes
//!   back on success.

use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FResult};

use serde::{Deserialize, Serialize};

use crate::catalog::DatasetType;
use crate::param::Parameter;


/***** ERRORS *****/
/// Cross-field validation failures a request can fail with at admission
/// time; every variant here maps to a `406` response.
#[derive(Debug)]
pub enum ValidationError {
    /// `design.samples` has a different arity than the data matrix's column count.
    DesignArityMismatch { dataset: String, samples: usize, columns: usize },
    /// `comparison.group1` or `comparison.group2` does not appear in `analysis_group`.
    ComparisonGroupNotFound { dataset: String, group: String },
    /// Two datasets in the same request share a name.
    DuplicateDatasetName { name: String },
    /// An additional covariate array's length does not match `samples`' arity.
    CovariateArityMismatch { dataset: String, covariate: String, expected: usize, actual: usize },
    /// The data matrix is missing its header row or is otherwise malformed.
    MalformedMatrix { dataset: String, reason: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ValidationError::*;
        match self {
            DesignArityMismatch { dataset, samples, columns } => {
                write!(f, "Dataset '{dataset}': design declares {samples} samples but the data matrix has {columns} columns")
            }
            ComparisonGroupNotFound { dataset, group } => write!(f, "Dataset '{dataset}': comparison group '{group}' does not appear in analysis_group"),
            DuplicateDatasetName { name } => write!(f, "Duplicate dataset name '{name}' in the same analysis request"),
            CovariateArityMismatch { dataset, covariate, expected, actual } => {
                write!(f, "Dataset '{dataset}': covariate '{covariate}' has {actual} entries, expected {expected}")
            }
            MalformedMatrix { dataset, reason } => write!(f, "Dataset '{dataset}': malformed data matrix: {reason}"),
        }
    }
}

impl std::error::Error for ValidationError {}



/***** LIBRARY *****/
/// The assignment of samples to comparison groups and covariate strata
/// Immutable after validation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Design {
    pub samples: Vec<String>,
    pub comparison: Comparison,
    /// Per-sample label, same order and arity as `samples`.
    pub analysis_group: Vec<String>,
    /// Arbitrary additional covariate arrays, each of the same arity as `samples`.
    #[serde(default)]
    pub covariates: std::collections::HashMap<String, Vec<String>>,
}

impl Design {
    /// Validates this design against the number of columns in its dataset's
    /// data matrix and the dataset's own name.
    pub fn validate(&self, dataset_name: &str, matrix_columns: usize) -> Result<(), ValidationError> {
        if self.samples.len() != matrix_columns {
            return Err(ValidationError::DesignArityMismatch { dataset: dataset_name.to_string(), samples: self.samples.len(), columns: matrix_columns });
        }
        if self.analysis_group.len() != self.samples.len() {
            return Err(ValidationError::CovariateArityMismatch {
                dataset: dataset_name.to_string(),
                covariate: "analysis_group".to_string(),
                expected: self.samples.len(),
                actual: self.analysis_group.len(),
            });
        }
        if !self.analysis_group.contains(&self.comparison.group1) {
            return Err(ValidationError::ComparisonGroupNotFound { dataset: dataset_name.to_string(), group: self.comparison.group1.clone() });
        }
        if !self.analysis_group.contains(&self.comparison.group2) {
            return Err(ValidationError::ComparisonGroupNotFound { dataset: dataset_name.to_string(), group: self.comparison.group2.clone() });
        }
        for (name, values) in &self.covariates {
            if values.len() != self.samples.len() {
                return Err(ValidationError::CovariateArityMismatch {
                    dataset: dataset_name.to_string(),
                    covariate: name.clone(),
                    expected: self.samples.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }
}



/// The two groups a differential comparison is drawn between.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Comparison {
    pub group1: String,
    pub group2: String,
}



/// An inline dataset as submitted with an analysis request: a name, a type,
/// a tab-delimited expression/abundance matrix, an optional design, and any
/// dataset-scoped parameter overrides. Copy-by-value into the queued work
/// item; never mutated afterward.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    pub name: String,
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    /// Tab-delimited matrix: header row of sample labels (leading tab), rows
    /// beginning with a gene/protein identifier.
    pub data: String,
    pub design: Option<Design>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Dataset {
    /// Returns the number of sample columns declared by this matrix's header row.
    ///
    /// # Errors
    /// Fails if the matrix has no rows at all.
    pub fn matrix_column_count(&self) -> Result<usize, ValidationError> {
        let header = self.data.lines().next().ok_or_else(|| ValidationError::MalformedMatrix {
            dataset: self.name.clone(),
            reason: "no header row".to_string(),
        })?;
        // Leading tab precedes the first sample label; splitting on '\t' and
        // dropping the empty first field yields exactly the sample columns.
        Ok(header.split('\t').skip(1).count())
    }

    /// Validates this dataset's own design, if present, against its matrix arity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(design) = &self.design {
            let columns = self.matrix_column_count()?;
            design.validate(&self.name, columns)?;
        }
        Ok(())
    }
}



/// A validated, normalized analysis request, serialized immutably into the
/// queued work item.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalysisInput {
    pub method_name: String,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Client-set values are ignored; the API always assigns its own id.
    #[serde(default, skip_serializing)]
    pub analysis_id: Option<String>,
}

impl AnalysisInput {
    /// Runs every admission-time cross-field check: per-dataset design
    /// arity, duplicate dataset names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.name.clone()) {
                return Err(ValidationError::DuplicateDatasetName { name: dataset.name.clone() });
            }
            dataset.validate()?;
        }
        Ok(())
    }
}



/// The tabular pathway result for a single dataset within a completed analysis.
/// Columns: `Pathway`, `Direction` ∈ {up, down}, `FDR`, `PValue`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DatasetResult {
    pub dataset_name: String,
    /// Tab-delimited pathway matrix with the required columns.
    pub results: String,
    /// Per-gene effect sizes, when the kernel's `gene_fold_changes` produced one.
    pub fold_changes: Option<String>,
    pub reactome_links: Vec<String>,
    /// Identifier mappings (e.g. gene symbol -> pathway-database id).
    pub mappings: std::collections::HashMap<String, String>,
}

/// The final, immutable result of a completed analysis job, written once to
/// the Blackboard under `result:{job_id}`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalysisResult {
    /// The pathway-database version this analysis was run against.
    pub release: String,
    pub results: Vec<DatasetResult>,
}



#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dataset(name: &str, design: Option<Design>) -> Dataset {
        Dataset {
            name: name.to_string(),
            dataset_type: DatasetType("rnaseq_counts".into()),
            data: "\tS1\tS2\tS3\ngeneA\t1\t2\t3\ngeneB\t4\t5\t6\n".to_string(),
            design,
            parameters: vec![],
        }
    }

    fn valid_design() -> Design {
        Design {
            samples: vec!["S1".into(), "S2".into(), "S3".into()],
            comparison: Comparison { group1: "treated".into(), group2: "control".into() },
            analysis_group: vec!["treated".into(), "treated".into(), "control".into()],
            covariates: Default::default(),
        }
    }

    #[test]
    fn matrix_column_count_reads_header() {
        let dataset = sample_dataset("ds1", None);
        assert_eq!(dataset.matrix_column_count().unwrap(), 3);
    }

    #[test]
    fn design_arity_mismatch_fails_closed() {
        let mut design = valid_design();
        design.samples.push("S4".to_string());
        design.analysis_group.push("control".to_string());
        let dataset = sample_dataset("ds1", Some(design));
        assert!(matches!(dataset.validate(), Err(ValidationError::DesignArityMismatch { .. })));
    }

    #[test]
    fn comparison_group_must_appear_in_analysis_group() {
        let mut design = valid_design();
        design.comparison.group1 = "nonexistent".to_string();
        let dataset = sample_dataset("ds1", Some(design));
        assert!(matches!(dataset.validate(), Err(ValidationError::ComparisonGroupNotFound { .. })));
    }

    #[test]
    fn duplicate_dataset_names_rejected() {
        let input = AnalysisInput {
            method_name: "camera_ora".into(),
            datasets: vec![sample_dataset("ds1", Some(valid_design())), sample_dataset("ds1", Some(valid_design()))],
            parameters: vec![],
            analysis_id: None,
        };
        assert!(matches!(input.validate(), Err(ValidationError::DuplicateDatasetName { .. })));
    }

    #[test]
    fn valid_request_passes() {
        let input = AnalysisInput {
            method_name: "camera_ora".into(),
            datasets: vec![sample_dataset("ds1", Some(valid_design()))],
            parameters: vec![],
            analysis_id: None,
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn client_set_analysis_id_is_never_serialized() {
        let input = AnalysisInput {
            method_name: "camera_ora".into(),
            datasets: vec![],
            parameters: vec![],
            analysis_id: Some("client-supplied-id".into()),
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(!json.contains("client-supplied-id"));
    }
}

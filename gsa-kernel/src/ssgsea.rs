//  SSGSEA.rs
//
//  Description:
//!   A single-sample gene-set scoring kernel (catalog method `"ssgsea"`),
//!   the reference implementation for the "single-sample scoring" kernel
//!   family. Unlike `OraKernel`, this method scores each sample
//!   independently by the rank of its pathway genes within that
//!   sample's own expression profile, so it needs no `Design` at all —
//!   its absence is simply treated as "no paired design".

use std::collections::HashMap;

use specifications::analysis::Design;
use specifications::catalog::DatasetType;
use specifications::param::Parameter;

use crate::kernel::{Direction, ExpressionMatrix, FoldChangeTable, Groups, Kernel, KernelError, PathwayRow, PathwayTable, Prepared, ProgressCallback};

const SUPPORTED_TYPES: &[&str] = &["rnaseq_counts", "rnaseq_norm", "proteomics_int", "proteomics_sc", "microarray_norm"];

pub struct SsgseaKernel {
    pathway_sets: HashMap<String, Vec<String>>,
}

impl SsgseaKernel {
    pub fn new() -> Self {
        let mut pathway_sets = HashMap::new();
        pathway_sets.insert("APOPTOSIS".to_string(), vec!["TP53".into(), "BAX".into(), "CASP3".into(), "BCL2".into()]);
        pathway_sets.insert("CELL_CYCLE".to_string(), vec!["CCND1".into(), "CDK4".into(), "RB1".into(), "E2F1".into()]);
        Self { pathway_sets }
    }
}

impl Default for SsgseaKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for SsgseaKernel {
    fn method_name(&self) -> &'static str {
        "ssgsea"
    }

    fn load_libraries(&self) -> Result<(), KernelError> {
        Ok(())
    }

    fn prepare(&self, matrix: &str, _design: Option<&Design>, dataset_type: &DatasetType, parameters: &HashMap<String, Parameter>) -> Result<Prepared, KernelError> {
        if !SUPPORTED_TYPES.contains(&dataset_type.0.as_str()) {
            return Err(KernelError::UnsupportedDatasetType { dataset_type: dataset_type.clone() });
        }
        let matrix = ExpressionMatrix::parse(matrix)?;
        Ok(Prepared { matrix, parameters: parameters.clone() })
    }

    fn process(&self, prepared: &Prepared, gene_indices: &[usize], _groups: &Groups, progress: &dyn ProgressCallback) -> Result<PathwayTable, KernelError> {
        progress.report(0.2, "ranking genes per sample");
        let n_samples = prepared.matrix.sample_labels.len();

        // Per-sample gene ranks (1 = lowest expression), used to build an
        // enrichment-style walking-sum statistic per pathway.
        let mut ranks: Vec<Vec<usize>> = vec![vec![0; gene_indices.len()]; n_samples];
        for sample in 0..n_samples {
            let mut order: Vec<usize> = (0..gene_indices.len()).collect();
            order.sort_by(|&a, &b| {
                prepared.matrix.values[gene_indices[a]][sample].partial_cmp(&prepared.matrix.values[gene_indices[b]][sample]).unwrap_or(std::cmp::Ordering::Equal)
            });
            for (rank, &gene_pos) in order.iter().enumerate() {
                ranks[sample][gene_pos] = rank + 1;
            }
        }

        progress.report(0.6, "scoring pathways");
        let mut rows = Vec::new();
        for (pathway, genes) in &self.pathway_sets {
            let member_positions: Vec<usize> = gene_indices
                .iter()
                .enumerate()
                .filter(|(_, &gi)| genes.iter().any(|g| g == &prepared.matrix.gene_ids[gi]))
                .map(|(pos, _)| pos)
                .collect();
            if member_positions.is_empty() {
                continue;
            }

            // Mean normalized rank of member genes across all samples; values
            // above 0.5 indicate the pathway runs high relative to the rest
            // of the transcriptome on average.
            let mut score_sum = 0.0;
            for sample in 0..n_samples {
                let mean_rank: f64 = member_positions.iter().map(|&p| ranks[sample][p] as f64).sum::<f64>() / member_positions.len() as f64;
                score_sum += mean_rank / gene_indices.len() as f64;
            }
            let mean_score = score_sum / n_samples as f64;
            let deviation = (mean_score - 0.5).abs();
            // Smaller deviation from the midpoint is less surprising; map to
            // a pseudo p-value that shrinks as the score moves to either tail.
            let p_value = (1.0 - 2.0 * deviation).clamp(0.0, 1.0);

            rows.push(PathwayRow {
                pathway: pathway.clone(),
                direction: if mean_score >= 0.5 { Direction::Up } else { Direction::Down },
                fdr: p_value,
                p_value,
            });
        }
        rows.sort_by(|a, b| a.p_value.partial_cmp(&b.p_value).unwrap_or(std::cmp::Ordering::Equal));

        progress.report(0.95, "assembling pathway table");
        Ok(PathwayTable { rows })
    }

    fn gene_fold_changes(&self, _prepared: &Prepared, _design: &Design, _groups: &Groups) -> Option<FoldChangeTable> {
        // Single-sample scoring has no comparison groups; fold change is undefined.
        None
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> &'static str {
        "\tS1\tS2\tS3\nTP53\t10\t11\t12\nBAX\t9\t10\t11\nCCND1\t1\t2\t1\nCDK4\t2\t1\t2\n"
    }

    #[test]
    fn prepare_does_not_require_design() {
        let kernel = SsgseaKernel::new();
        assert!(kernel.prepare(matrix(), None, &DatasetType("rnaseq_counts".into()), &HashMap::new()).is_ok());
    }

    #[test]
    fn rejects_unsupported_dataset_type() {
        let kernel = SsgseaKernel::new();
        let result = kernel.prepare(matrix(), None, &DatasetType("exotic_type".into()), &HashMap::new());
        assert!(matches!(result, Err(KernelError::UnsupportedDatasetType { .. })));
    }

    #[test]
    fn high_expression_pathway_scores_up() {
        let kernel = SsgseaKernel::new();
        let prepared = kernel.prepare(matrix(), None, &DatasetType("rnaseq_counts".into()), &HashMap::new()).unwrap();
        let gene_indices: Vec<usize> = (0..prepared.matrix.gene_ids.len()).collect();
        let groups = Groups { group1_indices: vec![], group2_indices: vec![] };
        let table = kernel.process(&prepared, &gene_indices, &groups, &|_f: f64, _m: &str| {}).unwrap();
        let apoptosis = table.rows.iter().find(|r| r.pathway == "APOPTOSIS").unwrap();
        assert_eq!(apoptosis.direction, Direction::Up);
    }

    #[test]
    fn no_fold_changes_for_single_sample_scoring() {
        let kernel = SsgseaKernel::new();
        let design = Design {
            samples: vec![],
            comparison: specifications::analysis::Comparison { group1: "a".into(), group2: "b".into() },
            analysis_group: vec![],
            covariates: Default::default(),
        };
        let prepared = kernel.prepare(matrix(), None, &DatasetType("rnaseq_counts".into()), &HashMap::new()).unwrap();
        let groups = Groups { group1_indices: vec![], group2_indices: vec![] };
        assert!(kernel.gene_fold_changes(&prepared, &design, &groups).is_none());
    }
}

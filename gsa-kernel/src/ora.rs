//  ORA.rs
//
//  Description:
//!   A rank-based gene-set over-representation kernel (catalog method
//!   `"camera_ora"`), the reference implementation for the "enrichment"
//!   kernel family. Genes are ranked by
//!   the effect size between the two comparison groups; a pathway is
//!   "enriched" if its member genes are over-represented among the
//!   top-ranked genes, tested with a binomial approximation and
//!   corrected for multiple testing (Benjamini-Hochberg).

use std::collections::HashMap;

use specifications::analysis::Design;
use specifications::catalog::DatasetType;
use specifications::param::Parameter;

use crate::kernel::{Direction, FoldChangeTable, Groups, Kernel, KernelError, PathwayRow, PathwayTable, Prepared, ProgressCallback};

const SUPPORTED_TYPES: &[&str] = &["rnaseq_counts", "rnaseq_norm", "microarray_norm"];
/// Fallback when the `top_n` parameter is absent or fails to parse: half the
/// ranked gene list, matching this kernel's behavior before `top_n` existed.
const DEFAULT_TOP_N_FRACTION: f64 = 0.5;
/// Fallback for `min_pathway_size` when absent or unparseable.
const DEFAULT_MIN_PATHWAY_SIZE: usize = 2;

/// A named set of gene identifiers from a curated pathway database
/// The file format itself is out of scope; this kernel consumes it as
/// opaque tab-delimited rows of `pathway_name\tgene_id`.
pub struct OraKernel {
    pathway_sets: HashMap<String, Vec<String>>,
}

impl OraKernel {
    /// Builds a kernel with a small built-in pathway set, sufficient for
    /// development and tests without requiring a database file.
    pub fn new() -> Self {
        let mut pathway_sets = HashMap::new();
        pathway_sets.insert("APOPTOSIS".to_string(), vec!["TP53".into(), "BAX".into(), "CASP3".into(), "BCL2".into()]);
        pathway_sets.insert("CELL_CYCLE".to_string(), vec!["CCND1".into(), "CDK4".into(), "RB1".into(), "E2F1".into()]);
        Self { pathway_sets }
    }

    /// Builds a kernel from a tab-delimited `pathway_name\tgene_id` file.
    pub fn from_tabular(raw: &str) -> Result<Self, KernelError> {
        let mut pathway_sets: HashMap<String, Vec<String>> = HashMap::new();
        for (row_num, line) in raw.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.splitn(2, '\t');
            let pathway = fields.next().ok_or_else(|| KernelError::PathwayDatabaseError { reason: format!("row {row_num} is empty") })?;
            let gene = fields.next().ok_or_else(|| KernelError::PathwayDatabaseError { reason: format!("row {row_num} is missing a gene column") })?;
            pathway_sets.entry(pathway.to_string()).or_default().push(gene.to_string());
        }
        Ok(Self { pathway_sets })
    }
}

impl Default for OraKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for OraKernel {
    fn method_name(&self) -> &'static str {
        "camera_ora"
    }

    fn load_libraries(&self) -> Result<(), KernelError> {
        // The pathway set is already resident; nothing further to load.
        Ok(())
    }

    fn prepare(&self, matrix: &str, design: Option<&Design>, dataset_type: &DatasetType, parameters: &HashMap<String, Parameter>) -> Result<Prepared, KernelError> {
        if design.is_none() {
            return Err(KernelError::DesignRequired);
        }
        if !SUPPORTED_TYPES.contains(&dataset_type.0.as_str()) {
            return Err(KernelError::UnsupportedDatasetType { dataset_type: dataset_type.clone() });
        }
        let matrix = crate::kernel::ExpressionMatrix::parse(matrix)?;
        Ok(Prepared { matrix, parameters: parameters.clone() })
    }

    fn process(&self, prepared: &Prepared, gene_indices: &[usize], groups: &Groups, progress: &dyn ProgressCallback) -> Result<PathwayTable, KernelError> {
        progress.report(0.1, "ranking genes by effect size");
        let fold_changes = mean_differences(&prepared.matrix, gene_indices, groups);

        progress.report(0.5, "testing pathway over-representation");
        let top_n = prepared
            .parameters
            .get("top_n")
            .and_then(|p| p.value.parse::<usize>().ok())
            .unwrap_or_else(|| (gene_indices.len() as f64 * DEFAULT_TOP_N_FRACTION) as usize);
        let min_pathway_size =
            prepared.parameters.get("min_pathway_size").and_then(|p| p.value.parse::<usize>().ok()).unwrap_or(DEFAULT_MIN_PATHWAY_SIZE);

        let mut ranked: Vec<(usize, f64)> = gene_indices.iter().copied().zip(fold_changes.iter().copied()).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top_ranked: std::collections::HashSet<&str> =
            ranked.iter().take(top_n.min(ranked.len())).map(|(idx, _)| prepared.matrix.gene_ids[*idx].as_str()).collect();
        let universe: std::collections::HashSet<&str> = gene_indices.iter().map(|idx| prepared.matrix.gene_ids[*idx].as_str()).collect();

        let fold_change_by_gene: HashMap<&str, f64> =
            gene_indices.iter().zip(fold_changes.iter()).map(|(&idx, &fc)| (prepared.matrix.gene_ids[idx].as_str(), fc)).collect();

        let mut rows = Vec::new();
        let mut raw_p_values = Vec::new();
        for (pathway, genes) in &self.pathway_sets {
            let in_universe: Vec<&str> = genes.iter().map(String::as_str).filter(|g| universe.contains(g)).collect();
            if in_universe.len() < min_pathway_size {
                continue;
            }
            let hits = in_universe.iter().filter(|g| top_ranked.contains(*g)).count();
            let n = in_universe.len();
            let p_value = binomial_tail_approx(hits, n, 0.5);
            let mean_fc: f64 = in_universe.iter().filter_map(|g| fold_change_by_gene.get(g)).sum::<f64>() / n as f64;
            raw_p_values.push(p_value);
            rows.push(PathwayRow {
                pathway: pathway.clone(),
                direction: if mean_fc >= 0.0 { Direction::Up } else { Direction::Down },
                fdr: p_value,
                p_value,
            });
        }

        let fdr = benjamini_hochberg(&raw_p_values);
        for (row, q) in rows.iter_mut().zip(fdr.into_iter()) {
            row.fdr = q;
        }
        rows.sort_by(|a, b| a.fdr.partial_cmp(&b.fdr).unwrap_or(std::cmp::Ordering::Equal));

        progress.report(0.95, "assembling pathway table");
        Ok(PathwayTable { rows })
    }

    fn gene_fold_changes(&self, prepared: &Prepared, _design: &Design, groups: &Groups) -> Option<FoldChangeTable> {
        let gene_indices: Vec<usize> = (0..prepared.matrix.gene_ids.len()).collect();
        let fold_changes = mean_differences(&prepared.matrix, &gene_indices, groups);
        let values = prepared.matrix.gene_ids.iter().cloned().zip(fold_changes).collect();
        Some(FoldChangeTable { values })
    }
}

/// Per-gene mean(group1) - mean(group2), restricted to `gene_indices`.
fn mean_differences(matrix: &crate::kernel::ExpressionMatrix, gene_indices: &[usize], groups: &Groups) -> Vec<f64> {
    gene_indices
        .iter()
        .map(|&gi| {
            let row = &matrix.values[gi];
            let mean1 = mean_at(row, &groups.group1_indices);
            let mean2 = mean_at(row, &groups.group2_indices);
            mean1 - mean2
        })
        .collect()
}

fn mean_at(row: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| row[i]).sum::<f64>() / indices.len() as f64
}

/// Crude normal-approximation tail probability for observing `hits` or more
/// successes in `n` Bernoulli(`p`) trials. Stands in for the hypergeometric
/// test a production over-representation kernel would use; the exact
/// statistic is out of scope here.
fn binomial_tail_approx(hits: usize, n: usize, p: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let mean = n as f64 * p;
    let variance = n as f64 * p * (1.0 - p);
    if variance <= 0.0 {
        return 1.0;
    }
    let z = (hits as f64 - mean) / variance.sqrt();
    (1.0 - standard_normal_cdf(z)).clamp(0.0, 1.0)
}

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz-Stegun rational approximation of the error function.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Benjamini-Hochberg FDR correction; returns `q`-values in the same order
/// as the input `p`-values.
fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }
    let mut indexed: Vec<(usize, f64)> = p_values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut q_by_rank = vec![0.0; m];
    let mut min_so_far = 1.0_f64;
    for (rank, (_, p)) in indexed.iter().enumerate().rev() {
        let q = (p * m as f64 / (rank as f64 + 1.0)).min(1.0);
        min_so_far = min_so_far.min(q);
        q_by_rank[rank] = min_so_far;
    }

    let mut result = vec![0.0; m];
    for (rank, (original_idx, _)) in indexed.iter().enumerate() {
        result[*original_idx] = q_by_rank[rank];
    }
    result
}



#[cfg(test)]
mod tests {
    use super::*;
    use specifications::analysis::Comparison;

    fn design() -> Design {
        Design {
            samples: vec!["S1".into(), "S2".into(), "S3".into(), "S4".into()],
            comparison: Comparison { group1: "treated".into(), group2: "control".into() },
            analysis_group: vec!["treated".into(), "treated".into(), "control".into(), "control".into()],
            covariates: Default::default(),
        }
    }

    fn matrix() -> &'static str {
        "\tS1\tS2\tS3\tS4\nTP53\t10\t11\t1\t2\nBAX\t9\t10\t1\t1\nCCND1\t1\t2\t9\t10\nCDK4\t2\t1\t8\t9\n"
    }

    fn no_params() -> HashMap<String, Parameter> {
        HashMap::new()
    }

    #[test]
    fn prepare_requires_design() {
        let kernel = OraKernel::new();
        let result = kernel.prepare(matrix(), None, &DatasetType("rnaseq_counts".into()), &no_params());
        assert!(matches!(result, Err(KernelError::DesignRequired)));
    }

    #[test]
    fn prepare_rejects_unsupported_dataset_type() {
        let kernel = OraKernel::new();
        let result = kernel.prepare(matrix(), Some(&design()), &DatasetType("proteomics_sc".into()), &no_params());
        assert!(matches!(result, Err(KernelError::UnsupportedDatasetType { .. })));
    }

    #[test]
    fn process_ranks_apoptosis_as_up_and_cell_cycle_as_down() {
        let kernel = OraKernel::new();
        let design = design();
        let prepared = kernel.prepare(matrix(), Some(&design), &DatasetType("rnaseq_counts".into()), &no_params()).unwrap();
        let groups = Groups::from_design(&design, &prepared.matrix).unwrap();
        let gene_indices: Vec<usize> = (0..prepared.matrix.gene_ids.len()).collect();
        let table = kernel.process(&prepared, &gene_indices, &groups, &|_f: f64, _m: &str| {}).unwrap();

        let apoptosis = table.rows.iter().find(|r| r.pathway == "APOPTOSIS").unwrap();
        assert_eq!(apoptosis.direction, Direction::Up);
        let cell_cycle = table.rows.iter().find(|r| r.pathway == "CELL_CYCLE").unwrap();
        assert_eq!(cell_cycle.direction, Direction::Down);
    }

    #[test]
    fn min_pathway_size_drops_small_pathways() {
        let kernel = OraKernel::new();
        let design = design();
        let mut params = HashMap::new();
        params.insert(
            "min_pathway_size".to_string(),
            Parameter { name: "min_pathway_size".to_string(), value: "5".to_string(), scope: specifications::param::ParameterScope::Dataset },
        );
        let prepared = kernel.prepare(matrix(), Some(&design), &DatasetType("rnaseq_counts".into()), &params).unwrap();
        let groups = Groups::from_design(&design, &prepared.matrix).unwrap();
        let gene_indices: Vec<usize> = (0..prepared.matrix.gene_ids.len()).collect();
        let table = kernel.process(&prepared, &gene_indices, &groups, &|_f: f64, _m: &str| {}).unwrap();
        assert!(table.rows.is_empty(), "every built-in pathway has fewer than 5 members in this matrix's universe");
    }

    #[test]
    fn fdr_values_are_nondecreasing_under_bh_ordering() {
        let p_values = vec![0.01, 0.04, 0.03, 0.5];
        let q_values = benjamini_hochberg(&p_values);
        assert_eq!(q_values.len(), p_values.len());
        assert!(q_values.iter().all(|q| (0.0..=1.0).contains(q)));
    }

    #[test]
    fn gene_fold_changes_covers_every_gene() {
        let kernel = OraKernel::new();
        let design = design();
        let prepared = kernel.prepare(matrix(), Some(&design), &DatasetType("rnaseq_counts".into()), &no_params()).unwrap();
        let groups = Groups::from_design(&design, &prepared.matrix).unwrap();
        let fc = kernel.gene_fold_changes(&prepared, &design, &groups).unwrap();
        assert_eq!(fc.values.len(), prepared.matrix.gene_ids.len());
    }
}

//  CATALOG.rs
//
//  Description:
//!   Serves the static method/type catalog (`GET /methods`, `GET
//!   /types`) built once at startup from the registered kernels.

use std::collections::HashMap;

use log::info;
use warp::{Rejection, Reply};

use specifications::catalog::DatasetType;
use specifications::data::{ExternalData, ExternalDatasource};
use specifications::param::{ParameterKind, ParameterScope};

use crate::spec::Context;


/***** LIBRARY *****/
/// Builds the catalog entries for the two reference kernels this project
/// ships: `camera_ora` rank-based over-representation and `ssgsea`
/// single-sample scoring. A deployment swapping in different kernels
/// edits only this function and `gsa-worker`'s registry wiring.
pub fn builtin_catalog() -> specifications::catalog::Catalog {
    use specifications::catalog::Method;

    let rnaseq = DatasetType("rnaseq_counts".to_string());
    let norm = DatasetType("rnaseq_norm".to_string());
    let proteomics = DatasetType("proteomics_int".to_string());

    let camera_ora = Method {
        name: "camera_ora".to_string(),
        display_name: "CAMERA over-representation".to_string(),
        description: "Rank-based gene-set over-representation test against a curated pathway database.".to_string(),
        accepted_dataset_types: vec![rnaseq.clone(), norm.clone(), proteomics.clone()],
        parameters: vec![
            specifications::param::ParameterSpec {
                name: "top_n".to_string(),
                scope: ParameterScope::Analysis,
                kind: ParameterKind::Int,
                required: false,
                default: Some("50".to_string()),
            },
            specifications::param::ParameterSpec {
                name: "min_pathway_size".to_string(),
                scope: ParameterScope::Dataset,
                kind: ParameterKind::Int,
                required: false,
                default: Some("2".to_string()),
            },
        ],
    };

    let ssgsea = Method {
        name: "ssgsea".to_string(),
        display_name: "Single-sample gene-set enrichment".to_string(),
        description: "Per-sample rank-walk pathway scoring; does not require a design.".to_string(),
        accepted_dataset_types: vec![rnaseq, norm, proteomics],
        parameters: vec![],
    };

    specifications::catalog::Catalog::new(vec![camera_ora, ssgsea])
}

/// The dataset types advertised by `GET /types`, derived from the union of
/// every registered method's accepted types.
pub fn builtin_types(catalog: &specifications::catalog::Catalog) -> Vec<DatasetType> {
    let mut seen = Vec::new();
    for method in catalog.iter() {
        for dataset_type in &method.accepted_dataset_types {
            if !seen.contains(dataset_type) {
                seen.push(dataset_type.clone());
            }
        }
    }
    seen
}

/// The external source descriptors served by `/data/sources`: datasets
/// a Dataset Loader can fetch on request, before any loading job exists.
pub fn builtin_data_sources() -> Vec<ExternalDatasource> {
    vec![
        ExternalDatasource {
            resource_id: "EXAMPLE_MEL_RNA".to_string(),
            title: "Melanoma cell-line RNA-seq".to_string(),
            dataset_type: DatasetType("rnaseq_counts".to_string()),
            description: "Raw RNA-seq gene counts across a melanoma treated/control panel.".to_string(),
        },
        ExternalDatasource {
            resource_id: "EXAMPLE_BRST_PROT".to_string(),
            title: "Breast cancer proteomics panel".to_string(),
            dataset_type: DatasetType("proteomics_int".to_string()),
            description: "Label-free proteomics intensities across a breast cancer tumor/normal panel.".to_string(),
        },
    ]
}

/// Bundled example datasets served by `/data/examples`, independent of
/// whether a Dataset Loader has ever run against their `resource_id`.
pub fn builtin_examples() -> Vec<ExternalData> {
    let mut tissue = HashMap::new();
    tissue.insert("tissue".to_string(), vec!["tumor".to_string(), "tumor".to_string(), "normal".to_string(), "normal".to_string()]);

    vec![ExternalData {
        id: "ds-example-mel-rna".to_string(),
        title: "Melanoma cell-line RNA-seq".to_string(),
        dataset_type: DatasetType("rnaseq_counts".to_string()),
        group: "melanoma".to_string(),
        sample_ids: vec!["S1".to_string(), "S2".to_string(), "S3".to_string(), "S4".to_string()],
        sample_metadata: tissue,
        default_parameters: vec![],
    }]
}

/// `GET /methods`
pub async fn methods(context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/methods'");
    let methods: Vec<&specifications::catalog::Method> = context.catalog.iter().collect();
    Ok(warp::reply::json(&methods))
}

/// `GET /types`
pub async fn types(context: Context) -> Result<impl Reply, Rejection> {
    info!("Handling GET on '/types'");
    Ok(warp::reply::json(&builtin_types(&context.catalog)))
}

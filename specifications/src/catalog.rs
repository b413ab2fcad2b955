//  CATALOG.rs
//
//  Description:
//!   Defines the method/type catalog: the statically-known set of
//!   analysis methods a kernel implementation advertises, the dataset
//!   types it accepts, and how those are looked up by the API at
//!   admission time and exposed to clients via the catalog endpoint.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};

use serde::{Deserialize, Serialize};

use crate::param::ParameterSpec;


/***** ERRORS *****/
/// Errors raised while looking a method or dataset type up in the catalog.
#[derive(Debug)]
pub enum CatalogError {
    /// No method is registered under this name.
    UnknownMethod { method: String },
    /// The method does not accept this dataset type.
    UnsupportedDatasetType { method: String, dataset_type: String },
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CatalogError::*;
        match self {
            UnknownMethod { method } => write!(f, "No analysis method named '{method}' is registered"),
            UnsupportedDatasetType { method, dataset_type } => write!(f, "Method '{method}' does not support dataset type '{dataset_type}'"),
        }
    }
}

impl std::error::Error for CatalogError {}



/***** LIBRARY *****/
/// A dataset type a kernel can be asked to operate on, e.g. "rnaseq_counts" or "microarray".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct DatasetType(pub String);

impl Display for DatasetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        write!(f, "{}", self.0)
    }
}



/// A single analysis method's catalog entry: its name, which dataset types it
/// accepts, and the parameters it declares (both analysis- and dataset-scoped).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Method {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub accepted_dataset_types: Vec<DatasetType>,
    pub parameters: Vec<ParameterSpec>,
}

impl Method {
    /// Returns whether this method declares support for the given dataset type.
    pub fn accepts(&self, dataset_type: &DatasetType) -> bool {
        self.accepted_dataset_types.contains(dataset_type)
    }
}



/// The statically-known catalog of methods, built once at startup from the
/// kernel registry and held read-only for the life of the process:
/// kernels are looked up by name, never by dynamic discovery at
/// request time.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Catalog {
    methods: HashMap<String, Method>,
}

impl Catalog {
    /// Builds a catalog from a list of methods, keyed by their declared name.
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods: methods.into_iter().map(|m| (m.name.clone(), m)).collect() }
    }

    /// Looks a method up by name.
    pub fn get(&self, name: &str) -> Result<&Method, CatalogError> {
        self.methods.get(name).ok_or_else(|| CatalogError::UnknownMethod { method: name.to_string() })
    }

    /// Validates that `method` accepts `dataset_type`, failing closed otherwise.
    pub fn check_accepts(&self, method: &str, dataset_type: &DatasetType) -> Result<(), CatalogError> {
        let entry = self.get(method)?;
        if entry.accepts(dataset_type) {
            Ok(())
        } else {
            Err(CatalogError::UnsupportedDatasetType { method: method.to_string(), dataset_type: dataset_type.to_string() })
        }
    }

    /// Iterates over every registered method, e.g. for the catalog listing endpoint.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    /// Returns the number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{ParameterKind, ParameterScope};

    fn sample_method() -> Method {
        Method {
            name: "camera_ora".into(),
            display_name: "CAMERA over-representation".into(),
            description: "Rank-based gene-set over-representation test.".into(),
            accepted_dataset_types: vec![DatasetType("rnaseq_counts".into())],
            parameters: vec![ParameterSpec {
                name: "top_n".into(),
                scope: ParameterScope::Analysis,
                kind: ParameterKind::Int,
                required: false,
                default: Some("50".into()),
            }],
        }
    }

    #[test]
    fn looks_up_known_method() {
        let catalog = Catalog::new(vec![sample_method()]);
        assert!(catalog.get("camera_ora").is_ok());
    }

    #[test]
    fn unknown_method_fails_closed() {
        let catalog = Catalog::new(vec![sample_method()]);
        assert!(matches!(catalog.get("nonexistent"), Err(CatalogError::UnknownMethod { .. })));
    }

    #[test]
    fn rejects_unsupported_dataset_type() {
        let catalog = Catalog::new(vec![sample_method()]);
        let result = catalog.check_accepts("camera_ora", &DatasetType("microarray".into()));
        assert!(matches!(result, Err(CatalogError::UnsupportedDatasetType { .. })));
    }

    #[test]
    fn accepts_supported_dataset_type() {
        let catalog = Catalog::new(vec![sample_method()]);
        assert!(catalog.check_accepts("camera_ora", &DatasetType("rnaseq_counts".into())).is_ok());
    }
}

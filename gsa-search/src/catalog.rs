//  CATALOG.rs
//
//  Description:
//!   Defines `CatalogEntry`, the record a search index is built from,
//!   and the YAML catalog file loader. Built once at API startup from
//!   the example-dataset catalog and curated whitelist/blacklist
//!   files.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// One entry in the example-dataset catalog: enough of an `ExternalData`'s
/// metadata to index, independent of whether the dataset has actually been
/// loaded yet. Indexes title, description, group, and each
/// `sample_metadata` value.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub dataset_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub group: String,
    #[serde(default)]
    pub sample_metadata_values: Vec<String>,
}

/// Loads a YAML catalog file (a list of `CatalogEntry`) from disk.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>, Error> {
    let raw = fs::read_to_string(path).map_err(|err| Error::FileOpenError { path: path.to_path_buf(), err })?;
    serde_yaml::from_str(&raw).map_err(|err| Error::CatalogParseError { path: path.to_path_buf(), err })
}

/// Loads a curated whitelist/blacklist file: one dataset id per line,
/// blank lines and `#`-prefixed comments ignored.
pub fn load_id_list(path: &Path) -> Result<HashSet<String>, Error> {
    let raw = fs::read_to_string(path).map_err(|err| Error::FileOpenError { path: path.to_path_buf(), err })?;
    Ok(raw.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#')).map(str::to_string).collect())
}

//  ERRORS.rs
//
//  Description:
//!   Defines errors that relate to loading the example-dataset catalog
//!   and the curated whitelist/blacklist files.

use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;


/***** LIBRARY *****/
#[derive(Debug)]
pub enum Error {
    /// Failed to open a catalog or whitelist/blacklist file.
    FileOpenError { path: PathBuf, err: std::io::Error },
    /// Failed to parse a catalog file as YAML.
    CatalogParseError { path: PathBuf, err: serde_yaml::Error },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Error::*;
        match self {
            FileOpenError { path, err } => write!(f, "Failed to open '{}': {}", path.display(), err),
            CatalogParseError { path, err } => write!(f, "Failed to parse catalog file '{}' as YAML: {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {}

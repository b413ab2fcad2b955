//  LIB.rs
//
//  Description:
//!   The `gsa-kernel` crate defines the inner statistical-kernel
//!   capability: a registry of pluggable implementations, each bound to
//!   a `method_name`, behind a shared `load`/`prepare`/`process`/
//!   `gene_fold_changes` surface. The actual pathway-enrichment
//!   mathematics is out of scope; what lives here is the dispatch seam
//!   and two reference implementations exercising it.

pub mod kernel;
pub mod ora;
pub mod registry;
pub mod ssgsea;

pub use kernel::{Direction, ExpressionMatrix, Kernel, KernelError, Prepared, PathwayRow, PathwayTable, FoldChangeTable, Groups, ProgressCallback};
pub use registry::KernelRegistry;

//  REGISTRY.rs
//
//  Description:
//!   Implements `KernelRegistry`: the lookup table from a catalog
//!   `method_name` to its `Kernel` implementation. Kernels are modeled
//!   as a capability interface behind a registry keyed by method name,
//!   plugged in rather than matched on by concrete type.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FResult};
use std::sync::Arc;

use crate::kernel::Kernel;


/***** ERRORS *****/
#[derive(Debug)]
pub enum Error {
    UnknownMethod { method: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        match self {
            Error::UnknownMethod { method } => write!(f, "No kernel is registered for method '{method}'"),
        }
    }
}

impl std::error::Error for Error {}



/***** LIBRARY *****/
/// A read-only-after-build registry mapping `method_name` to `Kernel`
/// implementation. Built once at worker startup; the worker never
/// discovers kernels dynamically at request time.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn Kernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kernel` under its own declared `method_name`.
    pub fn register(&mut self, kernel: Arc<dyn Kernel>) -> &mut Self {
        self.kernels.insert(kernel.method_name().to_string(), kernel);
        self
    }

    /// Looks a kernel up by method name.
    pub fn get(&self, method_name: &str) -> Result<Arc<dyn Kernel>, Error> {
        self.kernels.get(method_name).cloned().ok_or_else(|| Error::UnknownMethod { method: method_name.to_string() })
    }

    /// Calls `load_libraries` on every registered kernel; intended to run
    /// once at worker startup so per-job setup cost is paid up front.
    pub fn load_all(&self) -> Result<(), crate::kernel::KernelError> {
        for kernel in self.kernels.values() {
            kernel.load_libraries()?;
        }
        Ok(())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::ora::OraKernel;

    #[test]
    fn registers_and_looks_up_by_method_name() {
        let mut registry = KernelRegistry::new();
        registry.register(Arc::new(OraKernel::new()));
        assert!(registry.get("camera_ora").is_ok());
        assert!(matches!(registry.get("nonexistent"), Err(Error::UnknownMethod { .. })));
    }
}

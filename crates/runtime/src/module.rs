//! Collaborator interface to the heavy module
//!
//! The module passes through three successive representations: artifact
//! bytes, a compiled module, and a live instance. The backend produces each
//! from the previous one; the loader releases every representation as soon
//! as the next stage has consumed it, so nothing stale outlives the
//! instance.

use crate::error::FaultResult;

/// Compiles and instantiates the heavy module
///
/// Import binding is a construction-time concern: a backend is built already
/// knowing the host imports it will bind when `instantiate` runs. The
/// associated types let different engines carry their own artifact and
/// instance representations.
pub trait ModuleBackend {
    /// The compiled-but-uninstantiated artifact
    type Compiled;
    /// The live module handle
    type Instance: ModuleInstance;

    /// Compile artifact bytes into a module
    ///
    /// # Errors
    ///
    /// Returns `Fault::Compile` if the bytes are malformed.
    fn compile(&mut self, bytes: &[u8]) -> FaultResult<Self::Compiled>;

    /// Instantiate a compiled module, binding host-provided imports
    ///
    /// # Errors
    ///
    /// Returns `Fault::Instantiate` if required imports are unmet or a
    /// required entry point is missing.
    fn instantiate(&mut self, compiled: &Self::Compiled) -> FaultResult<Self::Instance>;
}

/// A live, invocable module instance
pub trait ModuleInstance {
    /// One-time logging/setup entry point
    ///
    /// Modules without one inherit this no-op; absence is not an error.
    fn logging_setup(&mut self) -> FaultResult<()> {
        Ok(())
    }

    /// Per-invocation entry point
    ///
    /// # Errors
    ///
    /// Internal faults must surface as `Fault::Runtime`, never a silent
    /// return.
    fn run_step(&mut self) -> FaultResult<()>;
}


#[cfg(test)]
mod tests {
    use super::ModuleInstance;
    use crate::error::FaultResult;

    struct BareInstance;

    impl ModuleInstance for BareInstance {
        fn run_step(&mut self) -> FaultResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logging_setup_defaults_to_noop() {
        // Modules without a setup entry point are not an error.
        let mut instance = BareInstance;
        assert!(instance.logging_setup().is_ok());
    }
}

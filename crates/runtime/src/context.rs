//! Live execution context for the heavy module
//!
//! Holds the instantiated handle once the loader installs it. The context
//! lives as long as the backing process; the host destroys it by recycling
//! the process, which is modeled here by dropping the owning harness. Nothing
//! in the crate ever assumes it persists past an invocation boundary.

/// Owner of the live module instance
pub struct ExecutionContext<I> {
    instance: Option<I>,
}

impl<I> Default for ExecutionContext<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> ExecutionContext<I> {
    /// Create an empty context
    pub fn new() -> Self {
        Self { instance: None }
    }

    /// Install the freshly instantiated module
    pub(crate) fn install(&mut self, instance: I) {
        self.instance = Some(instance);
    }

    /// The live instance, if instantiation has happened
    pub fn instance_mut(&mut self) -> Option<&mut I> {
        self.instance.as_mut()
    }

    /// Whether a live instance exists
    pub fn is_live(&self) -> bool {
        self.instance.is_some()
    }
}

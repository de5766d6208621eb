//! Per-invocation driver
//!
//! The host calls `run_invocation` once per invocation, synchronously. The
//! harness owns every piece of state that survives between invocations; the
//! host destroys that state by dropping the harness and building a fresh
//! one, which is exactly what a destroy request asks for.
//!
//! The call always returns normally. Faults raised by the bootstrap stages
//! or the module's run step are caught in a single scope, logged, and
//! latched; the destroy request goes out at the start of the *next*
//! invocation, because the host does not reliably surface output produced
//! in the same call that requests destruction.

use std::rc::Rc;

use tracing::{error, trace, warn};

use crate::{
    budget::BudgetOracle,
    context::ExecutionContext,
    error::FaultResult,
    fault::FaultLatch,
    loader::{BootstrapState, StagedLoader, StepOutcome},
    module::{ModuleBackend, ModuleInstance},
    scratch::{ScratchStore, SharedScratch},
    source::ModuleSource,
};

/// Ambient invocation context injected by the host
///
/// The budget meter is readable through the `BudgetOracle` supertrait;
/// `request_destroy` asks the host to recycle the backing process. The host
/// may honor the request at any point after the invocation returns.
pub trait Host: BudgetOracle {
    /// Ask the host to destroy the backing process
    fn request_destroy(&mut self);
}

/// Top-level invocation driver
///
/// One harness per backing process. Per invocation it answers a latched
/// fault with a destroy request, or resets the ephemeral store, advances the
/// staged loader if the module is not yet ready, and drives the module's
/// per-invocation entry point once it is.
pub struct Harness<S, B: ModuleBackend> {
    loader: StagedLoader<S, B>,
    context: ExecutionContext<B::Instance>,
    scratch: SharedScratch,
    latch: FaultLatch,
    invocation: u64,
}

impl<S: ModuleSource, B: ModuleBackend> Harness<S, B> {
    /// Create a harness with its own ephemeral store
    pub fn new(loader: StagedLoader<S, B>) -> Self {
        Self::with_scratch(loader, ScratchStore::shared())
    }

    /// Create a harness over an existing ephemeral store handle
    ///
    /// Use this when the backend's host imports were wired to the same
    /// handle, so module writes and the per-invocation reset observe one
    /// store.
    pub fn with_scratch(loader: StagedLoader<S, B>, scratch: SharedScratch) -> Self {
        Self {
            loader,
            context: ExecutionContext::new(),
            scratch,
            latch: FaultLatch::new(),
            invocation: 0,
        }
    }

    /// Handle to the ephemeral store, for wiring host imports
    pub fn scratch(&self) -> SharedScratch {
        Rc::clone(&self.scratch)
    }

    /// Current bootstrap state
    pub fn state(&self) -> BootstrapState {
        self.loader.state()
    }

    /// Whether a fault is waiting to be answered with a destroy request
    pub fn fault_pending(&self) -> bool {
        self.latch.fault_pending()
    }

    /// Invocations seen by this harness, i.e. this process lifetime
    pub fn invocation(&self) -> u64 {
        self.invocation
    }

    /// Run one invocation
    ///
    /// Always returns normally; the host's own scheduling decides what
    /// happens next.
    pub fn run_invocation<H: Host>(&mut self, host: &mut H) {
        self.invocation += 1;
        trace!(invocation = self.invocation, "invocation entered");

        // A latched fault, or an invocation that never finished, means the
        // in-memory state cannot be trusted to resume. Destroy-only path:
        // no store reset, no loading, no run step.
        if self.latch.fault_pending() || self.latch.interrupted() {
            warn!(
                invocation = self.invocation,
                fault = self.latch.fault_pending(),
                interrupted = self.latch.interrupted(),
                "requesting backing process destruction",
            );
            host.request_destroy();
            return;
        }

        // Install a fresh store before any module code can run.
        self.scratch.borrow_mut().reset();

        self.latch.begin();
        let outcome = self.drive(host);
        self.latch.finish();

        if let Err(fault) = outcome {
            error!(
                invocation = self.invocation,
                %fault,
                "invocation faulted; recovery scheduled for next invocation",
            );
            self.latch.record();
        }
    }

    /// Bootstrap and/or run, inside the invocation's single fault scope
    fn drive<H: Host>(&mut self, host: &mut H) -> FaultResult<()> {
        if !self.loader.is_ready() {
            if let StepOutcome::Deferred { .. } = self.loader.step(&*host, &mut self.context)? {
                return Ok(());
            }
        }

        // Ready, whether just reached or established in an earlier
        // invocation, means the instance runs in this same invocation.
        if let Some(instance) = self.context.instance_mut() {
            instance.run_step()?;
        }
        Ok(())
    }
}

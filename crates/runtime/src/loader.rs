//! Staged module bootstrap
//!
//! Advances the heavy module from unloaded to ready-to-invoke across one or
//! more invocations. Compilation and instantiation are the operations most
//! likely to blow a single invocation's budget and cannot be interrupted once
//! started, so every stage is admitted by a budget check and holds its own
//! state: a deferred stage resumes from exactly where it left off on the next
//! invocation, never from scratch.

use std::mem;

use tracing::{debug, info, warn};

use crate::{
    budget::BudgetOracle,
    context::ExecutionContext,
    error::FaultResult,
    module::{ModuleBackend, ModuleInstance},
    source::ModuleSource,
};

/// Budget remaining below this defers all bootstrap work for the invocation
///
/// Generous headroom relative to what the stages actually cost: starting a
/// compile that cannot finish within the invocation is unrecoverable.
pub const DEFAULT_ADMISSION_THRESHOLD: f64 = 1250.0;

/// Bootstrap progress of the heavy module
///
/// Only advances within a process lifetime. Destroying the backing process
/// (dropping the harness) is the one thing that resets it to `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapState {
    Unloaded,
    BytesFetched,
    Compiled,
    Instantiated,
    LoggingReady,
}

/// Outcome of a loader pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Budget below the admission threshold; zero progress this invocation
    Deferred { remaining: f64, required: f64 },
    /// The module is instantiated and its logging setup has run
    Ready,
}

/// In-flight artifacts, keyed by stage
///
/// Each representation is owned by the stage that produced it and released
/// when the next transition consumes it: compiling drops the bytes,
/// instantiating drops the compiled artifact.
enum Stage<C> {
    Unloaded,
    BytesFetched(Vec<u8>),
    Compiled(C),
    Instantiated,
    LoggingReady,
}

impl<C> Stage<C> {
    fn tag(&self) -> BootstrapState {
        match self {
            Stage::Unloaded => BootstrapState::Unloaded,
            Stage::BytesFetched(_) => BootstrapState::BytesFetched,
            Stage::Compiled(_) => BootstrapState::Compiled,
            Stage::Instantiated => BootstrapState::Instantiated,
            Stage::LoggingReady => BootstrapState::LoggingReady,
        }
    }
}

/// Budget-gated bootstrap state machine
pub struct StagedLoader<S, B: ModuleBackend> {
    source: S,
    backend: B,
    stage: Stage<B::Compiled>,
    admission_threshold: f64,
}

impl<S: ModuleSource, B: ModuleBackend> StagedLoader<S, B> {
    /// Create a loader with the default admission threshold
    pub fn new(source: S, backend: B) -> Self {
        Self::with_threshold(source, backend, DEFAULT_ADMISSION_THRESHOLD)
    }

    /// Create a loader with a custom admission threshold
    pub fn with_threshold(source: S, backend: B, admission_threshold: f64) -> Self {
        Self {
            source,
            backend,
            stage: Stage::Unloaded,
            admission_threshold,
        }
    }

    /// Current bootstrap state
    pub fn state(&self) -> BootstrapState {
        self.stage.tag()
    }

    /// Whether the module is ready to invoke
    pub fn is_ready(&self) -> bool {
        matches!(self.stage, Stage::LoggingReady)
    }

    /// Run one bootstrap pass
    ///
    /// Advances as many stages as the budget admits, re-reading the oracle
    /// before each one: the meter runs while the pass works, so a later
    /// stage may be deferred even though an earlier one was admitted within
    /// the same invocation. A deferral logs the shortfall and leaves the
    /// state untouched; the same stage is retried next invocation. Stage
    /// failures propagate to the caller's fault scope, not handled here.
    pub fn step<O: BudgetOracle + ?Sized>(
        &mut self,
        oracle: &O,
        context: &mut ExecutionContext<B::Instance>,
    ) -> FaultResult<StepOutcome> {
        while !self.is_ready() {
            let remaining = oracle.remaining();
            if remaining < self.admission_threshold {
                warn!(
                    remaining,
                    required = self.admission_threshold,
                    state = ?self.state(),
                    "bootstrap deferred: insufficient budget",
                );
                return Ok(StepOutcome::Deferred {
                    remaining,
                    required: self.admission_threshold,
                });
            }

            self.advance(context)?;

            if self.is_ready() {
                info!(used = oracle.used(), "module bootstrap complete");
            }
        }

        Ok(StepOutcome::Ready)
    }

    /// Perform exactly one stage transition
    ///
    /// On failure the current stage is restored before the fault propagates,
    /// so the state tag never regresses while the fault is being answered.
    fn advance(&mut self, context: &mut ExecutionContext<B::Instance>) -> FaultResult<()> {
        match mem::replace(&mut self.stage, Stage::Unloaded) {
            Stage::Unloaded => {
                let bytes = self.source.fetch()?;
                debug!(len = bytes.len(), "module artifact fetched");
                self.stage = Stage::BytesFetched(bytes);
            }
            Stage::BytesFetched(bytes) => match self.backend.compile(&bytes) {
                Ok(compiled) => {
                    debug!("module compiled, artifact bytes released");
                    self.stage = Stage::Compiled(compiled);
                }
                Err(fault) => {
                    self.stage = Stage::BytesFetched(bytes);
                    return Err(fault);
                }
            },
            Stage::Compiled(compiled) => match self.backend.instantiate(&compiled) {
                Ok(instance) => {
                    debug!("module instantiated, compiled artifact released");
                    context.install(instance);
                    self.stage = Stage::Instantiated;
                }
                Err(fault) => {
                    self.stage = Stage::Compiled(compiled);
                    return Err(fault);
                }
            },
            Stage::Instantiated => {
                self.stage = Stage::Instantiated;
                if let Some(instance) = context.instance_mut() {
                    instance.logging_setup()?;
                }
                self.stage = Stage::LoggingReady;
            }
            Stage::LoggingReady => {
                self.stage = Stage::LoggingReady;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
    };

    use super::{BootstrapState, StagedLoader, StepOutcome};
    use crate::{
        budget::{BudgetOracle, FixedOracle},
        context::ExecutionContext,
        error::Fault,
        module::mock::{MockBackend, MockInstance},
        source::mock::MockSource,
    };

    /// Oracle replaying a fixed sequence of `remaining()` readings,
    /// repeating the last one once the script runs out
    struct ScriptedOracle {
        readings: RefCell<VecDeque<f64>>,
        last: Cell<f64>,
    }

    impl ScriptedOracle {
        fn new(readings: &[f64]) -> Self {
            let mut queue: VecDeque<f64> = readings.iter().copied().collect();
            let first = queue.pop_front().unwrap_or(0.0);
            queue.push_front(first);
            Self {
                readings: RefCell::new(queue),
                last: Cell::new(first),
            }
        }
    }

    impl BudgetOracle for ScriptedOracle {
        fn remaining(&self) -> f64 {
            if let Some(next) = self.readings.borrow_mut().pop_front() {
                self.last.set(next);
            }
            self.last.get()
        }

        fn used(&self) -> f64 {
            0.0
        }
    }

    fn loader() -> (StagedLoader<MockSource, MockBackend>, MockSource, MockBackend) {
        let source = MockSource::new(&b"artifact"[..]);
        let backend = MockBackend::default();
        let loader = StagedLoader::new(source.clone(), backend.clone());
        (loader, source, backend)
    }

    fn context() -> ExecutionContext<MockInstance> {
        ExecutionContext::new()
    }

    #[test]
    fn test_full_pass_with_ample_budget() {
        let (mut loader, source, backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);

        let outcome = loader.step(&oracle, &mut context).unwrap();

        assert_eq!(outcome, StepOutcome::Ready);
        assert_eq!(loader.state(), BootstrapState::LoggingReady);
        assert!(context.is_live());
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(backend.counters.compiles.get(), 1);
        assert_eq!(backend.counters.instantiates.get(), 1);
        assert_eq!(backend.counters.setups.get(), 1);
    }

    #[test]
    fn test_defers_below_threshold_without_fault() {
        let (mut loader, source, _backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(100.0);

        let outcome = loader.step(&oracle, &mut context).unwrap();

        match outcome {
            StepOutcome::Deferred { remaining, required } => {
                assert_eq!(remaining, 100.0);
                assert_eq!(required, super::DEFAULT_ADMISSION_THRESHOLD);
            }
            other => panic!("expected deferral, got: {other:?}"),
        }
        assert_eq!(loader.state(), BootstrapState::Unloaded);
        assert_eq!(source.fetch_count(), 0);
        assert!(!context.is_live());
    }

    #[test]
    fn test_resumes_from_deferred_stage() {
        let (mut loader, source, backend) = loader();
        let mut context = context();

        // First pass: the meter drops below the threshold right after the
        // fetch, so compilation is deferred.
        let oracle = ScriptedOracle::new(&[5_000.0, 400.0]);
        let outcome = loader.step(&oracle, &mut context).unwrap();
        assert!(matches!(outcome, StepOutcome::Deferred { .. }));
        assert_eq!(loader.state(), BootstrapState::BytesFetched);
        assert_eq!(backend.counters.compiles.get(), 0);

        // Next pass: the budget recovered, the pass resumes at compile
        // without fetching again.
        let oracle = FixedOracle::new(5_000.0);
        let outcome = loader.step(&oracle, &mut context).unwrap();
        assert_eq!(outcome, StepOutcome::Ready);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(backend.counters.compiles.get(), 1);
    }

    #[test]
    fn test_ready_step_is_noop() {
        let (mut loader, source, backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);

        loader.step(&oracle, &mut context).unwrap();
        let outcome = loader.step(&oracle, &mut context).unwrap();

        assert_eq!(outcome, StepOutcome::Ready);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(backend.counters.compiles.get(), 1);
        assert_eq!(backend.counters.setups.get(), 1);
    }

    #[test]
    fn test_fetch_failure_propagates_and_state_holds() {
        let (mut loader, source, _backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);
        source.fail_next("store offline");

        let result = loader.step(&oracle, &mut context);

        assert!(matches!(result, Err(Fault::Fetch { .. })));
        assert_eq!(loader.state(), BootstrapState::Unloaded);
    }

    #[test]
    fn test_compile_failure_keeps_fetched_bytes() {
        let (mut loader, source, backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);
        backend.counters.fail_compile.set(true);

        let result = loader.step(&oracle, &mut context);

        assert!(matches!(result, Err(Fault::Compile { .. })));
        assert_eq!(loader.state(), BootstrapState::BytesFetched);
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_instantiate_failure_keeps_compiled_artifact() {
        let (mut loader, _source, backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);
        backend.counters.fail_instantiate.set(true);

        let result = loader.step(&oracle, &mut context);

        assert!(matches!(result, Err(Fault::Instantiate { .. })));
        assert_eq!(loader.state(), BootstrapState::Compiled);
        assert!(!context.is_live());
    }

    #[test]
    fn test_logging_setup_failure_stays_instantiated() {
        let (mut loader, _source, backend) = loader();
        let mut context = context();
        let oracle = FixedOracle::new(10_000.0);
        backend.counters.fail_setup.set(true);

        let result = loader.step(&oracle, &mut context);

        assert!(matches!(result, Err(Fault::LoggingSetup { .. })));
        assert_eq!(loader.state(), BootstrapState::Instantiated);
        assert!(context.is_live());
    }

    #[test]
    fn test_bootstrap_states_are_ordered() {
        assert!(BootstrapState::Unloaded < BootstrapState::BytesFetched);
        assert!(BootstrapState::BytesFetched < BootstrapState::Compiled);
        assert!(BootstrapState::Compiled < BootstrapState::Instantiated);
        assert!(BootstrapState::Instantiated < BootstrapState::LoggingReady);
    }
}

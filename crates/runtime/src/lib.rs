// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Budget-gated bootstrap and fault-isolated invocation loop for a
//! host-driven heavy module
//!
//! The host invokes the program on a fixed cadence, under a strictly metered
//! per-invocation budget, inside an execution context it may recycle at any
//! invocation boundary. This crate is the machinery that survives that
//! environment: it loads a heavy computational module incrementally, budget
//! check by budget check, then drives it once per invocation, and recovers
//! deterministically when an invocation fails partway through.
//!
//! # Overview
//!
//! Per invocation, the harness:
//! - answers a fault latched last invocation with a destroy request and does
//!   nothing else, or
//! - replaces the host's persistent-store stand-in with a fresh scratch map
//!   before any module code runs,
//! - advances the module toward ready, each expensive stage admitted only
//!   when the budget oracle shows enough headroom, and
//! - once ready, calls the module's per-invocation entry point, catching any
//!   fault in a single scope so the invocation still returns normally.
//!
//! # Architecture
//!
//! ```text
//! Host (one synchronous call per invocation)
//!      ↓
//! Harness::run_invocation
//!      ├── FaultLatch        destroy request if the last invocation faulted
//!      ├── ScratchStore      fresh ephemeral store, every invocation
//!      ├── StagedLoader      Unloaded → BytesFetched → Compiled
//!      │                       → Instantiated → LoggingReady
//!      └── ExecutionContext  run_step on the live instance
//! ```
//!
//! The heavy module itself is opaque. The loader reaches it through the
//! [`ModuleSource`] and [`ModuleBackend`] seams; an engine crate supplies
//! the real fetch/compile/instantiate/run calls, and this crate only holds
//! the contract those calls must satisfy.
//!
//! # Fault model
//!
//! All stage and run-step faults are caught at one scope, logged, and
//! latched. The destroy request is deferred to the next invocation: the
//! host does not reliably surface output produced in the same call that
//! requests destruction, and partial in-memory state after a fault cannot
//! be trusted to resume, so full process recycling is the only recovery
//! primitive.

mod budget;
mod context;
mod error;
mod fault;
mod harness;
mod loader;
mod module;
mod scratch;
mod source;

pub use budget::{BudgetOracle, FixedOracle};
pub use context::ExecutionContext;
pub use error::{Fault, FaultResult};
pub use harness::{Harness, Host};
pub use loader::{BootstrapState, StagedLoader, StepOutcome, DEFAULT_ADMISSION_THRESHOLD};
pub use module::{ModuleBackend, ModuleInstance};
pub use scratch::{ScratchStore, SharedScratch};
pub use source::{BytesSource, ModuleSource};

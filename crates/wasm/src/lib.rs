// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! wasmtime-backed implementation of the module collaborator interface
//!
//! The heavy module is a WebAssembly artifact: `compile` turns its bytes
//! into a `wasmtime::Module`, `instantiate` links it against host-provided
//! imports and resolves its entry points, and the resulting instance maps
//! `logging_setup`/`run_step` onto exported functions. Traps surface as
//! faults through the runtime crate's taxonomy, so the invocation loop
//! treats a wasm trap exactly like any other stage failure.
//!
//! Host imports are bound on the backend's [`Linker`] before loading starts.
//! Import functions reach the ephemeral store through the store data
//! ([`HostCtx`]), so incidental writes from inside the module land in the
//! same scratch map the harness resets every invocation.
//!
//! # Example
//!
//! ```no_run
//! use cadence_runtime::{BytesSource, Harness, ScratchStore, StagedLoader};
//! use cadence_wasm::WasmBackend;
//!
//! let scratch = ScratchStore::shared();
//! let backend = WasmBackend::new(scratch.clone());
//! let artifact = std::fs::read("module.wasm")?;
//! let loader = StagedLoader::new(BytesSource::new(artifact), backend);
//! let harness = Harness::with_scratch(loader, scratch);
//! // The host calls harness.run_invocation(&mut host_ctx) once per invocation.
//! # let _ = harness;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::rc::Rc;

use tracing::debug;
use wasmtime::{Engine, Linker, Module, Store, TypedFunc};

use cadence_runtime::{Fault, FaultResult, ModuleBackend, ModuleInstance, SharedScratch};

/// Export names resolved at instantiation
#[derive(Debug, Clone)]
pub struct WasmConfig {
    /// Required per-invocation entry point
    pub run_export: String,
    /// Optional one-time setup entry point
    pub setup_export: String,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            run_export: "run_step".into(),
            setup_export: "logging_setup".into(),
        }
    }
}

/// Host state visible to bound imports through the wasmtime store
pub struct HostCtx {
    /// Ephemeral store shared with the harness
    pub scratch: SharedScratch,
}

/// Module backend driving a wasmtime engine
pub struct WasmBackend {
    engine: Engine,
    linker: Linker<HostCtx>,
    scratch: SharedScratch,
    config: WasmConfig,
}

impl WasmBackend {
    /// Create a backend with default export names and an empty import set
    pub fn new(scratch: SharedScratch) -> Self {
        Self::with_config(scratch, WasmConfig::default())
    }

    /// Create a backend with custom export names
    pub fn with_config(scratch: SharedScratch, config: WasmConfig) -> Self {
        let engine = Engine::default();
        let linker = Linker::new(&engine);
        Self {
            engine,
            linker,
            scratch,
            config,
        }
    }

    /// Linker for binding host imports; bind them before loading starts
    pub fn linker_mut(&mut self) -> &mut Linker<HostCtx> {
        &mut self.linker
    }
}

impl ModuleBackend for WasmBackend {
    type Compiled = Module;
    type Instance = WasmInstance;

    fn compile(&mut self, bytes: &[u8]) -> FaultResult<Module> {
        Module::new(&self.engine, bytes).map_err(|err| Fault::Compile {
            reason: format!("{err:#}"),
        })
    }

    fn instantiate(&mut self, compiled: &Module) -> FaultResult<WasmInstance> {
        let mut store = Store::new(
            &self.engine,
            HostCtx {
                scratch: Rc::clone(&self.scratch),
            },
        );

        let instance = self
            .linker
            .instantiate(&mut store, compiled)
            .map_err(|err| Fault::Instantiate {
                reason: format!("{err:#}"),
            })?;

        let run = instance
            .get_typed_func::<(), ()>(&mut store, &self.config.run_export)
            .map_err(|err| Fault::Instantiate {
                reason: format!("run export `{}`: {err:#}", self.config.run_export),
            })?;

        // The setup export is optional; a module without one gets the
        // default no-op. A present-but-mistyped export is still an error.
        let setup = match instance.get_func(&mut store, &self.config.setup_export) {
            Some(func) => Some(func.typed::<(), ()>(&store).map_err(|err| {
                Fault::Instantiate {
                    reason: format!("setup export `{}`: {err:#}", self.config.setup_export),
                }
            })?),
            None => None,
        };

        debug!(
            run = %self.config.run_export,
            has_setup = setup.is_some(),
            "wasm module instantiated",
        );

        Ok(WasmInstance { store, run, setup })
    }
}

/// Live wasm module driven once per invocation
pub struct WasmInstance {
    store: Store<HostCtx>,
    run: TypedFunc<(), ()>,
    setup: Option<TypedFunc<(), ()>>,
}

impl ModuleInstance for WasmInstance {
    fn logging_setup(&mut self) -> FaultResult<()> {
        if let Some(setup) = &self.setup {
            setup
                .call(&mut self.store, ())
                .map_err(|err| Fault::LoggingSetup {
                    reason: format!("{err:#}"),
                })?;
        }
        Ok(())
    }

    fn run_step(&mut self) -> FaultResult<()> {
        self.run.call(&mut self.store, ()).map_err(|err| Fault::Runtime {
            reason: format!("{err:#}"),
        })
    }
}

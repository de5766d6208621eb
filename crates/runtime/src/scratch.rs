//! Ephemeral stand-in for the host's persistent key/value store
//!
//! The host materializes a persistent store into the program's ambient state
//! on every invocation, and parses/serializes it around the invocation
//! whenever it looks touched. Installing a fresh in-memory map before any
//! module code runs means incidental writes (by the module, or by host-side
//! effects the module triggers) land here and die with the invocation instead
//! of round-tripping through the host's store machinery.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use serde_json::Value;

/// Shared handle to the scratch store
///
/// The invocation loop and any host import machinery observe the same store
/// through this handle. The runtime is single-threaded, so no locking.
pub type SharedScratch = Rc<RefCell<ScratchStore>>;

/// In-memory key/value stand-in for the host store
#[derive(Debug, Default)]
pub struct ScratchStore {
    entries: HashMap<String, Value>,
}

impl ScratchStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind a shared handle
    pub fn shared() -> SharedScratch {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Discard all entries and install a fresh, empty map
    ///
    /// Unconditional and infallible; runs at the very start of every
    /// invocation that does any work.
    pub fn reset(&mut self) {
        self.entries = HashMap::new();
    }

    /// Write an entry, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Read an entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Remove an entry, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

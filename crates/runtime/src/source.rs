//! Module artifact sourcing
//!
//! The seam through which the staged loader obtains the heavy module's
//! artifact bytes. The build/packaging layer behind it is opaque; the loader
//! only needs a synchronous byte fetch.

use crate::error::FaultResult;

/// Source of the heavy module's artifact bytes
///
/// Implementations may be expensive (disk reads, embedded-asset lookups).
/// The loader calls `fetch` once per process lifetime, on the first
/// invocation whose budget admits loading work.
pub trait ModuleSource {
    /// Fetch the module's compiled artifact bytes
    ///
    /// # Errors
    ///
    /// Returns `Fault::Fetch` if the artifact cannot be produced.
    fn fetch(&mut self) -> FaultResult<Vec<u8>>;
}

/// In-memory byte source
///
/// Hands out a copy of bytes provided up front. Useful for embedded
/// artifacts and tests.
#[derive(Debug, Clone, Default)]
pub struct BytesSource {
    bytes: Vec<u8>,
}

impl BytesSource {
    /// Create a source over the given artifact bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl ModuleSource for BytesSource {
    fn fetch(&mut self) -> FaultResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::{mock::MockSource, BytesSource, ModuleSource};
    use crate::error::Fault;

    #[test]
    fn test_bytes_source_returns_bytes() {
        let mut source = BytesSource::new(&b"artifact"[..]);
        assert_eq!(source.fetch().unwrap(), b"artifact");
        // A second fetch still works; the loader just never asks twice.
        assert_eq!(source.fetch().unwrap(), b"artifact");
    }

    #[test]
    fn test_mock_source_counts_fetches() {
        let mut source = MockSource::new(&b"artifact"[..]);
        let observer = source.clone();

        assert_eq!(observer.fetch_count(), 0);
        source.fetch().unwrap();
        source.fetch().unwrap();
        assert_eq!(observer.fetch_count(), 2);
    }

    #[test]
    fn test_mock_source_failure_injection_clears() {
        let mut source = MockSource::new(&b"artifact"[..]);
        source.fail_next("store offline");

        match source.fetch().unwrap_err() {
            Fault::Fetch { reason } => assert_eq!(reason, "store offline"),
            other => panic!("expected Fetch fault, got: {other:?}"),
        }

        // Cleared after triggering once.
        assert!(source.fetch().is_ok());
    }
}

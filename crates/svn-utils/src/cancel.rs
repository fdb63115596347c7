//! Cooperative cancellation.
//!
//! Long-running drivers poll a `Canceller` before each network or disk
//! operation; a signalled canceller turns into a `UtilError::Cancelled`
//! that propagates out through the usual error channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::UtilError;

/// A polled cancellation source.
///
/// Cloning is cheap; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    flag: Option<Arc<AtomicBool>>,
}

impl Canceller {
    /// A canceller that never fires.
    pub fn none() -> Self {
        Canceller { flag: None }
    }

    /// A canceller backed by the given flag.
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Canceller { flag: Some(flag) }
    }

    /// Poll for cancellation.
    pub fn check(&self) -> Result<(), UtilError> {
        match &self.flag {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(UtilError::Cancelled),
            _ => Ok(()),
        }
    }
}

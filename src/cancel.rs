use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::FlashError;

/// Shared stop flag, checked at chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), FlashError> {
        if self.is_cancelled() {
            Err(FlashError::Cancelled)
        } else {
            Ok(())
        }
    }
}

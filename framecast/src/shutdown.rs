//! Process-wide interrupt flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable stop flag checked once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag that is raised by Ctrl-C / SIGTERM.
    ///
    /// Can only be called once per process; `ctrlc` rejects a second handler.
    pub fn install() -> crate::Result<Self> {
        let shutdown = Self::new();
        let flag = Arc::clone(&shutdown.flag);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            flag.store(true, Ordering::Relaxed);
        })?;
        Ok(shutdown)
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

use crate::ports::Connectivity;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connectivity flags set by the host as the device state changes.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
    airplane_mode: AtomicBool,
}

impl StaticConnectivity {
    /// Network available, airplane mode off.
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            airplane_mode: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_airplane_mode(&self, on: bool) {
        self.airplane_mode.store(on, Ordering::SeqCst);
    }
}

impl Default for StaticConnectivity {
    fn default() -> Self {
        Self::online()
    }
}

impl Connectivity for StaticConnectivity {
    fn is_network_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_airplane_mode_on(&self) -> bool {
        self.airplane_mode.load(Ordering::SeqCst)
    }
}

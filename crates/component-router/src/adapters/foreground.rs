//! Foreground dispatchers.

use crate::ports::{ForegroundDispatcher, ForegroundTask};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

/// A host with no foreground surface. Every ordinary callback is treated as
/// background delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl ForegroundDispatcher for Headless {
    fn has_foreground(&self) -> bool {
        false
    }

    fn run_on_foreground(&self, task: ForegroundTask) {
        task();
    }
}

/// A single task draining foreground work in submission order.
#[derive(Debug)]
pub struct ForegroundLoop {
    active: AtomicBool,
    tasks: mpsc::UnboundedSender<ForegroundTask>,
}

impl ForegroundLoop {
    /// Spawn the loop on `runtime`. The loop ends when the dispatcher is
    /// dropped.
    pub fn spawn(runtime: &Handle) -> Self {
        let (tasks, mut queue) = mpsc::unbounded_channel::<ForegroundTask>();
        runtime.spawn(async move {
            while let Some(task) = queue.recv().await {
                task();
            }
            debug!("foreground loop stopped");
        });
        Self {
            active: AtomicBool::new(true),
            tasks,
        }
    }

    /// Mark the foreground surface as shown or hidden.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl ForegroundDispatcher for ForegroundLoop {
    fn has_foreground(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn run_on_foreground(&self, task: ForegroundTask) {
        if let Err(mpsc::error::SendError(task)) = self.tasks.send(task) {
            debug!("foreground loop gone, running task inline");
            task();
        }
    }
}

//! Per-channel request deadlines.
//!
//! One task per channel owns a min-heap of `(deadline, request id)` and the
//! map of live deadlines. Scheduling and cancelling are non-blocking messages.
//! A deadline that fires while still live raises a timeout failure for its
//! request; cancelled or replaced entries are skipped when they surface.

use crate::channel::ChannelEvent;
use crate::domain::{RequestFailure, RequestId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Stale heap entries tolerated before compaction.
const COMPACTION_SLACK: usize = 64;

/// Longest deadline kept; larger timeouts are clamped to it.
const MAX_TIMEOUT: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Command {
    Schedule { request_id: RequestId, deadline: Instant },
    Cancel(RequestId),
    Clear,
}

/// Handle to a channel's deadline task. The task stops when the handle drops.
#[derive(Debug)]
pub(crate) struct TimeoutScheduler {
    commands: mpsc::UnboundedSender<Command>,
}

impl TimeoutScheduler {
    pub(crate) fn spawn(
        runtime: &Handle,
        component: String,
        expired: RequestFailure,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        runtime.spawn(run(receiver, events, expired, component));
        Self { commands }
    }

    /// Start the clock for `request_id`. Rescheduling replaces the deadline.
    pub(crate) fn schedule(&self, request_id: RequestId, timeout: Duration) {
        let deadline = deadline_after(Instant::now(), timeout);
        let _ = self.commands.send(Command::Schedule {
            request_id,
            deadline,
        });
    }

    pub(crate) fn cancel(&self, request_id: RequestId) {
        let _ = self.commands.send(Command::Cancel(request_id));
    }

    /// Drop every deadline.
    pub(crate) fn clear(&self) {
        let _ = self.commands.send(Command::Clear);
    }
}

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout.min(MAX_TIMEOUT)).unwrap_or(now)
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    expired: RequestFailure,
    component: String,
) {
    let mut heap: BinaryHeap<Reverse<(Instant, RequestId)>> = BinaryHeap::new();
    let mut live: HashMap<RequestId, Instant> = HashMap::new();

    loop {
        let next = heap.peek().map(|Reverse((deadline, _))| *deadline);

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Schedule { request_id, deadline }) => {
                    live.insert(request_id, deadline);
                    heap.push(Reverse((deadline, request_id)));
                }
                Some(Command::Cancel(request_id)) => {
                    live.remove(&request_id);
                    if heap.len() > live.len() * 2 + COMPACTION_SLACK {
                        heap.retain(|Reverse((deadline, id))| live.get(id) == Some(deadline));
                    }
                }
                Some(Command::Clear) => {
                    live.clear();
                    heap.clear();
                }
                None => break,
            },

            () = wait_until(next) => {
                let now = Instant::now();
                while let Some(Reverse((deadline, request_id))) = heap.peek().copied() {
                    if deadline > now {
                        break;
                    }
                    heap.pop();
                    if live.get(&request_id) != Some(&deadline) {
                        continue;
                    }
                    live.remove(&request_id);
                    debug!(component = %component, request_id, "request timed out");
                    let event = ChannelEvent::Failure {
                        request_id: Some(request_id),
                        failure: expired.clone(),
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Background idle eviction.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use crossbeam::select;

use crate::pool::PoolShared;
use crate::resource::Transport;

/// Periodic task retiring connections idle past the configured timeout.
///
/// Runs on a dedicated thread driven by a tick channel and holds only a weak
/// reference to the pool, so an un-closed pool can still be dropped. Each
/// pass takes the same pool mutex as the foreground operations, which makes
/// scan-and-retire atomic against concurrent session opens.
pub(crate) struct IdleEvictor {
    shutdown: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl IdleEvictor {
    pub(crate) fn spawn<C: Transport>(shared: &Arc<PoolShared<C>>, interval: Duration) -> Self {
        let weak: Weak<PoolShared<C>> = Arc::downgrade(shared);
        let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("transport-pool-evictor".into())
            .spawn(move || {
                let ticker = channel::tick(interval);
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(shared) = weak.upgrade() else { break };
                            shared.evict_idle();
                        }
                    }
                }
            })
            .expect("failed to spawn the idle evictor thread");
        Self {
            shutdown,
            thread: Some(thread),
        }
    }

    /// Signal the thread and join it; an in-flight eviction pass finishes
    /// before this returns.
    pub(crate) fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for IdleEvictor {
    fn drop(&mut self) {
        self.halt();
    }
}

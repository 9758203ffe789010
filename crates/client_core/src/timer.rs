use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};

const TICK: Duration = Duration::from_secs(1);

type ExpireCallback = Box<dyn FnOnce() + Send + 'static>;
type CallbackSlot = Arc<Mutex<Option<ExpireCallback>>>;

pub struct Timer;

impl Timer {
    pub fn start<F>(initial_seconds: u32, on_expire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (remaining_tx, remaining_rx) = watch::channel(initial_seconds);
        let callback: CallbackSlot = Arc::new(Mutex::new(Some(Box::new(on_expire))));
        let task_callback = Arc::clone(&callback);

        let task = tokio::spawn(async move {
            let mut remaining = initial_seconds;
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            while remaining > 0 {
                ticker.tick().await;
                remaining -= 1;
                remaining_tx.send_replace(remaining);
            }
            if let Some(on_expire) = take_callback(&task_callback) {
                on_expire();
            }
        });

        TimerHandle {
            remaining: remaining_rx,
            callback,
            task,
        }
    }
}

/// Owning handle to a running countdown. Dropping it cancels the countdown.
pub struct TimerHandle {
    remaining: watch::Receiver<u32>,
    callback: CallbackSlot,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    /// Receiver that observes every tick.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        drop(take_callback(&self.callback));
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("remaining", &self.remaining())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn take_callback(slot: &CallbackSlot) -> Option<ExpireCallback> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// `mm:ss` rendering of a remaining-seconds value.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;

//! Concurrency gate ("throat") limiting how many package processes run at once.
//!
//! A counting semaphore with an explicit FIFO wait queue. A released slot is
//! handed directly to the oldest waiter, so admission order is scheduling
//! order.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct GateState {
    active: usize,
    peak: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug, Clone)]
pub struct Gate {
    /// `None` means unbounded: every acquire succeeds immediately.
    capacity: Option<usize>,
    state: Arc<Mutex<GateState>>,
}

impl Gate {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            state: Arc::default(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            state: Arc::default(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.lock().peak
    }

    /// Acquirers queued for a slot.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        let mut st = self.lock();
        if self.has_room(&st) {
            Self::take_slot(&mut st);
            Some(self.permit())
        } else {
            None
        }
    }

    /// Wait for a slot. Waiters are served first come, first served.
    pub async fn acquire(&self) -> GatePermit {
        let rx = {
            let mut st = self.lock();
            if self.has_room(&st) && st.waiters.is_empty() {
                Self::take_slot(&mut st);
                return self.permit();
            }
            let (tx, rx) = oneshot::channel();
            st.waiters.push_back(tx);
            rx
        };

        let mut waiting = Waiting {
            rx,
            gate: self.clone(),
            granted: false,
        };
        // Senders are only dropped after a hand-over or once this receiver is gone.
        let _ = (&mut waiting.rx).await;
        waiting.granted = true;
        self.permit()
    }

    fn has_room(&self, st: &GateState) -> bool {
        match self.capacity {
            Some(cap) => st.active < cap,
            None => true,
        }
    }

    fn take_slot(st: &mut GateState) {
        st.active += 1;
        st.peak = st.peak.max(st.active);
    }

    fn permit(&self) -> GatePermit {
        GatePermit { gate: self.clone() }
    }

    fn release(&self) {
        let mut st = self.lock();
        // Hand the slot over without decrementing; skip waiters that gave up.
        while let Some(tx) = st.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        st.active = st.active.saturating_sub(1);
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct GatePermit {
    gate: Gate,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

struct Waiting {
    rx: oneshot::Receiver<()>,
    gate: Gate,
    granted: bool,
}

impl Drop for Waiting {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        // A slot handed over just before the acquirer was dropped goes back.
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}

//! Re-entrant gate serializing invocations on single-threaded adapters

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Admits one thread at a time; the owning thread may re-enter
#[derive(Default)]
pub(crate) struct SerialGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl SerialGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until the calling thread owns the gate
    pub(crate) fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    /// Release one level; releasing a gate this thread does not own is ignored
    pub(crate) fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_one();
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.state.lock().depth
    }
}

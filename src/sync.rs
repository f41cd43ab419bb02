use core::{
    future::{poll_fn, Future},
    task::Poll,
};

use portable_atomic::{AtomicBool, Ordering};

use atomic_waker::AtomicWaker;

/// A one-shot signal, which latches until it is reset.
///
/// This is used to wait for the completion of an off-channel transmission. Signalling it before
/// anyone waits is not lost, since the state is only cleared by [TxDoneSignal::reset].
pub struct TxDoneSignal {
    done: AtomicBool,
    waker: AtomicWaker,
}
impl TxDoneSignal {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }
    /// Rearm the signal.
    pub fn reset(&self) {
        self.done.store(false, Ordering::Release);
    }
    /// Fire the signal and wake the waiter, if there is one.
    pub fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.waker.wake();
    }
    /// Check if the signal fired since the last reset.
    pub fn is_signalled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
    /// Asynchronously wait for the signal to fire.
    ///
    /// Only one task may wait at a time.
    pub fn wait(&self) -> impl Future<Output = ()> + use<'_> {
        poll_fn(|cx| {
            // Registering first means, that a signal between the check and returning can't be
            // missed.
            self.waker.register(cx.waker());
            if self.is_signalled() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
    }
}
impl Default for TxDoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

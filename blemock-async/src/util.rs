use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use async_broadcast::TrySendError;

pub struct ScopeGuard<F: FnOnce()> {
    dropfn: ManuallyDrop<F>,
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        // SAFETY: This is OK because `dropfn` is `ManuallyDrop` which will not be dropped by the compiler.
        let dropfn = unsafe { ManuallyDrop::take(&mut self.dropfn) };
        dropfn();
    }
}

pub fn defer<F: FnOnce()>(dropfn: F) -> ScopeGuard<F> {
    ScopeGuard {
        dropfn: ManuallyDrop::new(dropfn),
    }
}

pub struct BroadcastSender<T> {
    sender: async_broadcast::Sender<T>,
    _keep_alive: async_broadcast::InactiveReceiver<T>,
}

impl<T> Deref for BroadcastSender<T> {
    type Target = async_broadcast::Sender<T>;

    fn deref(&self) -> &Self::Target {
        &self.sender
    }
}

impl<T> DerefMut for BroadcastSender<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sender
    }
}

pub type BroadcastReceiver<T> = async_broadcast::Receiver<T>;

impl<T: Clone> BroadcastSender<T> {
    /// Broadcasts `msg` to every active receiver without dropping older messages, doubling the
    /// channel's capacity when it is full.
    ///
    /// Having no active receivers is not an error.
    pub fn broadcast_growing(&mut self, msg: T) -> Result<(), TrySendError<T>> {
        if self.sender.is_full() {
            let capacity = self.sender.capacity();
            self.sender.set_capacity(capacity * 2);
        }
        match self.sender.try_broadcast(msg) {
            Ok(_) | Err(TrySendError::Inactive(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Creates a broadcast channel that stays open while it has no active receivers.
pub fn broadcast<T>(cap: usize) -> BroadcastSender<T> {
    let (sender, receiver) = async_broadcast::broadcast(cap);
    BroadcastSender {
        sender,
        _keep_alive: receiver.deactivate(),
    }
}

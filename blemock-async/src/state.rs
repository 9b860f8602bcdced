use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use blemock::ConnectionState;
use futures_lite::Stream;
use tracing::{trace, warn};

use crate::util::{BroadcastReceiver, BroadcastSender, broadcast};

/// Initial per-subscriber buffer of undelivered state changes. Grows on demand.
const STATE_BACKLOG: usize = 16;

/// The latest connection state plus a broadcast of every state published after it.
///
/// Publishing and subscribing both happen under the same lock, so a new subscriber sees each
/// published state exactly once: either as its seed value or through its receiver.
pub(crate) struct ConnectionStateCell {
    inner: Mutex<StateInner>,
}

struct StateInner {
    current: ConnectionState,
    updates: BroadcastSender<ConnectionState>,
}

impl Default for ConnectionStateCell {
    fn default() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                current: ConnectionState::Disconnected,
                updates: broadcast(STATE_BACKLOG),
            }),
        }
    }
}

impl ConnectionStateCell {
    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> ConnectionState {
        self.lock().current
    }

    pub fn publish(&self, state: ConnectionState) {
        let mut inner = self.lock();
        trace!(%state, "publishing connection state");
        inner.current = state;
        if let Err(err) = inner.updates.broadcast_growing(state) {
            warn!(%state, %err, "failed to deliver connection state");
        }
    }

    pub fn subscribe(&self) -> ConnectionStateChanges {
        let inner = self.lock();
        ConnectionStateChanges {
            seed: Some(inner.current),
            last: None,
            updates: Box::pin(inner.updates.new_receiver()),
        }
    }
}

/// A stream of connection states.
///
/// Yields the state current at subscription time first, then every later change. Consecutive
/// duplicates are skipped. The stream only ends once the device it observes has been dropped.
pub struct ConnectionStateChanges {
    seed: Option<ConnectionState>,
    last: Option<ConnectionState>,
    updates: Pin<Box<BroadcastReceiver<ConnectionState>>>,
}

impl std::fmt::Debug for ConnectionStateChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateChanges")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl Stream for ConnectionStateChanges {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(state) = self.seed.take() {
            self.last = Some(state);
            return Poll::Ready(Some(state));
        }

        loop {
            match self.updates.as_mut().poll_next(cx) {
                Poll::Ready(Some(state)) if self.last == Some(state) => continue,
                Poll::Ready(Some(state)) => {
                    self.last = Some(state);
                    return Poll::Ready(Some(state));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_lite::StreamExt;
    use futures_lite::future::{block_on, poll_once};

    use super::*;

    #[test]
    fn new_subscribers_start_from_the_latest_state() {
        let cell = ConnectionStateCell::default();
        cell.publish(ConnectionState::Connecting);
        cell.publish(ConnectionState::Connected);

        let mut changes = cell.subscribe();
        assert_eq!(block_on(changes.next()), Some(ConnectionState::Connected));
        assert_eq!(block_on(poll_once(changes.next())), None);
        assert_eq!(cell.get(), ConnectionState::Connected);
    }

    #[test]
    fn consecutive_duplicates_are_coalesced() {
        let cell = ConnectionStateCell::default();
        let mut changes = cell.subscribe();

        cell.publish(ConnectionState::Disconnected);
        cell.publish(ConnectionState::Connecting);
        cell.publish(ConnectionState::Connecting);
        cell.publish(ConnectionState::Disconnected);

        let states: Vec<_> = block_on(async {
            let mut states = Vec::new();
            for _ in 0..3 {
                states.extend(changes.next().await);
            }
            states
        });
        assert_eq!(
            states,
            [
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Disconnected,
            ]
        );
        assert_eq!(block_on(poll_once(changes.next())), None);
    }

    #[test]
    fn each_subscription_is_independent() {
        let cell = ConnectionStateCell::default();
        let mut early = cell.subscribe();
        cell.publish(ConnectionState::Connecting);
        let mut late = cell.subscribe();

        assert_eq!(block_on(early.next()), Some(ConnectionState::Disconnected));
        assert_eq!(block_on(early.next()), Some(ConnectionState::Connecting));
        assert_eq!(block_on(late.next()), Some(ConnectionState::Connecting));
    }

    #[test]
    fn idle_subscribers_miss_nothing() {
        let cell = ConnectionStateCell::default();
        let mut changes = cell.subscribe();

        let cycle = [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ];
        for _ in 0..3 * STATE_BACKLOG {
            for state in cycle {
                cell.publish(state);
            }
        }

        assert_eq!(block_on(changes.next()), Some(ConnectionState::Disconnected));
        for _ in 0..3 * STATE_BACKLOG {
            for state in cycle {
                assert_eq!(block_on(changes.next()), Some(state));
            }
        }
        assert_eq!(block_on(poll_once(changes.next())), None);
    }
}

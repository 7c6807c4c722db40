// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel state and the task that drives it.
//!
//! Every joined channel is owned by one spawned task. The task opens the
//! channel on the transport, waits for the join outcome, then dispatches
//! inbound traffic to listeners in arrival order until it is cancelled, the
//! backend closes the channel, or the channel fails.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livesync_core::recording;
use livesync_core::traits::{ChannelRequest, ClientMessage, ServerMessage};
use livesync_core::{
    BroadcastMessage, ChangeBinding, ChangeEvent, ChannelStatus, PresenceMessage, PresenceRecord,
    RealtimeTransport, SubscriptionState,
};

use crate::backoff::ReconnectPolicy;

pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;
pub type PresenceHandler = Arc<dyn Fn(&PresenceMessage) + Send + Sync>;
pub type BroadcastHandler = Arc<dyn Fn(&BroadcastMessage) + Send + Sync>;
pub type StatusHandler = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Listener {
    Change {
        binding: ChangeBinding,
        handler: ChangeHandler,
    },
    Presence(PresenceHandler),
    Broadcast {
        event: String,
        handler: BroadcastHandler,
    },
    Status(StatusHandler),
}

/// Shared state of one channel, referenced by the registry, the driver
/// task and every subscription handle attached to it.
pub(crate) struct ChannelInner {
    pub(crate) id: String,
    pub(crate) request: ChannelRequest,
    listeners: Mutex<Vec<(u64, Listener)>>,
    state: watch::Sender<SubscriptionState>,
    outbound: Mutex<Option<mpsc::Sender<ClientMessage>>>,
    presence: Mutex<Option<PresenceRecord>>,
    handles: AtomicUsize,
    next_handle: AtomicU64,
    pub(crate) cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChannelInner {
    pub(crate) fn new(id: String, request: ChannelRequest) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Connecting);
        Self {
            id,
            request,
            listeners: Mutex::new(Vec::new()),
            state,
            outbound: Mutex::new(None),
            presence: Mutex::new(None),
            handles: AtomicUsize::new(0),
            next_handle: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach listeners for a new handle and return the handle's id.
    pub(crate) fn attach(&self, listeners: Vec<Listener>) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.fetch_add(1, Ordering::AcqRel);
        lock(&self.listeners).extend(listeners.into_iter().map(|l| (handle, l)));
        handle
    }

    pub(crate) fn detach_listeners(&self, handle: u64) {
        lock(&self.listeners).retain(|(owner, _)| *owner != handle);
    }

    pub(crate) fn release_handle(&self) -> bool {
        self.handles.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }

    /// Queue a message for the backend if the channel is joined.
    pub(crate) fn send(&self, message: ClientMessage) -> Result<(), livesync_core::LiveSyncError> {
        let guard = lock(&self.outbound);
        let Some(outbound) = guard.as_ref() else {
            return Err(livesync_core::LiveSyncError::transport(format!(
                "channel `{}` is not joined",
                self.id
            )));
        };
        outbound.try_send(message).map_err(|e| {
            livesync_core::LiveSyncError::transport(format!(
                "channel `{}` outbound queue: {e}",
                self.id
            ))
        })
    }

    /// Remember the presence record so it is re-sent after every (re)join.
    pub(crate) fn set_presence(&self, record: Option<PresenceRecord>) {
        *lock(&self.presence) = record;
    }

    fn snapshot_listeners(&self) -> Vec<Listener> {
        lock(&self.listeners).iter().map(|(_, l)| l.clone()).collect()
    }

    fn dispatch_change(&self, event: &ChangeEvent) {
        recording::record_change_event(&event.table, &event.operation.to_string());
        for listener in self.snapshot_listeners() {
            if let Listener::Change { binding, handler } = listener
                && binding.matches(event)
            {
                handler(event);
            }
        }
    }

    fn dispatch_presence(&self, message: &PresenceMessage) {
        for listener in self.snapshot_listeners() {
            if let Listener::Presence(handler) = listener {
                handler(message);
            }
        }
    }

    fn dispatch_broadcast(&self, message: &BroadcastMessage) {
        for listener in self.snapshot_listeners() {
            if let Listener::Broadcast { event, handler } = listener
                && (event == "*" || event == message.event)
            {
                handler(message);
            }
        }
    }

    fn dispatch_status(&self, status: ChannelStatus) {
        for listener in self.snapshot_listeners() {
            if let Listener::Status(handler) = listener {
                handler(status);
            }
        }
    }
}

/// Active channels keyed by channel id.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) channels: DashMap<String, Arc<ChannelInner>>,
}

impl Registry {
    /// Release one handle of `inner`. The last handle out cancels the
    /// driver task and removes the channel from the registry.
    pub(crate) fn release(&self, inner: &Arc<ChannelInner>) {
        let mut counted = false;
        let removed = self.channels.remove_if(&inner.id, |_, current| {
            if Arc::ptr_eq(current, inner) {
                counted = true;
                inner.release_handle()
            } else {
                false
            }
        });
        let last = if counted {
            removed.is_some()
        } else {
            inner.release_handle()
        };
        if last {
            inner.cancel.cancel();
        }
        recording::set_active_channels(self.channels.len());
    }

    /// Remove `inner` if it is still the registered channel for its id.
    pub(crate) fn forget(&self, inner: &Arc<ChannelInner>) {
        self.channels
            .remove_if(&inner.id, |_, current| Arc::ptr_eq(current, inner));
        recording::set_active_channels(self.channels.len());
    }
}

/// How one connection attempt ended.
enum AttemptEnd {
    Cancelled,
    Closed,
    Failed { status: ChannelStatus, joined: bool },
}

/// Drive a channel until it is cancelled, closed, or fails for good.
pub(crate) async fn run_channel(
    inner: Arc<ChannelInner>,
    transport: Arc<dyn RealtimeTransport>,
    registry: Arc<Registry>,
    policy: ReconnectPolicy,
    join_timeout: Duration,
) {
    let mut attempt = 0u32;
    loop {
        inner.set_state(SubscriptionState::Connecting);
        let end = run_attempt(&inner, transport.as_ref(), join_timeout).await;
        *lock(&inner.outbound) = None;

        let (status, joined) = match end {
            AttemptEnd::Cancelled => {
                debug!(channel = %inner.id, "channel released");
                break;
            }
            AttemptEnd::Closed => {
                info!(channel = %inner.id, "channel closed by backend");
                break;
            }
            AttemptEnd::Failed { status, joined } => (status, joined),
        };

        if joined {
            attempt = 0;
        }
        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            info!(
                channel = %inner.id,
                status = %status,
                "channel left inactive until re-subscribed"
            );
            break;
        };

        info!(
            channel = %inner.id,
            status = %status,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "channel failed; re-joining after backoff"
        );
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    registry.forget(&inner);
}

async fn run_attempt(
    inner: &ChannelInner,
    transport: &dyn RealtimeTransport,
    join_timeout: Duration,
) -> AttemptEnd {
    let link = tokio::select! {
        _ = inner.cancel.cancelled() => return cancelled(inner, None),
        link = transport.open_channel(inner.request.clone()) => link,
    };
    let mut link = match link {
        Ok(link) => link,
        Err(e) => {
            warn!(
                channel = %inner.id,
                transport = transport.name(),
                error = %e,
                "failed to open channel"
            );
            return failed(inner, ChannelStatus::ChannelError, false);
        }
    };
    *lock(&inner.outbound) = Some(link.outbound.clone());

    let join_deadline = tokio::time::sleep(join_timeout);
    tokio::pin!(join_deadline);
    let mut joined = false;

    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                return cancelled(inner, Some(&link.outbound));
            }
            _ = &mut join_deadline, if !joined => {
                let _ = link.outbound.try_send(ClientMessage::Leave);
                return failed(inner, ChannelStatus::TimedOut, false);
            }
            message = link.inbound.recv() => match message {
                None => {
                    inner.set_state(SubscriptionState::Closed);
                    inner.dispatch_status(ChannelStatus::Closed);
                    return AttemptEnd::Closed;
                }
                Some(ServerMessage::Status(ChannelStatus::Subscribed)) => {
                    joined = true;
                    inner.set_state(SubscriptionState::Subscribed);
                    info!(channel = %inner.id, "channel subscribed");
                    let record = lock(&inner.presence).clone();
                    if let Some(record) = record {
                        let _ = link.outbound.try_send(ClientMessage::Track(record));
                    }
                    inner.dispatch_status(ChannelStatus::Subscribed);
                }
                Some(ServerMessage::Status(ChannelStatus::Closed)) => {
                    inner.set_state(SubscriptionState::Closed);
                    inner.dispatch_status(ChannelStatus::Closed);
                    return AttemptEnd::Closed;
                }
                Some(ServerMessage::Status(status)) => {
                    return failed(inner, status, joined);
                }
                Some(ServerMessage::Change(event)) => inner.dispatch_change(&event),
                Some(ServerMessage::Presence(message)) => inner.dispatch_presence(&message),
                Some(ServerMessage::Broadcast(message)) => inner.dispatch_broadcast(&message),
            }
        }
    }
}

fn cancelled(inner: &ChannelInner, outbound: Option<&mpsc::Sender<ClientMessage>>) -> AttemptEnd {
    if let Some(outbound) = outbound {
        let _ = outbound.try_send(ClientMessage::Leave);
    }
    inner.set_state(SubscriptionState::Closed);
    AttemptEnd::Cancelled
}

fn failed(inner: &ChannelInner, status: ChannelStatus, joined: bool) -> AttemptEnd {
    warn!(channel = %inner.id, status = %status, "channel error");
    inner.set_state(status.into());
    inner.dispatch_status(status);
    AttemptEnd::Failed { status, joined }
}

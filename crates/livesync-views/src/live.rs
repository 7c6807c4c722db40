// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`LiveSync`] context and the views it mounts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info};

use livesync_cache::{InvalidationRouter, QueryCache, QueryClient, Route};
use livesync_config::{LiveSyncConfig, RouteConfig};
use livesync_core::{
    ChangeSink, LiveSyncError, PresenceRecord, PresenceScope, QueryFetcher, RealtimeTransport,
    SubscriptionState,
};
use livesync_feed::{RealtimeClient, Subscription};
use livesync_notify::{NotificationDispatcher, NotificationStore};
use livesync_presence::{PresenceHandle, PresenceTracker};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which feature flag a view answers to besides the realtime master switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Submissions,
    Deals,
    Presence,
}

/// Everything the live views share, injected once per session.
///
/// Cheap to clone; clones share every store and channel.
#[derive(Clone)]
pub struct LiveSync {
    config: Arc<LiveSyncConfig>,
    realtime: RealtimeClient,
    queries: QueryClient,
    router: Arc<InvalidationRouter>,
    dispatcher: Arc<NotificationDispatcher>,
    presence: PresenceTracker,
    mounts: Arc<Mutex<HashMap<String, Weak<Mount>>>>,
}

/// One router listener on one channel, shared by every view of a route.
#[derive(Debug)]
struct Mount {
    route: RouteConfig,
    subscription: Subscription,
}

impl LiveSync {
    pub fn new(
        config: LiveSyncConfig,
        transport: Arc<dyn RealtimeTransport>,
        fetcher: Arc<dyn QueryFetcher>,
    ) -> Self {
        let realtime = RealtimeClient::from_config(transport, &config.realtime);
        let queries = QueryClient::from_config(Arc::new(QueryCache::new()), fetcher, &config.cache);
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(
            NotificationStore::from_config(&config.notifications),
        )));
        let sink: Arc<dyn ChangeSink> = dispatcher.clone();
        let router = Arc::new(InvalidationRouter::new(queries.clone()).with_sink(sink));
        let presence = PresenceTracker::from_config(realtime.clone(), &config.presence);

        Self {
            config: Arc::new(config),
            realtime,
            queries,
            router,
            dispatcher,
            presence,
            mounts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &LiveSyncConfig {
        &self.config
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn router(&self) -> &Arc<InvalidationRouter> {
        &self.router
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        self.dispatcher.store()
    }

    fn enabled(&self, feature: Feature) -> bool {
        let flags = &self.config.realtime.features;
        self.config.realtime_enabled()
            && match feature {
                Feature::Submissions => true,
                Feature::Deals => flags.deals,
                Feature::Presence => flags.presence,
            }
    }

    /// Live team-wide submission list.
    pub fn watch_submissions(&self) -> Result<LiveView, LiveSyncError> {
        self.mount(RouteConfig::submissions(), Feature::Submissions)
    }

    /// Live list of one rep's submissions.
    pub fn watch_user_submissions(&self, user_id: &str) -> Result<LiveView, LiveSyncError> {
        self.mount(RouteConfig::user_submissions(user_id), Feature::Submissions)
    }

    /// Live deal pipeline board.
    pub fn watch_deals(&self) -> Result<LiveView, LiveSyncError> {
        self.mount(RouteConfig::deals(), Feature::Deals)
    }

    /// Live view over an arbitrary table route.
    pub fn watch_table(&self, route: RouteConfig) -> Result<LiveView, LiveSyncError> {
        self.mount(route, Feature::Submissions)
    }

    /// Mount every `[[routes]]` entry from the configuration.
    pub fn watch_configured_routes(&self) -> Result<Vec<LiveView>, LiveSyncError> {
        self.config
            .routes
            .iter()
            .map(|route| self.watch_table(route.clone()))
            .collect()
    }

    /// Mount `config`, sharing the route's listener with views already
    /// mounted for it so each change is routed once.
    fn mount(&self, config: RouteConfig, feature: Feature) -> Result<LiveView, LiveSyncError> {
        let route = Route::new(config)?;
        let name = route.name().to_string();
        if !self.enabled(feature) {
            info!(view = %name, "realtime disabled; view is inert");
            return Ok(LiveView { name, mount: None });
        }

        let mut mounts = lock(&self.mounts);
        if let Some(existing) = mounts.get(&name).and_then(Weak::upgrade) {
            if existing.subscription.state().is_active() {
                if &existing.route != route.config() {
                    return Err(LiveSyncError::DuplicateChannel { channel_id: name });
                }
                debug!(view = %name, "view shares mounted route");
                return Ok(LiveView {
                    name,
                    mount: Some(existing),
                });
            }
        }

        self.dispatcher.register(route.config());
        let router = Arc::clone(&self.router);
        let binding = route.binding();
        let config = route.config().clone();
        let subscription = self
            .realtime
            .channel(name.clone())
            .on(binding, move |event| {
                router.handle(&route, event);
            })
            .subscribe()?;
        debug!(view = %name, channel = %subscription.channel_id(), "view mounted");

        let mount = Arc::new(Mount {
            route: config,
            subscription,
        });
        mounts.retain(|_, weak| weak.strong_count() > 0);
        mounts.insert(name.clone(), Arc::downgrade(&mount));
        Ok(LiveView {
            name,
            mount: Some(mount),
        })
    }

    /// Assert `record` into the roster for `scope`.
    pub fn track_presence(
        &self,
        scope: PresenceScope,
        record: PresenceRecord,
    ) -> Result<PresenceView, LiveSyncError> {
        if !self.enabled(Feature::Presence) {
            info!(scope = %scope, "realtime disabled; presence is inert");
            return Ok(PresenceView { handle: None });
        }
        Ok(PresenceView {
            handle: Some(self.presence.track(scope, record)?),
        })
    }

    /// Tear down every channel opened through this context.
    pub fn shutdown(&self) {
        self.realtime.remove_all_channels();
    }
}

impl std::fmt::Debug for LiveSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSync")
            .field("realtime_enabled", &self.config.realtime_enabled())
            .field("channels", &self.realtime.active_channels())
            .finish()
    }
}

/// A mounted live view. Dropping the last view of a route unsubscribes.
#[derive(Debug)]
pub struct LiveView {
    name: String,
    mount: Option<Arc<Mount>>,
}

impl LiveView {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` for views mounted while realtime is disabled.
    pub fn is_live(&self) -> bool {
        self.mount.is_some()
    }

    /// Current channel state; inert views report `CLOSED`.
    pub fn state(&self) -> SubscriptionState {
        self.subscription()
            .map_or(SubscriptionState::Closed, Subscription::state)
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.mount.as_ref().map(|mount| &mount.subscription)
    }
}

/// Presence asserted through [`LiveSync::track_presence`].
#[derive(Debug)]
pub struct PresenceView {
    handle: Option<PresenceHandle>,
}

impl PresenceView {
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Everyone else present; empty while inert.
    pub fn others(&self) -> Vec<PresenceRecord> {
        self.handle
            .as_ref()
            .map(PresenceHandle::others)
            .unwrap_or_default()
    }

    pub fn handle(&self) -> Option<&PresenceHandle> {
        self.handle.as_ref()
    }
}

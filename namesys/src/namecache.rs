//! Background following of names.
//!
//! Following a name spawns a task that resolves it through the `NameSystem`
//! right away and again every interval, keeping the latest answer. Each
//! follow owns a child cancellation token; unfollowing cancels it.
use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use record::Path;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{DEFAULT_FOLLOW_INTERVAL_SECS, DEFAULT_FOLLOW_RESOLVE_TIMEOUT_SECS},
    error::{NameError, NameResult},
    system::NameSystem,
};

struct Follow {
    cancel: CancellationToken,
    current: Arc<Mutex<Option<Path>>>,
}

pub struct NameCache {
    name_system: Arc<NameSystem>,
    follows: Mutex<HashMap<String, Follow>>,
    interval: Duration,
    resolve_timeout: Duration,
    cancel: CancellationToken,
}

impl NameCache {
    pub fn new(name_system: Arc<NameSystem>, cancel: CancellationToken) -> Self {
        Self {
            name_system,
            follows: Mutex::new(HashMap::new()),
            interval: Duration::from_secs(DEFAULT_FOLLOW_INTERVAL_SECS),
            resolve_timeout: Duration::from_secs(DEFAULT_FOLLOW_RESOLVE_TIMEOUT_SECS),
            cancel,
        }
    }

    /// A zero interval is ignored and the current one kept.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("ignoring zero follow interval");
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn with_resolve_timeout(mut self, resolve_timeout: Duration) -> Self {
        self.resolve_timeout = resolve_timeout;
        self
    }

    /// Start following `name`. Must be called inside a tokio runtime.
    pub fn follow(&self, name: &str) -> NameResult<()> {
        if self.cancel.is_cancelled() {
            return Err(NameError::Closed);
        }

        let mut follows = self.follows.lock();
        if follows.contains_key(name) {
            return Err(NameError::AlreadyFollowing(name.to_string()));
        }

        let follow = Follow {
            cancel: self.cancel.child_token(),
            current: Arc::new(Mutex::new(None)),
        };
        tokio::spawn(follow_name(
            self.name_system.clone(),
            name.to_string(),
            self.interval,
            self.resolve_timeout,
            follow.current.clone(),
            follow.cancel.clone(),
        ));
        follows.insert(name.to_string(), follow);

        info!(%name, interval_secs = self.interval.as_secs(), "following name");
        Ok(())
    }

    pub fn unfollow(&self, name: &str) -> NameResult<()> {
        let follow = self
            .follows
            .lock()
            .remove(name)
            .ok_or_else(|| NameError::NotFollowing(name.to_string()))?;
        follow.cancel.cancel();
        info!(%name, "stopped following name");
        Ok(())
    }

    /// Followed names, sorted.
    pub fn list_follows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.follows.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Last value `name` resolved to, if it is followed and resolved once.
    pub fn current(&self, name: &str) -> Option<Path> {
        let follows = self.follows.lock();
        let current = follows.get(name)?.current.lock().clone();
        current
    }

    /// Stop every follow.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.follows.lock().clear();
    }
}

impl Drop for NameCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow_name(
    name_system: Arc<NameSystem>,
    name: String,
    period: Duration,
    resolve_timeout: Duration,
    current: Arc<Mutex<Option<Path>>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let resolved = tokio::select! {
            _ = cancel.cancelled() => break,
            resolved = timeout(resolve_timeout, name_system.resolve(&name)) => resolved,
        };

        match resolved {
            Ok(Ok(value)) => {
                let mut current = current.lock();
                if current.as_ref() != Some(&value) {
                    info!(%name, %value, "followed name resolved");
                    *current = Some(value);
                }
            }
            Ok(Err(err)) if err.is_not_found() => debug!(%name, "followed name not resolved yet"),
            Ok(Err(err)) => warn!(%name, %err, "failed to resolve followed name"),
            Err(_) => warn!(
                %name,
                timeout_secs = resolve_timeout.as_secs(),
                "resolving followed name timed out"
            ),
        }
    }

    debug!(%name, "follow task stopped");
}

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use record::Path;
use tokio_util::sync::CancellationToken;

use super::mocks::path;
use crate::{NameCache, NameError, NameResolver, NameResult, NameSystem};

const INTERVAL: Duration = Duration::from_secs(3600);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolves every name to one settable value, optionally never answering.
#[derive(Default)]
struct ScriptedResolver {
    value: Mutex<Option<Path>>,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    fn set(&self, value: &str) {
        *self.value.lock() = Some(path(value));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for ScriptedResolver {
    async fn resolve_once(&self, name: &str) -> NameResult<Path> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let value = self.value.lock().clone();
        value.ok_or_else(|| NameError::NotFound(name.to_string()))
    }
}

fn name_cache(resolver: &Arc<ScriptedResolver>) -> NameCache {
    let resolvers: Vec<Arc<dyn NameResolver>> = vec![resolver.clone()];
    NameCache::new(Arc::new(NameSystem::new(resolvers)), CancellationToken::new())
        .with_interval(INTERVAL)
        .with_resolve_timeout(RESOLVE_TIMEOUT)
}

#[tokio::test(start_paused = true)]
async fn test_follow_resolves_now_and_every_interval() {
    let resolver = Arc::new(ScriptedResolver::default());
    resolver.set("/ipfs/Qm111");
    let cache = name_cache(&resolver);

    cache.follow("/ipns/A").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(resolver.calls(), 1);
    assert_eq!(cache.current("/ipns/A"), Some(path("/ipfs/Qm111")));

    resolver.set("/ipfs/Qm222");
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(resolver.calls(), 2);
    assert_eq!(cache.current("/ipns/A"), Some(path("/ipfs/Qm222")));
}

#[tokio::test]
async fn test_follow_bookkeeping() {
    let resolver = Arc::new(ScriptedResolver::default());
    let cache = name_cache(&resolver);

    cache.follow("/ipns/B").unwrap();
    cache.follow("/ipns/A").unwrap();
    assert!(matches!(
        cache.follow("/ipns/A"),
        Err(NameError::AlreadyFollowing(name)) if name == "/ipns/A"
    ));
    assert_eq!(cache.list_follows(), vec!["/ipns/A", "/ipns/B"]);

    cache.unfollow("/ipns/A").unwrap();
    assert!(matches!(
        cache.unfollow("/ipns/A"),
        Err(NameError::NotFollowing(name)) if name == "/ipns/A"
    ));
    assert_eq!(cache.list_follows(), vec!["/ipns/B"]);
    assert_eq!(cache.current("/ipns/A"), None);
}

#[tokio::test(start_paused = true)]
async fn test_unfollow_stops_resolving() {
    let resolver = Arc::new(ScriptedResolver::default());
    resolver.set("/ipfs/Qm111");
    let cache = name_cache(&resolver);

    cache.follow("/ipns/A").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    cache.unfollow("/ipns/A").unwrap();

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(resolver.calls(), 1);
    assert!(cache.list_follows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_resolve_times_out_and_follow_continues() {
    let resolver = Arc::new(ScriptedResolver::default());
    resolver.hang.store(true, Ordering::SeqCst);
    let cache = name_cache(&resolver);

    cache.follow("/ipns/A").unwrap();
    tokio::time::sleep(RESOLVE_TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(resolver.calls(), 1);
    assert_eq!(cache.current("/ipns/A"), None);

    resolver.hang.store(false, Ordering::SeqCst);
    resolver.set("/ipfs/Qm111");
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(resolver.calls(), 2);
    assert_eq!(cache.current("/ipns/A"), Some(path("/ipfs/Qm111")));
}

#[tokio::test]
async fn test_shutdown_refuses_new_follows() {
    let resolver = Arc::new(ScriptedResolver::default());
    let cache = name_cache(&resolver);
    cache.follow("/ipns/A").unwrap();

    cache.shutdown();

    assert!(cache.list_follows().is_empty());
    assert!(matches!(cache.follow("/ipns/B"), Err(NameError::Closed)));
}

use std::sync::Arc;

use async_trait::async_trait;
use record::Path;

use crate::{
    config::DEFAULT_DEPTH_LIMIT,
    error::{NameError, NameResult},
    resolver::{resolve_recursive, NameResolver},
};

/// Resolver chain, typically gossip first and the durable store second.
///
/// Each hop asks the resolvers in order and moves to the next one only when
/// the current one reports `NotFound`.
pub struct NameSystem {
    resolvers: Vec<Arc<dyn NameResolver>>,
    depth_limit: usize,
}

impl NameSystem {
    pub fn new(resolvers: Vec<Arc<dyn NameResolver>>) -> Self {
        Self {
            resolvers,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }

    pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    pub async fn resolve(&self, name: &str) -> NameResult<Path> {
        self.resolve_n(name, self.depth_limit).await
    }

    pub async fn resolve_n(&self, name: &str, depth: usize) -> NameResult<Path> {
        resolve_recursive(self, name, depth).await
    }
}

#[async_trait]
impl NameResolver for NameSystem {
    async fn resolve_once(&self, name: &str) -> NameResult<Path> {
        let mut last = NameError::NotFound(name.to_string());
        for resolver in &self.resolvers {
            match resolver.resolve_once(name).await {
                Ok(path) => return Ok(path),
                Err(err) if err.is_not_found() => last = err,
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }
}

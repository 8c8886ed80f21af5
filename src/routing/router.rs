//! Route lookup.
//!
//! # Responsibilities
//! - Store registered handlers by path
//! - Look up the handler for a request path
//! - Return the handler or an explicit no-match
//!
//! # Design Decisions
//! - Exact path match only, no prefixes or patterns
//! - Immutable once the server starts (shared via Arc without locks)
//! - O(1) lookup via HashMap

use std::collections::HashMap;
use std::sync::Arc;

use crate::supervisor::Handler;

/// Exact-match mapping from request path to handler.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, replacing any previous registration.
    pub fn register(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        let path = path.into();
        if self.routes.insert(path.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(path = %path, "Route registered twice, keeping the latest handler");
        }
        self
    }

    /// Look up the handler registered for exactly `path`.
    pub fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{HandlerResult, RequestContext};

    async fn noop(_ctx: Arc<RequestContext>) -> HandlerResult {
        Ok(())
    }

    #[test]
    fn test_exact_match_only() {
        let routes = RouteTable::new().register("/foo", noop);

        assert!(routes.get("/foo").is_some());
        assert!(routes.get("/foo/").is_none());
        assert!(routes.get("/fo").is_none());
        assert!(routes.get("/foobar").is_none());
    }

    #[test]
    fn test_registration() {
        let routes = RouteTable::new()
            .register("/b", noop)
            .register("/a", noop)
            .register("/a", noop);

        assert_eq!(routes.len(), 2);
        assert!(!routes.is_empty());
        assert_eq!(routes.paths(), vec!["/a", "/b"]);
        assert!(RouteTable::new().is_empty());
    }
}

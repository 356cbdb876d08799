//! Request-scoped transaction context registry
//!
//! Binds one [`SharedTxContext`] to one in-flight request identity. The
//! registry instance is owned by the middleware state and shared across
//! concurrently in-flight requests; the per-identity binding itself is only
//! ever touched by the unit of work it belongs to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use unitwork_db::SharedTxContext;
use uuid::Uuid;

/// Errors raised by registry misuse
///
/// Both variants indicate a wiring bug rather than a client problem: the
/// registry should never be queried before bind or after unbind, and an
/// identity is bound exactly once.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No transaction context bound for request {0}")]
    NotBound(Uuid),

    #[error("A transaction context is already bound for request {0}")]
    AlreadyBound(Uuid),
}

/// Registry of transaction contexts for in-flight requests
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    inner: Arc<Mutex<HashMap<Uuid, SharedTxContext>>>,
}

impl ContextRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Uuid, SharedTxContext>> {
        // poisoning only records that another request panicked mid-access
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Associates a context with a request identity.
    ///
    /// # Errors
    ///
    /// `RegistryError::AlreadyBound` if the identity already has a binding;
    /// rebinding without unbinding is a programming error.
    pub fn bind(&self, request_id: Uuid, ctx: SharedTxContext) -> Result<(), RegistryError> {
        let mut table = self.table();
        if table.contains_key(&request_id) {
            return Err(RegistryError::AlreadyBound(request_id));
        }
        table.insert(request_id, ctx);
        Ok(())
    }

    /// Returns the context bound to a request identity.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotBound` if no binding exists.
    pub fn lookup(&self, request_id: Uuid) -> Result<SharedTxContext, RegistryError> {
        self.table()
            .get(&request_id)
            .cloned()
            .ok_or(RegistryError::NotBound(request_id))
    }

    /// Removes the binding for a request identity, returning it if present.
    ///
    /// Safe to call when nothing is bound; teardown paths call this
    /// unconditionally.
    pub fn unbind(&self, request_id: Uuid) -> Option<SharedTxContext> {
        self.table().remove(&request_id)
    }

    /// Number of currently bound contexts
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no contexts are currently bound
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use unitwork_db::TxContext;

    fn test_context() -> SharedTxContext {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@127.0.0.1:1/unitwork_test")
            .expect("lazy pool");
        TxContext::shared(pool)
    }

    #[tokio::test]
    async fn bind_then_lookup_returns_the_same_context() {
        let registry = ContextRegistry::new();
        let id = Uuid::new_v4();
        let ctx = test_context();

        registry.bind(id, ctx.clone()).expect("bind");
        let found = registry.lookup(id).expect("lookup");
        assert!(Arc::ptr_eq(&ctx, &found));
    }

    #[test]
    fn lookup_without_bind_fails() {
        let registry = ContextRegistry::new();
        let err = registry.lookup(Uuid::new_v4()).expect_err("lookup");
        assert!(matches!(err, RegistryError::NotBound(_)));
    }

    #[tokio::test]
    async fn rebinding_an_identity_fails() {
        let registry = ContextRegistry::new();
        let id = Uuid::new_v4();

        registry.bind(id, test_context()).expect("first bind");
        let err = registry.bind(id, test_context()).expect_err("second bind");
        assert!(matches!(err, RegistryError::AlreadyBound(bound) if bound == id));
    }

    #[tokio::test]
    async fn unbind_is_noop_safe() {
        let registry = ContextRegistry::new();
        let id = Uuid::new_v4();

        assert!(registry.unbind(id).is_none());

        registry.bind(id, test_context()).expect("bind");
        assert!(registry.unbind(id).is_some());
        assert!(registry.is_empty());

        // second unbind after teardown is fine
        assert!(registry.unbind(id).is_none());
    }

    #[tokio::test]
    async fn bindings_are_independent_per_identity() {
        let registry = ContextRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.bind(first, test_context()).expect("bind first");
        registry.bind(second, test_context()).expect("bind second");
        assert_eq!(registry.len(), 2);

        registry.unbind(first);
        assert!(registry.lookup(first).is_err());
        assert!(registry.lookup(second).is_ok());
    }
}

//! Fallback and graceful-degradation extension points.
//!
//! Alternatives are registered per error type and per result type. Having
//! none registered, or one that declines by returning `None`, is an ordinary
//! outcome: the recovery loop simply moves on.

use super::RecoveryContext;
use crate::core_types::{ErrorRecord, ErrorType};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Alternate execution path tried once retries are exhausted.
#[async_trait]
pub trait RecoveryAlternative<T>: Send + Sync {
    /// Try to produce a result for the failed operation.
    ///
    /// `None` means this alternative does not apply to `last_error`.
    async fn attempt(
        &self,
        last_error: &ErrorRecord,
        context: &RecoveryContext,
    ) -> Option<anyhow::Result<T>>;
}

/// Which avenue an alternative serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlternativeKind {
    /// Same result from another source
    Fallback,
    /// Reduced result instead of none
    Degradation,
}

/// Adapts an async closure into a [`RecoveryAlternative`].
pub struct FnAlternative<F>(F);

impl<F> FnAlternative<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<T, F, Fut> RecoveryAlternative<T> for FnAlternative<F>
where
    T: Send + 'static,
    F: Fn(ErrorRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Option<anyhow::Result<T>>> + Send,
{
    async fn attempt(
        &self,
        last_error: &ErrorRecord,
        _context: &RecoveryContext,
    ) -> Option<anyhow::Result<T>> {
        (self.0)(last_error.clone()).await
    }
}

type AlternativeKey = (ErrorType, AlternativeKind, TypeId);

/// Alternatives keyed by error type, kind and result type.
#[derive(Default)]
pub(crate) struct AlternativeRegistry {
    entries: RwLock<HashMap<AlternativeKey, Box<dyn Any + Send + Sync>>>,
}

impl AlternativeRegistry {
    pub(crate) fn register<T: 'static>(
        &self,
        error_type: ErrorType,
        kind: AlternativeKind,
        alternative: Arc<dyn RecoveryAlternative<T>>,
    ) {
        let key = (error_type, kind, TypeId::of::<T>());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Box::new(alternative));
    }

    pub(crate) fn get<T: 'static>(
        &self,
        error_type: ErrorType,
        kind: AlternativeKind,
    ) -> Option<Arc<dyn RecoveryAlternative<T>>> {
        let key = (error_type, kind, TypeId::of::<T>());
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<Arc<dyn RecoveryAlternative<T>>>())
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

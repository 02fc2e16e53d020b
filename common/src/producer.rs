//! The producer capability: a single-method trait for anything that can
//! compute a cacheable value on demand.
//!
//! Route handlers, statistics calculators, and warming jobs all hand the
//! cache one of these instead of a raw closure type, so trait objects,
//! structs, and async closures can be passed uniformly.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Computes a value on demand for the cache.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// concurrently: the cache never serializes producer invocations (no
/// single-flight deduplication for concurrent misses on the same key).
#[async_trait]
pub trait Producer: Send + Sync {
    /// Compute the value. An `Err` is treated by the cache as a miss: logged,
    /// counted, never propagated to the caller.
    async fn compute(&self) -> anyhow::Result<Value>;
}

struct FnProducer<F>(F);

#[async_trait]
impl<F, Fut> Producer for FnProducer<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn compute(&self) -> anyhow::Result<Value> {
        (self.0)().await
    }
}

/// Wrap an async closure into a [`Producer`] trait object.
///
/// ```
/// use common::producer_fn;
/// use serde_json::json;
///
/// let producer = producer_fn(|| async { Ok(json!({"games": 42})) });
/// ```
pub fn producer_fn<F, Fut>(f: F) -> Arc<dyn Producer>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnProducer(f))
}

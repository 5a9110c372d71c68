//! Subscriber transport establishment.

use async_trait::async_trait;

use crate::result::AppResult;

/// Brings up the listener that subscriber connections arrive on.
#[async_trait]
pub trait TransportConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Establish the transport on `endpoint`.
    ///
    /// Resolves once the transport accepts connections. Establishing an
    /// already established transport succeeds without side effects.
    async fn establish(&self, endpoint: &str) -> AppResult<()>;

    /// Tear the transport down. Idempotent.
    async fn close(&self);
}

//! Remote ticket authority.
//!
//! The authority is the system of record for redemption state. The engine
//! reaches it only through [`TicketAuthority`], so production transports and
//! test fakes are interchangeable.

pub mod memory;
pub mod wire;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthorityError;

pub use memory::*;
pub use wire::*;

/// Remote authority API.
///
/// Implementations report transport problems as `Err`; a rejected ticket
/// is a successful call with `success == false`.
#[async_trait]
pub trait TicketAuthority: Send + Sync {
    /// Validate and, on success, redeem a ticket.
    async fn validate_ticket(
        &self,
        request: &ValidateTicketRequest,
    ) -> Result<ValidateTicketResponse, AuthorityError>;

    /// Redeem a batch of offline check-ins, in order.
    ///
    /// Redeeming an already-redeemed ticket must succeed as a no-op.
    async fn sync_batch(
        &self,
        request: &SyncBatchRequest,
    ) -> Result<SyncBatchResponse, AuthorityError>;
}

/// Run an authority call under `limit`; elapsing is a transport failure.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AuthorityError>
where
    F: Future<Output = Result<T, AuthorityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AuthorityError::Timeout(limit)),
    }
}

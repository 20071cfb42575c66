//! Offline check-in store.
//!
//! Owns two persisted lists: the pending check-in queue (replay order is
//! insertion order) and the cached ticket records used to enforce one-time
//! use while offline. Every mutation is a read-modify-write performed inside
//! one critical section and persisted before the call returns.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::StorageError;
use crate::storage::keys::StorageKeys;
use crate::storage::kv::Store;
use crate::storage::models::{decode_list, encode_list, CachedTicketRecord, PendingCheckIn};

pub struct OfflineCheckInStore {
    kv: Arc<dyn Store>,
    keys: StorageKeys,
    lock: Mutex<()>,
}

impl OfflineCheckInStore {
    pub fn new(kv: Arc<dyn Store>, namespace: &str) -> Self {
        Self {
            kv,
            keys: StorageKeys::new(namespace),
            lock: Mutex::new(()),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    // ---- pending queue ----

    /// Append a check-in. Returns `false` (and writes nothing) if one is
    /// already queued for the same ticket.
    pub fn enqueue(&self, check_in: PendingCheckIn) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        self.enqueue_locked(check_in)
    }

    /// All pending check-ins, oldest first.
    pub fn list(&self) -> Result<Vec<PendingCheckIn>, StorageError> {
        let _guard = self.lock.lock();
        self.load_pending()
    }

    pub fn contains(&self, ticket_id: &str) -> Result<bool, StorageError> {
        Ok(self.list()?.iter().any(|c| c.ticket_id == ticket_id))
    }

    pub fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.list()?.len())
    }

    /// Remove the check-in for `ticket_id`. Returns whether one was removed.
    pub fn remove(&self, ticket_id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        let mut pending = self.load_pending()?;
        let Some(pos) = pending.iter().position(|c| c.ticket_id == ticket_id) else {
            return Ok(false);
        };
        pending.remove(pos);
        self.save_pending(&pending)?;
        log::debug!(
            "CHECK_IN_REMOVED ticket={} remaining={}",
            ticket_id,
            pending.len()
        );
        Ok(true)
    }

    pub fn clear_pending(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.kv.remove(&self.keys.pending_check_ins)?;
        log::info!("CHECK_IN_QUEUE_CLEARED");
        Ok(())
    }

    // ---- cached tickets ----

    pub fn get_cached_ticket(&self, id: &str) -> Result<Option<CachedTicketRecord>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load_cached()?.into_iter().find(|t| t.id == id))
    }

    pub fn cached_tickets(&self) -> Result<Vec<CachedTicketRecord>, StorageError> {
        let _guard = self.lock.lock();
        self.load_cached()
    }

    /// Mark a ticket used, creating its record if it was never cached.
    pub fn set_cached_ticket_used(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.set_used_locked(id)
    }

    pub fn clear_cached_tickets(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.kv.remove(&self.keys.cached_tickets)?;
        log::info!("TICKET_CACHE_CLEARED");
        Ok(())
    }

    /// Queue an offline approval and mark the ticket used, under one lock.
    ///
    /// Returns `false` if the ticket was already queued; nothing is written then.
    /// The queue is written first: a crash between the two writes must never
    /// leave a ticket marked used that was not queued for sync. If the used
    /// flag cannot be written the queue is restored, so an `Err` leaves no
    /// trace of the approval.
    pub fn record_offline_approval(&self, check_in: PendingCheckIn) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        let previous = self.load_pending()?;
        let ticket_id = check_in.ticket_id.clone();
        if !self.enqueue_locked(check_in)? {
            return Ok(false);
        }
        if let Err(e) = self.set_used_locked(&ticket_id) {
            log::error!(
                "OFFLINE_APPROVAL_ROLLBACK ticket={} error={}",
                ticket_id,
                e
            );
            self.save_pending(&previous)?;
            return Err(e);
        }
        Ok(true)
    }

    // ---- internals (caller holds the lock) ----

    fn enqueue_locked(&self, check_in: PendingCheckIn) -> Result<bool, StorageError> {
        let mut pending = self.load_pending()?;
        if pending.iter().any(|c| c.ticket_id == check_in.ticket_id) {
            log::debug!("CHECK_IN_DUPLICATE ticket={}", check_in.ticket_id);
            return Ok(false);
        }
        let ticket_id = check_in.ticket_id.clone();
        pending.push(check_in);
        self.save_pending(&pending)?;
        log::info!(
            "CHECK_IN_QUEUED ticket={} pending={}",
            ticket_id,
            pending.len()
        );
        Ok(true)
    }

    fn set_used_locked(&self, id: &str) -> Result<(), StorageError> {
        let mut cached = self.load_cached()?;
        match cached.iter_mut().find(|t| t.id == id) {
            Some(record) => {
                if !record.is_used {
                    record.is_used = true;
                    record.used_at = Some(Utc::now());
                }
            }
            None => cached.push(CachedTicketRecord::used(id)),
        }
        self.save_cached(&cached)?;
        log::debug!("TICKET_MARKED_USED ticket={}", id);
        Ok(())
    }

    fn load_pending(&self) -> Result<Vec<PendingCheckIn>, StorageError> {
        let key = &self.keys.pending_check_ins;
        match self.kv.get(key)? {
            Some(raw) => decode_list(key, &raw),
            None => Ok(Vec::new()),
        }
    }

    fn save_pending(&self, pending: &[PendingCheckIn]) -> Result<(), StorageError> {
        let key = &self.keys.pending_check_ins;
        self.kv.set(key, &encode_list(key, pending)?)
    }

    fn load_cached(&self) -> Result<Vec<CachedTicketRecord>, StorageError> {
        let key = &self.keys.cached_tickets;
        match self.kv.get(key)? {
            Some(raw) => decode_list(key, &raw),
            None => Ok(Vec::new()),
        }
    }

    fn save_cached(&self, cached: &[CachedTicketRecord]) -> Result<(), StorageError> {
        let key = &self.keys.cached_tickets;
        self.kv.set(key, &encode_list(key, cached)?)
    }
}

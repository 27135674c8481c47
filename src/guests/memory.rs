use super::{GuestRecord, GuestRepository};
use std::{
    collections::HashMap,
    future::{self, Future},
    pin::Pin,
    sync::RwLock,
};

/// In-process guest store, keyed by exact username.
#[derive(Debug, Default)]
pub struct MemoryGuests {
    records: RwLock<HashMap<String, GuestRecord>>,
}

impl MemoryGuests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record stored under `record.username`.
    pub fn insert(&self, record: GuestRecord) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(record.username.clone(), record);
    }

    pub fn remove(&self, username: &str) -> Option<GuestRecord> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.remove(username)
    }

    fn get(&self, username: &str) -> Option<GuestRecord> {
        let records = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.get(username).cloned()
    }
}

impl FromIterator<GuestRecord> for MemoryGuests {
    fn from_iter<I: IntoIterator<Item = GuestRecord>>(iter: I) -> Self {
        let guests = Self::new();
        for record in iter {
            guests.insert(record);
        }
        guests
    }
}

impl GuestRepository for MemoryGuests {
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<GuestRecord>>> + Send + 'a>> {
        Box::pin(future::ready(Ok(self.get(username))))
    }
}

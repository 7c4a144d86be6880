use std::collections::HashMap;
use std::sync::Mutex;

use crate::data::{DataKind, Payload, Record, ResourceDescriptor};

/// Most recent record per (resource, kind), kept so "current value" lookups
/// skip the disk.
#[derive(Debug, Default)]
pub struct LatestItemCache {
    items: Mutex<HashMap<(String, DataKind), Payload>>,
}

impl LatestItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `record` unless a strictly newer one is already held.
    pub fn update<T: Record>(&self, resource: &ResourceDescriptor, record: &T) {
        let Ok(mut items) = self.items.lock() else {
            return;
        };
        let key = (resource.key(), T::KIND);
        let newer = items
            .get(&key)
            .map_or(true, |held| held.timestamp() <= record.timestamp());
        if newer {
            items.insert(key, record.clone().into_payload());
        }
    }

    pub fn get<T: Record>(&self, resource: &ResourceDescriptor) -> Option<T> {
        let items = self.items.lock().ok()?;
        items
            .get(&(resource.key(), T::KIND))
            .and_then(T::from_payload)
            .cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut items) = self.items.lock() {
            items.clear();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};

use super::DataMeta;
use crate::{Error, Result};

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidTimeRange { start, end });
        }
        Ok(Self {
            start: start.to_offset(UtcOffset::UTC),
            end: end.to_offset(UtcOffset::UTC),
        })
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whether the UTC calendar day `day` overlaps the window.
    pub fn touches_day(&self, day: Date) -> bool {
        day >= self.start.date() && day <= self.end.date()
    }
}

/// Addresses the typed record store: a device, optionally scoped to a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub device_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            location_id: None,
        }
    }

    pub fn at_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    /// Descriptor for the device and location a record was produced by.
    pub fn of(meta: &DataMeta) -> Self {
        let location_id = if meta.location_id.is_empty() {
            None
        } else {
            Some(meta.location_id.clone())
        };
        Self {
            device_id: meta.device_id.clone(),
            location_id,
        }
    }

    pub fn key(&self) -> String {
        match &self.location_id {
            Some(location) => format!("{location}/{}", self.device_id),
            None => self.device_id.clone(),
        }
    }
}

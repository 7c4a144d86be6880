//! Event records captured by the historian.
//!
//! Payload contents are opaque to the cache and player: only the common
//! [`DataMeta`] header (names and timestamp) is ever inspected.

mod entry;
mod payload;
mod range;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use entry::{CacheEntry, Payload};
pub use payload::{
    ActuatorData, ConnectionStateData, DataMeta, MessageData, Record, RequestResponseRecord,
    SensorData, SystemPerformanceData,
};
pub use range::{ResourceDescriptor, TimeRange};

/// Payload variant tag, also used to name typed record files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKind {
    Actuator,
    ConnectionState,
    Message,
    Sensor,
    SystemPerformance,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Actuator => "ActuatorData",
            DataKind::ConnectionState => "ConnectionStateData",
            DataKind::Message => "MessageData",
            DataKind::Sensor => "SensorData",
            DataKind::SystemPerformance => "SystemPerformanceData",
        }
    }

    /// Connection-state and message events are bookkeeping, not telemetry.
    pub fn is_data_event(self) -> bool {
        !matches!(self, DataKind::ConnectionState | DataKind::Message)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

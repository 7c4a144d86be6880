use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use super::payload::{
    ActuatorData, ConnectionStateData, DataMeta, MessageData, SensorData, SystemPerformanceData,
};
use super::DataKind;
use crate::listener::DataEventListener;

/// Exactly one captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Actuator(ActuatorData),
    ConnectionState(ConnectionStateData),
    Message(MessageData),
    Sensor(SensorData),
    SystemPerformance(SystemPerformanceData),
}

impl Payload {
    pub fn kind(&self) -> DataKind {
        match self {
            Payload::Actuator(_) => DataKind::Actuator,
            Payload::ConnectionState(_) => DataKind::ConnectionState,
            Payload::Message(_) => DataKind::Message,
            Payload::Sensor(_) => DataKind::Sensor,
            Payload::SystemPerformance(_) => DataKind::SystemPerformance,
        }
    }

    pub fn meta(&self) -> &DataMeta {
        match self {
            Payload::Actuator(data) => &data.meta,
            Payload::ConnectionState(data) => &data.meta,
            Payload::Message(data) => &data.meta,
            Payload::Sensor(data) => &data.meta,
            Payload::SystemPerformance(data) => &data.meta,
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.meta().timestamp
    }

    /// Serialized JSON length of the record itself, without the variant tag.
    pub fn encoded_len(&self) -> usize {
        let encoded = match self {
            Payload::Actuator(data) => serde_json::to_vec(data),
            Payload::ConnectionState(data) => serde_json::to_vec(data),
            Payload::Message(data) => serde_json::to_vec(data),
            Payload::Sensor(data) => serde_json::to_vec(data),
            Payload::SystemPerformance(data) => serde_json::to_vec(data),
        };
        encoded.map(|bytes| bytes.len()).unwrap_or(0)
    }

    /// Invokes the listener callback matching this variant.
    pub fn dispatch(&self, listener: &dyn DataEventListener) {
        match self {
            Payload::Actuator(data) => listener.on_actuator_data(data),
            Payload::ConnectionState(data) => listener.on_connection_state_data(data),
            Payload::Message(data) => listener.on_message_data(data),
            Payload::Sensor(data) => listener.on_sensor_data(data),
            Payload::SystemPerformance(data) => listener.on_system_performance_data(data),
        }
    }
}

/// One cache slot: a UTC timestamp and the payload it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    payload: Payload,
}

impl CacheEntry {
    pub fn new(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            timestamp: payload.timestamp().to_offset(UtcOffset::UTC),
            payload,
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn kind(&self) -> DataKind {
        self.payload.kind()
    }

    /// Replaces the payload; the entry timestamp follows the new payload.
    pub fn set_payload(&mut self, payload: impl Into<Payload>) {
        *self = CacheEntry::new(payload);
    }

    pub fn approx_byte_count(&self) -> usize {
        let stamp = self
            .timestamp
            .format(&Rfc3339)
            .map(|text| text.len())
            .unwrap_or(0);
        self.payload.encoded_len() + stamp
    }

    pub fn elapsed_epoch_millis(&self) -> i64 {
        (self.timestamp.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn delta_millis(&self, other: &CacheEntry) -> u64 {
        self.elapsed_epoch_millis()
            .abs_diff(other.elapsed_epoch_millis())
    }

    pub fn dispatch(&self, listener: &dyn DataEventListener) {
        self.payload.dispatch(listener);
    }
}

impl From<Payload> for CacheEntry {
    fn from(value: Payload) -> Self {
        CacheEntry::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use std::sync::Mutex;
    use time::macros::datetime;

    #[derive(Default)]
    struct Captured {
        kinds: Mutex<Vec<DataKind>>,
    }

    impl DataEventListener for Captured {
        fn on_message_data(&self, _data: &MessageData) {
            self.kinds.lock().expect("lock").push(DataKind::Message);
        }

        fn on_sensor_data(&self, _data: &SensorData) {
            self.kinds.lock().expect("lock").push(DataKind::Sensor);
        }
    }

    #[test]
    fn entry_takes_payload_timestamp_in_utc() {
        let sensor = SensorData::new("t", 3.0).at(datetime!(2026-01-01 08:00 -05:00));
        let entry = CacheEntry::new(sensor);
        assert_eq!(entry.timestamp(), datetime!(2026-01-01 13:00 UTC));
        assert_eq!(entry.kind(), DataKind::Sensor);
    }

    #[test]
    fn set_payload_moves_timestamp() {
        let mut entry = CacheEntry::new(SensorData::new("t", 1.0).at(datetime!(2026-01-01 00:00 UTC)));
        entry.set_payload(MessageData::new("m", "hi").at(datetime!(2026-01-02 00:00 UTC)));
        assert_eq!(entry.timestamp(), datetime!(2026-01-02 00:00 UTC));
        assert_eq!(entry.kind(), DataKind::Message);
    }

    #[test]
    fn delta_is_absolute_millis() {
        let a = CacheEntry::new(SensorData::new("t", 1.0).at(datetime!(2026-01-01 00:00:00 UTC)));
        let b = CacheEntry::new(SensorData::new("t", 1.0).at(datetime!(2026-01-01 00:00:05.250 UTC)));
        assert_eq!(a.delta_millis(&b), 5_250);
        assert_eq!(b.delta_millis(&a), 5_250);
        assert_eq!(a.elapsed_epoch_millis(), 1_767_225_600_000);
    }

    #[test]
    fn byte_count_covers_payload_and_timestamp() {
        let sensor = SensorData::new("t", 1.0).at(datetime!(2026-01-01 00:00 UTC));
        let payload_len = serde_json::to_vec(&sensor).expect("serialize").len();
        let entry = CacheEntry::new(sensor);
        assert_eq!(entry.approx_byte_count(), payload_len + "2026-01-01T00:00:00Z".len());
    }

    #[test]
    fn dispatch_routes_by_variant() {
        let listener = Captured::default();
        CacheEntry::new(SensorData::new("t", 1.0)).dispatch(&listener);
        CacheEntry::new(MessageData::new("m", "x")).dispatch(&listener);
        CacheEntry::new(ActuatorData::new("a", 1, 0.0)).dispatch(&listener);
        let kinds = listener.kinds.lock().expect("lock").clone();
        assert_eq!(kinds, vec![DataKind::Sensor, DataKind::Message]);
    }
}

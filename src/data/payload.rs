use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use super::{DataKind, Payload};

/// Header shared by every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMeta {
    pub name: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub type_category_id: i32,
    #[serde(default)]
    pub type_id: i32,
    #[serde(default)]
    pub status_code: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl DataMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_id: String::new(),
            location_id: String::new(),
            type_category_id: 0,
            type_id: 0,
            status_code: 0,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Common access to the typed records.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: DataKind;

    fn meta(&self) -> &DataMeta;

    fn meta_mut(&mut self) -> &mut DataMeta;

    fn into_payload(self) -> Payload;

    fn from_payload(payload: &Payload) -> Option<&Self>;

    fn timestamp(&self) -> OffsetDateTime {
        self.meta().timestamp
    }

    fn at(mut self, timestamp: OffsetDateTime) -> Self {
        self.meta_mut().timestamp = timestamp.to_offset(UtcOffset::UTC);
        self
    }

    fn on_device(mut self, device_id: impl Into<String>) -> Self {
        self.meta_mut().device_id = device_id.into();
        self
    }

    fn at_location(mut self, location_id: impl Into<String>) -> Self {
        self.meta_mut().location_id = location_id.into();
        self
    }
}

macro_rules! impl_record {
    ($ty:ident, $kind:ident) => {
        impl Record for $ty {
            const KIND: DataKind = DataKind::$kind;

            fn meta(&self) -> &DataMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut DataMeta {
                &mut self.meta
            }

            fn into_payload(self) -> Payload {
                Payload::$kind(self)
            }

            fn from_payload(payload: &Payload) -> Option<&Self> {
                match payload {
                    Payload::$kind(record) => Some(record),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Payload {
            fn from(value: $ty) -> Self {
                Payload::$kind(value)
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorData {
    #[serde(flatten)]
    pub meta: DataMeta,
    pub command: i32,
    #[serde(default)]
    pub command_name: String,
    pub value: f32,
    #[serde(default)]
    pub state_data: Option<String>,
    #[serde(default)]
    pub is_response: bool,
}

impl ActuatorData {
    pub fn new(name: impl Into<String>, command: i32, value: f32) -> Self {
        Self {
            meta: DataMeta::new(name),
            command,
            command_name: String::new(),
            value,
            state_data: None,
            is_response: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStateData {
    #[serde(flatten)]
    pub meta: DataMeta,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub host_port: u16,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_client_connecting: bool,
    #[serde(default)]
    pub is_client_connected: bool,
    #[serde(default)]
    pub is_client_disconnected: bool,
    #[serde(default)]
    pub msg_in_count: u64,
    #[serde(default)]
    pub msg_out_count: u64,
}

impl ConnectionStateData {
    pub fn new(name: impl Into<String>, host_name: impl Into<String>, host_port: u16) -> Self {
        Self {
            meta: DataMeta::new(name),
            host_name: host_name.into(),
            host_port,
            client_id: String::new(),
            message: String::new(),
            is_client_connecting: false,
            is_client_connected: false,
            is_client_disconnected: false,
            msg_in_count: 0,
            msg_out_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(flatten)]
    pub meta: DataMeta,
    pub message: String,
}

impl MessageData {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            meta: DataMeta::new(name),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    #[serde(flatten)]
    pub meta: DataMeta,
    pub value: f32,
}

impl SensorData {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            meta: DataMeta::new(name),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPerformanceData {
    #[serde(flatten)]
    pub meta: DataMeta,
    pub cpu_util: f32,
    pub mem_util: f32,
    #[serde(default)]
    pub disk_util: f32,
}

impl SystemPerformanceData {
    pub fn new(name: impl Into<String>, cpu_util: f32, mem_util: f32, disk_util: f32) -> Self {
        Self {
            meta: DataMeta::new(name),
            cpu_util,
            mem_util,
            disk_util,
        }
    }
}

impl_record!(ActuatorData, Actuator);
impl_record!(ConnectionStateData, ConnectionState);
impl_record!(MessageData, Message);
impl_record!(SensorData, Sensor);
impl_record!(SystemPerformanceData, SystemPerformance);

/// A model request and its response, stored by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponseRecord {
    pub session_id: String,
    #[serde(default)]
    pub target_uri: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub request_msg: String,
    #[serde(default)]
    pub response_msg: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl RequestResponseRecord {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            target_uri: String::new(),
            model_name: String::new(),
            request_msg: String::new(),
            response_msg: String::new(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

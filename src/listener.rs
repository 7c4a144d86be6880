//! Callback interfaces consumed by connectors and players.

use serde::{Deserialize, Serialize};

use crate::data::{
    ActuatorData, ConnectionStateData, MessageData, SensorData, SystemPerformanceData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of a connector's link to its backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub target: String,
    pub status: LinkStatus,
    pub msg_in_count: u64,
    pub msg_out_count: u64,
    pub message: String,
}

impl ConnectionState {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: LinkStatus::Disconnected,
            msg_in_count: 0,
            msg_out_count: 0,
            message: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == LinkStatus::Connected
    }
}

pub trait StatusListener: Send + Sync {
    fn on_log(&self, _level: log::Level, _message: &str) {}

    fn on_status_update(&self, _state: &ConnectionState) {}
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusListener;

impl StatusListener for LogStatusListener {
    fn on_log(&self, level: log::Level, message: &str) {
        log::log!(level, "{message}");
    }

    fn on_status_update(&self, state: &ConnectionState) {
        log::info!(
            "connection {} status={:?} in={} out={} {}",
            state.target,
            state.status,
            state.msg_in_count,
            state.msg_out_count,
            state.message
        );
    }
}

/// Receives typed events, both live and during playback.
pub trait DataEventListener: Send + Sync {
    fn on_actuator_data(&self, _data: &ActuatorData) {}

    fn on_connection_state_data(&self, _data: &ConnectionStateData) {}

    fn on_message_data(&self, _data: &MessageData) {}

    fn on_sensor_data(&self, _data: &SensorData) {}

    fn on_system_performance_data(&self, _data: &SystemPerformanceData) {}
}

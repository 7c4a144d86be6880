use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Uninitialized,
    Play,
    Pause,
    Stop,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Uninitialized => "uninitialized",
            PlaybackState::Play => "play",
            PlaybackState::Pause => "pause",
            PlaybackState::Stop => "stop",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackDirection {
    #[default]
    Uninitialized,
    Forward,
    Reverse,
}

impl PlaybackDirection {
    /// Cursor increment; an unset direction plays forward.
    pub fn step(self) -> isize {
        match self {
            PlaybackDirection::Reverse => -1,
            PlaybackDirection::Forward | PlaybackDirection::Uninitialized => 1,
        }
    }
}

impl fmt::Display for PlaybackDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackDirection::Uninitialized => "uninitialized",
            PlaybackDirection::Forward => "forward",
            PlaybackDirection::Reverse => "reverse",
        };
        f.write_str(label)
    }
}

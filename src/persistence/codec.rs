use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::layout::{BINARY_EXT, JSON_EXT};
use crate::Result;

const ZSTD_LEVEL: i32 = 3;

/// On-disk encoding for cache files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SerializerKind {
    #[default]
    Json,
    /// zstd-framed JSON.
    Binary,
}

impl SerializerKind {
    pub fn extension(self) -> &'static str {
        match self {
            SerializerKind::Json => JSON_EXT,
            SerializerKind::Binary => BINARY_EXT,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerKind::Json => Ok(serde_json::to_vec_pretty(value)?),
            SerializerKind::Binary => {
                let json = serde_json::to_vec(value)?;
                Ok(zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            SerializerKind::Json => Ok(serde_json::from_slice(bytes)?),
            SerializerKind::Binary => {
                let json = zstd::decode_all(bytes)?;
                Ok(serde_json::from_slice(&json)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_compressed_json() {
        let values: Vec<u32> = (0..512).collect();
        let bytes = SerializerKind::Binary.encode(&values).expect("encode");
        let raw = zstd::decode_all(bytes.as_slice()).expect("zstd");
        let parsed: Vec<u32> = serde_json::from_slice(&raw).expect("json");
        assert_eq!(parsed, values);
        let decoded: Vec<u32> = SerializerKind::Binary.decode(&bytes).expect("decode");
        assert_eq!(decoded, values);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(SerializerKind::Json.decode::<Vec<u32>>(b"{not json").is_err());
        assert!(SerializerKind::Binary.decode::<Vec<u32>>(b"plain").is_err());
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, MirrorResult};

/// Turns a key into the exact bytes the stream runtime's key serializer
/// produced, so partition computation agrees with the writer.
pub trait KeySerializer<K: ?Sized>: Send + Sync {
    fn serialize(&self, key: &K) -> MirrorResult<Vec<u8>>;
}

/// UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringKeySerializer;

impl KeySerializer<str> for StringKeySerializer {
    fn serialize(&self, key: &str) -> MirrorResult<Vec<u8>> {
        Ok(key.as_bytes().to_vec())
    }
}

impl KeySerializer<String> for StringKeySerializer {
    fn serialize(&self, key: &String) -> MirrorResult<Vec<u8>> {
        Ok(key.as_bytes().to_vec())
    }
}

/// 4-byte big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntKeySerializer;

impl KeySerializer<i32> for IntKeySerializer {
    fn serialize(&self, key: &i32) -> MirrorResult<Vec<u8>> {
        Ok(key.to_be_bytes().to_vec())
    }
}

/// 8-byte big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongKeySerializer;

impl KeySerializer<i64> for LongKeySerializer {
    fn serialize(&self, key: &i64) -> MirrorResult<Vec<u8>> {
        Ok(key.to_be_bytes().to_vec())
    }
}

/// Key type of a mirrored topic, chosen at deployment time.
///
/// Replicas only ever see keys as path text, so this also serializes textual
/// keys after parsing them into the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    String,
    Int,
    Long,
}

impl KeySerializer<str> for KeyType {
    fn serialize(&self, key: &str) -> MirrorResult<Vec<u8>> {
        match self {
            KeyType::String => StringKeySerializer.serialize(key),
            KeyType::Int => {
                let value = key.trim().parse::<i32>().map_err(|e| {
                    MirrorError::invalid_argument(format!("key '{key}' is not an int: {e}"))
                })?;
                IntKeySerializer.serialize(&value)
            }
            KeyType::Long => {
                let value = key.trim().parse::<i64>().map_err(|e| {
                    MirrorError::invalid_argument(format!("key '{key}' is not a long: {e}"))
                })?;
                LongKeySerializer.serialize(&value)
            }
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::String => "string",
            KeyType::Int => "int",
            KeyType::Long => "long",
        };
        f.write_str(name)
    }
}

impl FromStr for KeyType {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(KeyType::String),
            "int" | "integer" => Ok(KeyType::Int),
            "long" => Ok(KeyType::Long),
            other => Err(MirrorError::configuration(format!(
                "unsupported key type '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        IntKeySerializer, KeySerializer, KeyType, LongKeySerializer, MirrorError,
        StringKeySerializer,
    };

    #[test]
    fn typed_serializers() {
        assert_eq!(StringKeySerializer.serialize("ab").unwrap(), b"ab".to_vec());
        assert_eq!(IntKeySerializer.serialize(&1).unwrap(), vec![0, 0, 0, 1]);
        assert_eq!(
            LongKeySerializer.serialize(&-1).unwrap(),
            vec![0xff; 8]
        );
    }

    #[test]
    fn text_keys_follow_declared_type() {
        assert_eq!(KeyType::String.serialize("42").unwrap(), b"42".to_vec());
        assert_eq!(KeyType::Int.serialize("42").unwrap(), vec![0, 0, 0, 42]);
        assert_eq!(
            KeyType::Long.serialize("256").unwrap(),
            vec![0, 0, 0, 0, 0, 0, 1, 0]
        );
    }

    #[test]
    fn rejects_text_of_wrong_type() {
        assert!(matches!(
            KeyType::Int.serialize("abc"),
            Err(MirrorError::InvalidArgument { .. })
        ));
        assert!(KeyType::Int.serialize("9999999999").is_err());
        assert!(KeyType::Long.serialize("9999999999").is_ok());
    }

    #[test]
    fn parses_names() {
        assert_eq!("Integer".parse::<KeyType>().unwrap(), KeyType::Int);
        assert_eq!("long".parse::<KeyType>().unwrap(), KeyType::Long);
        assert!("double".parse::<KeyType>().is_err());
        let parsed: KeyType = serde_json::from_str("\"long\"").unwrap();
        assert_eq!(parsed, KeyType::Long);
    }
}

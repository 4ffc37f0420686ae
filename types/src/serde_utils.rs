use serde::{Deserialize, Deserializer, Serializer, de::Error as SerdeError};

/// The registry encodes 64-bit integers as JSON strings and narrower ones as
/// numbers. Both shapes are accepted on input; output is always a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuotedOrNumber {
    Quoted(String),
    Number(u64),
}

impl QuotedOrNumber {
    fn into_u64<E: SerdeError>(self) -> Result<u64, E> {
        match self {
            QuotedOrNumber::Number(value) => Ok(value),
            QuotedOrNumber::Quoted(value) => value
                .parse::<u64>()
                .map_err(|err| E::custom(format!("invalid u64 {value:?}: {err}"))),
        }
    }
}

pub mod quoted_u64 {
    use super::{Deserialize, Deserializer, QuotedOrNumber, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        QuotedOrNumber::deserialize(deserializer)?.into_u64()
    }
}

pub mod quoted_u32 {
    use super::{Deserialize, Deserializer, QuotedOrNumber, SerdeError, Serializer};

    pub fn serialize<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = QuotedOrNumber::deserialize(deserializer)?.into_u64::<D::Error>()?;
        u32::try_from(value).map_err(|_| SerdeError::custom(format!("u32 out of range: {value}")))
    }
}

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("block has no header height")]
    MissingHeight,
    #[error("block header height {0:?} is not an unsigned integer")]
    InvalidHeight(String),
    #[error("blocks at heights {first} and {second} are not consecutive")]
    NotConsecutive { first: u64, second: u64 },
}

/// A block as archived by a block pool.
///
/// The payload stays opaque to the sync pipeline and is handed to the engine
/// verbatim. Only the header height is lifted out, because ordering and the
/// height window depend on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub height: u64,
    pub raw: Value,
}

impl Block {
    /// Wrap an archived block value, reading `header.height`.
    ///
    /// Some runtimes nest the block under a `block` field; both shapes are
    /// accepted. Heights may be JSON strings or numbers.
    pub fn from_value(raw: Value) -> Result<Self, BlockError> {
        let height = {
            let header = raw
                .get("header")
                .or_else(|| raw.get("block").and_then(|block| block.get("header")))
                .ok_or(BlockError::MissingHeight)?;

            match header.get("height").ok_or(BlockError::MissingHeight)? {
                Value::String(height) => height
                    .parse::<u64>()
                    .map_err(|_| BlockError::InvalidHeight(height.clone()))?,
                Value::Number(height) => height
                    .as_u64()
                    .ok_or_else(|| BlockError::InvalidHeight(height.to_string()))?,
                other => return Err(BlockError::InvalidHeight(other.to_string())),
            }
        };

        Ok(Self { height, raw })
    }

    /// Serialized JSON bytes of the archived block.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.to_string().into_bytes()
    }
}

/// Two consecutive blocks: the engine needs the predecessor to produce the
/// commit information of the block it applies.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPair {
    pub first: Block,
    pub second: Block,
}

impl BlockPair {
    pub fn new(first: Block, second: Block) -> Result<Self, BlockError> {
        if first.height.checked_add(1) != Some(second.height) {
            return Err(BlockError::NotConsecutive {
                first: first.height,
                second: second.height,
            });
        }

        Ok(Self { first, second })
    }

    /// Height of the block this pair applies.
    pub fn height(&self) -> u64 {
        self.second.height
    }
}

use serde::{Deserialize, Serialize};

/// One content-addressed chunk of a file.
///
/// `weak_hash` is a rolling checksum used cheaply to find shift candidates
/// during local block reuse (§9 "block reuse via weak hash"); `strong_hash`
/// is the value that actually gets verified after a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub offset: u64,
    pub size: u32,
    pub weak_hash: u32,
    pub strong_hash: [u8; 32],
}

impl BlockInfo {
    pub fn new(offset: u64, size: u32, weak_hash: u32, strong_hash: [u8; 32]) -> Self {
        Self {
            offset,
            size,
            weak_hash,
            strong_hash,
        }
    }

    pub fn strong_hash_hex(&self) -> String {
        hex::encode(self.strong_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_hash_hex_roundtrips_through_serde() {
        let block = BlockInfo::new(0, 131072, 42, [9u8; 32]);
        let json = serde_json::to_string(&block).unwrap();
        let back: BlockInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
        assert_eq!(back.strong_hash_hex().len(), 64);
    }
}

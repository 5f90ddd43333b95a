//! Serializable control-file contents.

use serde::{Deserialize, Serialize};

pub const CONTROL_FILE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFileState {
    #[serde(default = "default_version")]
    pub version: u8,
    pub uris: Vec<String>,
    pub total_length: u64,
    pub piece_length: u64,
    /// Piece completion bitfield, hex-encoded on disk.
    #[serde(with = "hex_bytes")]
    pub bitfield: Vec<u8>,
    /// Basenames of the destination files, in descriptor order.
    pub files: Vec<String>,
    #[serde(default)]
    pub upload_length: u64,
}

fn default_version() -> u8 {
    CONTROL_FILE_VERSION
}

impl ControlFileState {
    /// Number of pieces marked complete in the stored bitfield.
    pub fn completed_pieces(&self) -> usize {
        self.bitfield.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn piece_count(&self) -> usize {
        if self.piece_length == 0 {
            return 0;
        }
        self.total_length.div_ceil(self.piece_length) as usize
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

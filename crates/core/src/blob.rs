//! On-disk object encoding: a fixed header followed by zstd-compressed bytes

use anyhow::Result;

/// Object header format (version 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeaderV1 {
    /// Magic bytes: "FOB1"
    pub magic: [u8; 4],
    /// Flags: bit0=compressed, bit1-7=reserved
    pub flags: u8,
    /// Original size (before compression)
    pub orig_len: u64,
    /// Stored size (after compression, if compressed)
    pub stored_len: u64,
}

impl ObjectHeaderV1 {
    const MAGIC: [u8; 4] = *b"FOB1";
    const FLAG_COMPRESSED: u8 = 0b0000_0001;

    /// Serialized header size: magic (4) + flags (1) + orig_len (8) + stored_len (8)
    pub const LEN: usize = 21;

    pub fn new(orig_len: u64, stored_len: u64, compressed: bool) -> Self {
        let flags = if compressed { Self::FLAG_COMPRESSED } else { 0 };
        Self {
            magic: Self::MAGIC,
            flags,
            orig_len,
            stored_len,
        }
    }

    pub fn is_compressed(&self) -> bool {
        (self.flags & Self::FLAG_COMPRESSED) != 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN);
        bytes.extend_from_slice(&self.magic);
        bytes.push(self.flags);
        bytes.extend_from_slice(&self.orig_len.to_le_bytes());
        bytes.extend_from_slice(&self.stored_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::LEN {
            anyhow::bail!(
                "Invalid header length: expected at least {} bytes, got {}",
                Self::LEN,
                bytes.len()
            );
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != Self::MAGIC {
            anyhow::bail!("Invalid magic bytes: expected {:?}, got {:?}", Self::MAGIC, magic);
        }

        let flags = bytes[4];
        let mut orig = [0u8; 8];
        orig.copy_from_slice(&bytes[5..13]);
        let mut stored = [0u8; 8];
        stored.copy_from_slice(&bytes[13..21]);

        Ok(Self {
            magic,
            flags,
            orig_len: u64::from_le_bytes(orig),
            stored_len: u64::from_le_bytes(stored),
        })
    }
}

/// Encode raw bytes into the stored representation.
///
/// Payloads are compressed unless zstd fails or would grow them, in which case
/// the raw bytes are stored with the compressed flag cleared.
pub fn encode(data: &[u8], level: i32) -> Vec<u8> {
    let orig_len = data.len() as u64;

    let compressed = match zstd::encode_all(data, level) {
        Ok(compressed) if compressed.len() < data.len() => Some(compressed),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("zstd compression failed, storing raw: {}", e);
            None
        }
    };

    let (header, body) = match compressed {
        Some(body) => (ObjectHeaderV1::new(orig_len, body.len() as u64, true), body),
        None => (ObjectHeaderV1::new(orig_len, orig_len, false), data.to_vec()),
    };

    let mut serialized = header.to_bytes();
    serialized.extend_from_slice(&body);
    serialized
}

/// Decode a stored object (header + body) back into raw bytes
pub fn decode(serialized: &[u8]) -> Result<Vec<u8>> {
    let header = ObjectHeaderV1::from_bytes(serialized)?;

    let data_start = ObjectHeaderV1::LEN;
    let data_end = usize::try_from(header.stored_len)
        .ok()
        .and_then(|len| data_start.checked_add(len))
        .ok_or_else(|| anyhow::anyhow!("Invalid stored length {}", header.stored_len))?;

    if serialized.len() < data_end {
        anyhow::bail!(
            "Invalid object data length: expected at least {} bytes, got {}",
            data_end,
            serialized.len()
        );
    }

    let stored_data = &serialized[data_start..data_end];

    if header.is_compressed() {
        let decompressed = zstd::decode_all(stored_data)?;
        if decompressed.len() != header.orig_len as usize {
            anyhow::bail!(
                "Decompressed size mismatch: expected {} bytes, got {}",
                header.orig_len,
                decompressed.len()
            );
        }
        Ok(decompressed)
    } else {
        if header.orig_len != header.stored_len {
            anyhow::bail!(
                "Raw object length mismatch: header says {} bytes, stored {}",
                header.orig_len,
                header.stored_len
            );
        }
        Ok(stored_data.to_vec())
    }
}

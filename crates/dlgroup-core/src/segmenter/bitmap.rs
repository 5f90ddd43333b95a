//! Completion bitfield: one bit per piece, LSB of byte 0 = piece 0.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    len: usize,
}

impl Bitfield {
    pub fn new(len: usize) -> Self {
        Bitfield {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Rebuild from persisted bytes. Extra bytes and bits past `len` are
    /// ignored; missing bytes count as incomplete.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut out = Bitfield::new(len);
        let copy = bytes.len().min(out.bytes.len());
        out.bytes[..copy].copy_from_slice(&bytes[..copy]);
        if len % 8 != 0 {
            if let Some(last) = out.bytes.last_mut() {
                *last &= (1u8 << (len % 8)) - 1;
            }
        }
        out
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.bytes[index / 8] |= 1 << (index % 8);
        }
    }

    pub fn unset(&mut self, index: usize) {
        if index < self.len {
            self.bytes[index / 8] &= !(1 << (index % 8));
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn count_set(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn all_set(&self) -> bool {
        self.count_set() == self.len
    }

    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

//! Header part 8: trailing data with no known structure.

/// Bytes between the end of part 7 and the end of the header, carried through unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part8 {
    data: Vec<u8>,
}

impl Part8 {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

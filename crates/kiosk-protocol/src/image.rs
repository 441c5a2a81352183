//! Sparse snapshots of card memory.
//!
//! A poll cycle reads only the regions a layout asks for. [`CardImage`]
//! collects those reads, addressed by absolute card offset, so a layout
//! can decode without knowing which transport produced the bytes.

/// A contiguous byte range on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub offset: u16,
    pub len: usize,
}

impl Region {
    pub const fn new(offset: u16, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte of the region.
    #[must_use]
    pub fn end(&self) -> usize {
        usize::from(self.offset) + self.len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    offset: usize,
    bytes: Vec<u8>,
}

impl Segment {
    fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

/// Bytes read from a card, keyed by absolute offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardImage {
    segments: Vec<Segment>,
}

impl CardImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bytes` as read at `offset`. Later inserts shadow earlier ones.
    pub fn insert(&mut self, offset: u16, bytes: Vec<u8>) {
        self.segments.push(Segment {
            offset: usize::from(offset),
            bytes,
        });
    }

    /// Builder form of [`CardImage::insert`].
    #[must_use]
    pub fn with(mut self, offset: u16, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(offset, bytes.into());
        self
    }

    /// Returns the bytes of `region` if a single read covered all of it.
    pub fn get(&self, region: Region) -> Option<&[u8]> {
        let start = usize::from(region.offset);
        let end = region.end();
        self.segments
            .iter()
            .rev()
            .find(|s| s.offset <= start && s.end() >= end)
            .map(|s| &s.bytes[start - s.offset..end - s.offset])
    }

    /// Returns `true` if `region` can be served by [`CardImage::get`].
    pub fn covers(&self, region: Region) -> bool {
        self.get(region).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

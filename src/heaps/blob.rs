//! #Blob heap - length-prefixed binary data.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// The #Blob heap containing length-prefixed binary blobs.
#[derive(Debug, Clone, Default)]
pub struct BlobHeap {
    /// Raw heap data.
    data: Vec<u8>,
    /// Raw bytes to offset mapping for O(1) interning during writes.
    index_map: HashMap<Vec<u8>, u32>,
}

impl BlobHeap {
    /// Create a new empty blob heap.
    #[must_use]
    pub fn new() -> Self {
        // Heap always starts with a null byte (empty blob at index 0)
        let mut index_map = HashMap::new();
        index_map.insert(Vec::new(), 0);
        Self {
            data: vec![0],
            index_map,
        }
    }

    /// Parse the blob heap from raw bytes.
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            index_map: HashMap::new(), // Populated lazily, matching `get`'s lookups.
        }
    }

    /// Get a blob at the given offset.
    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        let mut reader = Reader::new(&self.data[offset..]);
        let len = reader.read_compressed_uint()? as usize;

        let header_size = reader.position();
        let blob_start = offset + header_size;
        let blob_end = blob_start + len;

        if blob_end > self.data.len() {
            return Err(Error::InvalidBlob(offset));
        }

        Ok(&self.data[blob_start..blob_end])
    }

    /// Add a blob to the heap and return its offset, interning by content:
    /// a previously-added blob with identical bytes returns the same offset.
    pub fn add(&mut self, blob: &[u8]) -> u32 {
        if let Some(&offset) = self.index_map.get(blob) {
            return offset;
        }
        let offset = self.append_raw(blob);
        self.index_map.insert(blob.to_vec(), offset);
        offset
    }

    /// Append a blob without deduplication, always creating a new entry.
    /// Distinct from [`BlobHeap::add`]: the returned offset is never shared
    /// with a prior identical blob, even if one exists.
    pub fn append_raw(&mut self, blob: &[u8]) -> u32 {
        let offset = self.data.len() as u32;

        // Write compressed length
        let mut writer = Writer::new();
        writer.write_compressed_uint(blob.len() as u32);
        self.data.extend_from_slice(writer.as_slice());

        // Write blob data
        self.data.extend_from_slice(blob);

        offset
    }

    /// Get the raw heap data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the size of the heap.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if the heap uses 4-byte indices (size > 65535).
    #[must_use]
    pub fn uses_wide_indices(&self) -> bool {
        self.data.len() > 0xFFFF
    }

    /// Write the heap to a writer.
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_bytes(&self.data);
    }

    /// Write the heap to bytes.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Iterate over all blobs in the heap with their offsets.
    pub fn iter(&self) -> BlobIter<'_> {
        BlobIter {
            heap: self,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_heap_has_empty_blob() {
        let heap = BlobHeap::new();
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn add_and_get() {
        let mut heap = BlobHeap::new();
        let offset = heap.add(&[1, 2, 3]);
        assert_eq!(heap.get(offset).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn add_deduplicates_by_content() {
        let mut heap = BlobHeap::new();
        let a = heap.add(&[9, 9, 9]);
        let b = heap.add(&[9, 9, 9]);
        assert_eq!(a, b);
    }

    #[test]
    fn append_raw_never_dedupes() {
        let mut heap = BlobHeap::new();
        let a = heap.append_raw(&[5, 5]);
        let b = heap.append_raw(&[5, 5]);
        assert_ne!(a, b);
        assert_eq!(heap.get(a).unwrap(), heap.get(b).unwrap());
    }

    #[test]
    fn append_raw_distinct_from_add_for_same_bytes() {
        let mut heap = BlobHeap::new();
        let interned = heap.add(&[1, 2]);
        let raw = heap.append_raw(&[1, 2]);
        assert_ne!(interned, raw);
    }
}

/// Iterator over blobs in the heap.
pub struct BlobIter<'a> {
    heap: &'a BlobHeap,
    offset: usize,
}

impl<'a> Iterator for BlobIter<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.heap.data.len() {
            return None;
        }

        let start = self.offset;
        let mut reader = Reader::new(&self.heap.data[self.offset..]);
        let len = reader.read_compressed_uint().ok()? as usize;
        let header_size = reader.position();

        self.offset += header_size + len;

        if self.offset > self.heap.data.len() {
            return None;
        }

        Some((
            start as u32,
            &self.heap.data[start + header_size..start + header_size + len],
        ))
    }
}


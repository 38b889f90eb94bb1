//! Chunking: derive the packet size and split the firmware image into ordered packets.

/// Packet size for a transport unit of `max_payload` bytes, after `overhead` bytes of link-layer header.
///
/// Fails when nothing would be left for payload, or when the result cannot be announced in two bytes.
pub fn chunk_size(max_payload: usize, overhead: usize) -> Result<usize, ChunkError> {
    let size = max_payload.saturating_sub(overhead);
    if size == 0 {
        return Err(ChunkError::NoPayload {
            max_payload,
            overhead,
        });
    }
    if size > u16::MAX as usize {
        return Err(ChunkError::TooLarge(size));
    }
    Ok(size)
}

/// Number of packets needed for `len` bytes: ceil(len / chunk_size).
pub fn packet_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Split `firmware` into packets of `chunk_size` bytes; the last one is shorter, never padded.
///
/// A zero chunk size yields no packets; callers validate it through [`chunk_size`] first.
pub fn split_into_packets(firmware: &[u8], chunk_size: usize) -> Packets<'_> {
    Packets {
        remaining: firmware,
        chunk_size,
    }
}

/// Lazy, ordered packet sequence. Clone it to restart from the same position.
#[derive(Debug, Clone)]
pub struct Packets<'a> {
    remaining: &'a [u8],
    chunk_size: usize,
}

impl<'a> Iterator for Packets<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() || self.chunk_size == 0 {
            return None;
        }
        let end = self.chunk_size.min(self.remaining.len());
        let (packet, rest) = self.remaining.split_at(end);
        self.remaining = rest;
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = packet_count(self.remaining.len(), self.chunk_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Packets<'_> {}

/// Chunk size cannot be derived from the negotiated payload bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("max payload {max_payload} leaves no room after {overhead} bytes of overhead")]
    NoPayload { max_payload: usize, overhead: usize },
    #[error("chunk size {0} exceeds the 2-byte packet-size field")]
    TooLarge(usize),
}

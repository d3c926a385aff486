//! Shared, reference-counted payload buffers.
//!
//! A [`SharedBuffer`] is the unit of payload handoff between a worker thread
//! building a response or a request body and the record that eventually
//! holds it. It is either an owned/shared block of bytes that has not (yet)
//! been stored, or it is attached to a live [`Record`], in which case reading
//! it reads straight out of the record's own payload slot without a copy.
//! Cloning bumps a reference count — of the byte block if still unattached,
//! of the record's reader count once attached — rather than copying data.

use std::sync::Arc;

use crate::compressor::CompressorId;
use crate::error::{StoreError, StoreResult};
use crate::record::{Payload, Record};

enum Source {
    Empty,
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
    Attached(Arc<Record>),
}

pub struct SharedBuffer {
    source: Source,
}

impl SharedBuffer {
    #[must_use]
    pub fn empty() -> Self {
        Self { source: Source::Empty }
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { source: Source::Owned(bytes) }
    }

    #[must_use]
    pub fn attached(record: Arc<Record>) -> Self {
        record.add_reader();
        Self { source: Source::Attached(record) }
    }

    /// Allocates `size` zeroed bytes for the caller to fill in place. Only
    /// valid on a buffer that has not yet received any bytes.
    pub fn set_size(&mut self, size: usize) -> StoreResult<&mut [u8]> {
        match &self.source {
            Source::Empty => {
                self.source = Source::Owned(vec![0u8; size]);
                match &mut self.source {
                    Source::Owned(v) => Ok(v.as_mut_slice()),
                    _ => unreachable!(),
                }
            }
            _ => Err(StoreError::InvalidKey("buffer already has content".into())),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.source {
            Source::Empty => 0,
            Source::Owned(v) => v.len(),
            Source::Shared(a) => a.len(),
            Source::Attached(record) => record.payload_len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the buffer's bytes into a freshly allocated vector. Attached
    /// buffers copy out of the record under its payload lock.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.source {
            Source::Empty => Vec::new(),
            Source::Owned(v) => v.clone(),
            Source::Shared(a) => a.to_vec(),
            Source::Attached(record) => record.payload_bytes().map(|b| b.to_vec()).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        matches!(self.source, Source::Attached(_))
    }

    /// Moves this buffer's bytes into `record`'s payload slot (compressing
    /// with `compressor` first) and then attaches this handle to the record.
    /// The caller must already hold the record's write lock and it must have
    /// no payload yet.
    pub fn transfer_into(
        &mut self,
        record: &Arc<Record>,
        compressor_id: CompressorId,
    ) -> StoreResult<()> {
        debug_assert_eq!(
            record.reader_count(),
            0,
            "transfer_into requires the record to have no attached readers yet"
        );
        let raw = match std::mem::replace(&mut self.source, Source::Empty) {
            Source::Empty => Vec::new(),
            Source::Owned(v) => v,
            Source::Shared(a) => a.to_vec(),
            Source::Attached(other) => {
                let bytes = other.payload_bytes().map(|b| b.to_vec()).unwrap_or_default();
                other.remove_reader();
                bytes
            }
        };

        let uncompressed_size = raw.len();
        let compressed = compressor_id.compressor().compress(&raw)?;
        record.install_payload(Payload {
            compressor_id,
            uncompressed_size,
            bytes: Arc::from(compressed.into_boxed_slice()),
        });
        record.add_reader();
        self.source = Source::Attached(Arc::clone(record));
        Ok(())
    }
}

impl Clone for SharedBuffer {
    fn clone(&self) -> Self {
        match &self.source {
            Source::Empty => Self { source: Source::Empty },
            Source::Owned(_) => {
                // Promote to a shared, immutable block on first clone so both
                // handles can read it without copying.
                unreachable!("callers must use share() instead of Clone on an Owned buffer")
            }
            Source::Shared(arc) => Self { source: Source::Shared(Arc::clone(arc)) },
            Source::Attached(record) => {
                record.add_reader();
                Self { source: Source::Attached(Arc::clone(record)) }
            }
        }
    }
}

impl SharedBuffer {
    /// Returns an independent handle to the same bytes, promoting an `Owned`
    /// buffer to a `Shared` one in place (this is why plain [`Clone`] is not
    /// implemented for the owned case: the promotion needs `&mut self`).
    pub fn share(&mut self) -> Self {
        if let Source::Owned(bytes) = &mut self.source {
            let taken = std::mem::take(bytes);
            self.source = Source::Shared(Arc::from(taken.into_boxed_slice()));
        }
        self.clone()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if let Source::Attached(record) = &self.source {
            record.remove_reader();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Domain;

    #[test]
    fn owned_buffer_reports_len_and_bytes() {
        let mut buf = SharedBuffer::empty();
        buf.set_size(4).unwrap().copy_from_slice(b"abcd");
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.to_vec(), b"abcd");
    }

    #[test]
    fn share_promotes_owned_to_shared_and_clone_is_cheap() {
        let mut buf = SharedBuffer::from_bytes(b"hello".to_vec());
        let second = buf.share();
        assert_eq!(buf.to_vec(), b"hello");
        assert_eq!(second.to_vec(), b"hello");
    }

    #[test]
    fn attaching_bumps_and_drop_releases_reader_count() {
        let record = Arc::new(Record::new(b"k".to_vec(), Domain::Fpc));
        assert_eq!(record.reader_count(), 0);
        {
            let buf = SharedBuffer::attached(Arc::clone(&record));
            assert_eq!(record.reader_count(), 1);
            let cloned = buf.clone();
            assert_eq!(record.reader_count(), 2);
            drop(cloned);
            assert_eq!(record.reader_count(), 1);
        }
        assert_eq!(record.reader_count(), 0);
    }
}

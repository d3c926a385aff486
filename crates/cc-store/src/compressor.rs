//! Payload compressors used by the optimizer's re-compression pass and by the
//! stores when a record's payload is first transferred in.
//!
//! Backed by real crates (`flate2` for zlib, `zstd`) rather than hand-rolled
//! codecs.

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressorId {
    None = 0,
    Zlib = 1,
    Zstd = 2,
}

impl CompressorId {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressorId::None),
            1 => Some(CompressorId::Zlib),
            2 => Some(CompressorId::Zstd),
            _ => None,
        }
    }

    #[must_use]
    pub fn compressor(self) -> &'static dyn Compressor {
        match self {
            CompressorId::None => &NoneCompressor,
            CompressorId::Zlib => &ZlibCompressor,
            CompressorId::Zstd => &ZstdCompressor,
        }
    }
}

/// A payload codec. `compress` is only ever invoked by the optimizer's
/// background re-compression pass; stores call `decompress` on the read path.
pub trait Compressor: Send + Sync {
    fn id(&self) -> CompressorId;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError>;
    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, StoreError>;
}

pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn id(&self) -> CompressorId {
        CompressorId::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _uncompressed_size: usize) -> Result<Vec<u8>, StoreError> {
        Ok(data.to_vec())
    }
}

pub struct ZlibCompressor;

impl Compressor for ZlibCompressor {
    fn id(&self) -> CompressorId {
        CompressorId::Zlib
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
        encoder
            .write_all(data)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| StoreError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, StoreError> {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(uncompressed_size);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        Ok(out)
    }
}

pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn id(&self) -> CompressorId {
        CompressorId::Zstd
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        zstd::bulk::compress(data, 19).map_err(|e| StoreError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, StoreError> {
        zstd::bulk::decompress(data, uncompressed_size.max(1))
            .map_err(|e| StoreError::Compression(e.to_string()))
    }
}

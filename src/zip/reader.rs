use std::path::Path;
use std::sync::Arc;

use flate2::{Crc, Decompress, FlushDecompress, Status};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::io::{LocalFileReader, ReadAt};

use super::error::{Result, ZipError};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

const CHUNK_SIZE: usize = 64 * 1024;

/// Read side of the ZIP codec: lists entries and streams their contents.
pub struct ZipReader<R: ReadAt> {
    parser: ZipParser<R>,
}

impl ZipReader<LocalFileReader> {
    /// Open an archive on the local filesystem.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(LocalFileReader::new(path)?)))
    }
}

impl<R: ReadAt> ZipReader<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive
    pub async fn entries(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Stream an entry's decoded contents into `writer`, verifying CRC-32
    /// and size. Returns the number of bytes written.
    pub async fn copy_entry<W>(&self, entry: &ZipFileEntry, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let data_offset = self.parser.get_data_offset(entry).await?;
        let mut crc = Crc::new();

        let written = match entry.compression_method {
            CompressionMethod::Stored => {
                self.copy_stored(entry, data_offset, writer, &mut crc).await?
            }
            CompressionMethod::Deflate => {
                self.copy_deflated(entry, data_offset, writer, &mut crc)
                    .await?
            }
            CompressionMethod::Unknown(method) => {
                return Err(ZipError::UnsupportedMethod(method));
            }
        };

        if written != entry.uncompressed_size {
            return Err(ZipError::SizeMismatch {
                name: entry.file_name.clone(),
                expected: entry.uncompressed_size,
                actual: written,
            });
        }
        if crc.sum() != entry.crc32 {
            return Err(ZipError::ChecksumMismatch {
                name: entry.file_name.clone(),
                expected: entry.crc32,
                actual: crc.sum(),
            });
        }

        writer.flush().await?;
        Ok(written)
    }

    /// Decode an entry fully into memory
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(CHUNK_SIZE as u64) as usize);
        self.copy_entry(entry, &mut buf).await?;
        Ok(buf)
    }

    async fn copy_stored<W>(
        &self,
        entry: &ZipFileEntry,
        mut offset: u64,
        writer: &mut W,
        crc: &mut Crc,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut remaining = entry.compressed_size;
        let mut buf = vec![0u8; CHUNK_SIZE];

        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            self.parser
                .reader()
                .read_exact_at(offset, &mut buf[..n])
                .await?;
            crc.update(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
            offset += n as u64;
            remaining -= n as u64;
        }

        Ok(entry.compressed_size)
    }

    async fn copy_deflated<W>(
        &self,
        entry: &ZipFileEntry,
        mut offset: u64,
        writer: &mut W,
        crc: &mut Crc,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut inflater = Decompress::new(false);
        let mut remaining = entry.compressed_size;
        let mut input = vec![0u8; CHUNK_SIZE];
        let mut output = Vec::with_capacity(CHUNK_SIZE);
        let mut written = 0u64;

        loop {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            if n > 0 {
                self.parser
                    .reader()
                    .read_exact_at(offset, &mut input[..n])
                    .await?;
                offset += n as u64;
                remaining -= n as u64;
            }

            let mut consumed = 0;
            loop {
                output.clear();
                let before = inflater.total_in();
                let status = inflater.decompress_vec(
                    &input[consumed..n],
                    &mut output,
                    FlushDecompress::None,
                )?;
                consumed += (inflater.total_in() - before) as usize;

                crc.update(&output);
                writer.write_all(&output).await?;
                written += output.len() as u64;

                if status == Status::StreamEnd {
                    return Ok(written);
                }
                // Input drained and the output buffer had room: need more input.
                if consumed == n && output.len() < output.capacity() {
                    break;
                }
            }

            if n == 0 {
                return Err(ZipError::Malformed("deflate stream (truncated)"));
            }
        }
    }
}

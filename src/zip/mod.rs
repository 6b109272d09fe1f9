//! ZIP container codec.
//!
//! The archive engine only orchestrates entry-level operations; this module
//! is the codec it drives.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, headers, entries)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`reader`]: Entry listing and streaming decode
//! - [`writer`]: Streaming encode of local headers, data and central directory
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 end records on both sides, ZIP64 sizes when reading
//! - STORED and DEFLATE compression methods
//! - Unix permission bits in the external attributes
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Entries larger than 4 GiB cannot be written

mod error;
mod parser;
mod reader;
mod structures;
mod writer;

pub use error::{Result, ZipError};
pub use parser::ZipParser;
pub use reader::ZipReader;
pub use structures::*;
pub use writer::ZipWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ReadAt;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MemoryReader(Vec<u8>);

    #[async_trait]
    impl ReadAt for MemoryReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn written_entries_read_back() {
        let text = sample(300_000);
        let mut writer = ZipWriter::new(Vec::<u8>::new()).with_level(9);
        writer
            .add_directory(EntryHeader::directory("docs"))
            .await
            .unwrap();
        writer
            .add_file(EntryHeader::file("docs/deflated.bin"), &mut text.as_slice())
            .await
            .unwrap();
        writer
            .add_file(
                EntryHeader::file("docs/stored.bin").with_method(CompressionMethod::Stored),
                &mut text.as_slice(),
            )
            .await
            .unwrap();
        writer
            .add_file(EntryHeader::file("empty"), &mut &b""[..])
            .await
            .unwrap();
        let bytes = writer.finish().await.unwrap();

        let reader = ZipReader::new(Arc::new(MemoryReader(bytes)));
        let entries = reader.entries().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/deflated.bin", "docs/stored.bin", "empty"]);

        assert!(entries[0].is_directory);
        assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
        assert!(entries[1].compressed_size < entries[1].uncompressed_size);
        assert_eq!(entries[2].compression_method, CompressionMethod::Stored);

        assert_eq!(reader.read_entry(&entries[1]).await.unwrap(), text);
        assert_eq!(reader.read_entry(&entries[2]).await.unwrap(), text);
        assert!(reader.read_entry(&entries[3]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_data_fails_checksum() {
        let mut writer = ZipWriter::new(Vec::<u8>::new());
        writer
            .add_file(
                EntryHeader::file("a.txt").with_method(CompressionMethod::Stored),
                &mut &b"hello world"[..],
            )
            .await
            .unwrap();
        let mut bytes = writer.finish().await.unwrap();
        // First data byte follows the 30 byte local header and the 5 byte name.
        bytes[LFH_SIZE + 5] ^= 0xFF;

        let reader = ZipReader::new(Arc::new(MemoryReader(bytes)));
        let entries = reader.entries().await.unwrap();
        let err = reader.read_entry(&entries[0]).await.unwrap_err();
        assert!(matches!(err, ZipError::ChecksumMismatch { .. }), "{err:?}");
    }

    /// Sink that accepts `budget` bytes, then fails every write.
    struct FailingSink {
        budget: usize,
    }

    impl tokio::io::AsyncWrite for FailingSink {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            if self.budget == 0 {
                return std::task::Poll::Ready(Err(std::io::Error::other("disk full")));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_sink_write_poisons_the_writer() {
        // Room for the first local header and part of its data only.
        let mut writer = ZipWriter::new(FailingSink { budget: LFH_SIZE + 10 });
        let data = sample(1000);
        let err = writer
            .add_file(
                EntryHeader::file("a.bin").with_method(CompressionMethod::Stored),
                &mut data.as_slice(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::Io(_)), "{err:?}");

        let err = writer
            .add_directory(EntryHeader::directory("later"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::Poisoned), "{err:?}");
        assert!(writer.is_empty());
        assert!(matches!(writer.finish().await, Err(ZipError::Poisoned)));
    }

    #[tokio::test]
    async fn garbage_is_not_a_zip() {
        let reader = ZipReader::new(Arc::new(MemoryReader(vec![7u8; 100])));
        assert!(matches!(reader.entries().await, Err(ZipError::NotZip)));
    }

    #[tokio::test]
    async fn empty_archive_lists_nothing() {
        let bytes = ZipWriter::new(Vec::<u8>::new()).finish().await.unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        let reader = ZipReader::new(Arc::new(MemoryReader(bytes)));
        assert!(reader.entries().await.unwrap().is_empty());
    }
}

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
// Not `AsyncWriteExt`: `Vec<u8>` implements both write traits, and the header
// buffers below must resolve to `WriteBytesExt`.
use tokio::io::{self as aio, AsyncRead, AsyncReadExt, AsyncWrite};

use super::error::{Result, ZipError};
use super::structures::*;

const CHUNK_SIZE: usize = 64 * 1024;
const U32_MAX: u64 = 0xFFFFFFFF;

/// Write side of the ZIP codec.
///
/// Entries are streamed: the local header goes out first with the data
/// descriptor flag set, and CRC-32 and sizes follow the data. Nothing is
/// listed in the central directory until its data is complete, so an entry
/// that fails half way never becomes visible to readers.
pub struct ZipWriter<W> {
    inner: W,
    offset: u64,
    records: Vec<CentralRecord>,
    level: Compression,
    /// Set once a write to `inner` fails; `offset` no longer matches the
    /// sink, so nothing more may be written.
    poisoned: bool,
}

struct CentralRecord {
    header: EntryHeader,
    flags: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    lfh_offset: u64,
}

impl<W: AsyncWrite + Unpin> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            records: Vec::new(),
            level: Compression::default(),
            poisoned: false,
        }
    }

    /// Deflate level, 0 (fastest) to 9 (smallest)
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Number of entries completed so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write a directory entry. It carries no data.
    pub async fn add_directory(&mut self, header: EntryHeader) -> Result<()> {
        self.check_usable()?;
        if !header.is_directory() {
            return Err(ZipError::Unsupported(format!(
                "directory entry '{}' must end with '/'",
                header.name
            )));
        }

        let lfh_offset = self.offset;
        let flags = name_flags(&header.name);
        self.write_local_header(&header, flags).await?;
        self.records.push(CentralRecord {
            header,
            flags,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset,
        });
        Ok(())
    }

    /// Stream `source` into a new file entry using the header's method.
    /// Returns the number of uncompressed bytes stored.
    pub async fn add_file<R>(&mut self, header: EntryHeader, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if header.is_directory() {
            self.add_directory(header).await?;
            return Ok(0);
        }
        self.check_usable()?;
        if let CompressionMethod::Unknown(method) = header.method {
            return Err(ZipError::UnsupportedMethod(method));
        }

        let lfh_offset = self.offset;
        let flags = name_flags(&header.name) | FLAG_DATA_DESCRIPTOR;
        self.write_local_header(&header, flags).await?;

        let (crc32, compressed_size, uncompressed_size) = match header.method {
            CompressionMethod::Deflate => self.write_deflated(source).await?,
            _ => self.write_stored(source).await?,
        };

        if compressed_size >= U32_MAX || uncompressed_size >= U32_MAX {
            return Err(ZipError::Unsupported(format!(
                "entry '{}' exceeds 4 GiB",
                header.name
            )));
        }

        let mut descriptor = Vec::with_capacity(16);
        descriptor.extend_from_slice(DATA_DESCRIPTOR_SIGNATURE);
        descriptor.write_u32::<LittleEndian>(crc32)?;
        descriptor.write_u32::<LittleEndian>(compressed_size as u32)?;
        descriptor.write_u32::<LittleEndian>(uncompressed_size as u32)?;
        self.write_raw(&descriptor).await?;

        self.records.push(CentralRecord {
            header,
            flags,
            crc32,
            compressed_size,
            uncompressed_size,
            lfh_offset,
        });
        Ok(uncompressed_size)
    }

    /// Write the central directory and end records, flush, and hand back
    /// the underlying writer.
    pub async fn finish(mut self) -> Result<W> {
        self.check_usable()?;
        let cd_offset = self.offset;
        let mut tail = Vec::new();
        for record in &self.records {
            write_central_header(record, &mut tail)?;
        }
        let cd_size = tail.len() as u64;
        let total_entries = self.records.len() as u64;

        if total_entries >= 0xFFFF || cd_offset >= U32_MAX || cd_size >= U32_MAX {
            let eocd64_offset = cd_offset + cd_size;
            Zip64EOCD {
                // Size of the record after the size field itself.
                eocd64_size: (Zip64EOCD::MIN_SIZE - 12) as u64,
                version_made_by: HOST_UNIX << 8 | VERSION_ZIP64,
                version_needed: VERSION_ZIP64,
                disk_number: 0,
                disk_with_cd: 0,
                disk_entries: total_entries,
                total_entries,
                cd_size,
                cd_offset,
            }
            .write_to(&mut tail)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut tail)?;
        }

        let entries16 = total_entries.min(0xFFFF) as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries16,
            total_entries: entries16,
            cd_size: cd_size.min(U32_MAX) as u32,
            cd_offset: cd_offset.min(U32_MAX) as u32,
            comment_len: 0,
        }
        .write_to(&mut tail)?;

        self.write_raw(&tail).await?;
        aio::AsyncWriteExt::flush(&mut self.inner).await?;
        Ok(self.inner)
    }

    async fn write_local_header(&mut self, header: &EntryHeader, flags: u16) -> Result<()> {
        let name = header.name.as_bytes();
        let name_len = u16::try_from(name.len())
            .map_err(|_| ZipError::Unsupported(format!("entry name too long: {}", header.name)))?;

        let mut buf = Vec::with_capacity(LFH_SIZE + name.len());
        buf.extend_from_slice(LFH_SIGNATURE);
        buf.write_u16::<LittleEndian>(VERSION_DEFAULT)?;
        buf.write_u16::<LittleEndian>(flags)?;
        buf.write_u16::<LittleEndian>(header.method.as_u16())?;
        buf.write_u16::<LittleEndian>(header.last_mod_time)?;
        buf.write_u16::<LittleEndian>(header.last_mod_date)?;
        // CRC-32 and sizes: zero here, real values in the data descriptor.
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(name_len)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.extend_from_slice(name);

        self.write_raw(&buf).await
    }

    async fn write_stored<R>(&mut self, source: &mut R) -> Result<(u32, u64, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut crc = Crc::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                return Ok((crc.sum(), total, total));
            }
            crc.update(&buf[..n]);
            self.write_raw(&buf[..n]).await?;
            total += n as u64;
        }
    }

    async fn write_deflated<R>(&mut self, source: &mut R) -> Result<(u32, u64, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut deflater = Compress::new(self.level, false);
        let mut crc = Crc::new();
        let mut input = vec![0u8; CHUNK_SIZE];
        let mut output = Vec::with_capacity(CHUNK_SIZE);

        loop {
            let n = source.read(&mut input).await?;
            crc.update(&input[..n]);
            let flush = if n == 0 {
                FlushCompress::Finish
            } else {
                FlushCompress::None
            };

            let mut consumed = 0;
            loop {
                output.clear();
                let before = deflater.total_in();
                let status = deflater.compress_vec(&input[consumed..n], &mut output, flush)?;
                consumed += (deflater.total_in() - before) as usize;
                self.write_raw(&output).await?;

                if n == 0 {
                    if status == Status::StreamEnd {
                        return Ok((crc.sum(), deflater.total_out(), deflater.total_in()));
                    }
                } else if consumed == n && output.len() < output.capacity() {
                    break;
                }
            }
        }
    }

    async fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.check_usable()?;
        if let Err(e) = aio::AsyncWriteExt::write_all(&mut self.inner, buf).await {
            self.poisoned = true;
            return Err(e.into());
        }
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(ZipError::Poisoned)
        } else {
            Ok(())
        }
    }
}

fn name_flags(name: &str) -> u16 {
    if name.is_ascii() { 0 } else { FLAG_UTF8 }
}

fn write_central_header(record: &CentralRecord, out: &mut Vec<u8>) -> Result<()> {
    let header = &record.header;
    let name = header.name.as_bytes();

    let mut extra = Vec::new();
    if record.lfh_offset >= U32_MAX {
        extra.write_u16::<LittleEndian>(0x0001)?;
        extra.write_u16::<LittleEndian>(8)?;
        extra.write_u64::<LittleEndian>(record.lfh_offset)?;
    }
    let version_needed = if extra.is_empty() {
        VERSION_DEFAULT
    } else {
        VERSION_ZIP64
    };

    out.extend_from_slice(CDFH_SIGNATURE);
    out.write_u16::<LittleEndian>(HOST_UNIX << 8 | version_needed)?;
    out.write_u16::<LittleEndian>(version_needed)?;
    out.write_u16::<LittleEndian>(record.flags)?;
    out.write_u16::<LittleEndian>(header.method.as_u16())?;
    out.write_u16::<LittleEndian>(header.last_mod_time)?;
    out.write_u16::<LittleEndian>(header.last_mod_date)?;
    out.write_u32::<LittleEndian>(record.crc32)?;
    out.write_u32::<LittleEndian>(record.compressed_size as u32)?;
    out.write_u32::<LittleEndian>(record.uncompressed_size as u32)?;
    out.write_u16::<LittleEndian>(name.len() as u16)?;
    out.write_u16::<LittleEndian>(extra.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?; // comment
    out.write_u16::<LittleEndian>(0)?; // disk number start
    out.write_u16::<LittleEndian>(0)?; // internal attributes
    out.write_u32::<LittleEndian>(header.external_attrs())?;
    out.write_u32::<LittleEndian>(record.lfh_offset.min(U32_MAX) as u32)?;
    out.extend_from_slice(name);
    out.extend_from_slice(&extra);
    Ok(())
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::Metadata;
use std::io::{self, Cursor};
use std::time::SystemTime;

use time::OffsetDateTime;

use super::error::{Result, ZipError};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Malformed("End of Central Directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Malformed("ZIP64 locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        out.write_u64::<LittleEndian>(self.eocd64_offset)?;
        out.write_u32::<LittleEndian>(self.total_disks)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::Malformed("ZIP64 End of Central Directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u64::<LittleEndian>(self.eocd64_size)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u32::<LittleEndian>(self.disk_number)?;
        out.write_u32::<LittleEndian>(self.disk_with_cd)?;
        out.write_u64::<LittleEndian>(self.disk_entries)?;
        out.write_u64::<LittleEndian>(self.total_entries)?;
        out.write_u64::<LittleEndian>(self.cd_size)?;
        out.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Data descriptor following streamed entry data
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// General purpose flag: sizes and CRC follow the data
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: name is UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// Host system stored in the high byte of "version made by"
pub const HOST_UNIX: u16 = 3;
/// Version 2.0: deflate and directories
pub const VERSION_DEFAULT: u16 = 20;
/// Version 4.5: ZIP64 end records
pub const VERSION_ZIP64: u16 = 45;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const DOS_DIRECTORY: u32 = 0x10;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub version_made_by: u16,
    pub external_attrs: u32,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Unix mode from the external attributes, if the archive was made on a
    /// unix host and recorded one.
    pub fn unix_mode(&self) -> Option<u32> {
        let mode = self.external_attrs >> 16;
        (self.version_made_by >> 8 == HOST_UNIX && mode != 0).then_some(mode)
    }
}

/// Header for an entry about to be written.
///
/// Directory entries are recognised by their trailing `/`.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub name: String,
    pub method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub unix_mode: u32,
}

impl EntryHeader {
    /// Regular file entry, mode 0644, stamped now.
    pub fn file(name: impl Into<String>) -> Self {
        let (last_mod_time, last_mod_date) = dos_datetime(SystemTime::now());
        Self {
            name: name.into(),
            method: CompressionMethod::Deflate,
            last_mod_time,
            last_mod_date,
            unix_mode: S_IFREG | 0o644,
        }
    }

    /// Directory entry, mode 0755, stamped now.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        let (last_mod_time, last_mod_date) = dos_datetime(SystemTime::now());
        Self {
            name,
            method: CompressionMethod::Stored,
            last_mod_time,
            last_mod_date,
            unix_mode: S_IFDIR | 0o755,
        }
    }

    /// Build a header from filesystem metadata. `name` must already be
    /// archive-relative; a `/` is appended for directories.
    pub fn from_metadata(name: impl Into<String>, meta: &Metadata) -> Self {
        let mut header = if meta.is_dir() {
            Self::directory(name)
        } else {
            Self::file(name)
        };
        if let Ok(modified) = meta.modified() {
            (header.last_mod_time, header.last_mod_date) = dos_datetime(modified);
        }
        let type_bits = if meta.is_dir() { S_IFDIR } else { S_IFREG };
        header.unix_mode = type_bits | permission_bits(meta);
        header
    }

    pub fn with_method(mut self, method: CompressionMethod) -> Self {
        if !self.is_directory() {
            self.method = method;
        }
        self
    }

    pub fn with_mode(mut self, permissions: u32) -> Self {
        self.unix_mode = (self.unix_mode & !0o7777) | (permissions & 0o7777);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn external_attrs(&self) -> u32 {
        let dos = if self.is_directory() { DOS_DIRECTORY } else { 0 };
        (self.unix_mode << 16) | dos
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Convert a timestamp to MS-DOS (time, date), clamped to the 1980..=2107
/// range the format can express.
pub fn dos_datetime(at: SystemTime) -> (u16, u16) {
    let at = OffsetDateTime::from(at);
    if at.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    if at.year() > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }
    let time = ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | (at.second() as u16 / 2);
    let date = (((at.year() - 1980) as u16) << 9)
        | ((u8::from(at.month()) as u16) << 5)
        | at.day() as u16;
    (time, date)
}

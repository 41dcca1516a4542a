//! The YDF dump file format.
//!
//! A YDF file starts with a 4-byte header (16-bit magic `0x6DDF` and
//! 16-bit version `0x0001`, both little-endian). Each record is a
//! 16-bit magic `0x6DE0`, a 64-bit key length, a 64-bit value length,
//! then the raw key and value bytes. Compression is selected by file
//! suffix, symmetrically for reading and writing: `.gz` means gzip,
//! `.xz` means xz, anything else is raw.
//!
//! Dumping runs over a passive job so the snapshot is point-in-time;
//! importing streams records through an auto-batching writer.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::batch::AutoWriteBatch;
use crate::connection::Connection;
use crate::conversion::BinaryValue;
use crate::error::YakDbError;
use crate::iterators::DEFAULT_CHUNK_SIZE;
use crate::transport::TransportContext;

const YDF_HEADER_MAGIC: u16 = 0x6DDF;
const YDF_HEADER_VERSION: u16 = 0x0001;
const YDF_RECORD_MAGIC: u16 = 0x6DE0;

/// Compression applied to a dump file, selected by its suffix
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DumpCompression {
    Raw,
    Gzip,
    Xz,
}

impl DumpCompression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => DumpCompression::Gzip,
            Some("xz") => DumpCompression::Xz,
            _ => DumpCompression::Raw,
        }
    }
}

enum YdfWriter {
    Raw(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Xz(XzEncoder<BufWriter<File>>),
}

impl YdfWriter {
    fn create(path: &Path) -> Result<Self, YakDbError> {
        let file = BufWriter::new(File::create(path)?);
        Ok(match DumpCompression::from_path(path) {
            DumpCompression::Raw => YdfWriter::Raw(file),
            DumpCompression::Gzip => YdfWriter::Gzip(GzEncoder::new(file, Compression::default())),
            DumpCompression::Xz => YdfWriter::Xz(XzEncoder::new(file, 6)),
        })
    }

    /// Flush everything and finalize the compressed stream
    fn finish(self) -> Result<(), YakDbError> {
        match self {
            YdfWriter::Raw(mut file) => file.flush()?,
            YdfWriter::Gzip(encoder) => {
                encoder.finish()?.flush()?;
            }
            YdfWriter::Xz(encoder) => {
                encoder.finish()?.flush()?;
            }
        }
        Ok(())
    }
}

impl Write for YdfWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            YdfWriter::Raw(inner) => inner.write(buf),
            YdfWriter::Gzip(inner) => inner.write(buf),
            YdfWriter::Xz(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            YdfWriter::Raw(inner) => inner.flush(),
            YdfWriter::Gzip(inner) => inner.flush(),
            YdfWriter::Xz(inner) => inner.flush(),
        }
    }
}

enum YdfReader {
    Raw(BufReader<File>),
    Gzip(GzDecoder<BufReader<File>>),
    Xz(XzDecoder<BufReader<File>>),
}

impl YdfReader {
    fn open(path: &Path) -> Result<Self, YakDbError> {
        let file = BufReader::new(File::open(path)?);
        Ok(match DumpCompression::from_path(path) {
            DumpCompression::Raw => YdfReader::Raw(file),
            DumpCompression::Gzip => YdfReader::Gzip(GzDecoder::new(file)),
            DumpCompression::Xz => YdfReader::Xz(XzDecoder::new(file)),
        })
    }
}

impl Read for YdfReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            YdfReader::Raw(inner) => inner.read(buf),
            YdfReader::Gzip(inner) => inner.read(buf),
            YdfReader::Xz(inner) => inner.read(buf),
        }
    }
}

fn write_file_header(writer: &mut impl Write) -> Result<(), YakDbError> {
    writer.write_all(&YDF_HEADER_MAGIC.to_le_bytes())?;
    writer.write_all(&YDF_HEADER_VERSION.to_le_bytes())?;
    Ok(())
}

fn verify_file_header(reader: &mut impl Read) -> Result<(), YakDbError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(|_| {
        YakDbError::Protocol(
            "Tried to read the 4-byte YDF header but the file ended early".to_string(),
        )
    })?;
    let magic = u16::from_le_bytes([header[0], header[1]]);
    let version = u16::from_le_bytes([header[2], header[3]]);
    if magic != YDF_HEADER_MAGIC {
        return Err(YakDbError::Protocol(format!(
            "YDF file header magic word mismatches, expected 0x{YDF_HEADER_MAGIC:04X} but was 0x{magic:04X}"
        )));
    }
    if version != YDF_HEADER_VERSION {
        return Err(YakDbError::Protocol(format!(
            "YDF file header version mismatches, expected {YDF_HEADER_VERSION} but was {version}"
        )));
    }
    Ok(())
}

fn write_record(writer: &mut impl Write, key: &[u8], value: &[u8]) -> Result<(), YakDbError> {
    writer.write_all(&YDF_RECORD_MAGIC.to_le_bytes())?;
    writer.write_all(&(key.len() as u64).to_le_bytes())?;
    writer.write_all(&(value.len() as u64).to_le_bytes())?;
    writer.write_all(key)?;
    writer.write_all(value)?;
    Ok(())
}

/// Read one key/value record, or `None` at a clean end of file
fn read_record(reader: &mut impl Read) -> Result<Option<(Vec<u8>, Vec<u8>)>, YakDbError> {
    // 2 bytes magic word + 8 bytes key size + 8 bytes value size
    let mut header = [0u8; 18];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < header.len() {
        return Err(YakDbError::Protocol(format!(
            "YDF record header truncated, got {filled} of 18 bytes"
        )));
    }
    let magic = u16::from_le_bytes([header[0], header[1]]);
    if magic != YDF_RECORD_MAGIC {
        return Err(YakDbError::Protocol(format!(
            "YDF key-value header magic word mismatches, expected 0x{YDF_RECORD_MAGIC:04X} but was 0x{magic:04X}"
        )));
    }
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&header[2..10]);
    let key_size = u64::from_le_bytes(size_bytes) as usize;
    size_bytes.copy_from_slice(&header[10..18]);
    let value_size = u64::from_le_bytes(size_bytes) as usize;
    let mut key = vec![0u8; key_size];
    reader.read_exact(&mut key)?;
    let mut value = vec![0u8; value_size];
    reader.read_exact(&mut value)?;
    Ok(Some((key, value)))
}

/// Dump a table range to a YDF file, reading from a point-in-time
/// snapshot via a passive job
pub fn dump_ydf<C: TransportContext>(
    conn: &mut Connection<C>,
    output_path: impl AsRef<Path>,
    table_no: u32,
    start_key: Option<&BinaryValue>,
    end_key: Option<&BinaryValue>,
    limit: Option<u64>,
    chunk_size: Option<u32>,
) -> Result<(), YakDbError> {
    let path = output_path.as_ref();
    debug!("dumping table {table_no} to {}", path.display());
    let mut writer = YdfWriter::create(path)?;
    write_file_header(&mut writer)?;
    let chunk_size = chunk_size.or(Some(DEFAULT_CHUNK_SIZE as u32));
    let job = conn.initialize_passive_job(table_no, chunk_size, limit, start_key, end_key)?;
    for record in job {
        let (key, value) = record?;
        write_record(&mut writer, &key, &value)?;
    }
    writer.finish()
}

/// Import a YDF dump into a table, streaming through an auto-batching
/// writer
pub fn import_ydf<C: TransportContext>(
    conn: &mut Connection<C>,
    input_path: impl AsRef<Path>,
    table_no: u32,
) -> Result<(), YakDbError> {
    let path = input_path.as_ref();
    debug!("importing {} into table {table_no}", path.display());
    let mut reader = YdfReader::open(path)?;
    verify_file_header(&mut reader)?;
    let mut batch = AutoWriteBatch::new(conn, table_no);
    while let Some((key, value)) = read_record(&mut reader)? {
        batch.put_single(BinaryValue::Bytes(key), BinaryValue::Bytes(value))?;
    }
    batch.flush()
}

/// Options for [copy_table]
#[derive(Clone, Debug, Default)]
pub struct CopyTableOptions {
    /// Truncate the target table instead of deleting the copied range
    pub truncate: bool,
    /// Extension for the intermediate dump file, e.g. `.gz` or `.xz` to
    /// trade time for disk space in the temp directory
    pub extension: Option<String>,
    /// Range start used for both dumping and deletion
    pub start_key: Option<BinaryValue>,
    /// Range end used for both dumping and deletion
    pub end_key: Option<BinaryValue>,
    /// Record limit used for both dumping and deletion
    pub limit: Option<u64>,
    /// Passive job chunk size for the dump
    pub chunk_size: Option<u32>,
}

/// Copy a table (or a range of it) into another table through a
/// snapshotted YDF dump in a scoped temporary directory. The target is
/// cleared as late as possible to minimize its downtime, and the
/// temporary directory is removed on all exit paths.
pub fn copy_table<C: TransportContext>(
    conn: &mut Connection<C>,
    src_table: u32,
    target_table: u32,
    options: &CopyTableOptions,
) -> Result<(), YakDbError> {
    let tempdir = tempfile::Builder::new().prefix("yakdb-copy").tempdir()?;
    let extension = options.extension.as_deref().unwrap_or("");
    let filename = format!("t{src_table}-t{target_table}-copy.ydf{extension}");
    let dumpfile = tempdir.path().join(filename);
    info!("dumping table {src_table} to {}", dumpfile.display());
    dump_ydf(
        conn,
        &dumpfile,
        src_table,
        options.start_key.as_ref(),
        options.end_key.as_ref(),
        options.limit,
        options.chunk_size,
    )?;
    if options.truncate {
        conn.truncate(target_table)?;
    } else {
        conn.delete_range(
            target_table,
            options.start_key.as_ref(),
            options.end_key.as_ref(),
            options.limit,
        )?;
    }
    import_ydf(conn, &dumpfile, target_table)
    // tempdir cleans itself up when it goes out of scope
}

//! Container helpers for exchange export files.

use std::io::{Cursor, Read};

use crate::error::{DataFeedError, Result};

/// True when the buffer starts with a GZIP magic.
#[inline]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1F && bytes[1] == 0x8B
}

/// Decompresses a GZIP container in full.
pub fn read_gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Extracts the first entry of a ZIP container (exchange exports carry a
/// single CSV per archive).
pub fn read_zip_first_entry(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| DataFeedError::Parse(format!("zip container: {err}")))?;
    if archive.len() == 0 {
        return Err(DataFeedError::Parse("zip container is empty".into()));
    }
    let mut entry = archive
        .by_index(0)
        .map_err(|err| DataFeedError::Parse(format!("zip entry: {err}")))?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out)?;
    Ok(out)
}

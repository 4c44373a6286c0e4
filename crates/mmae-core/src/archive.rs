use std::io::{Cursor, Read, Write};

use thiserror::Error;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter, write::SimpleFileOptions};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packs `(path, bytes)` entries into an in-memory ZIP.
///
/// Entries are stored uncompressed with a fixed timestamp, so identical
/// inputs produce identical archives.
pub fn build_zip<'a, I>(entries: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default());
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, bytes) in entries {
        writer.start_file(path, options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

pub fn read_zip(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        entries.push((file.name().to_string(), contents));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_is_deterministic_and_readable() {
        let entries = [("a/clip_001.wav", &b"one"[..]), ("b/clip_001.wav", &b"two"[..])];
        let first = build_zip(entries).expect("zip should build");
        let second = build_zip(entries).expect("zip should build");
        assert_eq!(first, second);

        let read = read_zip(&first).expect("zip should read");
        assert_eq!(
            read,
            vec![
                ("a/clip_001.wav".to_string(), b"one".to_vec()),
                ("b/clip_001.wav".to_string(), b"two".to_vec()),
            ]
        );
    }
}

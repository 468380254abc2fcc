//! Archive reading: open a zip of page images and yield them in name order.
//!
//! Only the entry *names* are read up front; each image's bytes are
//! decompressed lazily when the iterator reaches it, so a large archive never
//! has more than one page image in memory at a time.

use crate::error::{ImageError, News2CsvError};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// File extensions (lower-case, with dot) accepted as page images.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// One page image read from the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Full entry name inside the archive, e.g. `pages/Page_01.jpg`.
    pub name: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// Returns true if the entry name carries an accepted image extension (case-insensitive).
pub fn is_image_name(name: &str) -> bool {
    if name.ends_with('/') {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// A zip archive restricted to its page-image entries.
pub struct ImageArchive<R: Read + Seek> {
    zip: ZipArchive<R>,
    image_names: Vec<String>,
}

impl ImageArchive<Cursor<Vec<u8>>> {
    /// Open an archive held in memory.
    pub fn from_bytes(bytes: Vec<u8>, archive_name: &str) -> Result<Self, News2CsvError> {
        Self::new(Cursor::new(bytes), archive_name)
    }
}

impl ImageArchive<File> {
    /// Open an archive on disk.
    pub fn open(path: &Path) -> Result<Self, News2CsvError> {
        let file = File::open(path).map_err(|e| News2CsvError::ArchiveReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::new(file, &path.display().to_string())
    }
}

impl<R: Read + Seek> ImageArchive<R> {
    /// Open the archive and collect the sorted list of image entry names.
    ///
    /// Fails with [`News2CsvError::ArchiveCorrupt`] if the reader is not a
    /// valid zip archive.
    pub fn new(reader: R, archive_name: &str) -> Result<Self, News2CsvError> {
        let zip = ZipArchive::new(reader).map_err(|e| News2CsvError::ArchiveCorrupt {
            name: archive_name.to_string(),
            detail: e.to_string(),
        })?;

        let mut image_names: Vec<String> = zip
            .file_names()
            .filter(|n| is_image_name(n))
            .map(str::to_string)
            .collect();
        image_names.sort_unstable();

        debug!(
            "Archive '{}': {} entries, {} images",
            archive_name,
            zip.len(),
            image_names.len()
        );

        Ok(Self { zip, image_names })
    }

    /// Names of the qualifying image entries, in processing order.
    pub fn image_names(&self) -> &[String] {
        &self.image_names
    }

    pub fn len(&self) -> usize {
        self.image_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_names.is_empty()
    }

    /// Iterate over the image entries in ascending name order.
    ///
    /// Each item is read when the iterator reaches it. An entry whose data
    /// cannot be decompressed yields an [`ImageError::EntryUnreadable`]; the
    /// iteration itself carries on with the next entry.
    pub fn entries(&mut self) -> Entries<'_, R> {
        Entries {
            zip: &mut self.zip,
            names: self.image_names.iter(),
        }
    }
}

/// Lazy iterator returned by [`ImageArchive::entries`].
pub struct Entries<'a, R: Read + Seek> {
    zip: &'a mut ZipArchive<R>,
    names: std::slice::Iter<'a, String>,
}

impl<R: Read + Seek> Iterator for Entries<'_, R> {
    type Item = Result<ArchiveEntry, ImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        Some(read_entry(self.zip, name))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

fn read_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> Result<ArchiveEntry, ImageError> {
    let unreadable = |detail: String| ImageError::EntryUnreadable {
        image: name.to_string(),
        detail,
    };

    let mut file = zip.by_name(name).map_err(|e| unreadable(e.to_string()))?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| unreadable(e.to_string()))?;

    Ok(ArchiveEntry {
        name: name.to_string(),
        bytes,
    })
}

//! Extraction of the generated image from the provider's zip response.

use bytes::Bytes;
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

/// Extension of the raster member we look for.
const IMAGE_EXTENSION: &str = ".png";

/// Upper bound on the decompressed image size (64 MiB).
pub const MAX_IMAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Errors from unpacking a provider archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unreadable archive: {0}")]
    Unreadable(#[from] ZipError),

    #[error("no image found in archive")]
    NoImage,

    #[error("archive member {name} exceeds {limit} bytes")]
    TooLarge { name: String, limit: u64 },

    #[error("failed to read archive member {name}: {source}")]
    Member {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Return the decompressed bytes of the first `.png` member.
pub fn extract_image(archive: &[u8]) -> Result<Bytes, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;

    for index in 0..zip.len() {
        let file = zip.by_index(index)?;
        if file.is_dir() || !file.name().ends_with(IMAGE_EXTENSION) {
            continue;
        }

        let name = file.name().to_string();
        let mut data = Vec::with_capacity(file.size().min(MAX_IMAGE_SIZE) as usize);
        file.take(MAX_IMAGE_SIZE + 1)
            .read_to_end(&mut data)
            .map_err(|source| ArchiveError::Member {
                name: name.clone(),
                source,
            })?;
        if data.len() as u64 > MAX_IMAGE_SIZE {
            return Err(ArchiveError::TooLarge {
                name,
                limit: MAX_IMAGE_SIZE,
            });
        }
        return Ok(Bytes::from(data));
    }

    Err(ArchiveError::NoImage)
}

//! Non-volatile media backends.
//!
//! The store never writes the non-volatile region directly. It goes through
//! [`NvMedia`], which offers two primitives:
//!
//! - `program`: ordered in-place write of a byte range, used to append
//!   entries and to narrow state bytes
//! - `atomic_replace`: replace the whole image so that after any
//!   interruption either the old or the new image is visible
//!
//! [`MemoryMedia`] keeps the image on the heap and enforces flash
//! semantics (programming can only clear bits). [`FileMedia`] maps an
//! image file and replaces it through a temp file and rename.

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use varstore_format::ERASED_BYTE;

/// Number of attempts for an atomic file replace.
const REPLACE_ATTEMPTS: usize = 3;

/// Errors raised by media backends.
#[derive(Debug, Error)]
pub enum MediaError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write outside the image.
    #[error("Write of {len} bytes at {offset:#x} exceeds media size {size:#x}")]
    OutOfBounds {
        /// Start of the write
        offset: usize,
        /// Length of the write
        len: usize,
        /// Media size
        size: usize,
    },

    /// Replacement image has the wrong size.
    #[error("Image size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Media size
        expected: usize,
        /// Size of the supplied image
        actual: usize,
    },

    /// Program would set bits that are already clear.
    #[error("Program at {offset:#x} would set cleared bits")]
    WouldSetBits {
        /// First offending offset
        offset: usize,
    },

    /// Atomic replace failed; the previous image is intact.
    #[error("Atomic replace failed: {0}")]
    Replace(String),
}

/// Byte-addressable non-volatile media.
pub trait NvMedia {
    /// Current contents of the media.
    fn image(&self) -> &[u8];

    /// Write `bytes` at `offset`.
    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediaError>;

    /// Replace the whole image atomically.
    ///
    /// On error the previous image must still be in place.
    fn atomic_replace(&mut self, image: &[u8]) -> Result<(), MediaError>;

    /// Media size in bytes.
    fn size(&self) -> usize {
        self.image().len()
    }
}

fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), MediaError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(MediaError::OutOfBounds { offset, len, size }),
    }
}

/// Heap-backed media with flash program semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMedia {
    image: Vec<u8>,
}

impl MemoryMedia {
    /// Erased media of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            image: vec![ERASED_BYTE; size],
        }
    }

    /// Media holding an existing image.
    pub const fn from_image(image: Vec<u8>) -> Self {
        Self { image }
    }

    /// Take the image out of the media.
    pub fn into_image(self) -> Vec<u8> {
        self.image
    }
}

impl NvMedia for MemoryMedia {
    fn image(&self) -> &[u8] {
        &self.image
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediaError> {
        check_bounds(offset, bytes.len(), self.image.len())?;
        let target = &mut self.image[offset..offset + bytes.len()];
        if let Some(pos) = target
            .iter()
            .zip(bytes)
            .position(|(&old, &new)| old & new != new)
        {
            return Err(MediaError::WouldSetBits {
                offset: offset + pos,
            });
        }
        target.copy_from_slice(bytes);
        Ok(())
    }

    fn atomic_replace(&mut self, image: &[u8]) -> Result<(), MediaError> {
        if image.len() != self.image.len() {
            return Err(MediaError::SizeMismatch {
                expected: self.image.len(),
                actual: image.len(),
            });
        }
        let staged = image.to_vec();
        self.image = staged;
        Ok(())
    }
}

/// Media backed by a memory-mapped image file.
#[derive(Debug)]
pub struct FileMedia {
    path: PathBuf,
    mmap: MmapMut,
}

impl FileMedia {
    /// Create an erased image file of `size` bytes.
    ///
    /// Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, size: usize) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&vec![ERASED_BYTE; size])?;
        file.sync_all()?;
        debug!("Created {size} byte image at {}", path.display());
        Self::map(path, &file)
    }

    /// Open an existing image file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::map(path, &file)
    }

    /// Path of the image file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map(path: &Path, file: &File) -> Result<Self, MediaError> {
        // The file is owned by this process for the lifetime of the map.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map_mut(file)? };
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    fn write_temp(temp_path: &Path, image: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(temp_path)?;
        file.write_all(image)?;
        file.sync_all()
    }
}

impl NvMedia for FileMedia {
    fn image(&self) -> &[u8] {
        &self.mmap
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediaError> {
        check_bounds(offset, bytes.len(), self.mmap.len())?;
        self.mmap[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.mmap.flush_range(offset, bytes.len())?;
        Ok(())
    }

    fn atomic_replace(&mut self, image: &[u8]) -> Result<(), MediaError> {
        if image.len() != self.mmap.len() {
            return Err(MediaError::SizeMismatch {
                expected: self.mmap.len(),
                actual: image.len(),
            });
        }

        // Atomic write: temp file -> fsync -> rename, retry up to 3 times
        let temp_path = self.path.with_extension("tmp");
        let mut last_error = None;

        for attempt in 0..REPLACE_ATTEMPTS {
            match Self::write_temp(&temp_path, image) {
                Ok(()) => match std::fs::rename(&temp_path, &self.path) {
                    Ok(()) => {
                        debug!(
                            "Replaced image {} (attempt {})",
                            self.path.display(),
                            attempt + 1
                        );
                        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
                        *self = Self::map(&self.path, &file)?;
                        return Ok(());
                    }
                    Err(e) => {
                        last_error = Some(format!("Failed to rename temp file: {e}"));
                    }
                },
                Err(e) => {
                    last_error = Some(format!("Failed to write temp file: {e}"));
                }
            }

            let _ = std::fs::remove_file(&temp_path);
        }

        let reason = last_error.unwrap_or_else(|| "unknown error".to_string());
        warn!(
            "Failed to replace image {} after {REPLACE_ATTEMPTS} attempts: {reason}",
            self.path.display()
        );
        Err(MediaError::Replace(reason))
    }
}

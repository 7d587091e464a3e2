//! Archive unpacking
//!
//! Dispatches on the file extension: `.zip` goes through the zip reader,
//! everything in the tar family (`.tar`, `.tar.gz`/`.tgz`, `.tar.bz2`/`.tbz2`,
//! `.tar.xz`/`.txz`) through the tar reader with the matching decoder.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while unpacking an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file extension is not a known archive format
    #[error("Unsupported archive file: {0}")]
    Unsupported(PathBuf),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// The archive is corrupt or could not be extracted
    #[error("Failed to extract {path}: {message}")]
    ExtractionError { path: PathBuf, message: String },
}

/// Compression wrapped around a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Container format of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompression),
}

impl ArchiveFormat {
    /// Detect the format from a file name
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar") {
            Some(Self::Tar(TarCompression::None))
        } else if name.ends_with(".gz") || name.ends_with(".tgz") {
            Some(Self::Tar(TarCompression::Gzip))
        } else if name.ends_with(".bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::Tar(TarCompression::Bzip2))
        } else if name.ends_with(".xz") || name.ends_with(".txz") {
            Some(Self::Tar(TarCompression::Xz))
        } else {
            None
        }
    }
}

/// A downloaded archive ready to unpack
#[derive(Debug, Clone)]
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
}

impl Archive {
    /// Classify an archive by its extension
    ///
    /// Fails with [`ArchiveError::Unsupported`] before touching the file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        let format = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(ArchiveFormat::from_file_name)
            .ok_or_else(|| ArchiveError::Unsupported(path.clone()))?;

        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unpack into `destination`
    ///
    /// Any existing directory at `destination` is removed first, so the result
    /// holds exactly the archive's contents.
    pub fn unpack(&self, destination: &Path) -> Result<(), ArchiveError> {
        if destination.exists() {
            fs::remove_dir_all(destination)?;
        }
        fs::create_dir_all(destination)?;

        match self.format {
            ArchiveFormat::Zip => self.unpack_zip(destination),
            ArchiveFormat::Tar(compression) => self.unpack_tar(compression, destination),
        }
    }

    fn unpack_tar(&self, compression: TarCompression, destination: &Path) -> Result<(), ArchiveError> {
        let file = File::open(&self.path)?;
        let reader: Box<dyn Read> = match compression {
            TarCompression::None => Box::new(file),
            TarCompression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
            TarCompression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
            TarCompression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        };

        let mut archive = tar::Archive::new(reader);
        archive
            .unpack(destination)
            .map_err(|e| self.extraction_error(e))
    }

    fn unpack_zip(&self, destination: &Path) -> Result<(), ArchiveError> {
        let file = File::open(&self.path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| self.extraction_error(e))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| self.extraction_error(e))?;
            let entry_path = match entry.enclosed_name() {
                Some(p) => destination.join(p),
                None => continue,
            };

            if entry.is_dir() {
                fs::create_dir_all(&entry_path)?;
            } else {
                if let Some(parent) = entry_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&entry_path)?;
                io::copy(&mut entry, &mut outfile)?;
            }
        }

        Ok(())
    }

    fn extraction_error(&self, error: impl std::fmt::Display) -> ArchiveError {
        ArchiveError::ExtractionError {
            path: self.path.clone(),
            message: error.to_string(),
        }
    }
}

/// Find the root of unpacked content
///
/// Source archives usually wrap everything in one `name-version/` directory.
/// When `dir` holds exactly one entry and it is a directory, that directory is
/// the root; otherwise `dir` itself is.
pub fn content_root(dir: &Path) -> io::Result<PathBuf> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(entry) = entries.pop() {
            return Ok(entry.path());
        }
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tgz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_format_detection() {
        use ArchiveFormat::*;
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.zip"), Some(Zip));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.tar"), Some(Tar(TarCompression::None)));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.tar.gz"), Some(Tar(TarCompression::Gzip)));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.tgz"), Some(Tar(TarCompression::Gzip)));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.tar.bz2"), Some(Tar(TarCompression::Bzip2)));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.tar.xz"), Some(Tar(TarCompression::Xz)));
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.exe"), None);
        assert_eq!(ArchiveFormat::from_file_name("a-1.0.whl"), None);
    }

    #[test]
    fn test_unsupported_fails_before_io() {
        let result = Archive::open("/does/not/exist/pkg-1.0.rpm");
        assert!(matches!(result, Err(ArchiveError::Unsupported(_))));
    }

    #[test]
    fn test_unpack_tgz() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("pkg-1.0.tar.gz");
        write_tgz(&archive_path, &[("pkg-1.0/package.toml", "name = \"pkg\"\n")]);

        let dest = temp.path().join("out");
        Archive::open(&archive_path).unwrap().unpack(&dest).unwrap();

        assert!(dest.join("pkg-1.0/package.toml").exists());
        assert_eq!(content_root(&dest).unwrap(), dest.join("pkg-1.0"));
    }

    #[test]
    fn test_unpack_zip() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("pkg-1.0.zip");
        write_zip(&archive_path, &[("pkg-1.0/src/lib.txt", "hello")]);

        let dest = temp.path().join("out");
        Archive::open(&archive_path).unwrap().unpack(&dest).unwrap();

        let content = fs::read_to_string(dest.join("pkg-1.0/src/lib.txt")).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_unpack_clears_destination() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("pkg-1.0.tgz");
        write_tgz(&archive_path, &[("fresh.txt", "new")]);

        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("old")).unwrap();
        fs::write(dest.join("stale.txt"), "old").unwrap();

        Archive::open(&archive_path).unwrap().unpack(&dest).unwrap();

        let names: Vec<_> = fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["fresh.txt".to_string()]);
    }

    #[test]
    fn test_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("broken.zip");
        fs::write(&archive_path, b"definitely not a zip").unwrap();

        let result = Archive::open(&archive_path)
            .unwrap()
            .unpack(&temp.path().join("out"));
        assert!(matches!(result, Err(ArchiveError::ExtractionError { .. })));
    }

    #[test]
    fn test_content_root_with_multiple_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::create_dir(temp.path().join("b")).unwrap();
        assert_eq!(content_root(temp.path()).unwrap(), temp.path());
    }
}

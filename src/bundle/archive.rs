use super::error::{BundleError, PipelineStage, UnsafeEntryReason};
use super::options::BundleOptions;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::result::ZipError;
use zip::ZipArchive;

const STAGING_PREFIX: &str = "securezip";

/// Scratch directory holding the unpacked bundle for the length of one
/// pipeline run. Dropping it removes the directory and everything in it.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Joins a bundle-relative name onto the staging root, refusing names
    /// that would land outside it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, UnsafeEntryReason> {
        Ok(self.dir.path().join(safe_relative_path(name)?))
    }

    /// Removes the staging directory, reporting failures that `Drop` would
    /// swallow.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// A file written into the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub mode: Option<u32>,
}

/// Normalizes an archive entry name into a relative path with only normal
/// components. Both `/` and `\` count as separators.
pub fn safe_relative_path(name: &str) -> Result<PathBuf, UnsafeEntryReason> {
    if name.is_empty() || name.contains('\0') {
        return Err(UnsafeEntryReason::InvalidName);
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(UnsafeEntryReason::AbsolutePath);
    }
    let mut relative = PathBuf::new();
    for (index, part) in name.split(['/', '\\']).enumerate() {
        match part {
            "" | "." => {}
            ".." => return Err(UnsafeEntryReason::PathTraversal),
            drive if index == 0 && drive.ends_with(':') => {
                return Err(UnsafeEntryReason::AbsolutePath);
            }
            normal => relative.push(normal),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(UnsafeEntryReason::InvalidName);
    }
    Ok(relative)
}

/// Unpacks every entry of the zip archive at `archive_path` into `staging`.
///
/// Entries are validated before anything is written for them; unix
/// permission bits recorded in the archive are reapplied to staged files and
/// directories. A later entry with the same name replaces an earlier one.
pub fn extract_archive(
    archive_path: &Path,
    staging: &StagingArea,
    options: &BundleOptions,
) -> Result<Vec<StagedFile>, BundleError> {
    let unreadable = |source: ZipError| BundleError::ArchiveUnreadable {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path).map_err(|err| unreadable(ZipError::Io(err)))?;
    let mut archive = ZipArchive::new(file).map_err(unreadable)?;
    if archive.len() > options.max_entries {
        return Err(BundleError::UnsafeArchiveEntry {
            name: archive_path.display().to_string(),
            reason: UnsafeEntryReason::TooManyEntries {
                limit: options.max_entries,
            },
        });
    }

    let mut staged = Vec::with_capacity(archive.len());
    let mut directory_modes = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(unreadable)?;
        let name = entry.name().to_string();
        let destination = staging
            .resolve(&name)
            .map_err(|reason| BundleError::UnsafeArchiveEntry {
                name: name.clone(),
                reason,
            })?;

        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(extract_io)?;
            if let Some(mode) = entry.unix_mode() {
                directory_modes.push((destination, mode));
            }
            continue;
        }
        if entry.size() > options.max_entry_bytes {
            return Err(too_large(&name, options.max_entry_bytes));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(extract_io)?;
        }

        // The earlier copy may be read-only.
        match fs::remove_file(&destination) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(extract_io(err)),
            _ => {}
        }
        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&destination)
            .map_err(extract_io)?;
        let size = copy_entry(&mut entry, &mut out, options.max_entry_bytes)
            .map_err(|err| match err {
                CopyError::Read(source) => unreadable(ZipError::Io(source)),
                CopyError::Write(source) => extract_io(source),
                CopyError::Limit => too_large(&name, options.max_entry_bytes),
            })?;
        out.flush().map_err(extract_io)?;
        drop(out);

        let mode = entry.unix_mode();
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode & 0o777))
                .map_err(extract_io)?;
        }

        debug!("staged bundle entry `{name}` ({size} bytes)");
        staged.push(StagedFile {
            name,
            path: destination,
            size,
            mode,
        });
    }
    apply_directory_modes(directory_modes)?;
    Ok(staged)
}

// Runs once every file is in place, deepest directory first. The owner keeps
// rwx so the staging area can still be removed.
fn apply_directory_modes(mut modes: Vec<(PathBuf, u32)>) -> Result<(), BundleError> {
    modes.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
    #[cfg(unix)]
    for (path, mode) in &modes {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode((mode & 0o777) | 0o700))
            .map_err(extract_io)?;
    }
    Ok(())
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
    Limit,
}

// Copies at most `limit` bytes; the declared size in the central directory
// is not trusted.
fn copy_entry(reader: &mut impl Read, writer: &mut impl Write, limit: u64) -> Result<u64, CopyError> {
    let mut buf = [0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CopyError::Read(err)),
        };
        total += read as u64;
        if total > limit {
            return Err(CopyError::Limit);
        }
        writer.write_all(&buf[..read]).map_err(CopyError::Write)?;
    }
}

fn extract_io(err: io::Error) -> BundleError {
    BundleError::staging_io(PipelineStage::Extract, err)
}

fn too_large(name: &str, limit: u64) -> BundleError {
    BundleError::UnsafeArchiveEntry {
        name: name.to_string(),
        reason: UnsafeEntryReason::TooLarge { limit },
    }
}

//! Directory packaging.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use parcel_compress::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::HeaderMode;
use tracing::instrument;
use walkdir::WalkDir;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;
/// Modification time recorded for every directory entry. Writing the archive
/// (or its temporary) into a directory inside the source touches that
/// directory's mtime, which would otherwise leak into the digest.
const DIRECTORY_MTIME: u64 = 0;

/// Packages directories into compressed tar archives.
///
/// Archives are named `<directory base name>.tar<compression extension>` and
/// written into a single output directory, so two sources that share a base
/// name map to the same archive.
#[derive(Debug, Clone)]
pub struct Archiver {
    output_dir: PathBuf,
    compression: Compression,
}

/// An archive file on disk, as produced (or found) by [`Archiver::package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packaged {
    /// Absolute, resolved source directory.
    pub source: PathBuf,
    /// File name of the archive; doubles as the remote object key.
    pub name: String,
    /// Absolute path of the archive file.
    pub path: PathBuf,
    /// `true` if an existing archive was reused rather than rebuilt.
    pub reused: bool,
}

impl Archiver {
    pub fn new(output_dir: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Resolve a source directory to an absolute path and derive the name of
    /// its archive.
    ///
    /// # Errors
    /// - [`SourceNotFound`](ErrorKind::SourceNotFound) if the path does not
    ///   exist or cannot be stat'ed.
    /// - [`NotADirectory`](ErrorKind::NotADirectory) if it isn't a directory.
    /// - [`InvalidSource`](ErrorKind::InvalidSource) if it has no UTF-8 base
    ///   name (the filesystem root, for example).
    pub fn resolve(&self, source: impl AsRef<Path>) -> Result<(PathBuf, String)> {
        let requested = source.as_ref();
        let resolved = fs::canonicalize(requested).or_raise(|| ErrorKind::SourceNotFound(requested.to_path_buf()))?;
        if !resolved.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(resolved));
        }
        let base = resolved
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_raise(|| ErrorKind::InvalidSource(resolved.clone()))?;
        let name = format!("{base}{}", self.compression.archive_suffix());
        Ok((resolved, name))
    }

    /// Package `source` into an archive, or reuse the archive that is already
    /// there.
    ///
    /// An existing archive is left untouched unless `force` is set: no walk,
    /// no rewrite. Otherwise the tree is written to a temporary file next to
    /// the final archive and renamed into place only once the compression
    /// trailer has been written, so a failed run never leaves a truncated
    /// archive under the final name.
    #[instrument(skip_all, fields(source = %source.as_ref().display(), force))]
    pub fn package(&self, source: impl AsRef<Path>, force: bool) -> Result<Packaged> {
        let (source, name) = self.resolve(source)?;
        fs::create_dir_all(&self.output_dir).or_raise(|| ErrorKind::Io(self.output_dir.clone()))?;
        let output_dir = fs::canonicalize(&self.output_dir).or_raise(|| ErrorKind::Io(self.output_dir.clone()))?;
        let path = output_dir.join(&name);

        if !force && path.try_exists().or_raise(|| ErrorKind::Io(path.clone()))? {
            tracing::info!(archive = %path.display(), "Archive already exists; not recreating");
            return Ok(Packaged { source, name, path, reused: true });
        }

        tracing::info!(archive = %path.display(), compression = %self.compression, "Creating archive");
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".partial")
            .tempfile_in(&output_dir)
            .or_raise(|| ErrorKind::Io(output_dir.clone()))?;
        let entries = self.write_archive(&source, temp.as_file(), &[temp.path(), &path])?;
        // Unwrapping the io::Error drops the temporary, which deletes it.
        temp.persist(&path).map_err(|err| err.error).or_raise(|| ErrorKind::Io(path.clone()))?;
        tracing::info!(archive = %path.display(), entries, "Created archive");
        Ok(Packaged { source, name, path, reused: false })
    }

    /// Stream the tree rooted at `source` into `file`, returning the number
    /// of entries written.
    ///
    /// Entries are named relative to the source's parent, so everything sits
    /// under a single top-level directory named after the source. The walk
    /// is depth-first and sorted by file name within each directory, which is
    /// what makes the output byte-for-byte reproducible.
    fn write_archive(&self, source: &Path, file: &File, exclude: &[&Path]) -> Result<u64> {
        let root = source.file_name().ok_or_raise(|| ErrorKind::InvalidSource(source.to_path_buf()))?;
        let writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let encoder = self.compression.wrap_writer(writer).or_raise(|| ErrorKind::Compression)?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.mode(HeaderMode::Complete);

        let mut entries = 0;
        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(source).to_path_buf();
                    return Err(err).or_raise(|| ErrorKind::Io(path));
                },
            };
            let path = entry.path();
            if exclude.contains(&path) {
                continue;
            }
            let file_type = entry.file_type();
            if !(file_type.is_dir() || file_type.is_file() || file_type.is_symlink()) {
                tracing::warn!(path = %path.display(), "Skipping special file");
                continue;
            }
            let relative = path.strip_prefix(source).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
            let name = match relative.as_os_str().is_empty() {
                true => PathBuf::from(root),
                false => Path::new(root).join(relative),
            };
            tracing::trace!(entry = %name.display(), "Adding archive entry");
            match file_type.is_dir() {
                true => append_directory(&mut builder, path, &name)?,
                false => builder.append_path_with_name(path, &name).or_raise(|| ErrorKind::Io(path.to_path_buf()))?,
            }
            entries += 1;
        }

        let encoder = builder.into_inner().or_raise(|| ErrorKind::Io(source.to_path_buf()))?;
        let writer = encoder.finish().or_raise(|| ErrorKind::Compression)?;
        let file = writer.into_inner().map_err(|err| err.into_error()).or_raise(|| ErrorKind::Compression)?;
        file.sync_all().or_raise(|| ErrorKind::Io(source.to_path_buf()))?;
        Ok(entries)
    }
}

fn append_directory<W: Write>(builder: &mut tar::Builder<W>, path: &Path, name: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
    header.set_size(0);
    header.set_mtime(DIRECTORY_MTIME);
    builder
        .append_data(&mut header, name, io::empty())
        .or_raise(|| ErrorKind::Io(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_file;
    use std::io::Read;
    use tempfile::TempDir;

    /// `<tmp>/foo/{a.txt, empty/, sub/b.txt}`
    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("foo");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();
        fs::write(source.join("sub/b.txt"), b"nested").unwrap();
        (dir, source)
    }

    fn entries(path: &Path, compression: Compression) -> Vec<(PathBuf, tar::EntryType, Vec<u8>)> {
        let reader = compression.wrap_reader(File::open(path).unwrap()).unwrap();
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().into_owned();
                let kind = entry.header().entry_type();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                (name, kind, body)
            })
            .collect()
    }

    #[test]
    fn test_archive_name_and_location() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let packaged = Archiver::new(out.path(), Compression::Gzip).package(&source, false).unwrap();
        assert_eq!(packaged.name, "foo.tar.gz");
        assert_eq!(packaged.path, fs::canonicalize(out.path()).unwrap().join("foo.tar.gz"));
        assert_eq!(packaged.source, fs::canonicalize(&source).unwrap());
        assert!(!packaged.reused);
        // Nothing but the archive is left behind
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_archive_name_follows_compression() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let packaged = Archiver::new(out.path(), Compression::Bzip2).package(&source, false).unwrap();
        assert_eq!(packaged.name, "foo.tar.bz2");
        assert_eq!(entries(&packaged.path, Compression::Bzip2).len(), 5);
    }

    #[test]
    fn test_entries_are_rooted_and_sorted() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let packaged = Archiver::new(out.path(), Compression::Gzip).package(&source, false).unwrap();
        let entries = entries(&packaged.path, Compression::Gzip);
        let names: Vec<_> = entries.iter().map(|(name, _, _)| name.clone()).collect();
        assert_eq!(
            names,
            ["foo", "foo/a.txt", "foo/empty", "foo/sub", "foo/sub/b.txt"].map(PathBuf::from).to_vec()
        );
        assert_eq!(entries[0].1, tar::EntryType::Directory);
        assert_eq!(entries[1].1, tar::EntryType::Regular);
        assert_eq!(entries[1].2, b"hi");
        assert_eq!(entries[4].2, b"nested");
    }

    #[test]
    fn test_packaging_is_deterministic() {
        let (_dir, source) = fixture();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let a = Archiver::new(first.path(), Compression::Gzip).package(&source, true).unwrap();
        let b = Archiver::new(second.path(), Compression::Gzip).package(&source, true).unwrap();
        assert_eq!(fs::read(&a.path).unwrap(), fs::read(&b.path).unwrap());
        assert_eq!(digest_file(&a.path).unwrap(), digest_file(&b.path).unwrap());
    }

    #[test]
    fn test_existing_archive_is_reused() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(out.path(), Compression::Gzip);
        let first = archiver.package(&source, false).unwrap();
        let before = fs::read(&first.path).unwrap();

        fs::write(source.join("a.txt"), b"changed").unwrap();
        let second = archiver.package(&source, false).unwrap();
        assert!(second.reused);
        assert_eq!(second.path, first.path);
        assert_eq!(fs::read(&second.path).unwrap(), before);

        let forced = archiver.package(&source, true).unwrap();
        assert!(!forced.reused);
        assert_ne!(fs::read(&forced.path).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let (_dir, source) = fixture();
        std::os::unix::fs::symlink("a.txt", source.join("link")).unwrap();
        std::os::unix::fs::symlink("/definitely/not/here", source.join("dangling")).unwrap();
        let out = tempfile::tempdir().unwrap();
        let packaged = Archiver::new(out.path(), Compression::Gzip).package(&source, false).unwrap();

        let reader = Compression::Gzip.wrap_reader(File::open(&packaged.path).unwrap()).unwrap();
        let mut archive = tar::Archive::new(reader);
        let links: Vec<_> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.header().entry_type() == tar::EntryType::Symlink)
            .map(|entry| {
                let name = entry.path().unwrap().into_owned();
                let target = entry.link_name().unwrap().unwrap().into_owned();
                (name, target)
            })
            .collect();
        assert_eq!(
            links,
            vec![
                (PathBuf::from("foo/dangling"), PathBuf::from("/definitely/not/here")),
                (PathBuf::from("foo/link"), PathBuf::from("a.txt")),
            ]
        );
    }

    #[test]
    fn test_archive_inside_source_is_excluded() {
        let (_dir, source) = fixture();
        let archiver = Archiver::new(&source, Compression::Gzip);
        archiver.package(&source, false).unwrap();
        let packaged = archiver.package(&source, true).unwrap();
        let names: Vec<_> = entries(&packaged.path, Compression::Gzip).into_iter().map(|(name, _, _)| name).collect();
        assert_eq!(names.len(), 5);
        assert!(!names.iter().any(|name| name.to_string_lossy().contains("tar.gz")));
    }

    #[test]
    fn test_rebuild_into_source_is_deterministic() {
        let (_dir, source) = fixture();
        let archiver = Archiver::new(&source, Compression::Gzip);
        let first = fs::read(archiver.package(&source, true).unwrap().path).unwrap();
        // Directory mtimes only have whole-second resolution on some filesystems.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = fs::read(archiver.package(&source, true).unwrap().path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_directory_entries_have_fixed_mtime() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let packaged = Archiver::new(out.path(), Compression::None).package(&source, false).unwrap();
        let mut archive = tar::Archive::new(File::open(&packaged.path).unwrap());
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            match header.entry_type() {
                tar::EntryType::Directory => assert_eq!(header.mtime().unwrap(), DIRECTORY_MTIME),
                _ => assert_ne!(header.mtime().unwrap(), DIRECTORY_MTIME),
            }
        }
    }

    #[test]
    fn test_failed_package_commits_nothing() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        // A non-empty directory under the final name makes the rename fail.
        let blocker = out.path().join("foo.tar.gz");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"keep").unwrap();

        let err = Archiver::new(out.path(), Compression::Gzip).package(&source, true).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(path) if path.ends_with("foo.tar.gz")));
        let left: Vec<_> = fs::read_dir(out.path()).unwrap().map(|entry| entry.unwrap().file_name()).collect();
        assert_eq!(left, vec![std::ffi::OsString::from("foo.tar.gz")]);
        assert!(blocker.is_dir());
        assert_eq!(fs::read(blocker.join("keep")).unwrap(), b"keep");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archiver::new(dir.path(), Compression::Gzip).package(dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::SourceNotFound(_)));
    }

    #[test]
    fn test_source_must_be_directory() {
        let (_dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let err = Archiver::new(out.path(), Compression::Gzip).package(source.join("a.txt"), false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[test]
    fn test_relative_source_is_resolved() {
        let (dir, source) = fixture();
        let out = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(out.path(), Compression::Gzip);
        let (resolved, name) = archiver.resolve(source.join("sub/..")).unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path().join("foo")).unwrap());
        assert_eq!(name, "foo.tar.gz");
    }
}

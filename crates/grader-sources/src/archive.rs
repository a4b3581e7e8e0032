//! Archive helpers for repository tarballs.
//!
//! These functions do blocking filesystem work; async callers run them on
//! `spawn_blocking`.

use std::fs;
use std::io::Read;
use std::path::{Component, Path};
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use regex::Regex;
use tar::Archive;
use tracing::debug;

use crate::error::{AcquisitionError, AcquisitionResult};

/// Name the downloaded archive is written under inside the store directory.
pub const ARCHIVE_NAME: &str = "sources.tar.gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Longest suffixes first so `.tar.gz` is removed in one pass.
const ARCHIVE_EXTENSIONS: [&str; 4] = [".tar.gz", ".tgz", ".tar", ".gz"];
const MAX_EXTENSION_PASSES: usize = 4;

static FILENAME_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"filename=\s*"?([^";]+)"?"#).ok());

/// Extract the file name from a `content-disposition` header value.
///
/// Accepts `attachment; filename=name.tar.gz` with or without quotes.
/// Returns `None` when absent or when the name is not a single path
/// component.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let name = FILENAME_PARAM.as_ref()?.captures(header)?.get(1)?.as_str().trim();
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(name.to_string()),
        _ => None,
    }
}

/// Strip archive extensions (`.tar`, `.gz`, `.tar.gz`, `.tgz`) from the end
/// of `name`, repeatedly, in a bounded number of passes.
pub fn strip_archive_extensions(name: &str) -> &str {
    let mut stem = name;
    for _ in 0..MAX_EXTENSION_PASSES {
        let stripped = ARCHIVE_EXTENSIONS
            .iter()
            .find_map(|ext| stem.strip_suffix(ext))
            .filter(|s| !s.is_empty());
        match stripped {
            Some(s) => stem = s,
            None => break,
        }
    }
    stem
}

pub fn is_gzip(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = fs::File::open(path)?;
    let mut read = 0;
    while read < magic.len() {
        let n = file.read(&mut magic[read..])?;
        if n == 0 {
            return Ok(false);
        }
        read += n;
    }
    Ok(magic == GZIP_MAGIC)
}

/// Unpack `archive` into `dest` and delete the archive.
pub fn extract(archive: &Path, dest: &Path) -> AcquisitionResult<()> {
    let gzip = is_gzip(archive)?;
    let file = fs::File::open(archive)?;
    if gzip {
        Archive::new(GzDecoder::new(file)).unpack(dest)?;
    } else {
        Archive::new(file).unpack(dest)?;
    }
    fs::remove_file(archive)?;
    debug!(archive = %archive.display(), dest = %dest.display(), gzip, "Extracted archive");
    Ok(())
}

fn entry_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Move every entry of `dest/root` into `dest` and remove the then empty
/// `root` folder.
pub fn flatten_root(dest: &Path, root: &str) -> AcquisitionResult<()> {
    let root_path = dest.join(root);
    if !root_path.is_dir() {
        return Err(AcquisitionError::RootFolderMismatch {
            expected: root.to_string(),
            found: entry_names(dest)?,
        });
    }

    // Park the root under a name no entry can have, so a child sharing the
    // root's name can still move up.
    let parked = dest.join(format!(".{root}.flatten"));
    fs::rename(&root_path, &parked)?;

    for entry in fs::read_dir(&parked)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if target.exists() {
            return Err(AcquisitionError::FlattenCollision(target));
        }
        fs::rename(entry.path(), &target)?;
    }

    fs::remove_dir(&parked)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_forms() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename=acme-lab1-3f2a9c1.tar.gz"),
            Some("acme-lab1-3f2a9c1.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename=\"lab.tgz\"; size=10"),
            Some("lab.tgz".to_string())
        );
        assert_eq!(filename_from_content_disposition("attachment"), None);
        assert_eq!(
            filename_from_content_disposition("attachment; filename=../../etc.tar.gz"),
            None
        );
    }

    #[test]
    fn test_filename_pattern_compiles() {
        assert!(FILENAME_PARAM.is_some());
    }

    #[test]
    fn test_strip_archive_extensions() {
        assert_eq!(strip_archive_extensions("repo-abc.tar.gz"), "repo-abc");
        assert_eq!(strip_archive_extensions("repo-abc.tgz"), "repo-abc");
        assert_eq!(strip_archive_extensions("repo-abc.tar"), "repo-abc");
        assert_eq!(strip_archive_extensions("repo-abc.gz.tar.gz"), "repo-abc");
        assert_eq!(strip_archive_extensions("lib-v1.2"), "lib-v1.2");
        assert_eq!(strip_archive_extensions(".tar.gz"), ".tar.gz");
    }

    #[test]
    fn test_is_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("a");
        fs::write(&gz, [0x1f, 0x8b, 0x08]).unwrap();
        let plain = dir.path().join("b");
        fs::write(&plain, b"ustar").unwrap();
        let empty = dir.path().join("c");
        fs::write(&empty, b"").unwrap();

        assert!(is_gzip(&gz).unwrap());
        assert!(!is_gzip(&plain).unwrap());
        assert!(!is_gzip(&empty).unwrap());
    }

    #[test]
    fn test_flatten_moves_entries_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo-abc");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("main.c"), "int main(){}").unwrap();
        fs::write(root.join("src").join("util.c"), "").unwrap();

        flatten_root(dir.path(), "repo-abc").unwrap();

        assert_eq!(
            entry_names(dir.path()).unwrap(),
            vec!["main.c".to_string(), "src".to_string()]
        );
        assert!(dir.path().join("src").join("util.c").exists());
    }

    #[test]
    fn test_flatten_child_named_like_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src").join("src")).unwrap();
        fs::write(dir.path().join("src").join("src").join("lib.rs"), "").unwrap();

        flatten_root(dir.path(), "src").unwrap();

        assert_eq!(entry_names(dir.path()).unwrap(), vec!["src".to_string()]);
        assert!(dir.path().join("src").join("lib.rs").exists());
    }

    #[test]
    fn test_flatten_root_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("actual-root")).unwrap();

        let err = flatten_root(dir.path(), "announced-root").unwrap_err();
        match err {
            AcquisitionError::RootFolderMismatch { expected, found } => {
                assert_eq!(expected, "announced-root");
                assert_eq!(found, vec!["actual-root".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_flatten_collision() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("root")).unwrap();
        fs::write(dir.path().join("root").join("README"), "").unwrap();
        fs::write(dir.path().join("README"), "").unwrap();

        assert!(matches!(
            flatten_root(dir.path(), "root"),
            Err(AcquisitionError::FlattenCollision(_))
        ));
    }
}

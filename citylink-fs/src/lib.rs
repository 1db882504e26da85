//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! Besides directory preparation for the backing store and the CLI, this
//! crate resolves the file URIs carried by texture and library object
//! references: relative paths are taken from the import base directory,
//! `file://` prefixes are stripped and any other scheme is left unresolved.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// A texture or library URI after scheme inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUri {
    /// A local path, relative to the base directory unless absolute.
    Local(Utf8PathBuf),
    /// A URI with a scheme other than `file`.
    Unsupported {
        /// Lower-cased scheme, without the trailing `:`.
        scheme: String,
    },
}

impl FileUri {
    /// Classify `uri`.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use citylink_fs::FileUri;
    ///
    /// assert_eq!(
    ///     FileUri::parse("file:///data/roof.png"),
    ///     FileUri::Local(Utf8PathBuf::from("/data/roof.png"))
    /// );
    /// assert!(matches!(FileUri::parse("https://example.com/a.png"), FileUri::Unsupported { .. }));
    /// ```
    #[must_use]
    pub fn parse(uri: &str) -> Self {
        let trimmed = uri.trim();
        if let Some(path) = strip_prefix_ignore_case(trimmed, FILE_SCHEME) {
            return Self::Local(Utf8PathBuf::from(path));
        }
        match scheme_of(trimmed) {
            Some(scheme) => Self::Unsupported {
                scheme: scheme.to_ascii_lowercase(),
            },
            None => Self::Local(Utf8PathBuf::from(trimmed)),
        }
    }

    /// Resolve a local URI against `base_dir`; `None` for unsupported schemes.
    #[must_use]
    pub fn resolve(&self, base_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        match self {
            Self::Local(path) if path.is_absolute() => Some(path.clone()),
            Self::Local(path) => Some(base_dir.join(path)),
            Self::Unsupported { .. } => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

/// URI scheme per RFC 3986. Single letters are treated as drive letters.
fn scheme_of(value: &str) -> Option<&str> {
    let (scheme, _) = value.split_once(':')?;
    let mut chars = scheme.chars();
    let head = chars.next()?;
    let well_formed = head.is_ascii_alphabetic()
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
    (well_formed && scheme.len() > 1).then_some(scheme)
}

/// Media type inferred from a file extension.
#[must_use]
pub fn mime_type_for(path: &Utf8Path) -> &'static str {
    let extension = path.extension().map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("tif" | "tiff") => "image/tiff",
        Some("bmp") => "image/bmp",
        Some("rgb") => "image/x-rgb",
        _ => "application/octet-stream",
    }
}

/// Open a UTF-8 file path using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Read a whole file, returning `None` when it does not exist.
///
/// Every other I/O failure is returned as an error.
pub fn read_optional(path: &Utf8Path) -> io::Result<Option<Vec<u8>>> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let Some(file_name) = path.file_name() else {
        return Ok(None);
    };
    let (base_dir, relative) = match base_dir_and_relative(parent) {
        Ok(split) => split,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let target = relative.join(file_name);
    let mut file = match base_dir.open(&target) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Create `path` and all of its missing ancestors.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    if path.as_os_str().is_empty() || path == Utf8Path::new("/") {
        return Ok(());
    }
    let (base_dir, relative) = base_dir_and_relative(path)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Ensure the parent directory for `path` exists.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    path.parent().map_or(Ok(()), ensure_dir)
}

/// Split a path into an ambient root directory and a relative suffix, so that
/// `cap-std` can operate on it.
///
/// Relative paths are anchored at the working directory and `..` is folded
/// first, so a suffix never climbs out of its root.
pub fn base_dir_and_relative(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let absolute = anchored(path)?;
    let std_path = absolute.as_path();

    let (base, relative) = match std_path.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_path.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => return Err(io::Error::other(format!("{path} did not resolve to an absolute path"))),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative =
        Utf8PathBuf::from_path_buf(relative).map_err(|_| io::Error::other("non-UTF-8 path"))?;

    Ok((dir, relative))
}

/// Absolute form of `path` with `.` and `..` folded lexically.
fn anchored(path: &Utf8Path) -> io::Result<PathBuf> {
    let start = if path.as_str().is_empty() {
        Path::new(".")
    } else {
        path.as_std_path()
    };
    let mut folded = PathBuf::new();
    for component in std::path::absolute(start)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other),
        }
    }
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn scratch() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        (dir, path)
    }

    #[rstest]
    #[case("textures/roof.png", FileUri::Local(Utf8PathBuf::from("textures/roof.png")))]
    #[case("FILE:///srv/a.jpg", FileUri::Local(Utf8PathBuf::from("/srv/a.jpg")))]
    #[case("C:\\data\\a.png", FileUri::Local(Utf8PathBuf::from("C:\\data\\a.png")))]
    #[case("https://example.com/a.png", FileUri::Unsupported { scheme: "https".to_owned() })]
    #[case("HTTP://example.com/a.png", FileUri::Unsupported { scheme: "http".to_owned() })]
    fn classifies_uris(#[case] uri: &str, #[case] expected: FileUri) {
        assert_eq!(FileUri::parse(uri), expected);
    }

    #[rstest]
    fn relative_uris_join_the_base_dir() {
        let resolved = FileUri::parse("appearance/roof.png").resolve(Utf8Path::new("/import"));
        assert_eq!(resolved, Some(Utf8PathBuf::from("/import/appearance/roof.png")));
    }

    #[rstest]
    #[case("roof.PNG", "image/png")]
    #[case("roof.jpeg", "image/jpeg")]
    #[case("roof.tif", "image/tiff")]
    #[case("roof.rgb", "image/x-rgb")]
    #[case("model.obj", "application/octet-stream")]
    #[case("README", "application/octet-stream")]
    fn infers_mime_types(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(mime_type_for(Utf8Path::new(path)), expected);
    }

    #[rstest]
    fn reads_existing_files(scratch: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = scratch;
        let path = root.join("roof.png");
        std::fs::write(&path, b"PNG").expect("write texture");
        assert_eq!(
            read_optional(&path).expect("read texture"),
            Some(b"PNG".to_vec())
        );
    }

    #[rstest]
    fn missing_files_and_directories_are_absent(scratch: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = scratch;
        assert_eq!(read_optional(&root.join("nope.png")).expect("read"), None);
        assert_eq!(
            read_optional(&root.join("missing/nope.png")).expect("read"),
            None
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn relative_uris_may_climb_above_the_working_directory(scratch: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = scratch;
        std::fs::write(root.join("roof.png"), b"PNG").expect("write texture");
        let cwd = std::env::current_dir().expect("working directory");
        let depth = cwd
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .count();
        let uri = format!(
            "{}{}/roof.png",
            "../".repeat(depth),
            root.as_str().trim_start_matches('/')
        );
        let resolved = FileUri::parse(&uri)
            .resolve(Utf8Path::new("."))
            .expect("local uri");
        assert_eq!(
            read_optional(&resolved).expect("read texture"),
            Some(b"PNG".to_vec())
        );
    }

    #[rstest]
    fn directories_are_read_errors(scratch: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = scratch;
        std::fs::create_dir(root.join("atlas.png")).expect("create directory");
        read_optional(&root.join("atlas.png")).expect_err("a directory is not a texture");
    }

    #[rstest]
    fn ensure_dir_creates_nested_directories(scratch: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = scratch;
        let nested = root.join("a/b/c");
        ensure_dir(&nested).expect("create nested dirs");
        assert!(nested.is_dir());
        ensure_parent_dir(&nested.join("db.sqlite")).expect("parent exists already");
    }
}

//! Media locators handed to the engine.

use std::fmt;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// URI identifying the media a stream plays.
///
/// Bare filesystem paths are accepted and stored as `file://` URIs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaLocator {
    uri: String,
}

impl MediaLocator {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if has_scheme(trimmed) {
            Self {
                uri: trimmed.to_string(),
            }
        } else {
            Self::from_path(trimmed)
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        let text = absolute.to_string_lossy().replace('\\', "/");
        let uri = if text.starts_with('/') {
            format!("{FILE_SCHEME}{text}")
        } else {
            format!("{FILE_SCHEME}/{text}")
        };
        Self { uri }
    }

    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    /// Lower-case scheme, e.g. `file` or `http`.
    pub fn scheme(&self) -> &str {
        self.uri.split("://").next().unwrap_or_default()
    }

    /// Local path for `file://` locators.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        let rest = self.uri.strip_prefix(FILE_SCHEME)?;
        let decoded = percent_decode(rest);
        // `file:///C:/x` carries a leading slash before the drive letter.
        let bytes = decoded.as_bytes();
        if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
            return Some(PathBuf::from(&decoded[1..]));
        }
        Some(PathBuf::from(decoded))
    }

    /// File extension of the last path segment, lower-cased.
    pub fn extension(&self) -> Option<String> {
        let tail = self.uri.split(['?', '#']).next().unwrap_or(&self.uri);
        let file = tail.rsplit('/').next().unwrap_or(tail);
        let mut parts = file.rsplit('.');
        let ext = parts.next()?;
        if parts.next().is_some() && !ext.is_empty() {
            Some(ext.to_ascii_lowercase())
        } else {
            None
        }
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl From<&str> for MediaLocator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaLocator {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&Path> for MediaLocator {
    fn from(value: &Path) -> Self {
        Self::from_path(value)
    }
}

impl From<PathBuf> for MediaLocator {
    fn from(value: PathBuf) -> Self {
        Self::from_path(value)
    }
}

fn has_scheme(raw: &str) -> bool {
    match raw.split_once("://") {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

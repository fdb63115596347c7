use bstr::{BStr, BString, ByteSlice, ByteVec};

/// A normalized relative path or URL tail (always forward slashes,
/// no trailing slash unless the path is just "/").
///
/// The client internally represents paths with forward slashes
/// regardless of platform. This type enforces that invariant and
/// provides the ancestry operations the diff label code depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath(BString);

/// Check if a byte is a directory separator (handles both Unix and Windows).
#[inline]
fn is_dir_sep(c: u8) -> bool {
    c == b'/' || c == b'\\'
}

/// Check whether a target looks like a URL (`scheme://...`).
pub fn is_url(path: &BStr) -> bool {
    let Some(idx) = path.find(b"://") else {
        return false;
    };
    if idx == 0 {
        return false;
    }
    path[..idx]
        .iter()
        .all(|&c| c.is_ascii_alphanumeric() || c == b'+' || c == b'-' || c == b'.')
}

impl RelPath {
    /// Create from a byte slice, normalizing path separators to forward
    /// slashes and removing trailing slashes (unless the path is just "/").
    pub fn new(path: impl AsRef<[u8]>) -> Self {
        let path = path.as_ref();
        let mut normalized = BString::new(Vec::with_capacity(path.len()));

        for &b in path {
            if is_dir_sep(b) {
                normalized.push_byte(b'/');
            } else {
                normalized.push_byte(b);
            }
        }

        while normalized.len() > 1 && normalized.last() == Some(&b'/') {
            normalized.pop();
        }

        RelPath(normalized)
    }

    /// Get the raw bytes of this path.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Get this path as a `BStr`.
    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    /// True for the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Join two paths with '/'. An empty side yields the other side.
    pub fn join(&self, other: impl AsRef<[u8]>) -> RelPath {
        let other = other.as_ref();
        if other.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            return RelPath::new(other);
        }

        let mut result = self.0.clone();
        if result.last() != Some(&b'/') {
            result.push_byte(b'/');
        }
        result.extend_from_slice(other);
        RelPath::new(result)
    }

    /// Get the directory portion (like dirname).
    /// Returns "" if there is no directory component.
    pub fn dirname(&self) -> RelPath {
        let bytes = self.0.as_bytes();
        match bytes.iter().rposition(|&b| b == b'/') {
            Some(0) => RelPath::new("/"),
            Some(pos) => RelPath::new(&bytes[..pos]),
            None => RelPath::new(""),
        }
    }

    /// Get the filename portion (like basename).
    /// Returns the whole path if there is no directory separator.
    pub fn basename(&self) -> &BStr {
        let bytes = self.0.as_bytes();
        match bytes.iter().rposition(|&b| b == b'/') {
            Some(pos) => BStr::new(&bytes[pos + 1..]),
            None => BStr::new(bytes),
        }
    }

    /// Split into (dirname, basename). A URL splits on its last component.
    pub fn split(&self) -> (RelPath, BString) {
        (self.dirname(), self.basename().to_owned())
    }

    /// The longest common ancestor of two paths, component-wise.
    ///
    /// `foo/bar` and `foo/baz` share `foo`; `foo` and `foobar` share
    /// nothing. Two URLs only share an ancestor within the same scheme
    /// and host.
    pub fn longest_common_ancestor(&self, other: &RelPath) -> RelPath {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        let mut last_sep = 0;
        let mut i = 0;

        while i < a.len() && i < b.len() && a[i] == b[i] {
            if a[i] == b'/' {
                last_sep = i;
            }
            i += 1;
        }

        // Whole-path match, or one path is a proper prefix ending at a
        // component boundary.
        if i == a.len() && i == b.len() {
            return self.clone();
        }
        if i == a.len() && b.get(i) == Some(&b'/') {
            return self.clone();
        }
        if i == b.len() && a.get(i) == Some(&b'/') {
            return other.clone();
        }

        RelPath::new(&a[..last_sep])
    }

    /// If `self` is a strict descendant of `ancestor`, return the
    /// remainder relative to `ancestor`.
    pub fn skip_ancestor(&self, ancestor: &RelPath) -> Option<RelPath> {
        if ancestor.0.is_empty() {
            if self.0.is_empty() {
                return None;
            }
            return Some(self.clone());
        }
        let rest = self.0.as_bytes().strip_prefix(ancestor.0.as_bytes())?;
        match rest {
            [] => None,
            [b'/', tail @ ..] => Some(RelPath::new(tail)),
            _ => None,
        }
    }

    /// True if `self` and `other` name the same node.
    pub fn is_same(&self, other: &RelPath) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelPath {
    fn from(s: &str) -> Self {
        RelPath::new(s.as_bytes())
    }
}

impl From<&BStr> for RelPath {
    fn from(s: &BStr) -> Self {
        RelPath::new(s)
    }
}

/// A resolved revision number, or the invalid sentinel.
///
/// The invalid value stands for "working copy" in diff labels and
/// "not yet resolved" inside the diff driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revnum(Option<u64>);

impl Revnum {
    /// The invalid sentinel.
    pub const INVALID: Revnum = Revnum(None);

    /// A concrete revision number.
    pub fn new(n: u64) -> Self {
        Revnum(Some(n))
    }

    /// True unless this is the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// The number, if valid.
    pub fn number(&self) -> Option<u64> {
        self.0
    }
}

impl From<u64> for Revnum {
    fn from(n: u64) -> Self {
        Revnum::new(n)
    }
}

/// An unresolved revision specifier, as given on a command line.
///
/// `Base` and `Working` are the two "local" kinds: they can be
/// answered from working-copy metadata without a repository round
/// trip. Everything else requires the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevisionSpec {
    /// No revision given.
    #[default]
    Unspecified,
    /// An explicit revision number.
    Number(u64),
    /// The youngest revision in the repository.
    Head,
    /// The pristine base of the working-copy node.
    Base,
    /// The working-copy node itself, local modifications included.
    Working,
}

impl RevisionSpec {
    /// True for the kinds answerable from the working copy alone.
    pub fn is_local(&self) -> bool {
        matches!(self, RevisionSpec::Base | RevisionSpec::Working)
    }
}

/// The kind of a node in a tree, as reported by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// No node exists at this location.
    Absent,
    File,
    Dir,
}

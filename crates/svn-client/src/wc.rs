//! The abstract working-copy reader.
//!
//! Stands in for the working-copy metadata store: node kinds, URLs,
//! repository-relative paths, pristine and working properties and
//! contents, plus the two editor-based diff walks (local-only and
//! against a repository revision) that this crate drives but does not
//! implement.

use bstr::{BStr, BString};
use svn_utils::props::PropHash;
use svn_utils::{Canceller, NodeKind, RevisionSpec, Revnum};

use crate::callbacks::DiffCallbacks;
use crate::ra::RepositoryReader;
use crate::{ClientError, Depth};

/// Read access to a working copy. Paths are absolute, in the byte
/// encoding of the filesystem.
pub trait WorkingCopyReader {
    /// The on-disk kind of the node, with symlinks resolved.
    fn kind(&self, local_abspath: &BStr) -> Result<NodeKind, ClientError>;

    /// The repository URL of the node, if it has one.
    fn node_url(&self, local_abspath: &BStr) -> Result<Option<BString>, ClientError>;

    /// The node's path relative to the repository root.
    fn repos_relpath(&self, local_abspath: &BStr) -> Result<BString, ClientError>;

    /// The root directory of the working copy containing the node.
    fn wc_root(&self, local_abspath: &BStr) -> Result<BString, ClientError>;

    /// Split a target into (anchor, target): the parent directory and
    /// basename for files, (path, "") for directories.
    fn actual_target(&self, path: &BStr) -> Result<(BString, BString), ClientError>;

    /// Resolve a base-or-working revision specifier for the node.
    ///
    /// Fails with [`ClientError::BadRevision`] for nodes that have no
    /// base, such as locally added ones.
    fn base_revision(&self, local_abspath: &BStr, spec: RevisionSpec)
        -> Result<Revnum, ClientError>;

    /// Pristine (BASE) properties of the node.
    fn pristine_props(&self, local_abspath: &BStr) -> Result<PropHash, ClientError>;

    /// Actual (WORKING) properties of the node.
    fn working_props(&self, local_abspath: &BStr) -> Result<PropHash, ClientError>;

    /// Pristine (BASE) contents of a file.
    fn pristine_contents(&self, local_abspath: &BStr) -> Result<Vec<u8>, ClientError>;

    /// True when the node's origin is a copy.
    fn is_copy(&self, local_abspath: &BStr) -> Result<bool, ClientError>;

    /// The working file's contents with keyword expansion undone and
    /// line endings normalized to the repository form.
    fn detranslated_contents(&self, local_abspath: &BStr) -> Result<Vec<u8>, ClientError>;

    /// Walk local modifications below `anchor_abspath`, reporting each
    /// changed node into the callback set.
    #[allow(clippy::too_many_arguments)]
    fn walk_local_diff(
        &self,
        anchor_abspath: &BStr,
        callbacks: &mut dyn DiffCallbacks,
        depth: Depth,
        ignore_ancestry: bool,
        show_copies_as_adds: bool,
        use_git_diff_format: bool,
        changelists: &[BString],
        canceller: &Canceller,
    ) -> Result<(), ClientError>;

    /// Drive the editor-based diff of the working copy against
    /// `url@revision`, reporting into the callback set. With `reverse`
    /// set, the repository side is the newer one.
    #[allow(clippy::too_many_arguments)]
    fn crawl_repos_diff(
        &self,
        anchor_abspath: &BStr,
        target: &BStr,
        url: &BStr,
        revision: Revnum,
        ra: &dyn RepositoryReader,
        reverse: bool,
        depth: Depth,
        ignore_ancestry: bool,
        show_copies_as_adds: bool,
        use_git_diff_format: bool,
        changelists: &[BString],
        callbacks: &mut dyn DiffCallbacks,
        canceller: &Canceller,
    ) -> Result<(), ClientError>;
}

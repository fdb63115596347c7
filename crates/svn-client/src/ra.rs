//! The abstract repository reader.
//!
//! Stands in for the remote-access session: node kinds and contents at
//! a revision, repository-root-relative paths, revision resolution,
//! history tracing for peg revisions, and the tree-level change replay
//! that drives repository-to-repository diffs.

use std::collections::BTreeMap;

use bstr::{BStr, BString};
use svn_utils::props::PropHash;
use svn_utils::{Canceller, NodeKind, RevisionSpec, Revnum};

use crate::callbacks::DiffCallbacks;
use crate::{ClientError, Depth};

/// Read access to a repository, keyed by absolute URL.
pub trait RepositoryReader {
    /// The kind of the node at `url` in `revision`.
    fn check_path(&self, url: &BStr, revision: Revnum) -> Result<NodeKind, ClientError>;

    /// Fetch a file's content and properties.
    fn get_file(&self, url: &BStr, revision: Revnum) -> Result<(Vec<u8>, PropHash), ClientError>;

    /// Fetch a directory's entries (name to kind) and properties.
    fn get_dir(
        &self,
        url: &BStr,
        revision: Revnum,
    ) -> Result<(BTreeMap<BString, NodeKind>, PropHash), ClientError>;

    /// The path of `url` relative to the repository root.
    fn path_relative_to_root(&self, url: &BStr) -> Result<BString, ClientError>;

    /// Resolve a revision specifier against `url`.
    fn resolve_revision(&self, url: &BStr, spec: RevisionSpec) -> Result<Revnum, ClientError>;

    /// Follow history from `path_or_url@peg` to `revision` and return
    /// the URL the object has there.
    ///
    /// Fails with [`ClientError::NotFound`] or
    /// [`ClientError::UnrelatedResources`] when the object has no
    /// location in `revision`; peg resolution treats both as "absent".
    fn trace_locations(
        &self,
        path_or_url: &BStr,
        peg_revision: RevisionSpec,
        revision: RevisionSpec,
    ) -> Result<BString, ClientError>;

    /// Replay the changes between `url1@rev1` and `url2@rev2` into the
    /// callback set, rooted at `anchor1` with `target1` as the diff
    /// target (empty for a directory anchor).
    #[allow(clippy::too_many_arguments)]
    fn replay_diff(
        &self,
        anchor1: &BStr,
        target1: &BStr,
        rev1: Revnum,
        url2: &BStr,
        rev2: Revnum,
        depth: Depth,
        ignore_ancestry: bool,
        callbacks: &mut dyn DiffCallbacks,
        canceller: &Canceller,
    ) -> Result<(), ClientError>;
}

//! The diff callback capability set.
//!
//! Drivers and tree walkers report every changed node through this
//! trait; the text front-end in [`crate::writer`] implements it to
//! render unified diff output. Content sides arrive as paths to
//! temporary (or working) files on disk.

use std::path::Path;

use bstr::BStr;
use svn_utils::props::{PropChange, PropHash};
use svn_utils::Revnum;

use crate::ClientError;

/// Result state of a single callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyState {
    #[default]
    Unknown,
    Unchanged,
    Changed,
    Merged,
    Conflicted,
    Missing,
    Obstructed,
}

/// What a callback reports back to the driver.
///
/// The text front-end has nothing to report: states stay unknown and
/// nothing ever flags a tree conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackOutcome {
    pub content_state: NotifyState,
    pub prop_state: NotifyState,
    pub tree_conflicted: bool,
}

/// The capability set required from a diff consumer.
#[allow(clippy::too_many_arguments)]
pub trait DiffCallbacks {
    /// A file diff is about to be reported.
    fn file_opened(&mut self, path: &BStr, revision: Revnum)
        -> Result<CallbackOutcome, ClientError>;

    /// A file changed in content and/or properties.
    fn file_changed(
        &mut self,
        path: &BStr,
        tmpfile1: Option<&Path>,
        tmpfile2: Option<&Path>,
        rev1: Revnum,
        rev2: Revnum,
        mimetype1: Option<&BStr>,
        mimetype2: Option<&BStr>,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError>;

    /// A file was added, possibly as a copy.
    fn file_added(
        &mut self,
        path: &BStr,
        tmpfile1: Option<&Path>,
        tmpfile2: Option<&Path>,
        rev1: Revnum,
        rev2: Revnum,
        mimetype1: Option<&BStr>,
        mimetype2: Option<&BStr>,
        copyfrom_path: Option<&BStr>,
        copyfrom_revision: Revnum,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError>;

    /// A file was deleted.
    fn file_deleted(
        &mut self,
        path: &BStr,
        tmpfile1: Option<&Path>,
        tmpfile2: Option<&Path>,
        mimetype1: Option<&BStr>,
        mimetype2: Option<&BStr>,
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError>;

    /// A directory is about to be visited.
    fn dir_opened(&mut self, path: &BStr, revision: Revnum)
        -> Result<CallbackOutcome, ClientError>;

    /// A directory was added.
    fn dir_added(
        &mut self,
        path: &BStr,
        revision: Revnum,
        copyfrom_path: Option<&BStr>,
        copyfrom_revision: Revnum,
    ) -> Result<CallbackOutcome, ClientError>;

    /// A directory was deleted.
    fn dir_deleted(&mut self, path: &BStr) -> Result<CallbackOutcome, ClientError>;

    /// A directory's properties changed.
    fn dir_props_changed(
        &mut self,
        path: &BStr,
        dir_was_added: bool,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError>;

    /// A directory visit finished.
    fn dir_closed(
        &mut self,
        path: &BStr,
        dir_was_added: bool,
    ) -> Result<CallbackOutcome, ClientError>;
}

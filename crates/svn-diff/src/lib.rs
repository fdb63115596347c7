//! Unified diff consumer.
//!
//! Parses unified-diff files (classical or git-extended) into
//! structured patches: per-file operation, hunks, property patches,
//! embedded merge tracking data, and base85-encoded binary blobs.
//! Hunk text and binary payloads stay in the patch file and are
//! materialized on demand through the readers in [`hunk`] and
//! [`binary`].

pub mod binary;
pub mod hunk;
pub mod parser;
pub mod patch_file;

use std::collections::BTreeMap;

use bstr::BString;
use svn_mergeinfo::Mergeinfo;
use svn_utils::Tristate;

pub use binary::BinaryStream;
pub use hunk::{hunk_adds_single_line, hunk_deletes_single_line};
pub use parser::next_patch;
pub use patch_file::PatchFile;

/// What a patch does to its target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffOperation {
    #[default]
    Unchanged,
    Added,
    Deleted,
    Modified,
    Copied,
    Moved,
}

impl DiffOperation {
    /// The operation undoing this one. Only add and delete swap;
    /// copies and moves keep their kind and merely change direction.
    pub fn reversed(self) -> Self {
        match self {
            DiffOperation::Added => DiffOperation::Deleted,
            DiffOperation::Deleted => DiffOperation::Added,
            other => other,
        }
    }
}

/// A byte range into the backing patch file, with a read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HunkRange {
    pub start: u64,
    pub current: u64,
    pub end: u64,
}

impl HunkRange {
    fn at(start: u64, end: u64) -> Self {
        HunkRange {
            start,
            current: start,
            end,
        }
    }

    fn reset(&mut self) {
        self.current = self.start;
    }
}

/// One `@@` (or `##`) delimited region of a patch.
///
/// The hunk's text is not stored here; the three ranges index into the
/// patch file the hunk was parsed from, and the readers in [`hunk`]
/// reconstruct the original or modified text on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub(crate) original_start: u64,
    pub(crate) original_length: u64,
    pub(crate) modified_start: u64,
    pub(crate) modified_length: u64,

    /// Unchanged lines before the first change.
    pub(crate) leading_context: u64,
    /// Unchanged lines after the last change.
    pub(crate) trailing_context: u64,

    /// Penalty accrued when the header's declared counts do not match
    /// the body actually present.
    pub(crate) original_fuzz: u64,
    pub(crate) modified_fuzz: u64,

    /// Set by a `\ No newline at end of ...` marker.
    pub(crate) original_no_final_eol: bool,
    pub(crate) modified_no_final_eol: bool,

    /// The whole hunk body, prefix characters included.
    pub(crate) diff_text_range: HunkRange,
    /// The minus-plus-context reconstruction of the original side.
    pub(crate) original_text_range: HunkRange,
    /// The plus-plus-context reconstruction of the modified side.
    pub(crate) modified_text_range: HunkRange,

    /// Copied from the owning patch; swaps the sense of every
    /// reverse-aware accessor and reader.
    pub(crate) reverse: bool,
}

impl Hunk {
    pub(crate) fn new() -> Self {
        Hunk {
            original_start: 0,
            original_length: 0,
            modified_start: 0,
            modified_length: 0,
            leading_context: 0,
            trailing_context: 0,
            original_fuzz: 0,
            modified_fuzz: 0,
            original_no_final_eol: false,
            modified_no_final_eol: false,
            diff_text_range: HunkRange::default(),
            original_text_range: HunkRange::default(),
            modified_text_range: HunkRange::default(),
            reverse: false,
        }
    }
}

/// A patch against a single property rather than file content.
///
/// Property hunks use `##` as their delimiter in the patch file but
/// are ordinary hunks internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropPatch {
    pub name: BString,
    pub operation: DiffOperation,
    pub hunks: Vec<Hunk>,
}

/// Offsets of a git binary patch's base85 sections, plus the declared
/// expanded sizes of both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinaryPatch {
    pub src_start: u64,
    pub src_end: u64,
    /// Expanded (decompressed) size of the original side.
    pub src_filesize: u64,

    pub dst_start: u64,
    pub dst_end: u64,
    /// Expanded (decompressed) size of the result side.
    pub dst_filesize: u64,
}

/// A fully parsed patch for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// The target as it was before the change. In git mode this is
    /// relative to the repository root.
    pub old_filename: BString,
    /// The target as it is after the change.
    pub new_filename: BString,

    pub operation: DiffOperation,

    /// Mode bits carried by git extended headers.
    pub old_executable_bit: Tristate,
    pub new_executable_bit: Tristate,
    pub old_symlink_bit: Tristate,
    pub new_symlink_bit: Tristate,

    /// Content hunks, sorted by original start line.
    pub hunks: Vec<Hunk>,

    /// Property patches by property name. Never contains
    /// `svn:mergeinfo`; that data lives in the two fields below.
    pub prop_patches: BTreeMap<BString, PropPatch>,

    /// Forward merges recorded by an `svn:mergeinfo` hunk.
    pub mergeinfo: Option<Mergeinfo>,
    /// Reverse merges recorded by an `svn:mergeinfo` hunk.
    pub reverse_mergeinfo: Option<Mergeinfo>,

    pub binary_patch: Option<BinaryPatch>,

    /// True when the patch was parsed to be applied in reverse.
    pub reverse: bool,
}

/// Errors raised by the diff consumer.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("unexpected data: {0}")]
    UnexpectedData(String),

    #[error("invalid file mode '{0}'")]
    InvalidMode(BString),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<svn_utils::UtilError> for DiffError {
    fn from(err: svn_utils::UtilError) -> Self {
        match err {
            svn_utils::UtilError::Cancelled => DiffError::Cancelled,
            svn_utils::UtilError::Io(e) => DiffError::Io(e),
            other => DiffError::UnexpectedData(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_reversal() {
        assert_eq!(DiffOperation::Added.reversed(), DiffOperation::Deleted);
        assert_eq!(DiffOperation::Deleted.reversed(), DiffOperation::Added);
        assert_eq!(DiffOperation::Modified.reversed(), DiffOperation::Modified);
        assert_eq!(DiffOperation::Copied.reversed(), DiffOperation::Copied);
        assert_eq!(DiffOperation::Moved.reversed(), DiffOperation::Moved);
        assert_eq!(
            DiffOperation::Unchanged.reversed(),
            DiffOperation::Unchanged
        );
    }

    #[test]
    fn range_reset() {
        let mut range = HunkRange::at(10, 30);
        range.current = 25;
        range.reset();
        assert_eq!(range.current, 10);
        assert_eq!(range.end, 30);
    }
}

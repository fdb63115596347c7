//! The abstract text differ.
//!
//! Byte-level diff computation and unified-format printing live
//! outside this crate; the front-end only needs the operations below.
//! Property diffs go through [`TextDiffer::write_unified_strings`]
//! with `##` as the hunk delimiter and the per-file header suppressed.

use std::io::Write;
use std::path::Path;

use bstr::BStr;

use crate::ClientError;

/// Options accepted by the text differ, parsed from the
/// `diff-extensions` configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffTextOptions {
    /// `-w` / `--ignore-all-space`.
    pub ignore_all_space: bool,
    /// `-b` / `--ignore-space-change`.
    pub ignore_space_change: bool,
    /// `--ignore-eol-style`.
    pub ignore_eol_style: bool,
    /// `-p` / `--show-c-function`.
    pub show_c_function: bool,
}

impl DiffTextOptions {
    /// Parse a whitespace-split argument list; unknown flags are
    /// ignored so an external-diff argument list can be reused here.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut options = DiffTextOptions::default();
        for arg in args {
            match arg.as_ref() {
                "-w" | "--ignore-all-space" => options.ignore_all_space = true,
                "-b" | "--ignore-space-change" => options.ignore_space_change = true,
                "--ignore-eol-style" => options.ignore_eol_style = true,
                "-p" | "--show-c-function" => options.show_c_function = true,
                _ => {}
            }
        }
        options
    }
}

/// The byte-level diff engine this crate delegates to.
pub trait TextDiffer {
    /// An opaque computed diff between two files.
    type FileDiff;

    /// Compare two files on disk.
    fn diff_files(
        &self,
        original: &Path,
        modified: &Path,
        options: &DiffTextOptions,
    ) -> Result<Self::FileDiff, ClientError>;

    /// True when the computed diff contains any changes.
    fn contains_diffs(&self, diff: &Self::FileDiff) -> bool;

    /// Write the diff in unified format, with `@@` hunk headers and
    /// the given `---`/`+++` labels.
    #[allow(clippy::too_many_arguments)]
    fn write_unified(
        &self,
        out: &mut dyn Write,
        diff: &Self::FileDiff,
        original: &Path,
        modified: &Path,
        label1: &BStr,
        label2: &BStr,
        show_c_function: bool,
    ) -> Result<(), ClientError>;

    /// Diff two in-memory values and write unified output with the
    /// given hunk delimiter and no per-file header. Returns true when
    /// the two values differ.
    fn write_unified_strings(
        &self,
        out: &mut dyn Write,
        original: &[u8],
        modified: &[u8],
        hunk_delimiter: &str,
        options: &DiffTextOptions,
    ) -> Result<bool, ClientError>;
}

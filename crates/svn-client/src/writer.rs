//! The unified-diff text front-end.
//!
//! Implements the diff callback set by rendering classical headers
//! (`Index:` plus a ruler, `---`/`+++` labels), optional git extended
//! headers, content hunks through the text differ or an external diff
//! program, and property change sections.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use svn_utils::path::RelPath;
use svn_utils::props::{prop_kind, PropChange, PropHash, PropKind};
use svn_utils::Revnum;

use crate::callbacks::{CallbackOutcome, DiffCallbacks};
use crate::config::DiffConfig;
use crate::differ::{DiffTextOptions, TextDiffer};
use crate::driver::DiffRequest;
use crate::external::run_external_diff;
use crate::header::{print_git_diff_header, Operation};
use crate::labels::{adjust_paths_for_diff_labels, adjust_relative_to_repos_root, diff_label};
use crate::props::{display_prop_diffs, PropDiffContext};
use crate::ra::RepositoryReader;
use crate::wc::WorkingCopyReader;
use crate::ClientError;

/// The ruler under `Index:` lines.
pub(crate) const EQUAL_STRING: &str =
    "===================================================================";
/// The ruler under `Property changes on:` lines.
pub(crate) const UNDER_STRING: &str =
    "___________________________________________________________________";

/// True for mime types the diff engine refuses to show as text.
fn mime_type_is_binary(mime_type: &BStr) -> bool {
    !(mime_type.starts_with(b"text/")
        || mime_type == "image/x-xbitmap"
        || mime_type == "image/x-xpixmap")
}

/// The text front-end: a [`DiffCallbacks`] implementation writing
/// unified diff output to a stream.
pub struct DiffWriter<'a, W: Write, D: TextDiffer> {
    out: W,
    differ: &'a D,

    /// The two original diff targets, for label display.
    pub(crate) orig_path_1: BString,
    pub(crate) orig_path_2: BString,
    /// Fallback revisions for callbacks that do not carry their own.
    pub(crate) revnum1: Revnum,
    pub(crate) revnum2: Revnum,
    /// Prefixed before callback paths.
    pub(crate) anchor: Option<BString>,
    /// Root of a working copy involved in a repos-wc diff.
    pub(crate) wc_root: Option<BString>,
    pub(crate) ra: Option<&'a dyn RepositoryReader>,
    pub(crate) wc: Option<&'a dyn WorkingCopyReader>,

    use_git_diff_format: bool,
    no_diff_deleted: bool,
    ignore_content_type: bool,
    relative_to: Option<BString>,
    /// Show a diff even when the content is identical.
    force_empty: bool,

    diff_cmd: Option<String>,
    diff_extensions: Vec<String>,
    text_options: DiffTextOptions,

    /// Exit code of the most recent external diff invocation.
    pub last_external_exit_code: Option<i32>,

    /// Paths a diff header was already printed for, so the property
    /// section does not print a second one.
    visited_paths: HashSet<BString>,
}

impl<'a, W: Write, D: TextDiffer> DiffWriter<'a, W, D> {
    /// Build a front-end for one diff request.
    pub fn new(
        out: W,
        differ: &'a D,
        config: &DiffConfig,
        request: &DiffRequest,
        ra: Option<&'a dyn RepositoryReader>,
        wc: Option<&'a dyn WorkingCopyReader>,
    ) -> Self {
        DiffWriter {
            out,
            differ,
            orig_path_1: request.path1.clone(),
            orig_path_2: request.path2.clone(),
            revnum1: Revnum::INVALID,
            revnum2: Revnum::INVALID,
            anchor: None,
            wc_root: None,
            ra,
            wc,
            use_git_diff_format: request.use_git_diff_format,
            no_diff_deleted: request.no_diff_deleted,
            ignore_content_type: request.ignore_content_type,
            relative_to: request.relative_to.clone(),
            force_empty: false,
            diff_cmd: config.diff_cmd.clone(),
            diff_extensions: config.diff_extensions.clone(),
            text_options: DiffTextOptions::from_args(&config.diff_extensions),
            last_external_exit_code: None,
            visited_paths: HashSet::new(),
        }
    }

    /// Prefix the anchor onto a callback path.
    fn local_path(&self, path: &BStr) -> BString {
        match &self.anchor {
            Some(anchor) => BString::from(RelPath::new(anchor).join(path).as_bytes()),
            None => BString::from(path),
        }
    }

    fn mark_visited(&mut self, path: &BStr) {
        self.visited_paths.insert(BString::from(path));
    }

    /// Write the diff for one file's content change.
    #[allow(clippy::too_many_arguments)]
    fn diff_content_changed(
        &mut self,
        path: &BStr,
        tmpfile1: &Path,
        tmpfile2: &Path,
        rev1: Revnum,
        rev2: Revnum,
        mimetype1: Option<&BStr>,
        mimetype2: Option<&BStr>,
        operation: Operation,
        copyfrom_path: Option<&BStr>,
    ) -> Result<(), ClientError> {
        // A diff rooted at the working copy root has an empty path.
        let path = if path.is_empty() {
            BString::from(".")
        } else {
            BString::from(path)
        };

        let (display_path, adjusted1, adjusted2) = adjust_paths_for_diff_labels(
            path.as_bstr(),
            self.orig_path_1.as_bstr(),
            self.orig_path_2.as_bstr(),
            self.relative_to.as_ref().map(|p| p.as_bstr()),
        )?;

        let mut label1 = diff_label(adjusted1.as_bstr(), rev1);
        let mut label2 = diff_label(adjusted2.as_bstr(), rev2);

        let mt1_binary = mimetype1.is_some_and(mime_type_is_binary);
        let mt2_binary = mimetype2.is_some_and(mime_type_is_binary);

        if !self.ignore_content_type && (mt1_binary || mt2_binary) {
            write!(self.out, "Index: {display_path}\n{EQUAL_STRING}\n")?;
            writeln!(self.out, "Cannot display: file marked as a binary type.")?;

            match (mimetype1, mimetype2) {
                (Some(m1), None) => writeln!(self.out, "svn:mime-type = {m1}")?,
                (None, Some(m2)) => writeln!(self.out, "svn:mime-type = {m2}")?,
                (Some(m1), Some(m2)) if m1 == m2 => {
                    writeln!(self.out, "svn:mime-type = {m1}")?
                }
                (Some(m1), Some(m2)) => {
                    writeln!(self.out, "svn:mime-type = ({m1}, {m2})")?
                }
                (None, None) => {}
            }
            return Ok(());
        }

        if let Some(diff_cmd) = self.diff_cmd.clone() {
            write!(self.out, "Index: {display_path}\n{EQUAL_STRING}\n")?;

            // The 'Index:' and '===' lines are ours; the rest is up to
            // the external diff program, which may not know about git
            // headers, so none are printed here.
            let exit_code = run_external_diff(
                &mut self.out,
                &diff_cmd,
                &self.diff_extensions,
                label1.as_bstr(),
                label2.as_bstr(),
                tmpfile1,
                tmpfile2,
            )?;
            self.last_external_exit_code = Some(exit_code);

            self.mark_visited(path.as_bstr());
            return Ok(());
        }

        let diff = self
            .differ
            .diff_files(tmpfile1, tmpfile2, &self.text_options)?;
        let contains_diffs = self.differ.contains_diffs(&diff);

        if contains_diffs || self.force_empty || self.use_git_diff_format {
            write!(self.out, "Index: {display_path}\n{EQUAL_STRING}\n")?;

            if self.use_git_diff_format {
                let repos_relpath1 = adjust_relative_to_repos_root(
                    path.as_bstr(),
                    self.orig_path_1.as_bstr(),
                    self.ra,
                    self.wc,
                    self.wc_root.as_ref().map(|p| p.as_bstr()),
                )?;
                let repos_relpath2 = adjust_relative_to_repos_root(
                    path.as_bstr(),
                    self.orig_path_2.as_bstr(),
                    self.ra,
                    self.wc,
                    self.wc_root.as_ref().map(|p| p.as_bstr()),
                )?;
                (label1, label2) = print_git_diff_header(
                    &mut self.out,
                    operation,
                    repos_relpath1.as_bstr(),
                    repos_relpath2.as_bstr(),
                    rev1,
                    rev2,
                    copyfrom_path,
                )?;
            }

            if contains_diffs || self.force_empty {
                self.differ.write_unified(
                    &mut self.out,
                    &diff,
                    tmpfile1,
                    tmpfile2,
                    label1.as_bstr(),
                    label2.as_bstr(),
                    self.text_options.show_c_function,
                )?;
            }

            self.mark_visited(path.as_bstr());
        }

        Ok(())
    }

    /// Write the property change section for one path, with a diff
    /// header unless one was already printed for it.
    fn diff_props_changed(
        &mut self,
        path: &BStr,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<(), ClientError> {
        let regular: Vec<PropChange> = prop_changes
            .iter()
            .filter(|change| prop_kind(change.name.as_bstr()) == PropKind::Regular)
            .cloned()
            .collect();
        if regular.is_empty() {
            return Ok(());
        }

        let show_diff_header = !self.visited_paths.contains(path);

        let ctx = PropDiffContext {
            orig_path_1: self.orig_path_1.as_bstr(),
            orig_path_2: self.orig_path_2.as_bstr(),
            rev1: self.revnum1,
            rev2: self.revnum2,
            relative_to: self.relative_to.as_ref().map(|p| p.as_bstr()),
            show_diff_header,
            use_git_diff_format: self.use_git_diff_format,
            ra: self.ra,
            wc: self.wc,
            wc_root: self.wc_root.as_ref().map(|p| p.as_bstr()),
            text_options: &self.text_options,
        };
        display_prop_diffs(&mut self.out, self.differ, &regular, original_props, path, &ctx)?;

        if show_diff_header {
            self.mark_visited(path);
        }

        Ok(())
    }
}

impl<W: Write, D: TextDiffer> DiffCallbacks for DiffWriter<'_, W, D> {
    fn file_opened(
        &mut self,
        _path: &BStr,
        _revision: Revnum,
    ) -> Result<CallbackOutcome, ClientError> {
        Ok(CallbackOutcome::default())
    }

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
    ) -> Result<CallbackOutcome, ClientError> {
        let path = self.local_path(path);

        if let (Some(tmpfile1), Some(tmpfile2)) = (tmpfile1, tmpfile2) {
            self.diff_content_changed(
                path.as_bstr(),
                tmpfile1,
                tmpfile2,
                rev1,
                rev2,
                mimetype1,
                mimetype2,
                Operation::Modified,
                None,
            )?;
        }
        if !prop_changes.is_empty() {
            self.diff_props_changed(path.as_bstr(), prop_changes, original_props)?;
        }

        Ok(CallbackOutcome::default())
    }

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
        _copyfrom_revision: Revnum,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError> {
        let path = self.local_path(path);

        if let (Some(tmpfile1), Some(tmpfile2)) = (tmpfile1, tmpfile2) {
            let operation = if copyfrom_path.is_some() {
                Operation::Copied
            } else {
                Operation::Added
            };
            self.diff_content_changed(
                path.as_bstr(),
                tmpfile1,
                tmpfile2,
                rev1,
                rev2,
                mimetype1,
                mimetype2,
                operation,
                copyfrom_path,
            )?;
        }
        if !prop_changes.is_empty() {
            self.diff_props_changed(path.as_bstr(), prop_changes, original_props)?;
        }

        Ok(CallbackOutcome::default())
    }

    fn file_deleted(
        &mut self,
        path: &BStr,
        tmpfile1: Option<&Path>,
        tmpfile2: Option<&Path>,
        mimetype1: Option<&BStr>,
        mimetype2: Option<&BStr>,
        _original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError> {
        let path = self.local_path(path);

        if self.no_diff_deleted {
            let display_path = if path.is_empty() {
                BString::from(".")
            } else {
                path.clone()
            };
            write!(
                self.out,
                "Index: {display_path} (deleted)\n{EQUAL_STRING}\n"
            )?;
            self.mark_visited(path.as_bstr());
        } else if let (Some(tmpfile1), Some(tmpfile2)) = (tmpfile1, tmpfile2) {
            self.diff_content_changed(
                path.as_bstr(),
                tmpfile1,
                tmpfile2,
                self.revnum1,
                self.revnum2,
                mimetype1,
                mimetype2,
                Operation::Deleted,
                None,
            )?;
        }

        Ok(CallbackOutcome::default())
    }

    fn dir_opened(
        &mut self,
        _path: &BStr,
        _revision: Revnum,
    ) -> Result<CallbackOutcome, ClientError> {
        Ok(CallbackOutcome::default())
    }

    fn dir_added(
        &mut self,
        _path: &BStr,
        _revision: Revnum,
        _copyfrom_path: Option<&BStr>,
        _copyfrom_revision: Revnum,
    ) -> Result<CallbackOutcome, ClientError> {
        Ok(CallbackOutcome::default())
    }

    fn dir_deleted(&mut self, _path: &BStr) -> Result<CallbackOutcome, ClientError> {
        Ok(CallbackOutcome::default())
    }

    fn dir_props_changed(
        &mut self,
        path: &BStr,
        _dir_was_added: bool,
        prop_changes: &[PropChange],
        original_props: &PropHash,
    ) -> Result<CallbackOutcome, ClientError> {
        let path = self.local_path(path);
        self.diff_props_changed(path.as_bstr(), prop_changes, original_props)?;
        Ok(CallbackOutcome::default())
    }

    fn dir_closed(
        &mut self,
        _path: &BStr,
        _dir_was_added: bool,
    ) -> Result<CallbackOutcome, ClientError> {
        Ok(CallbackOutcome::default())
    }
}

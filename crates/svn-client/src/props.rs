//! Property change sections of the diff output.
//!
//! Property changes are reported per path under a `Property changes
//! on:` ruler, one `Added:`/`Deleted:`/`Modified:` block per property,
//! with `##`-delimited hunks. `svn:mergeinfo` gets a human-readable
//! rendering of the merged and reverse-merged revision ranges instead
//! of a raw text diff, unless its value fails to parse.

use std::io::Write;

use bstr::{BStr, BString, ByteSlice};
use svn_mergeinfo::MergeinfoError;
use svn_utils::props::{PropChange, PropHash, PROP_MERGEINFO};
use svn_utils::Revnum;

use crate::differ::{DiffTextOptions, TextDiffer};
use crate::header::{print_git_diff_header, Operation};
use crate::labels::{adjust_paths_for_diff_labels, adjust_relative_to_repos_root, diff_label};
use crate::ra::RepositoryReader;
use crate::wc::WorkingCopyReader;
use crate::writer::{EQUAL_STRING, UNDER_STRING};
use crate::ClientError;

/// Append the platform EOL to a property value that lacks one, and
/// report whether it already had one.
///
/// The appended EOL keeps the text differ from emitting its own
/// `\ No newline at end of file` line; the property-specific marker is
/// added by the caller instead.
fn maybe_append_eol(value: &BStr) -> (BString, bool) {
    if value.is_empty() {
        return (BString::from(""), false);
    }

    match value.last_byte() {
        Some(b'\r') | Some(b'\n') => (BString::from(value), true),
        _ => {
            let mut with_eol = BString::from(value);
            with_eol.push(b'\n');
            (with_eol, false)
        }
    }
}

/// Pretty-print an `svn:mergeinfo` change as merged/reverse-merged
/// revision ranges, with a `##` hunk header carrying the counts.
fn display_mergeinfo_diff(
    out: &mut dyn Write,
    old_value: Option<&BStr>,
    new_value: Option<&BStr>,
) -> Result<(), ClientError> {
    let old_mergeinfo = match old_value {
        Some(value) => svn_mergeinfo::parse(value)?,
        None => Default::default(),
    };
    let new_mergeinfo = match new_value {
        Some(value) => svn_mergeinfo::parse(value)?,
        None => Default::default(),
    };

    let (deleted, added) = svn_mergeinfo::diff(&old_mergeinfo, &new_mergeinfo);

    writeln!(out, "## -0,{} +0,{} ##", deleted.len(), added.len())?;

    for (from_path, ranges) in &deleted {
        writeln!(
            out,
            "   Reverse-merged {}:r{}",
            from_path,
            svn_mergeinfo::rangelist_to_string(ranges)
        )?;
    }
    for (from_path, ranges) in &added {
        writeln!(
            out,
            "   Merged {}:r{}",
            from_path,
            svn_mergeinfo::rangelist_to_string(ranges)
        )?;
    }

    Ok(())
}

/// Everything `display_prop_diffs` needs to know about the diff in
/// progress beyond the property changes themselves.
pub(crate) struct PropDiffContext<'a> {
    pub orig_path_1: &'a BStr,
    pub orig_path_2: &'a BStr,
    pub rev1: Revnum,
    pub rev2: Revnum,
    pub relative_to: Option<&'a BStr>,
    pub show_diff_header: bool,
    pub use_git_diff_format: bool,
    pub ra: Option<&'a dyn RepositoryReader>,
    pub wc: Option<&'a dyn WorkingCopyReader>,
    pub wc_root: Option<&'a BStr>,
    pub text_options: &'a DiffTextOptions,
}

/// Write the property change section for one path.
pub(crate) fn display_prop_diffs<D: TextDiffer>(
    out: &mut dyn Write,
    differ: &D,
    prop_changes: &[PropChange],
    original_props: &PropHash,
    path: &BStr,
    ctx: &PropDiffContext<'_>,
) -> Result<(), ClientError> {
    let mut path1 = BString::from(ctx.orig_path_1);
    let mut path2 = BString::from(ctx.orig_path_2);

    if ctx.use_git_diff_format {
        path1 = adjust_relative_to_repos_root(
            path,
            ctx.orig_path_1,
            ctx.ra,
            ctx.wc,
            ctx.wc_root,
        )?;
        path2 = adjust_relative_to_repos_root(
            path,
            ctx.orig_path_2,
            ctx.ra,
            ctx.wc,
            ctx.wc_root,
        )?;
    }

    // A diff rooted at the working copy root has an empty path.
    let path: &BStr = if path.is_empty() {
        BStr::new(".")
    } else {
        path
    };

    if ctx.show_diff_header {
        let (display_path, adjusted1, adjusted2) =
            adjust_paths_for_diff_labels(path, path1.as_bstr(), path2.as_bstr(), ctx.relative_to)?;

        let mut label1 = diff_label(adjusted1.as_bstr(), ctx.rev1);
        let mut label2 = diff_label(adjusted2.as_bstr(), ctx.rev2);

        write!(out, "Index: {display_path}\n{EQUAL_STRING}\n")?;

        if ctx.use_git_diff_format {
            (label1, label2) = print_git_diff_header(
                out,
                Operation::Modified,
                path1.as_bstr(),
                path2.as_bstr(),
                ctx.rev1,
                ctx.rev2,
                None,
            )?;
        }

        write!(out, "--- {label1}\n+++ {label2}\n")?;
    }

    writeln!(
        out,
        "\nProperty changes on: {}\n{UNDER_STRING}",
        if ctx.use_git_diff_format {
            path1.as_bstr()
        } else {
            path
        }
    )?;

    for change in prop_changes {
        let original_value = original_props.get(&change.name);

        let action = match (original_value, &change.value) {
            (None, _) => "Added",
            (_, None) => "Deleted",
            _ => "Modified",
        };
        writeln!(out, "{}: {}", action, change.name)?;

        if change.name.as_slice() == PROP_MERGEINFO.as_bytes() {
            match display_mergeinfo_diff(
                out,
                original_value.map(|v| v.as_bstr()),
                change.value.as_deref().map(BStr::new),
            ) {
                Ok(()) => continue,
                // Invalid mergeinfo is not fatal; show it as a plain
                // property diff instead.
                Err(ClientError::Mergeinfo(_)) => {}
                Err(other) => return Err(other),
            }
        }

        let (original, _) = maybe_append_eol(
            original_value.map(|v| v.as_bstr()).unwrap_or_default(),
        );
        let (modified, modified_had_eol) = maybe_append_eol(
            change.value.as_deref().map(BStr::new).unwrap_or_default(),
        );

        differ.write_unified_strings(out, &original, &modified, "##", ctx.text_options)?;

        if !modified_had_eol && !modified.is_empty() {
            writeln!(out, "\\ No newline at end of property")?;
        }
    }

    Ok(())
}

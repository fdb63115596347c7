//! Diff label rendering and path adjustment.
//!
//! Labels carry the revision (`path\t(revision 5)`) or mark the
//! working copy. When the two diff targets have different anchors,
//! the unique tails of the original targets are shown in parentheses
//! with an ellipsis for the stripped prefix.

use bstr::{BStr, BString, ByteSlice};
use svn_utils::path::{is_url, RelPath};
use svn_utils::Revnum;

use crate::ra::RepositoryReader;
use crate::wc::WorkingCopyReader;
use crate::ClientError;

/// Generate a label for the diff output for `path` at `revision`.
/// An invalid revision stands for the working copy.
pub fn diff_label(path: &BStr, revision: Revnum) -> BString {
    let mut label = BString::from(path);
    match revision.number() {
        Some(number) => label.extend_from_slice(format!("\t(revision {number})").as_bytes()),
        None => label.extend_from_slice(b"\t(working copy)"),
    }
    label
}

/// Make `path` relative to the repository root beneath `orig_target`.
///
/// Without a repository reader the working copy answers directly.
/// Otherwise the original target's root-relative path is resolved
/// (through the repository for URLs, the working copy for local
/// paths), `path` is reduced to its tail below `wc_root` when it has
/// one, and the two are joined.
pub fn adjust_relative_to_repos_root(
    path: &BStr,
    orig_target: &BStr,
    ra: Option<&dyn RepositoryReader>,
    wc: Option<&dyn WorkingCopyReader>,
    wc_root: Option<&BStr>,
) -> Result<BString, ClientError> {
    let Some(ra) = ra else {
        // A local-only diff; the working copy knows the relpath.
        let wc = wc.ok_or_else(|| {
            ClientError::Unsupported("no reader available to resolve repository paths".into())
        })?;
        return wc.repos_relpath(path);
    };

    let orig_relpath = if is_url(orig_target) {
        ra.path_relative_to_root(orig_target)?
    } else {
        let wc = wc.ok_or_else(|| {
            ClientError::Unsupported("no reader available to resolve repository paths".into())
        })?;
        wc.repos_relpath(orig_target)?
    };

    let child_relpath = wc_root
        .and_then(|root| RelPath::new(path).skip_ancestor(&RelPath::new(root)))
        .map(|tail| BString::from(tail.as_bytes()))
        .unwrap_or_else(|| BString::from(path));

    Ok(BString::from(
        RelPath::new(orig_relpath).join(child_relpath).as_bytes(),
    ))
}

fn relative_or_dot(
    value: &BStr,
    relative_to: &RelPath,
    relative_to_raw: &BStr,
) -> Result<BString, ClientError> {
    let as_path = RelPath::new(value);
    if let Some(child) = as_path.skip_ancestor(relative_to) {
        Ok(BString::from(child.as_bytes()))
    } else if as_path.is_same(relative_to) {
        Ok(BString::from("."))
    } else {
        Err(ClientError::BadRelativePath {
            path: BString::from(value),
            relative_to: BString::from(relative_to_raw),
        })
    }
}

/// Adjust `path` and the two original targets for display, handling
/// differing anchors.
///
/// The longest common ancestor of the two original targets is
/// stripped; non-empty remainders turn into `path\t(.../tail)`
/// decorations. With `relative_to` set, every returned path must be
/// at or below it, and is replaced by its relative tail (or `.`).
pub fn adjust_paths_for_diff_labels(
    path: &BStr,
    orig_path_1: &BStr,
    orig_path_2: &BStr,
    relative_to: Option<&BStr>,
) -> Result<(BString, BString, BString), ClientError> {
    let ancestor_len = RelPath::new(orig_path_1)
        .longest_common_ancestor(&RelPath::new(orig_path_2))
        .as_bytes()
        .len();

    let decorate = |orig: &BStr| -> BString {
        let tail = &orig.as_bytes()[ancestor_len.min(orig.len())..];
        if tail.is_empty() {
            BString::from(path)
        } else if tail[0] == b'/' {
            let mut label = BString::from(path);
            label.extend_from_slice(b"\t(...");
            label.extend_from_slice(tail);
            label.extend_from_slice(b")");
            label
        } else {
            let mut label = BString::from(path);
            label.extend_from_slice(b"\t(.../");
            label.extend_from_slice(tail);
            label.extend_from_slice(b")");
            label
        }
    };

    let mut new_path = BString::from(path);
    let mut new_path1 = decorate(orig_path_1);
    let mut new_path2 = decorate(orig_path_2);

    if let Some(relative_to_raw) = relative_to {
        let relative_to_path = RelPath::new(relative_to_raw);
        new_path = relative_or_dot(new_path.as_bstr(), &relative_to_path, relative_to_raw)?;
        new_path1 = relative_or_dot(new_path1.as_bstr(), &relative_to_path, relative_to_raw)?;
        new_path2 = relative_or_dot(new_path2.as_bstr(), &relative_to_path, relative_to_raw)?;
    }

    Ok((new_path, new_path1, new_path2))
}

//! The added/deleted tree walker.
//!
//! When one side of a repository diff does not exist, the side that
//! does is enumerated recursively and reported as a series of pure
//! additions or deletions: file contents are fetched and diffed
//! against an empty file, directory properties are shown as wholesale
//! additions or removals.

use std::io::Write;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use svn_utils::path::RelPath;
use svn_utils::props::{regular_props, PropChange, PropHash, PROP_MIME_TYPE};
use svn_utils::{Canceller, NodeKind, Revnum};
use tempfile::NamedTempFile;

use crate::callbacks::DiffCallbacks;
use crate::ra::RepositoryReader;
use crate::ClientError;

/// Present a property map as a list of additions.
pub(crate) fn props_as_additions(props: &PropHash) -> Vec<PropChange> {
    props
        .iter()
        .map(|(name, value)| PropChange {
            name: name.clone(),
            value: Some(value.clone()),
        })
        .collect()
}

/// Present a property map as a list of removals.
pub(crate) fn props_as_removals(props: &PropHash) -> Vec<PropChange> {
    props
        .keys()
        .map(|name| PropChange {
            name: name.clone(),
            value: None,
        })
        .collect()
}

/// Spill bytes into a temporary file that lives until dropped.
pub(crate) fn write_temp_file(content: &[u8]) -> Result<NamedTempFile, ClientError> {
    let mut tmp = NamedTempFile::new()?;
    tmp.write_all(content)?;
    tmp.flush()?;
    Ok(tmp)
}

/// Report one file as added or deleted, its fetched content diffed
/// against the empty file.
#[allow(clippy::too_many_arguments)]
fn added_or_deleted_file(
    ra: &dyn RepositoryReader,
    anchor_url: &RelPath,
    target: &BStr,
    revision: Revnum,
    rev1: Revnum,
    rev2: Revnum,
    show_deletion: bool,
    empty_file: &Path,
    callbacks: &mut dyn DiffCallbacks,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    canceller.check()?;

    let url = anchor_url.join(target);
    let (content, props) = ra.get_file(url.as_bstr(), revision)?;
    let fetched = write_temp_file(&content)?;

    let mimetype = props.get(BStr::new(PROP_MIME_TYPE)).map(|v| v.as_bstr());
    let regular = regular_props(&props);

    if show_deletion {
        callbacks.file_deleted(
            target,
            Some(fetched.path()),
            Some(empty_file),
            mimetype,
            None,
            &regular,
        )?;
    } else {
        callbacks.file_added(
            target,
            Some(empty_file),
            Some(fetched.path()),
            rev1,
            rev2,
            None,
            mimetype,
            None,
            Revnum::INVALID,
            &props_as_additions(&regular),
            &PropHash::new(),
        )?;
    }

    Ok(())
}

/// Report one directory and all its children as added or deleted.
#[allow(clippy::too_many_arguments)]
fn added_or_deleted_dir(
    ra: &dyn RepositoryReader,
    anchor_url: &RelPath,
    target: &BStr,
    revision: Revnum,
    rev1: Revnum,
    rev2: Revnum,
    show_deletion: bool,
    empty_file: &Path,
    callbacks: &mut dyn DiffCallbacks,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    canceller.check()?;

    let url = anchor_url.join(target);
    let (entries, props) = ra.get_dir(url.as_bstr(), revision)?;

    if show_deletion {
        callbacks.dir_deleted(target)?;
    } else {
        callbacks.dir_added(target, revision, None, Revnum::INVALID)?;
    }

    let regular = regular_props(&props);
    if !regular.is_empty() {
        if show_deletion {
            callbacks.dir_props_changed(target, false, &props_as_removals(&regular), &regular)?;
        } else {
            callbacks.dir_props_changed(
                target,
                true,
                &props_as_additions(&regular),
                &PropHash::new(),
            )?;
        }
    }

    for (name, kind) in &entries {
        canceller.check()?;

        let child_target = BString::from(RelPath::new(target).join(name).as_bytes());
        match kind {
            NodeKind::Dir => added_or_deleted_dir(
                ra,
                anchor_url,
                child_target.as_bstr(),
                revision,
                rev1,
                rev2,
                show_deletion,
                empty_file,
                callbacks,
                canceller,
            )?,
            NodeKind::File => added_or_deleted_file(
                ra,
                anchor_url,
                child_target.as_bstr(),
                revision,
                rev1,
                rev2,
                show_deletion,
                empty_file,
                callbacks,
                canceller,
            )?,
            NodeKind::Absent => {}
        }
    }

    if !show_deletion {
        callbacks.dir_closed(target, true)?;
    }

    Ok(())
}

/// Show a diff target that exists on only one side as a tree of
/// additions or deletions. Exactly one of `kind1`/`kind2` is absent.
#[allow(clippy::too_many_arguments)]
pub(crate) fn added_or_deleted_target(
    ra: &dyn RepositoryReader,
    anchor_url: &BStr,
    target1: &BStr,
    target2: &BStr,
    rev1: Revnum,
    rev2: Revnum,
    kind1: NodeKind,
    kind2: NodeKind,
    callbacks: &mut dyn DiffCallbacks,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    debug_assert!(kind1 == NodeKind::Absent || kind2 == NodeKind::Absent);

    let show_deletion = kind2 == NodeKind::Absent;
    let (existing_target, existing_rev, existing_kind) = if show_deletion {
        (target1, rev1, kind1)
    } else {
        (target2, rev2, kind2)
    };

    // All file content is diffed against the empty file.
    let empty_file = NamedTempFile::new()?;
    let anchor = RelPath::new(anchor_url);

    if existing_kind == NodeKind::File {
        added_or_deleted_file(
            ra,
            &anchor,
            existing_target,
            existing_rev,
            rev1,
            rev2,
            show_deletion,
            empty_file.path(),
            callbacks,
            canceller,
        )
    } else {
        added_or_deleted_dir(
            ra,
            &anchor,
            existing_target,
            existing_rev,
            rev1,
            rev2,
            show_deletion,
            empty_file.path(),
            callbacks,
            canceller,
        )
    }
}

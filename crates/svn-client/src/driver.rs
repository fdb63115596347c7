//! The diff driver.
//!
//! Classifies a pair of targets into one of four comparison modes
//! (repository-repository, repository-working copy in either order,
//! or working copy only), prepares URLs, anchors, and revisions, and
//! drives the matching machinery into the callback set.

use std::io::Write;
use std::path::PathBuf;

use bstr::{BStr, BString, ByteSlice};
use svn_utils::path::{is_url, RelPath};
use svn_utils::props::{prop_diffs, regular_props, PropHash, PROP_EOL_STYLE, PROP_KEYWORDS,
    PROP_MIME_TYPE};
use svn_utils::{Canceller, NodeKind, RevisionSpec, Revnum};

use crate::callbacks::DiffCallbacks;
use crate::config::DiffConfig;
use crate::differ::TextDiffer;
use crate::ra::RepositoryReader;
use crate::walker;
use crate::wc::WorkingCopyReader;
use crate::writer::DiffWriter;
use crate::{ClientError, Depth};

/// One diff invocation: the two targets and the switches that shape
/// the output.
#[derive(Debug, Clone)]
pub struct DiffRequest {
    /// First target: a working copy path or URL.
    pub path1: BString,
    pub revision1: RevisionSpec,
    /// Second target: a working copy path or URL.
    pub path2: BString,
    pub revision2: RevisionSpec,
    /// Resolve both targets through history from this revision.
    pub peg_revision: RevisionSpec,
    pub depth: Depth,
    pub ignore_ancestry: bool,
    /// Print only `Index:` lines for deleted files.
    pub no_diff_deleted: bool,
    /// Show copied nodes as plain additions.
    pub show_copies_as_adds: bool,
    /// Diff binary mime types as if they were text.
    pub ignore_content_type: bool,
    /// Emit git extended headers.
    pub use_git_diff_format: bool,
    /// Restrict the diff to these changelists.
    pub changelists: Vec<BString>,
    /// Render output paths relative to this directory.
    pub relative_to: Option<BString>,
}

impl DiffRequest {
    /// A request with default switches.
    pub fn new(
        path1: impl Into<BString>,
        revision1: RevisionSpec,
        path2: impl Into<BString>,
        revision2: RevisionSpec,
    ) -> Self {
        DiffRequest {
            path1: path1.into(),
            revision1,
            path2: path2.into(),
            revision2,
            peg_revision: RevisionSpec::Unspecified,
            depth: Depth::Infinity,
            ignore_ancestry: false,
            no_diff_deleted: false,
            show_copies_as_adds: false,
            ignore_content_type: false,
            use_git_diff_format: false,
            changelists: Vec::new(),
            relative_to: None,
        }
    }
}

/// Decide which side of the diff lives in the repository.
///
/// A revision is "local" iff its kind is BASE or WORKING; a side is a
/// repository side when its revision is not local or the target is a
/// URL. With a peg revision, at least one side must be non-local and
/// the peg forces the repository interpretation.
fn check_paths(request: &DiffRequest) -> Result<(bool, bool), ClientError> {
    if request.revision1 == RevisionSpec::Unspecified
        || request.revision2 == RevisionSpec::Unspecified
    {
        return Err(ClientError::BadRevision(
            "not all required revisions are specified".into(),
        ));
    }

    let is_local_rev1 = request.revision1.is_local();
    let is_local_rev2 = request.revision2.is_local();

    if request.peg_revision != RevisionSpec::Unspecified {
        if is_local_rev1 && is_local_rev2 {
            return Err(ClientError::BadRevision(
                "at least one revision must be something other than BASE or WORKING \
                 when diffing a URL"
                    .into(),
            ));
        }
        Ok((!is_local_rev1, !is_local_rev2))
    } else {
        Ok((
            !is_local_rev1 || is_url(request.path1.as_bstr()),
            !is_local_rev2 || is_url(request.path2.as_bstr()),
        ))
    }
}

/// Return the URL of a target that may be a working copy path.
fn convert_to_url(
    wc: Option<&dyn WorkingCopyReader>,
    path_or_url: &BStr,
) -> Result<BString, ClientError> {
    if is_url(path_or_url) {
        return Ok(BString::from(path_or_url));
    }
    let wc = wc.ok_or_else(|| ClientError::EntryMissingUrl(BString::from(path_or_url)))?;
    wc.node_url(path_or_url)?
        .ok_or_else(|| ClientError::EntryMissingUrl(BString::from(path_or_url)))
}

/// Resolve `path_or_url@peg` to the URL the object has in `revision`.
///
/// An object without a location there resolves to `None` rather than
/// an error, so the caller can still show a one-sided diff.
fn resolve_pegged_diff_target_url(
    ra: &dyn RepositoryReader,
    path_or_url: &BStr,
    peg_revision: RevisionSpec,
    revision: RevisionSpec,
) -> Result<Option<BString>, ClientError> {
    match ra.trace_locations(path_or_url, peg_revision, revision) {
        Ok(url) => Ok(Some(url)),
        Err(ClientError::NotFound { .. }) | Err(ClientError::UnrelatedResources(..)) => Ok(None),
        Err(other) => Err(other),
    }
}

/// Everything a repository-repository diff needs to know up front.
struct ReposReposInfo {
    url1: BString,
    url2: BString,
    /// Local path to prefix before output paths, when a working copy
    /// target was given.
    base_path: Option<BString>,
    rev1: Revnum,
    rev2: Revnum,
    anchor1: BString,
    target1: BString,
    target2: BString,
    kind1: NodeKind,
    kind2: NodeKind,
}

/// Fail with *not-found* unless `url` exists at `revision`.
fn check_diff_target_exists(
    ra: &dyn RepositoryReader,
    url: &BStr,
    revision: Revnum,
) -> Result<(), ClientError> {
    if ra.check_path(url, revision)? == NodeKind::Absent {
        return Err(ClientError::NotFound {
            url: BString::from(url),
            revision: revision.number().unwrap_or(0),
        });
    }
    Ok(())
}

/// Prepare a repository-repository diff: resolve URLs and revisions,
/// verify existence, and compute the anchor/target split.
fn prepare_repos_repos(
    ra: &dyn RepositoryReader,
    wc: Option<&dyn WorkingCopyReader>,
    request: &DiffRequest,
) -> Result<ReposReposInfo, ClientError> {
    let mut url1 = convert_to_url(wc, request.path1.as_bstr())?;
    let mut url2 = convert_to_url(wc, request.path2.as_bstr())?;

    let mut base_path = None;
    if url1 != request.path1 {
        base_path = Some(request.path1.clone());
    }
    if url2 != request.path2 {
        base_path = Some(request.path2.clone());
    }

    if request.peg_revision != RevisionSpec::Unspecified {
        let resolved2 = resolve_pegged_diff_target_url(
            ra,
            request.path2.as_bstr(),
            request.peg_revision,
            request.revision2,
        )?;
        let resolved1 = resolve_pegged_diff_target_url(
            ra,
            request.path1.as_bstr(),
            request.peg_revision,
            request.revision1,
        )?;

        // Either or both URLs may have moved along their history. If
        // only one side resolved, reuse its URL for the other so the
        // diff shows the object as a whole add or delete.
        if let Some(resolved2) = &resolved2 {
            url2 = resolved2.clone();
            if resolved1.is_none() {
                url1 = resolved2.clone();
            }
        }
        if let Some(resolved1) = &resolved1 {
            url1 = resolved1.clone();
            if resolved2.is_none() {
                url2 = resolved1.clone();
            }
        }
    }

    let rev2 = ra.resolve_revision(url2.as_bstr(), request.revision2)?;
    let kind2 = ra.check_path(url2.as_bstr(), rev2)?;
    let rev1 = ra.resolve_revision(url1.as_bstr(), request.revision1)?;
    let kind1 = ra.check_path(url1.as_bstr(), rev1)?;

    // Either both URLs exist at their revisions, or one may be missing
    // from one side of the diff.
    if kind1 == NodeKind::Absent && kind2 == NodeKind::Absent {
        return Err(ClientError::NotFound {
            url: url1,
            revision: rev1.number().unwrap_or(0),
        });
    } else if kind1 == NodeKind::Absent {
        check_diff_target_exists(ra, url1.as_bstr(), rev2)?;
    } else if kind2 == NodeKind::Absent {
        check_diff_target_exists(ra, url2.as_bstr(), rev1)?;
    }

    let mut anchor1 = url1.clone();
    let mut target1 = BString::from("");
    let mut target2 = BString::from("");

    // If one of the targets is a file, use the parent as the anchor.
    if kind1 == NodeKind::File || kind2 == NodeKind::File {
        let (a1, t1) = RelPath::new(&url1).split();
        anchor1 = BString::from(a1.as_bytes());
        target1 = t1;
        let (_, t2) = RelPath::new(&url2).split();
        target2 = t2;
        if let Some(existing) = &base_path {
            base_path = Some(BString::from(
                RelPath::new(existing).dirname().as_bytes(),
            ));
        }
    }

    Ok(ReposReposInfo {
        url1,
        url2,
        base_path,
        rev1,
        rev2,
        anchor1,
        target1,
        target2,
        kind1,
        kind2,
    })
}

/// Repository against repository.
fn diff_repos_repos<W: Write, D: TextDiffer>(
    writer: &mut DiffWriter<'_, W, D>,
    ra: &dyn RepositoryReader,
    wc: Option<&dyn WorkingCopyReader>,
    request: &DiffRequest,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    let info = prepare_repos_repos(ra, wc, request)?;

    writer.orig_path_1 = info.url1.clone();
    writer.orig_path_2 = info.url2.clone();
    writer.revnum1 = info.rev1;
    writer.revnum2 = info.rev2;
    writer.anchor = info.base_path.clone();

    if info.kind1 == NodeKind::Absent || info.kind2 == NodeKind::Absent {
        // One side of the diff does not exist. Walk the tree that
        // does, showing a series of additions or deletions.
        return walker::added_or_deleted_target(
            ra,
            info.anchor1.as_bstr(),
            info.target1.as_bstr(),
            info.target2.as_bstr(),
            info.rev1,
            info.rev2,
            info.kind1,
            info.kind2,
            writer,
            canceller,
        );
    }

    ra.replay_diff(
        info.anchor1.as_bstr(),
        info.target1.as_bstr(),
        info.rev1,
        info.url2.as_bstr(),
        info.rev2,
        request.depth,
        request.ignore_ancestry,
        writer,
        canceller,
    )
}

/// How a working file's svn:eol-style translates for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EolStyle {
    /// No translation configured.
    None,
    /// Translate to the platform end-of-line.
    Native,
    /// A fixed LF, CR, or CRLF ending.
    Fixed,
    /// An unrecognized value.
    Unknown,
}

fn eol_style_from_value(value: Option<&BString>) -> EolStyle {
    match value.map(|v| v.as_slice()) {
        None => EolStyle::None,
        Some(b"native") => EolStyle::Native,
        Some(b"LF") | Some(b"CR") | Some(b"CRLF") => EolStyle::Fixed,
        Some(_) => EolStyle::Unknown,
    }
}

/// Convert a byte path into an OS path.
#[cfg(unix)]
fn os_path(bytes: &BStr) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn os_path(bytes: &BStr) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Single-file repository-to-working-copy diff: fetch the repository
/// side, normalize the working side, and report the change directly.
#[allow(clippy::too_many_arguments)]
fn diff_repos_wc_file_target<W: Write, D: TextDiffer>(
    writer: &mut DiffWriter<'_, W, D>,
    ra: &dyn RepositoryReader,
    wc: &dyn WorkingCopyReader,
    target: &BStr,
    file2_abspath: &BStr,
    url1: &BStr,
    kind1: NodeKind,
    rev: Revnum,
    reverse: bool,
    show_copies_as_adds: bool,
    diff_with_base: bool,
) -> Result<(), ClientError> {
    // Content and props of file 1, the repository file.
    let mut file1 = walker::write_temp_file(b"")?;
    let mut props1: Option<PropHash> = None;
    let mut is_copy = false;

    if kind1 == NodeKind::File {
        if show_copies_as_adds {
            is_copy = wc.is_copy(file2_abspath)?;
        }
        // When showing copies as adds, the fetch is skipped and the
        // file is diffed against the empty file.
        if !(show_copies_as_adds && is_copy) {
            let (content, props) = ra.get_file(url1, rev)?;
            file1 = walker::write_temp_file(&content)?;
            props1 = Some(props);
        }
    }

    // Content and props of file 2, the local file.
    let mut file2_tmp = None;
    let props2 = if diff_with_base {
        let props = wc.pristine_props(file2_abspath)?;
        file2_tmp = Some(walker::write_temp_file(&wc.pristine_contents(file2_abspath)?)?);
        props
    } else {
        let props = wc.working_props(file2_abspath)?;

        // A normalized copy of the working file is needed when eol
        // translation or keyword expansion is in play.
        let eol_value = props.get(BStr::new(PROP_EOL_STYLE));
        let eol_style = eol_style_from_value(eol_value);
        let has_keywords = props.contains_key(BStr::new(PROP_KEYWORDS));

        if eol_style != EolStyle::None || has_keywords {
            if eol_style == EolStyle::Unknown {
                return Err(ClientError::UnknownEol(
                    eol_value.cloned().unwrap_or_default(),
                ));
            }
            file2_tmp = Some(walker::write_temp_file(
                &wc.detranslated_contents(file2_abspath)?,
            )?);
        }
        props
    };

    let file2_path = match &file2_tmp {
        Some(tmp) => tmp.path().to_path_buf(),
        None => os_path(file2_abspath),
    };

    let props1_hash = props1.unwrap_or_default();
    let mimetype1 = props1_hash.get(BStr::new(PROP_MIME_TYPE)).map(|v| v.as_bstr());
    let mimetype2 = props2.get(BStr::new(PROP_MIME_TYPE)).map(|v| v.as_bstr());

    if kind1 == NodeKind::File && !(show_copies_as_adds && is_copy) {
        writer.file_opened(target, if reverse { Revnum::INVALID } else { rev })?;

        if reverse {
            let prop_changes = prop_diffs(&props2, &props1_hash);
            writer.file_changed(
                target,
                Some(&file2_path),
                Some(file1.path()),
                Revnum::INVALID,
                rev,
                mimetype2,
                mimetype1,
                &prop_changes,
                &props2,
            )?;
        } else {
            let prop_changes = prop_diffs(&props1_hash, &props2);
            writer.file_changed(
                target,
                Some(file1.path()),
                Some(&file2_path),
                rev,
                Revnum::INVALID,
                mimetype1,
                mimetype2,
                &prop_changes,
                &props1_hash,
            )?;
        }
    } else if reverse {
        writer.file_deleted(
            target,
            Some(&file2_path),
            Some(file1.path()),
            mimetype2,
            None,
            &regular_props(&props2),
        )?;
    } else {
        writer.file_added(
            target,
            Some(file1.path()),
            Some(&file2_path),
            rev,
            Revnum::INVALID,
            None,
            mimetype2,
            None,
            Revnum::INVALID,
            &walker::props_as_additions(&regular_props(&props2)),
            &PropHash::new(),
        )?;
    }

    Ok(())
}

/// Repository against working copy, in either direction.
#[allow(clippy::too_many_arguments)]
fn diff_repos_wc<W: Write, D: TextDiffer>(
    writer: &mut DiffWriter<'_, W, D>,
    ra: &dyn RepositoryReader,
    wc: &dyn WorkingCopyReader,
    path_or_url1: &BStr,
    revision1: RevisionSpec,
    path2: &BStr,
    revision2: RevisionSpec,
    reverse: bool,
    request: &DiffRequest,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    let mut url1 = convert_to_url(Some(wc), path_or_url1)?;

    let (anchor, target) = wc.actual_target(path2)?;
    let anchor_url = wc
        .node_url(anchor.as_bstr())?
        .ok_or_else(|| ClientError::EntryMissingUrl(anchor.clone()))?;
    let target_url = BString::from(RelPath::new(&anchor_url).join(&target).as_bytes());

    if !reverse {
        writer.orig_path_1 = url1.clone();
        writer.orig_path_2 = target_url;
    } else {
        writer.orig_path_1 = target_url;
        writer.orig_path_2 = url1.clone();
    }

    if request.use_git_diff_format {
        writer.wc_root = Some(wc.wc_root(anchor.as_bstr())?);
    }

    if request.peg_revision != RevisionSpec::Unspecified {
        if let Some(resolved) =
            resolve_pegged_diff_target_url(ra, path_or_url1, request.peg_revision, revision1)?
        {
            url1 = resolved;
        }
    }

    let rev = ra.resolve_revision(url1.as_bstr(), revision1)?;
    let kind1 = ra.check_path(url1.as_bstr(), rev)?;
    let kind2 = wc.kind(path2)?;

    if !reverse {
        writer.revnum1 = rev;
    } else {
        writer.revnum2 = rev;
    }
    writer.anchor = Some(anchor.clone());

    // If both targets can be diffed as files, fetch the repository
    // file and compare it against the local one directly.
    if (kind1 == NodeKind::File || kind1 == NodeKind::Absent) && kind2 == NodeKind::File {
        return diff_repos_wc_file_target(
            writer,
            ra,
            wc,
            target.as_bstr(),
            path2,
            url1.as_bstr(),
            kind1,
            rev,
            reverse,
            request.show_copies_as_adds,
            revision2 == RevisionSpec::Base,
        );
    }

    // Otherwise the working copy's editor-based machinery produces
    // the diff.
    wc.crawl_repos_diff(
        anchor.as_bstr(),
        target.as_bstr(),
        anchor_url.as_bstr(),
        rev,
        ra,
        reverse,
        request.depth,
        request.ignore_ancestry,
        request.show_copies_as_adds,
        request.use_git_diff_format,
        &request.changelists,
        writer,
        canceller,
    )
}

/// Working copy against working copy.
fn diff_wc_wc<W: Write, D: TextDiffer>(
    writer: &mut DiffWriter<'_, W, D>,
    wc: &dyn WorkingCopyReader,
    request: &DiffRequest,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    if request.path1 != request.path2
        || !(request.revision1 == RevisionSpec::Base
            && request.revision2 == RevisionSpec::Working)
    {
        return Err(ClientError::Unsupported(
            "only diffs between a path's text-base and its working files are \
             supported at this time"
                .into(),
        ));
    }

    let path1 = request.path1.as_bstr();

    // An added node has no base revision; show it against revision 0.
    writer.revnum1 = match wc.base_revision(path1, request.revision1) {
        Ok(revision) => revision,
        Err(ClientError::BadRevision(_)) => Revnum::new(0),
        Err(other) => return Err(other),
    };

    let kind = wc.kind(path1)?;
    let anchor = if kind != NodeKind::Dir {
        BString::from(RelPath::new(path1).dirname().as_bytes())
    } else {
        BString::from(path1)
    };
    writer.anchor = Some(anchor);

    wc.walk_local_diff(
        path1,
        writer,
        request.depth,
        request.ignore_ancestry,
        request.show_copies_as_adds,
        request.use_git_diff_format,
        &request.changelists,
        canceller,
    )
}

/// Dispatch a diff request to the matching comparison mode.
pub fn do_diff<W: Write, D: TextDiffer>(
    request: &DiffRequest,
    ra: Option<&dyn RepositoryReader>,
    wc: Option<&dyn WorkingCopyReader>,
    writer: &mut DiffWriter<'_, W, D>,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    let (is_repos1, is_repos2) = check_paths(request)?;

    let need_ra = || {
        ra.ok_or_else(|| {
            ClientError::Unsupported("a repository reader is required for this diff".into())
        })
    };
    let need_wc = || {
        wc.ok_or_else(|| {
            ClientError::Unsupported("a working copy reader is required for this diff".into())
        })
    };

    if is_repos1 {
        if is_repos2 {
            diff_repos_repos(writer, need_ra()?, wc, request, canceller)
        } else {
            diff_repos_wc(
                writer,
                need_ra()?,
                need_wc()?,
                request.path1.as_bstr(),
                request.revision1,
                request.path2.as_bstr(),
                request.revision2,
                false,
                request,
                canceller,
            )
        }
    } else if is_repos2 {
        diff_repos_wc(
            writer,
            need_ra()?,
            need_wc()?,
            request.path2.as_bstr(),
            request.revision2,
            request.path1.as_bstr(),
            request.revision1,
            true,
            request,
            canceller,
        )
    } else {
        diff_wc_wc(writer, need_wc()?, request, canceller)
    }
}

/// Produce a unified diff for `request` on `out`.
///
/// This is the top-level entry point: it builds the text front-end
/// from the configuration and hands it to [`do_diff`].
pub fn diff<'a, W: Write, D: TextDiffer>(
    request: &DiffRequest,
    config: &DiffConfig,
    differ: &'a D,
    ra: Option<&'a dyn RepositoryReader>,
    wc: Option<&'a dyn WorkingCopyReader>,
    out: W,
    canceller: &Canceller,
) -> Result<(), ClientError> {
    let mut writer = DiffWriter::new(out, differ, config, request, ra, wc);
    do_diff(request, ra, wc, &mut writer, canceller)
}

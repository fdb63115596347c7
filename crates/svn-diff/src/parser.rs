//! The patch parser.
//!
//! [`next_patch`] scans a patch file for the next patch, returning
//! `None` at end of file. Header recognition is a table-driven state
//! machine keyed on line prefixes; the hunk bodies, property patches,
//! embedded merge tracking data, and git binary patch offsets are
//! picked up by dedicated sub-parsers once a valid header was found.

use std::io::{Read, Seek};

use bstr::{BStr, BString, ByteSlice};
use svn_utils::props::PROP_MERGEINFO;
use svn_utils::{Canceller, Tristate};

use crate::patch_file::PatchFile;
use crate::{BinaryPatch, DiffError, DiffOperation, Hunk, HunkRange, Patch, PropPatch};

/// Parser states. The terminal states are `UnidiffFound`,
/// `GitHeaderFound` and `BinaryPatchFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Initial.
    Start,
    /// `diff --git`.
    GitDiffSeen,
    /// A tree operation, rather than a content change.
    GitTreeSeen,
    /// `--- /dev/null` or `--- a/...`.
    GitMinusSeen,
    /// `old mode 100644`.
    OldModeSeen,
    /// `new mode 100644`.
    GitModeSeen,
    /// `rename from foo.c`.
    MoveFromSeen,
    /// `copy from foo.c`.
    CopyFromSeen,
    /// `--- foo.c`.
    MinusSeen,
    /// Valid start of a regular unidiff header.
    UnidiffFound,
    /// Valid start of a git extended header.
    GitHeaderFound,
    /// Valid start of a git binary patch.
    BinaryPatchFound,
}

/// The patch under construction; filenames stay optional until the
/// header is complete.
#[derive(Debug, Default)]
struct PatchBuild {
    old_filename: Option<BString>,
    new_filename: Option<BString>,
    operation: DiffOperation,
    old_executable_bit: Tristate,
    new_executable_bit: Tristate,
    old_symlink_bit: Tristate,
    new_symlink_bit: Tristate,
}

type Handler = fn(&mut PatchBuild, &BStr, ParseState) -> Result<ParseState, DiffError>;

struct Transition {
    prefix: &'static [u8],
    required_state: ParseState,
    handler: Handler,
}

/// The transition table. Lines are matched top to bottom against
/// (prefix, required state); the first match runs its handler.
static TRANSITIONS: &[Transition] = &[
    Transition { prefix: b"--- ",             required_state: ParseState::Start,        handler: diff_minus },
    Transition { prefix: b"+++ ",             required_state: ParseState::MinusSeen,    handler: diff_plus },

    Transition { prefix: b"diff --git",       required_state: ParseState::Start,        handler: git_start },
    Transition { prefix: b"--- a/",           required_state: ParseState::GitDiffSeen,  handler: git_minus },
    Transition { prefix: b"--- a/",           required_state: ParseState::GitModeSeen,  handler: git_minus },
    Transition { prefix: b"--- a/",           required_state: ParseState::GitTreeSeen,  handler: git_minus },
    Transition { prefix: b"--- /dev/null",    required_state: ParseState::GitModeSeen,  handler: git_minus },
    Transition { prefix: b"--- /dev/null",    required_state: ParseState::GitTreeSeen,  handler: git_minus },
    Transition { prefix: b"+++ b/",           required_state: ParseState::GitMinusSeen, handler: git_plus },
    Transition { prefix: b"+++ /dev/null",    required_state: ParseState::GitMinusSeen, handler: git_plus },

    Transition { prefix: b"old mode ",        required_state: ParseState::GitDiffSeen,  handler: git_old_mode },
    Transition { prefix: b"new mode ",        required_state: ParseState::OldModeSeen,  handler: git_new_mode },

    Transition { prefix: b"rename from ",     required_state: ParseState::GitDiffSeen,  handler: git_move_from },
    Transition { prefix: b"rename from ",     required_state: ParseState::GitModeSeen,  handler: git_move_from },
    Transition { prefix: b"rename to ",       required_state: ParseState::MoveFromSeen, handler: git_move_to },

    Transition { prefix: b"copy from ",       required_state: ParseState::GitDiffSeen,  handler: git_copy_from },
    Transition { prefix: b"copy from ",       required_state: ParseState::GitModeSeen,  handler: git_copy_from },
    Transition { prefix: b"copy to ",         required_state: ParseState::CopyFromSeen, handler: git_copy_to },

    Transition { prefix: b"new file ",        required_state: ParseState::GitDiffSeen,  handler: git_new_file },

    Transition { prefix: b"deleted file ",    required_state: ParseState::GitDiffSeen,  handler: git_deleted_file },

    Transition { prefix: b"index ",           required_state: ParseState::GitDiffSeen,  handler: git_index },
    Transition { prefix: b"index ",           required_state: ParseState::GitTreeSeen,  handler: git_index },
    Transition { prefix: b"index ",           required_state: ParseState::GitModeSeen,  handler: git_index },

    Transition { prefix: b"GIT binary patch", required_state: ParseState::GitDiffSeen,  handler: binary_patch_start },
    Transition { prefix: b"GIT binary patch", required_state: ParseState::GitTreeSeen,  handler: binary_patch_start },
    Transition { prefix: b"GIT binary patch", required_state: ParseState::GitModeSeen,  handler: binary_patch_start },
];

/// Cut a filename at the first tab; everything after it (label
/// decorations like `(revision 5)`) is discarded.
fn grab_filename(line: &[u8]) -> BString {
    match line.find_byte(b'\t') {
        Some(tab) => BString::from(&line[..tab]),
        None => BString::from(line),
    }
}

/// Parse the `--- ` line of a regular unidiff.
fn diff_minus(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.old_filename = Some(grab_filename(&line.as_bytes()[b"--- ".len()..]));
    Ok(ParseState::MinusSeen)
}

/// Parse the `+++ ` line of a regular unidiff.
fn diff_plus(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.new_filename = Some(grab_filename(&line.as_bytes()[b"+++ ".len()..]));
    Ok(ParseState::UnidiffFound)
}

/// Parse the `diff --git a/path b/path` line.
///
/// The two paths are recorded only when they can be determined
/// unambiguously, i.e. when the text before and after a ` b/` marker
/// is identical. Filenames containing ` a/` or ` b/` make the line
/// ambiguous; in that case the real names come from the `---`/`+++`
/// or `rename`/`copy` lines that follow.
fn git_start(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    let bytes = line.as_bytes();

    let Some(old_marker) = bytes.find(b" a/") else {
        return Ok(ParseState::Start);
    };
    let old_path_start = old_marker + 3;
    if old_path_start >= bytes.len() {
        return Ok(ParseState::Start);
    }
    if bytes[old_marker..].find(b" b/").is_none() {
        return Ok(ParseState::Start);
    }

    let new_path_end = bytes.len();
    let mut search_from = old_path_start;
    loop {
        let Some(rel) = bytes[search_from..].find(b" b/") else {
            break;
        };
        let old_path_end = search_from + rel;
        let new_path_start = old_path_end + 3;
        if new_path_start >= bytes.len() {
            break;
        }
        search_from = new_path_start;

        let old = &bytes[old_path_start..old_path_end];
        let new = &bytes[new_path_start..new_path_end];
        if old == new {
            patch.old_filename = Some(BString::from(old));
            patch.new_filename = Some(BString::from(new));
            break;
        }
    }

    // Assume a modified file until a tree-operation line says otherwise.
    patch.operation = DiffOperation::Modified;

    Ok(ParseState::GitDiffSeen)
}

/// Parse the `--- ` line of a git extended unidiff.
fn git_minus(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    let name = if line.starts_with(b"--- /dev/null") {
        BString::from("/dev/null")
    } else {
        grab_filename(&line.as_bytes()[b"--- a/".len()..])
    };
    patch.old_filename = Some(name);
    Ok(ParseState::GitMinusSeen)
}

/// Parse the `+++ ` line of a git extended unidiff.
fn git_plus(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    let name = if line.starts_with(b"+++ /dev/null") {
        BString::from("/dev/null")
    } else {
        grab_filename(&line.as_bytes()[b"+++ b/".len()..])
    };
    patch.new_filename = Some(name);
    Ok(ParseState::GitHeaderFound)
}

/// Translate a git octal file mode into executable and symlink states.
///
/// 0644 and 0755 are the only permission patterns recognized; anything
/// else leaves the executable bit unknown. The format bits map 0120000
/// to a symlink and 0100000/0040000 to a non-symlink; other values
/// leave the symlink bit unknown.
fn parse_git_mode_bits(mode_str: &[u8]) -> Result<(Tristate, Tristate), DiffError> {
    let text = std::str::from_utf8(mode_str)
        .map_err(|_| DiffError::InvalidMode(BString::from(mode_str)))?;
    let mode = u64::from_str_radix(text.trim(), 8)
        .map_err(|_| DiffError::InvalidMode(BString::from(mode_str)))?;
    if mode > 0o777777 {
        return Err(DiffError::InvalidMode(BString::from(mode_str)));
    }

    let executable = match mode & 0o777 {
        0o644 => Tristate::False,
        0o755 => Tristate::True,
        _ => Tristate::Unknown,
    };

    let symlink = match mode & 0o170000 {
        0o120000 => Tristate::True,
        0o100000 | 0o040000 => Tristate::False,
        _ => Tristate::Unknown,
    };

    Ok((executable, symlink))
}

/// Parse the `old mode ` line of a git extended unidiff.
fn git_old_mode(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    let (executable, symlink) = parse_git_mode_bits(&line.as_bytes()[b"old mode ".len()..])?;
    patch.old_executable_bit = executable;
    patch.old_symlink_bit = symlink;
    Ok(ParseState::OldModeSeen)
}

/// Parse the `new mode ` line of a git extended unidiff.
fn git_new_mode(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    let (executable, symlink) = parse_git_mode_bits(&line.as_bytes()[b"new mode ".len()..])?;
    patch.new_executable_bit = executable;
    patch.new_symlink_bit = symlink;
    Ok(ParseState::GitModeSeen)
}

/// Parse the `rename from ` line of a git extended unidiff.
fn git_move_from(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.old_filename = Some(grab_filename(&line.as_bytes()[b"rename from ".len()..]));
    patch.operation = DiffOperation::Moved;
    Ok(ParseState::MoveFromSeen)
}

/// Parse the `rename to ` line of a git extended unidiff.
fn git_move_to(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.new_filename = Some(grab_filename(&line.as_bytes()[b"rename to ".len()..]));
    patch.operation = DiffOperation::Moved;
    Ok(ParseState::GitTreeSeen)
}

/// Parse the `copy from ` line of a git extended unidiff.
fn git_copy_from(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.old_filename = Some(grab_filename(&line.as_bytes()[b"copy from ".len()..]));
    patch.operation = DiffOperation::Copied;
    Ok(ParseState::CopyFromSeen)
}

/// Parse the `copy to ` line of a git extended unidiff.
fn git_copy_to(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    patch.new_filename = Some(grab_filename(&line.as_bytes()[b"copy to ".len()..]));
    patch.operation = DiffOperation::Copied;
    Ok(ParseState::GitTreeSeen)
}

/// Parse the `new file ` line of a git extended unidiff.
fn git_new_file(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    if let Some(mode_str) = line.as_bytes().strip_prefix(b"new file mode ") {
        let (executable, symlink) = parse_git_mode_bits(mode_str)?;
        patch.new_executable_bit = executable;
        patch.new_symlink_bit = symlink;
    }
    patch.operation = DiffOperation::Added;
    Ok(ParseState::GitTreeSeen)
}

/// Parse the `deleted file ` line of a git extended unidiff.
fn git_deleted_file(patch: &mut PatchBuild, line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    if let Some(mode_str) = line.as_bytes().strip_prefix(b"deleted file mode ") {
        let (executable, symlink) = parse_git_mode_bits(mode_str)?;
        patch.old_executable_bit = executable;
        patch.old_symlink_bit = symlink;
    }
    patch.operation = DiffOperation::Deleted;
    Ok(ParseState::GitTreeSeen)
}

/// Parse the `index ` line of a git extended unidiff.
///
/// `index 33e5b38..0000000 100644` carries the unchanged file mode;
/// when the mode did change, separate `old mode`/`new mode` lines
/// appear instead and the index line has nothing for us.
fn git_index(patch: &mut PatchBuild, line: &BStr, state: ParseState) -> Result<ParseState, DiffError> {
    let rest = &line.as_bytes()[b"index ".len()..];
    if let Some(space) = rest.find_byte(b' ') {
        if patch.new_executable_bit == Tristate::Unknown
            && patch.new_symlink_bit == Tristate::Unknown
            && patch.operation != DiffOperation::Added
            && patch.operation != DiffOperation::Deleted
        {
            let (executable, symlink) = parse_git_mode_bits(&rest[space + 1..])?;
            patch.new_executable_bit = executable;
            patch.new_symlink_bit = symlink;

            // No mode change, so the old side matches the new side.
            patch.old_executable_bit = patch.new_executable_bit;
            patch.old_symlink_bit = patch.new_symlink_bit;
        }
    }
    Ok(state)
}

/// Parse the `GIT binary patch` header line.
fn binary_patch_start(_patch: &mut PatchBuild, _line: &BStr, _state: ParseState) -> Result<ParseState, DiffError> {
    Ok(ParseState::BinaryPatchFound)
}

/// Parse a range of the form `start[,length]`; a missing length is 1.
fn parse_range(bytes: &[u8]) -> Option<(u64, u64)> {
    let parse = |b: &[u8]| std::str::from_utf8(b).ok()?.parse::<u64>().ok();
    match bytes.find_byte(b',') {
        Some(comma) => Some((parse(&bytes[..comma])?, parse(&bytes[comma + 1..])?)),
        None => Some((parse(bytes)?, 1)),
    }
}

/// Try to parse a hunk header of the form `@@ -A[,B] +C[,D] @@` with
/// the given delimiter (`@@` for text, `##` for property hunks).
/// Returns `(original_start, original_length, modified_start,
/// modified_length)` on success.
fn parse_hunk_header(line: &[u8], atat: &[u8]) -> Option<(u64, u64, u64, u64)> {
    let mut p = atat.len();

    if line.get(p) != Some(&b' ') {
        return None;
    }
    p += 1;
    if line.get(p) != Some(&b'-') {
        return None;
    }
    p += 1;
    let start = p;
    while p < line.len() && line[p] != b' ' {
        p += 1;
    }
    if line.get(p) != Some(&b' ') {
        return None;
    }
    let (original_start, original_length) = parse_range(&line[start..p])?;

    p += 1;
    if line.get(p) != Some(&b'+') {
        return None;
    }
    p += 1;
    let start = p;
    while p < line.len() && line[p] != b' ' {
        p += 1;
    }
    if line.get(p) != Some(&b' ') {
        return None;
    }
    let (modified_start, modified_length) = parse_range(&line[start..p])?;

    Some((original_start, original_length, modified_start, modified_length))
}

/// Merge freshly parsed mergeinfo into an accumulator slot.
fn merge_into(slot: &mut Option<svn_mergeinfo::Mergeinfo>, parsed: svn_mergeinfo::Mergeinfo) {
    match slot {
        None => *slot = Some(parsed),
        Some(existing) => svn_mergeinfo::merge(existing, &parsed),
    }
}

/// Try to read one line of an `svn:mergeinfo` property hunk.
///
/// The words around the data are localized; all we can assume is that
/// a leading `/` starts the merge source path, the path runs up to a
/// `:` followed by `r`, and the revision range list after the `r` is
/// terminated by whitespace or end of line. Lines whose range list
/// does not parse are not treated as mergeinfo; that is not an error.
///
/// Counts come from the `## -0,R +0,F ##` header: while the original
/// length is positive the line describes a reverse merge, afterwards a
/// forward merge. The matching count on `hunk` is decremented per
/// successfully parsed line.
fn parse_mergeinfo(line: &BStr, hunk: &mut Hunk, patch: &mut Patch) -> Result<bool, DiffError> {
    let bytes = line.as_bytes();
    let slash = bytes.find_byte(b'/');
    let colon = bytes.rfind_byte(b':');

    let (Some(slash), Some(colon)) = (slash, colon) else {
        return Ok(false);
    };
    if !(slash < colon && bytes.get(colon + 1) == Some(&b'r')) {
        return Ok(false);
    }

    // The merge source path plus colon, then the range list with the
    // 'r' skipped, up to the first whitespace.
    let mut input = BString::from(&bytes[slash..=colon]);
    for &b in &bytes[colon + 2..] {
        if b.is_ascii_whitespace() {
            break;
        }
        input.push(b);
    }

    let mergeinfo = match svn_mergeinfo::parse(input.as_bstr()) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(false),
    };

    if hunk.original_length > 0 {
        // Reverse merges.
        if patch.reverse {
            merge_into(&mut patch.mergeinfo, mergeinfo);
        } else {
            merge_into(&mut patch.reverse_mergeinfo, mergeinfo);
        }
        hunk.original_length -= 1;
    } else if hunk.modified_length > 0 {
        // Forward merges.
        if patch.reverse {
            merge_into(&mut patch.reverse_mergeinfo, mergeinfo);
        } else {
            merge_into(&mut patch.mergeinfo, mergeinfo);
        }
        hunk.modified_length -= 1;
    }

    Ok(true)
}

/// The kind of the last body line read, used to decide which sides a
/// `\ No newline ...` marker applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineType {
    Noise,
    Original,
    Modified,
    Context,
}

/// A hunk as returned by [`parse_next_hunk`].
struct ParsedHunk {
    hunk: Hunk,
    is_property: bool,
    /// Set when a property header line was seen in this call; `None`
    /// for continuation hunks of the preceding property.
    prop_name: Option<BString>,
    prop_operation: DiffOperation,
}

/// Parse the next hunk, text or property, from the patch file.
///
/// Returns `None` when no further hunk belongs to the current patch;
/// the file is left positioned at the line that ended the scan so the
/// next patch sees it again.
fn parse_next_hunk<R: Read + Seek>(
    patch: &mut Patch,
    patch_file: &mut PatchFile<R>,
    ignore_whitespace: bool,
    canceller: &Canceller,
) -> Result<Option<ParsedHunk>, DiffError> {
    let minus: &[u8] = b"--- ";
    let text_atat: &[u8] = b"@@";
    let prop_atat: &[u8] = b"##";

    let mut hunk = Hunk::new();
    hunk.reverse = patch.reverse;

    let mut is_property = false;
    let mut prop_name: Option<BString> = None;
    let mut prop_operation = DiffOperation::Unchanged;

    let mut in_hunk = false;
    let mut hunk_seen = false;
    let mut changed_line_seen = false;
    let mut leading_context: u64 = 0;
    let mut trailing_context: u64 = 0;
    let mut original_lines: u64 = 0;
    let mut modified_lines: u64 = 0;
    let mut start: u64 = 0;
    let mut end: u64 = 0;
    let mut original_end: u64 = 0;
    let mut modified_end: u64 = 0;
    let mut last_line_type = LineType::Noise;
    let mut original_no_final_eol = false;
    let mut modified_no_final_eol = false;

    // Reversed parsing swaps the meaning of the prefix characters.
    let (add, del) = if patch.reverse { (b'-', b'+') } else { (b'+', b'-') };

    let mut pos = patch_file.position()?;
    let mut last_line;
    let mut eof;

    loop {
        canceller.check()?;

        last_line = pos;
        let raw = patch_file.readline()?;
        eof = raw.at_eof;
        pos = patch_file.position()?;
        let line = raw.text;

        // Lines starting with a backslash indicate a missing EOL:
        // "\ No newline at end of file" or "... of property".
        if line.first() == Some(&b'\\') {
            if in_hunk {
                // Which sides lack the newline follows from the kind of
                // the line right before the marker.
                if last_line_type != LineType::Modified {
                    original_no_final_eol = true;
                }
                if last_line_type != LineType::Original {
                    modified_no_final_eol = true;
                }
            }
            if eof {
                break;
            }
            continue;
        }

        if in_hunk
            && is_property
            && prop_name.as_deref().is_some_and(|n| n == PROP_MERGEINFO.as_bytes())
        {
            if parse_mergeinfo(line.as_bstr(), &mut hunk, patch)? {
                // Proceed to the next line of the mergeinfo hunk.
                if eof {
                    break;
                }
                continue;
            }
            // Not mergeinfo after all; on to the next property.
            in_hunk = false;
        }

        if in_hunk {
            if !hunk_seen {
                // First line of the hunk; its offset starts the hunk text.
                start = last_line;
            }

            let c = line.first().copied();
            let blank = !eof && line.is_empty();

            if c == Some(b' ')
                || ((original_lines > 0 && modified_lines > 0)
                    && (blank
                        || (ignore_whitespace && c != Some(del) && c != Some(add))))
            {
                // Context line; blank lines in mid-hunk count as context
                // with their leading space chopped.
                hunk_seen = true;
                original_end = pos;
                modified_end = pos;
                if original_lines > 0 {
                    original_lines -= 1;
                } else {
                    hunk.original_length += 1;
                    hunk.original_fuzz += 1;
                }
                if modified_lines > 0 {
                    modified_lines -= 1;
                } else {
                    hunk.modified_length += 1;
                    hunk.modified_fuzz += 1;
                }
                if changed_line_seen {
                    trailing_context += 1;
                } else {
                    leading_context += 1;
                }
                last_line_type = LineType::Context;
            } else if c == Some(del) && (original_lines > 0 || line.get(1) != Some(&del)) {
                // Deleted line.
                hunk_seen = true;
                changed_line_seen = true;
                original_end = pos;

                // Context in mid-hunk is not trailing context.
                trailing_context = 0;

                if original_lines > 0 {
                    original_lines -= 1;
                } else {
                    hunk.original_length += 1;
                    hunk.original_fuzz += 1;
                }
                last_line_type = LineType::Original;
            } else if c == Some(add) && (modified_lines > 0 || line.get(1) != Some(&add)) {
                // Added line.
                hunk_seen = true;
                changed_line_seen = true;
                modified_end = pos;

                trailing_context = 0;

                if modified_lines > 0 {
                    modified_lines -= 1;
                } else {
                    hunk.modified_length += 1;
                    hunk.modified_fuzz += 1;
                }
                last_line_type = LineType::Modified;
            } else {
                // The start of the current line marks the first byte
                // after the hunk text.
                end = if eof { pos } else { last_line };
                if original_end == 0 {
                    original_end = end;
                }
                if modified_end == 0 {
                    modified_end = end;
                }
                in_hunk = false;
                break;
            }
        } else if line.starts_with(text_atat) {
            // Looks like a hunk header, try to rip it apart.
            if let Some((os, ol, ms, ml)) = parse_hunk_header(&line, text_atat) {
                hunk.original_start = os;
                hunk.original_length = ol;
                hunk.modified_start = ms;
                hunk.modified_length = ml;
                original_lines = ol;
                modified_lines = ml;
                in_hunk = true;
                is_property = false;
            }
        } else if line.starts_with(prop_atat) {
            if let Some((os, ol, ms, ml)) = parse_hunk_header(&line, prop_atat) {
                hunk.original_start = os;
                hunk.original_length = ol;
                hunk.modified_start = ms;
                hunk.modified_length = ml;
                original_lines = ol;
                modified_lines = ml;
                in_hunk = true;
                is_property = true;
            }
        } else if let Some(rest) = line.as_bytes().strip_prefix(b"Added: ") {
            if !rest.is_empty() {
                prop_name = Some(BString::from(rest));
                prop_operation = if patch.reverse {
                    DiffOperation::Deleted
                } else {
                    DiffOperation::Added
                };
            }
        } else if let Some(rest) = line.as_bytes().strip_prefix(b"Deleted: ") {
            if !rest.is_empty() {
                prop_name = Some(BString::from(rest));
                prop_operation = if patch.reverse {
                    DiffOperation::Added
                } else {
                    DiffOperation::Deleted
                };
            }
        } else if let Some(rest) = line.as_bytes().strip_prefix(b"Modified: ") {
            if !rest.is_empty() {
                prop_name = Some(BString::from(rest));
                prop_operation = DiffOperation::Modified;
            }
        } else if line.starts_with(minus) || line.starts_with(b"diff --git ") {
            // This could be the header of another patch. Bail out.
            break;
        }

        if eof {
            break;
        }
    }

    if !eof {
        // Rewind to the start of the line just read, so the next call
        // does not end up skipping it.
        patch_file.seek_to(last_line)?;
    } else if in_hunk {
        // The hunk ends at EOF.
        end = pos;
        if original_end == 0 {
            original_end = end;
        }
        if modified_end == 0 {
            modified_end = end;
        }
    }

    if hunk_seen && start < end {
        // When the body was shorter than the header announced, limit
        // the lengths to what was present and charge a fuzz penalty.
        if original_lines > 0 {
            hunk.original_length -= original_lines;
            hunk.original_fuzz += original_lines;
        }
        if modified_lines > 0 {
            hunk.modified_length -= modified_lines;
            hunk.modified_fuzz += modified_lines;
        }

        hunk.leading_context = leading_context;
        hunk.trailing_context = trailing_context;
        hunk.original_no_final_eol = original_no_final_eol;
        hunk.modified_no_final_eol = modified_no_final_eol;
        hunk.diff_text_range = HunkRange::at(start, end);
        hunk.original_text_range = HunkRange::at(start, original_end);
        hunk.modified_text_range = HunkRange::at(start, modified_end);

        Ok(Some(ParsedHunk {
            hunk,
            is_property,
            prop_name,
            prop_operation,
        }))
    } else {
        // Something went wrong, discard the result.
        Ok(None)
    }
}

/// Store a property hunk under its property's patch, creating the
/// patch on first sight.
fn add_property_hunk(patch: &mut Patch, name: BString, hunk: Hunk, operation: DiffOperation) {
    patch
        .prop_patches
        .entry(name.clone())
        .or_insert_with(|| PropPatch {
            name,
            operation,
            hunks: Vec::new(),
        })
        .hunks
        .push(hunk);
}

/// Parse all hunks, text and property, belonging to the current patch.
fn parse_hunks<R: Read + Seek>(
    patch: &mut Patch,
    patch_file: &mut PatchFile<R>,
    ignore_whitespace: bool,
    canceller: &Canceller,
) -> Result<(), DiffError> {
    let mut last_prop_name: Option<BString> = None;

    while let Some(parsed) = parse_next_hunk(patch, patch_file, ignore_whitespace, canceller)? {
        if parsed.is_property {
            let name = match parsed.prop_name {
                Some(name) => {
                    last_prop_name = Some(name.clone());
                    name
                }
                None => match last_prop_name.clone() {
                    Some(name) => name,
                    // A property hunk with no property header; drop it.
                    None => continue,
                },
            };

            // Mergeinfo cannot be represented as a hunk; it was already
            // folded into the patch itself.
            if name.as_slice() == PROP_MERGEINFO.as_bytes() {
                continue;
            }

            add_property_hunk(patch, name, parsed.hunk, parsed.prop_operation);
        } else {
            patch.hunks.push(parsed.hunk);
            last_prop_name = None;
        }
    }

    Ok(())
}

/// Scan a `GIT binary patch` block, recording the byte offsets of the
/// base85 sections and the declared expanded sizes.
///
/// The first `literal N` section is the result (dst) side, the second
/// the original (src) side. A line that fits no rule ends the scan and
/// is pushed back for the next patch. Reversed parsing swaps the two
/// sides.
fn parse_binary_patch<R: Read + Seek>(
    patch: &mut Patch,
    patch_file: &mut PatchFile<R>,
    reverse: bool,
) -> Result<(), DiffError> {
    let mut bpatch = BinaryPatch::default();
    let mut in_blob = false;
    let mut in_src = false;
    let mut found = false;

    let mut pos = patch_file.position()?;
    let mut last_line;
    let mut eof;

    loop {
        last_line = pos;
        let raw = patch_file.readline()?;
        eof = raw.at_eof;
        pos = patch_file.position()?;
        let line = raw.text;

        if in_blob {
            // 66 = length byte + (52 / 4 * 5) encoded characters.
            let blob_line = line
                .first()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && line.len() <= 66
                && !line.contains(&b':')
                && !line.contains(&b' ');
            let has_non_ws = line.iter().any(|b| !b.is_ascii_whitespace());

            if blob_line {
                if in_src {
                    bpatch.src_end = pos;
                } else {
                    bpatch.dst_end = pos;
                }
            } else if has_non_ws && !(in_src && bpatch.src_start < last_line) {
                break; // Bad patch.
            } else if in_src {
                found = true;
                break;
            } else {
                in_blob = false;
                in_src = true;
            }
        } else if let Some(rest) = line.as_bytes().strip_prefix(b"literal ") {
            let Some(expanded_size) = std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
            else {
                break;
            };

            if in_src {
                bpatch.src_start = pos;
                bpatch.src_end = pos;
                bpatch.src_filesize = expanded_size;
            } else {
                bpatch.dst_start = pos;
                bpatch.dst_end = pos;
                bpatch.dst_filesize = expanded_size;
            }
            in_blob = true;
        } else {
            break; // Deltas are not supported.
        }

        if eof {
            break;
        }
    }

    if !eof {
        // Rewind to the start of the line just read; it may contain a
        // patch or hunk header.
        patch_file.seek_to(last_line)?;
    } else if in_src && (bpatch.src_end > bpatch.src_start || bpatch.src_filesize == 0) {
        found = true;
    }

    if found {
        if reverse {
            std::mem::swap(&mut bpatch.src_start, &mut bpatch.dst_start);
            std::mem::swap(&mut bpatch.src_end, &mut bpatch.dst_end);
            std::mem::swap(&mut bpatch.src_filesize, &mut bpatch.dst_filesize);
        }
        patch.binary_patch = Some(bpatch);
    }

    Ok(())
}

/// Parse the next patch from the patch file.
///
/// Returns `None` at end of file, or when the remaining input contains
/// no complete diff header. With `reverse` set, the returned patch
/// describes the inverse change: filenames, mode bits, operation
/// direction and binary sides are swapped, and the hunk readers swap
/// `+` and `-`. With `ignore_whitespace` set, hunk body lines that
/// match no prefix are tolerated as context.
pub fn next_patch<R: Read + Seek>(
    patch_file: &mut PatchFile<R>,
    reverse: bool,
    ignore_whitespace: bool,
    canceller: &Canceller,
) -> Result<Option<Patch>, DiffError> {
    let mut build = PatchBuild::default();
    let mut state = ParseState::Start;
    let mut line_after_tree_header_read = false;

    let mut pos = patch_file.next_patch_offset;
    patch_file.seek_to(pos)?;
    let mut last_line;

    loop {
        canceller.check()?;

        last_line = pos;
        let raw = patch_file.readline()?;
        if !raw.at_eof {
            pos = patch_file.position()?;
        }
        let line = raw.text;

        // Run the state machine.
        let mut valid_header_line = false;
        for transition in TRANSITIONS {
            if state == transition.required_state && line.starts_with(transition.prefix) {
                state = (transition.handler)(&mut build, line.as_bstr(), state)?;
                valid_header_line = true;
                break;
            }
        }

        if matches!(
            state,
            ParseState::UnidiffFound | ParseState::GitHeaderFound | ParseState::BinaryPatchFound
        ) {
            // A valid diff header.
            break;
        } else if matches!(state, ParseState::GitTreeSeen | ParseState::GitModeSeen)
            && line_after_tree_header_read
            && !valid_header_line
        {
            // A valid diff header for a patch with only tree changes.
            // Rewind to the start of the line just read, so the next
            // call does not end up skipping it; it may contain a patch.
            patch_file.seek_to(last_line)?;
            break;
        } else if matches!(state, ParseState::GitTreeSeen | ParseState::GitModeSeen) {
            line_after_tree_header_read = true;
        } else if !valid_header_line
            && state != ParseState::Start
            && state != ParseState::GitDiffSeen
        {
            // A partial header went nowhere. Rewind; the line just read
            // may start a new header.
            patch_file.seek_to(last_line)?;
            state = ParseState::Start;
        }

        if raw.at_eof {
            break;
        }
    }

    // Reversal happens on the build so the hunk and binary sub-parsers
    // see the already-swapped patch.
    if reverse {
        std::mem::swap(&mut build.old_filename, &mut build.new_filename);
        build.operation = build.operation.reversed();
        std::mem::swap(&mut build.old_executable_bit, &mut build.new_executable_bit);
        std::mem::swap(&mut build.old_symlink_bit, &mut build.new_symlink_bit);
    }

    let (Some(old_filename), Some(new_filename)) = (build.old_filename, build.new_filename)
    else {
        // Not a valid patch; remember where scanning stopped and let
        // the caller move on.
        patch_file.next_patch_offset = patch_file.position()?;
        return Ok(None);
    };

    let mut patch = Patch {
        old_filename,
        new_filename,
        operation: build.operation,
        old_executable_bit: build.old_executable_bit,
        new_executable_bit: build.new_executable_bit,
        old_symlink_bit: build.old_symlink_bit,
        new_symlink_bit: build.new_symlink_bit,
        hunks: Vec::new(),
        prop_patches: Default::default(),
        mergeinfo: None,
        reverse_mergeinfo: None,
        binary_patch: None,
        reverse,
    };

    if state == ParseState::BinaryPatchFound {
        parse_binary_patch(&mut patch, patch_file, reverse)?;
        // And fall through to property parsing.
    }

    parse_hunks(&mut patch, patch_file, ignore_whitespace, canceller)?;

    patch_file.next_patch_offset = patch_file.position()?;

    patch.hunks.sort_by_key(|hunk| hunk.original_start);

    Ok(Some(patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits() {
        assert_eq!(
            parse_git_mode_bits(b"100644").unwrap(),
            (Tristate::False, Tristate::False)
        );
        assert_eq!(
            parse_git_mode_bits(b"100755").unwrap(),
            (Tristate::True, Tristate::False)
        );
        assert_eq!(
            parse_git_mode_bits(b"120000").unwrap(),
            (Tristate::Unknown, Tristate::True)
        );
        assert_eq!(
            parse_git_mode_bits(b"040000").unwrap(),
            (Tristate::Unknown, Tristate::False)
        );
        // Unknown values parse but decide nothing.
        assert_eq!(
            parse_git_mode_bits(b"000000").unwrap(),
            (Tristate::Unknown, Tristate::Unknown)
        );
        assert!(parse_git_mode_bits(b"totally-not-a-mode").is_err());
    }

    #[test]
    fn hunk_headers() {
        assert_eq!(
            parse_hunk_header(b"@@ -1,3 +1,4 @@", b"@@"),
            Some((1, 3, 1, 4))
        );
        assert_eq!(
            parse_hunk_header(b"@@ -10 +10,2 @@ fn main()", b"@@"),
            Some((10, 1, 10, 2))
        );
        assert_eq!(
            parse_hunk_header(b"## -0,0 +0,1 ##", b"##"),
            Some((0, 0, 0, 1))
        );
        assert_eq!(parse_hunk_header(b"@@ bogus @@", b"@@"), None);
        assert_eq!(parse_hunk_header(b"@@ -1,3 @@", b"@@"), None);
    }

    #[test]
    fn git_start_requires_matching_paths() {
        let mut build = PatchBuild::default();
        let state = git_start(
            &mut build,
            bstr::BStr::new(b"diff --git a/dir/file.c b/dir/file.c"),
            ParseState::Start,
        )
        .unwrap();
        assert_eq!(state, ParseState::GitDiffSeen);
        assert_eq!(build.old_filename, Some(BString::from(&b"dir/file.c"[..])));
        assert_eq!(build.new_filename, Some(BString::from(&b"dir/file.c"[..])));
    }

    #[test]
    fn git_start_leaves_ambiguous_paths_unset() {
        let mut build = PatchBuild::default();
        let state = git_start(
            &mut build,
            bstr::BStr::new(b"diff --git a/old b/new"),
            ParseState::Start,
        )
        .unwrap();
        assert_eq!(state, ParseState::GitDiffSeen);
        assert!(build.old_filename.is_none());
        assert!(build.new_filename.is_none());
    }

    #[test]
    fn filenames_stop_at_tab() {
        assert_eq!(grab_filename(b"a.txt\t(revision 1)"), "a.txt");
        assert_eq!(grab_filename(b"a.txt"), "a.txt");
    }
}

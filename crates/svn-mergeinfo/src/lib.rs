//! Merge tracking metadata.
//!
//! A mergeinfo value maps merge source paths to lists of revision
//! ranges, serialized as `/source:2-5,7*` lines. This crate parses and
//! formats that syntax and provides the range-list algebra (merge,
//! diff) the diff engine needs for `svn:mergeinfo` property output.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};

/// Errors raised by mergeinfo parsing.
#[derive(Debug, thiserror::Error)]
pub enum MergeinfoError {
    #[error("could not parse mergeinfo string '{0}'")]
    Parse(BString),

    #[error("unable to parse reversed revision range '{start}-{end}'")]
    ReversedRange { start: u64, end: u64 },

    #[error("revision 0 is not a valid merge source revision")]
    RevisionZero,
}

/// An inclusive revision range with an inheritability marker.
///
/// `4-7` covers revisions 4, 5, 6 and 7; a trailing `*` in the
/// serialized form marks the range as non-inheritable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MergeRange {
    pub start: u64,
    pub end: u64,
    pub inheritable: bool,
}

impl MergeRange {
    /// An inheritable range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        MergeRange {
            start,
            end,
            inheritable: true,
        }
    }

    fn fmt_into(&self, out: &mut BString) {
        if self.start == self.end {
            out.extend_from_slice(self.start.to_string().as_bytes());
        } else {
            out.extend_from_slice(self.start.to_string().as_bytes());
            out.push(b'-');
            out.extend_from_slice(self.end.to_string().as_bytes());
        }
        if !self.inheritable {
            out.push(b'*');
        }
    }
}

/// A canonicalized list of ranges: sorted, non-overlapping, with
/// adjacent same-inheritability ranges combined.
pub type RangeList = Vec<MergeRange>;

/// Mergeinfo: merge source path to range list, ordered by path.
pub type Mergeinfo = BTreeMap<BString, RangeList>;

/// Parse a mergeinfo string.
///
/// The input is a sequence of `path:ranges` lines separated by
/// newlines, where `ranges` is a comma-separated list of `N`, `N-M`,
/// optionally suffixed `*`. Paths are stored without their leading
/// slash stripped; they are compared bytewise.
pub fn parse(input: &BStr) -> Result<Mergeinfo, MergeinfoError> {
    let mut mergeinfo = Mergeinfo::new();

    for line in input.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        // Split on the last ':' so source paths may contain colons.
        let colon = line
            .iter()
            .rposition(|&b| b == b':')
            .ok_or_else(|| MergeinfoError::Parse(line.as_bstr().to_owned()))?;
        let (path, rest) = line.split_at(colon);
        if path.is_empty() {
            return Err(MergeinfoError::Parse(line.as_bstr().to_owned()));
        }

        let ranges = parse_rangelist(BStr::new(&rest[1..]))?;
        merge_into_entry(&mut mergeinfo, BStr::new(path), &ranges);
    }

    Ok(mergeinfo)
}

/// Parse a comma-separated revision range list.
pub fn parse_rangelist(input: &BStr) -> Result<RangeList, MergeinfoError> {
    let mut ranges = RangeList::new();

    for piece in input.split(|&b| b == b',') {
        if piece.is_empty() {
            return Err(MergeinfoError::Parse(input.to_owned()));
        }

        let (piece, inheritable) = match piece.strip_suffix(b"*") {
            Some(rest) => (rest, false),
            None => (piece, true),
        };

        let (start, end) = match piece.find_byte(b'-') {
            Some(dash) => (
                parse_revnum(&piece[..dash])?,
                parse_revnum(&piece[dash + 1..])?,
            ),
            None => {
                let rev = parse_revnum(piece)?;
                (rev, rev)
            }
        };

        if start == 0 || end == 0 {
            return Err(MergeinfoError::RevisionZero);
        }
        if end < start {
            return Err(MergeinfoError::ReversedRange { start, end });
        }

        ranges.push(MergeRange {
            start,
            end,
            inheritable,
        });
    }

    Ok(canonicalize(ranges))
}

fn parse_revnum(bytes: &[u8]) -> Result<u64, MergeinfoError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| MergeinfoError::Parse(bytes.as_bstr().to_owned()))?;
    s.trim()
        .parse::<u64>()
        .map_err(|_| MergeinfoError::Parse(bytes.as_bstr().to_owned()))
}

/// Sort and coalesce a range list.
fn canonicalize(mut ranges: RangeList) -> RangeList {
    ranges.sort();
    let mut out = RangeList::with_capacity(ranges.len());

    for range in ranges {
        match out.last_mut() {
            Some(last)
                if last.inheritable == range.inheritable
                    && range.start <= last.end.saturating_add(1) =>
            {
                last.end = last.end.max(range.end);
            }
            _ => out.push(range),
        }
    }

    out
}

fn merge_into_entry(mergeinfo: &mut Mergeinfo, path: &BStr, ranges: &RangeList) {
    let entry = mergeinfo.entry(path.to_owned()).or_default();
    entry.extend_from_slice(ranges);
    *entry = canonicalize(std::mem::take(entry));
}

/// Merge `other` into `mergeinfo`, path by path.
pub fn merge(mergeinfo: &mut Mergeinfo, other: &Mergeinfo) {
    for (path, ranges) in other {
        merge_into_entry(mergeinfo, path.as_bstr(), ranges);
    }
}

/// Subtract `subtrahend` from `minuend` as revision sets, keeping the
/// inheritability of the surviving minuend pieces.
fn rangelist_remove(minuend: &RangeList, subtrahend: &RangeList) -> RangeList {
    let mut out = RangeList::new();

    for &range in minuend {
        let mut pieces = vec![range];

        for &sub in subtrahend {
            let mut next = Vec::with_capacity(pieces.len() + 1);
            for piece in pieces {
                if sub.end < piece.start || sub.start > piece.end {
                    next.push(piece);
                    continue;
                }
                if sub.start > piece.start {
                    next.push(MergeRange {
                        start: piece.start,
                        end: sub.start - 1,
                        inheritable: piece.inheritable,
                    });
                }
                if sub.end < piece.end {
                    next.push(MergeRange {
                        start: sub.end + 1,
                        end: piece.end,
                        inheritable: piece.inheritable,
                    });
                }
            }
            pieces = next;
        }

        out.extend(pieces);
    }

    canonicalize(out)
}

/// Compute the mergeinfo removed and added when going from `old` to
/// `new`: `(deleted, added)`.
pub fn diff(old: &Mergeinfo, new: &Mergeinfo) -> (Mergeinfo, Mergeinfo) {
    let empty = RangeList::new();
    let mut deleted = Mergeinfo::new();
    let mut added = Mergeinfo::new();

    for (path, old_ranges) in old {
        let new_ranges = new.get(path).unwrap_or(&empty);
        let removed = rangelist_remove(old_ranges, new_ranges);
        if !removed.is_empty() {
            deleted.insert(path.clone(), removed);
        }
    }

    for (path, new_ranges) in new {
        let old_ranges = old.get(path).unwrap_or(&empty);
        let introduced = rangelist_remove(new_ranges, old_ranges);
        if !introduced.is_empty() {
            added.insert(path.clone(), introduced);
        }
    }

    (deleted, added)
}

/// Serialize a range list as `2-5,7*`.
pub fn rangelist_to_string(ranges: &RangeList) -> BString {
    let mut out = BString::from("");
    for (i, range) in ranges.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        range.fmt_into(&mut out);
    }
    out
}

/// Serialize mergeinfo as newline-separated `path:ranges` lines.
pub fn to_string(mergeinfo: &Mergeinfo) -> BString {
    let mut out = BString::from("");
    for (path, ranges) in mergeinfo {
        out.extend_from_slice(path);
        out.push(b':');
        out.extend_from_slice(&rangelist_to_string(ranges));
        out.push(b'\n');
    }
    out
}

//! On-demand hunk text readers.
//!
//! A hunk stores byte ranges into its patch file rather than text; the
//! readers here reconstruct the original side, the modified side, or
//! the raw hunk body line by line. Every call saves and restores the
//! patch file's cursor, so interleaving with the parser is safe.

use std::io::{Cursor, Read, Seek};

use bstr::{BStr, BString};

use crate::patch_file::PatchFile;
use crate::{DiffError, Hunk, HunkRange};

#[derive(Debug, Clone, Copy)]
enum Side {
    Original,
    Modified,
}

impl Hunk {
    /// Start line of the original side (reverse-aware).
    pub fn original_start(&self) -> u64 {
        if self.reverse {
            self.modified_start
        } else {
            self.original_start
        }
    }

    /// Line count of the original side (reverse-aware).
    pub fn original_length(&self) -> u64 {
        if self.reverse {
            self.modified_length
        } else {
            self.original_length
        }
    }

    /// Start line of the modified side (reverse-aware).
    pub fn modified_start(&self) -> u64 {
        if self.reverse {
            self.original_start
        } else {
            self.modified_start
        }
    }

    /// Line count of the modified side (reverse-aware).
    pub fn modified_length(&self) -> u64 {
        if self.reverse {
            self.original_length
        } else {
            self.modified_length
        }
    }

    /// Unchanged lines before the first change.
    pub fn leading_context(&self) -> u64 {
        self.leading_context
    }

    /// Unchanged lines after the last change.
    pub fn trailing_context(&self) -> u64 {
        self.trailing_context
    }

    /// The fuzz penalty relevant for applying this hunk (reverse-aware).
    pub fn fuzz_penalty(&self) -> u64 {
        if self.reverse {
            self.original_fuzz
        } else {
            self.modified_fuzz
        }
    }

    /// True when the original side ends without a newline (reverse-aware).
    pub fn original_no_final_eol(&self) -> bool {
        if self.reverse {
            self.modified_no_final_eol
        } else {
            self.original_no_final_eol
        }
    }

    /// True when the modified side ends without a newline (reverse-aware).
    pub fn modified_no_final_eol(&self) -> bool {
        if self.reverse {
            self.original_no_final_eol
        } else {
            self.modified_no_final_eol
        }
    }

    /// Rewind the raw hunk text cursor.
    pub fn reset_diff_text(&mut self) {
        self.diff_text_range.reset();
    }

    /// Rewind the original text cursor (reverse-aware).
    pub fn reset_original_text(&mut self) {
        if self.reverse {
            self.modified_text_range.reset();
        } else {
            self.original_text_range.reset();
        }
    }

    /// Rewind the modified text cursor (reverse-aware).
    pub fn reset_modified_text(&mut self) {
        if self.reverse {
            self.original_text_range.reset();
        } else {
            self.modified_text_range.reset();
        }
    }

    /// Read the next line of the original-side reconstruction.
    ///
    /// Added lines are skipped, the prefix character is stripped from
    /// context and deleted lines, and no-eol markers are skipped.
    /// Returns `None` when the side is exhausted.
    pub fn readline_original<R: Read + Seek>(
        &mut self,
        patch_file: &mut PatchFile<R>,
    ) -> Result<Option<BString>, DiffError> {
        self.readline_filtered(patch_file, Side::Original)
    }

    /// Read the next line of the modified-side reconstruction.
    pub fn readline_modified<R: Read + Seek>(
        &mut self,
        patch_file: &mut PatchFile<R>,
    ) -> Result<Option<BString>, DiffError> {
        self.readline_filtered(patch_file, Side::Modified)
    }

    fn readline_filtered<R: Read + Seek>(
        &mut self,
        patch_file: &mut PatchFile<R>,
        side: Side,
    ) -> Result<Option<BString>, DiffError> {
        let reverse = self.reverse;

        // For a reversed patch the sides trade places wholesale: range,
        // no-eol flag, and which prefix is kept versus skipped.
        let (no_final_eol, forbidden, wanted) = match side {
            Side::Original => (
                if reverse {
                    self.modified_no_final_eol
                } else {
                    self.original_no_final_eol
                },
                if reverse { b'-' } else { b'+' },
                if reverse { b'+' } else { b'-' },
            ),
            Side::Modified => (
                if reverse {
                    self.original_no_final_eol
                } else {
                    self.modified_no_final_eol
                },
                if reverse { b'+' } else { b'-' },
                if reverse { b'-' } else { b'+' },
            ),
        };
        let range = match (side, reverse) {
            (Side::Original, false) | (Side::Modified, true) => &mut self.original_text_range,
            (Side::Original, true) | (Side::Modified, false) => &mut self.modified_text_range,
        };

        if range.current >= range.end {
            return Ok(None);
        }

        patch_file.save_position()?;
        patch_file.seek_to(range.current)?;

        let mut picked = None;
        while range.current < range.end {
            let max = range.end - range.current;
            let raw = patch_file.readline_max(max)?;
            range.current = patch_file.position()?;

            if raw.text.is_empty() && raw.eol.is_none() {
                break;
            }

            let first = raw.text.first().copied();
            if first == Some(b'\\') || first == Some(forbidden) {
                continue;
            }

            // Strip the prefix from context and same-side lines; a line
            // with no recognized prefix had its leading space chopped
            // and is returned as-is.
            let body = if first == Some(b' ') || first == Some(wanted) {
                BString::from(&raw.text[1..])
            } else {
                raw.text
            };
            picked = Some((body, raw.eol, raw.at_eof));
            break;
        }

        let line = match picked {
            None => None,
            Some((mut body, eol, at_eof)) => {
                match eol {
                    Some(eol) => body.extend_from_slice(&eol),
                    None => {
                        // The patch file itself ends without a newline
                        // here. Unless a no-eol marker covered this side,
                        // the reconstruction still needs one; borrow the
                        // first EOL found in the patch file.
                        if at_eof && !no_final_eol && !body.is_empty() {
                            if let Some(eol) = patch_file.first_eol()? {
                                body.extend_from_slice(&eol);
                            }
                        }
                    }
                }
                Some(body)
            }
        };

        patch_file.restore_position()?;
        Ok(line)
    }

    /// Read the next raw line of the hunk body, prefix characters
    /// included. With a reversed patch, `+` and `-` prefixes are
    /// swapped in the returned text.
    pub fn readline_diff_text<R: Read + Seek>(
        &mut self,
        patch_file: &mut PatchFile<R>,
    ) -> Result<Option<BString>, DiffError> {
        let range = &mut self.diff_text_range;
        if range.current >= range.end {
            return Ok(None);
        }

        patch_file.save_position()?;
        patch_file.seek_to(range.current)?;

        let max = range.end - range.current;
        let raw = patch_file.readline_max(max)?;
        range.current = patch_file.position()?;

        let line = if raw.text.is_empty() && raw.eol.is_none() {
            None
        } else {
            let mut body = raw.text;
            if self.reverse {
                match body.first().copied() {
                    Some(b'+') => body[0] = b'-',
                    Some(b'-') => body[0] = b'+',
                    _ => {}
                }
            }
            match raw.eol {
                Some(eol) => body.extend_from_slice(&eol),
                None => {
                    if raw.at_eof && !body.is_empty() {
                        if let Some(eol) = patch_file.first_eol()? {
                            body.extend_from_slice(&eol);
                        }
                    }
                }
            }
            Some(body)
        };

        patch_file.restore_position()?;
        Ok(line)
    }
}

/// Common guts of [`hunk_adds_single_line`] and
/// [`hunk_deletes_single_line`]: a synthetic one-line hunk backed by
/// its own in-memory patch file.
fn add_or_delete_single_line(
    line: &BStr,
    reverse: bool,
    add: bool,
) -> Result<(Hunk, PatchFile<Cursor<Vec<u8>>>), DiffError> {
    const HUNK_HEADER: [&str; 2] = ["@@ -1 +0,0 @@\n", "@@ -0,0 +1 @@\n"];
    let header = HUNK_HEADER[usize::from(add)];
    let header_len = header.len() as u64;
    let len = line.len() as u64;
    // The range covers the prefix character and the line, but not the
    // trailing newline, so the reconstruction comes back without one.
    let end = header_len + 1 + len;

    let mut buf = BString::from(header);
    buf.push(if add { b'+' } else { b'-' });
    buf.extend_from_slice(line);
    buf.push(b'\n');
    buf.extend_from_slice(b"\\ No newline at end of hunk\n");

    let mut hunk = Hunk::new();
    hunk.reverse = reverse;
    hunk.diff_text_range = HunkRange::at(header_len, buf.len() as u64);

    if add {
        // There is no original text.
        hunk.original_text_range = HunkRange::at(0, 0);
        hunk.original_no_final_eol = false;
        hunk.modified_text_range = HunkRange::at(header_len, end);
        hunk.modified_no_final_eol = true;
        hunk.original_start = 0;
        hunk.original_length = 0;
        hunk.modified_start = 1;
        hunk.modified_length = 1;
    } else {
        hunk.original_text_range = HunkRange::at(header_len, end);
        hunk.original_no_final_eol = true;
        hunk.modified_text_range = HunkRange::at(0, 0);
        hunk.modified_no_final_eol = false;
        hunk.original_start = 1;
        hunk.original_length = 1;
        hunk.modified_start = 0;
        hunk.modified_length = 0;
    }

    let patch_file = PatchFile::new(Cursor::new(Vec::from(buf)));
    Ok((hunk, patch_file))
}

/// Build a hunk that adds a single line, for a patch with the given
/// reverse flag. The returned patch file backs the hunk's text.
pub fn hunk_adds_single_line(
    line: &BStr,
    reverse: bool,
) -> Result<(Hunk, PatchFile<Cursor<Vec<u8>>>), DiffError> {
    add_or_delete_single_line(line, reverse, !reverse)
}

/// Build a hunk that deletes a single line; see [`hunk_adds_single_line`].
pub fn hunk_deletes_single_line(
    line: &BStr,
    reverse: bool,
) -> Result<(Hunk, PatchFile<Cursor<Vec<u8>>>), DiffError> {
    add_or_delete_single_line(line, reverse, reverse)
}

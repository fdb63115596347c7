//! The shared, seekable reader over a patch file.
//!
//! The parser walks the file forwards while hunk and binary readers
//! seek to hunk-local offsets; both go through this type. Readers that
//! jump around must bracket their work with [`PatchFile::save_position`]
//! and [`PatchFile::restore_position`] so the parser's cursor survives.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bstr::BString;

use crate::DiffError;

/// One physical line read from the patch file.
#[derive(Debug, Clone)]
pub(crate) struct RawLine {
    /// Line content without its end-of-line bytes.
    pub text: BString,
    /// The end-of-line bytes, if the line had any.
    pub eol: Option<BString>,
    /// True when end of file was hit during this read.
    pub at_eof: bool,
}

impl RawLine {
    /// True for the read past the last line: no content, no EOL.
    pub fn is_empty_eof(&self) -> bool {
        self.at_eof && self.eol.is_none() && self.text.is_empty()
    }
}

/// A buffered, position-tracking reader over a patch file.
pub struct PatchFile<R> {
    reader: BufReader<R>,
    /// Where the next patch starts; advanced by the parser.
    pub(crate) next_patch_offset: u64,
    saved_position: Option<u64>,
}

impl PatchFile<File> {
    /// Open a patch file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DiffError> {
        Ok(PatchFile::new(File::open(path)?))
    }
}

impl<R: Read + Seek> PatchFile<R> {
    /// Wrap an arbitrary seekable reader (e.g. an in-memory cursor).
    pub fn new(reader: R) -> Self {
        PatchFile {
            reader: BufReader::new(reader),
            next_patch_offset: 0,
            saved_position: None,
        }
    }

    /// Current byte offset.
    pub(crate) fn position(&mut self) -> io::Result<u64> {
        self.reader.stream_position()
    }

    /// Seek to an absolute byte offset.
    pub(crate) fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Remember the current offset so a nested reader can put it back.
    pub(crate) fn save_position(&mut self) -> io::Result<()> {
        self.saved_position = Some(self.position()?);
        Ok(())
    }

    /// Return to the offset remembered by `save_position`.
    pub(crate) fn restore_position(&mut self) -> io::Result<()> {
        if let Some(pos) = self.saved_position.take() {
            self.seek_to(pos)?;
        }
        Ok(())
    }

    /// Read one line, without any length limit.
    pub(crate) fn readline(&mut self) -> io::Result<RawLine> {
        self.readline_max(u64::MAX)
    }

    /// Read one line, consuming at most `max` bytes.
    ///
    /// Lines end at `\n`; a `\r\n` pair counts as one end-of-line. A
    /// line cut short by `max` comes back without EOL bytes.
    pub(crate) fn readline_max(&mut self, max: u64) -> io::Result<RawLine> {
        let mut text = BString::from("");
        let mut eol = None;
        let mut at_eof = false;
        let mut remaining = max;

        loop {
            if remaining == 0 {
                break;
            }
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                at_eof = true;
                break;
            }
            let limit = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

            match buf[..limit].iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    text.extend_from_slice(&buf[..idx]);
                    self.reader.consume(idx + 1);
                    if text.last() == Some(&b'\r') {
                        text.pop();
                        eol = Some(BString::from("\r\n"));
                    } else {
                        eol = Some(BString::from("\n"));
                    }
                    break;
                }
                None => {
                    text.extend_from_slice(&buf[..limit]);
                    self.reader.consume(limit);
                    remaining -= limit as u64;
                }
            }
        }

        Ok(RawLine { text, eol, at_eof })
    }

    /// The first end-of-line sequence found in the file.
    ///
    /// Used to synthesize a final EOL for hunk text; every patch file
    /// that contains hunks has at least one.
    pub(crate) fn first_eol(&mut self) -> io::Result<Option<BString>> {
        let pos = self.position()?;
        self.seek_to(0)?;
        let line = self.readline()?;
        self.seek_to(pos)?;
        Ok(line.eol)
    }
}

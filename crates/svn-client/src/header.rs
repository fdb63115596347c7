//! Git extended header emission.
//!
//! Writes the `diff --git` prologue matching the operation, and hands
//! back the `a/`-`b/` decorated labels the `---`/`+++` lines should
//! use. Paths here are relative to the repository root.

use std::io::Write;

use bstr::{BStr, BString, ByteSlice};
use svn_utils::Revnum;

use crate::labels::diff_label;
use crate::ClientError;

/// What a git diff header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Added,
    Deleted,
    Modified,
    Copied,
    Moved,
}

fn write_diff_git_line(
    out: &mut dyn Write,
    path1: &BStr,
    path2: &BStr,
) -> Result<(), ClientError> {
    out.write_all(b"diff --git a/")?;
    out.write_all(path1)?;
    out.write_all(b" b/")?;
    out.write_all(path2)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn prefixed(prefix: &str, path: &BStr) -> BString {
    let mut out = BString::from(prefix);
    out.extend_from_slice(path);
    out
}

/// Print a git diff header for `operation` between `repos_relpath1`
/// and `repos_relpath2`, returning the labels for the `---` and `+++`
/// lines. `copyfrom_path` names the source of copies and moves.
#[allow(clippy::too_many_arguments)]
pub fn print_git_diff_header(
    out: &mut dyn Write,
    operation: Operation,
    repos_relpath1: &BStr,
    repos_relpath2: &BStr,
    rev1: Revnum,
    rev2: Revnum,
    copyfrom_path: Option<&BStr>,
) -> Result<(BString, BString), ClientError> {
    match operation {
        Operation::Deleted => {
            write_diff_git_line(out, repos_relpath1, repos_relpath2)?;
            out.write_all(b"deleted file mode 10644\n")?;
            Ok((
                diff_label(prefixed("a/", repos_relpath1).as_bstr(), rev1),
                diff_label(BStr::new("/dev/null"), rev2),
            ))
        }
        Operation::Added => {
            write_diff_git_line(out, repos_relpath1, repos_relpath2)?;
            out.write_all(b"new file mode 10644\n")?;
            Ok((
                diff_label(BStr::new("/dev/null"), rev1),
                diff_label(prefixed("b/", repos_relpath2).as_bstr(), rev2),
            ))
        }
        Operation::Modified => {
            write_diff_git_line(out, repos_relpath1, repos_relpath2)?;
            Ok((
                diff_label(prefixed("a/", repos_relpath1).as_bstr(), rev1),
                diff_label(prefixed("b/", repos_relpath2).as_bstr(), rev2),
            ))
        }
        Operation::Copied => {
            let copyfrom = copyfrom_path.unwrap_or(repos_relpath1);
            write_diff_git_line(out, copyfrom, repos_relpath2)?;
            out.write_all(b"copy from ")?;
            out.write_all(copyfrom)?;
            out.write_all(b"\n")?;
            out.write_all(b"copy to ")?;
            out.write_all(repos_relpath2)?;
            out.write_all(b"\n")?;
            Ok((
                diff_label(prefixed("a/", copyfrom).as_bstr(), rev1),
                diff_label(prefixed("b/", repos_relpath2).as_bstr(), rev2),
            ))
        }
        Operation::Moved => {
            let copyfrom = copyfrom_path.unwrap_or(repos_relpath1);
            write_diff_git_line(out, copyfrom, repos_relpath2)?;
            out.write_all(b"rename from ")?;
            out.write_all(copyfrom)?;
            out.write_all(b"\n")?;
            out.write_all(b"rename to ")?;
            out.write_all(repos_relpath2)?;
            out.write_all(b"\n")?;
            Ok((
                diff_label(prefixed("a/", copyfrom).as_bstr(), rev1),
                diff_label(prefixed("b/", repos_relpath2).as_bstr(), rev2),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(operation: Operation, copyfrom: Option<&str>) -> (String, BString, BString) {
        let mut out = Vec::new();
        let (label1, label2) = print_git_diff_header(
            &mut out,
            operation,
            BStr::new("dir/old.c"),
            BStr::new("dir/new.c"),
            Revnum::new(3),
            Revnum::new(4),
            copyfrom.map(BStr::new),
        )
        .unwrap();
        (String::from_utf8(out).unwrap(), label1, label2)
    }

    #[test]
    fn added_header() {
        let (text, label1, label2) = render(Operation::Added, None);
        assert_eq!(
            text,
            "diff --git a/dir/old.c b/dir/new.c\nnew file mode 10644\n"
        );
        assert_eq!(label1, "/dev/null\t(revision 3)");
        assert_eq!(label2, "b/dir/new.c\t(revision 4)");
    }

    #[test]
    fn deleted_header() {
        let (text, label1, label2) = render(Operation::Deleted, None);
        assert_eq!(
            text,
            "diff --git a/dir/old.c b/dir/new.c\ndeleted file mode 10644\n"
        );
        assert_eq!(label1, "a/dir/old.c\t(revision 3)");
        assert_eq!(label2, "/dev/null\t(revision 4)");
    }

    #[test]
    fn modified_header() {
        let (text, _, _) = render(Operation::Modified, None);
        assert_eq!(text, "diff --git a/dir/old.c b/dir/new.c\n");
    }

    #[test]
    fn copied_header() {
        let (text, label1, _) = render(Operation::Copied, Some("src/orig.c"));
        assert_eq!(
            text,
            "diff --git a/src/orig.c b/dir/new.c\ncopy from src/orig.c\ncopy to dir/new.c\n"
        );
        assert_eq!(label1, "a/src/orig.c\t(revision 3)");
    }

    #[test]
    fn moved_header() {
        let (text, _, _) = render(Operation::Moved, Some("src/orig.c"));
        assert_eq!(
            text,
            "diff --git a/src/orig.c b/dir/new.c\nrename from src/orig.c\nrename to dir/new.c\n"
        );
    }

    #[test]
    fn header_emission_is_idempotent() {
        let first = render(Operation::Copied, Some("src/orig.c"));
        let second = render(Operation::Copied, Some("src/orig.c"));
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
        assert_eq!(first.2, second.2);
    }
}

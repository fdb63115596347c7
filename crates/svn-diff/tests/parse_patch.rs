//! Patch parser integration tests.
//!
//! Feeds literal patch texts through the parser and checks the
//! resulting patches, hunk reconstructions, and binary streams.

use std::io::Cursor;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bstr::{BStr, BString};
use svn_diff::{next_patch, DiffError, DiffOperation, Patch, PatchFile};
use svn_mergeinfo::MergeRange;
use svn_utils::{Canceller, Tristate};

fn patch_file(text: &str) -> PatchFile<Cursor<Vec<u8>>> {
    PatchFile::new(Cursor::new(text.as_bytes().to_vec()))
}

fn parse_one(text: &str, reverse: bool) -> Patch {
    let mut pf = patch_file(text);
    next_patch(&mut pf, reverse, false, &Canceller::none())
        .unwrap()
        .expect("expected one patch")
}

fn parse_all(text: &str) -> Vec<Patch> {
    let mut pf = patch_file(text);
    let mut patches = Vec::new();
    while let Some(patch) = next_patch(&mut pf, false, false, &Canceller::none()).unwrap() {
        patches.push(patch);
    }
    patches
}

fn modified_lines(text: &str, patch: &mut Patch) -> Vec<BString> {
    let mut pf = patch_file(text);
    let mut lines = Vec::new();
    for hunk in &mut patch.hunks {
        while let Some(line) = hunk.readline_modified(&mut pf).unwrap() {
            lines.push(line);
        }
    }
    lines
}

fn original_lines(text: &str, patch: &mut Patch) -> Vec<BString> {
    let mut pf = patch_file(text);
    let mut lines = Vec::new();
    for hunk in &mut patch.hunks {
        while let Some(line) = hunk.readline_original(&mut pf).unwrap() {
            lines.push(line);
        }
    }
    lines
}

#[test]
fn classical_modify() {
    let text = "--- a.txt\t(revision 1)\n\
                +++ a.txt\t(revision 2)\n\
                @@ -1,1 +1,1 @@\n\
                -hello\n\
                +world\n";
    let mut patch = parse_one(text, false);

    assert_eq!(patch.old_filename, "a.txt");
    assert_eq!(patch.new_filename, "a.txt");
    assert_eq!(patch.operation, DiffOperation::Modified);
    assert_eq!(patch.hunks.len(), 1);
    assert_eq!(patch.hunks[0].original_start(), 1);
    assert_eq!(patch.hunks[0].original_length(), 1);
    assert_eq!(patch.hunks[0].modified_length(), 1);
    assert_eq!(patch.hunks[0].fuzz_penalty(), 0);

    assert_eq!(modified_lines(text, &mut patch), vec![BString::from("world\n")]);
}

#[test]
fn git_rename() {
    let text = "diff --git a/x b/y\n\
                rename from x\n\
                rename to y\n";
    let patch = parse_one(text, false);

    assert_eq!(patch.operation, DiffOperation::Moved);
    assert_eq!(patch.old_filename, "x");
    assert_eq!(patch.new_filename, "y");
    assert!(patch.hunks.is_empty());
    assert!(patch.binary_patch.is_none());
}

#[test]
fn git_add_with_executable_bit() {
    let text = "diff --git a/t b/t\n\
                new file mode 100755\n\
                --- /dev/null\n\
                +++ b/t\n\
                @@ -0,0 +1 @@\n\
                +#!/bin/sh\n";
    let patch = parse_one(text, false);

    assert_eq!(patch.operation, DiffOperation::Added);
    assert_eq!(patch.new_executable_bit, Tristate::True);
    assert_eq!(patch.new_symlink_bit, Tristate::False);
    assert_eq!(patch.new_filename, "t");
    assert_eq!(patch.hunks.len(), 1);
    assert_eq!(patch.hunks[0].original_length(), 0);
    assert_eq!(patch.hunks[0].modified_length(), 1);
}

#[test]
fn mergeinfo_property_lands_in_patch_not_prop_map() {
    let text = "--- a\n\
                +++ a\n\
                Added: svn:mergeinfo\n\
                ## -0,0 +0,1 ##\n\
                \x20\x20 Merged /trunk:r2-3\n";
    let patch = parse_one(text, false);

    let mergeinfo = patch.mergeinfo.expect("forward mergeinfo");
    assert_eq!(mergeinfo.len(), 1);
    assert_eq!(mergeinfo[BStr::new("/trunk")], vec![MergeRange::new(2, 3)]);
    assert!(patch.reverse_mergeinfo.is_none());
    assert!(!patch.prop_patches.contains_key(BStr::new("svn:mergeinfo")));
}

#[test]
fn reverse_swaps_operation_and_mode_bits() {
    let text = "diff --git a/t b/t\n\
                new file mode 100755\n\
                --- /dev/null\n\
                +++ b/t\n\
                @@ -0,0 +1 @@\n\
                +#!/bin/sh\n";
    let patch = parse_one(text, true);

    assert_eq!(patch.operation, DiffOperation::Deleted);
    assert_eq!(patch.old_executable_bit, Tristate::True);
    assert_eq!(patch.new_executable_bit, Tristate::Unknown);
    assert_eq!(patch.old_filename, "t");
    assert_eq!(patch.new_filename, "/dev/null");
    assert!(patch.reverse);
}

#[test]
fn reverse_hunk_reader_swaps_sides() {
    let text = "--- a.txt\n\
                +++ a.txt\n\
                @@ -1,2 +1,2 @@\n\
                \x20keep\n\
                -old\n\
                +new\n";
    let mut forward = parse_one(text, false);
    assert_eq!(
        modified_lines(text, &mut forward),
        vec![BString::from("keep\n"), BString::from("new\n")]
    );

    let mut reversed = parse_one(text, true);
    assert_eq!(
        modified_lines(text, &mut reversed),
        vec![BString::from("keep\n"), BString::from("old\n")]
    );
    assert_eq!(
        original_lines(text, &mut reversed),
        vec![BString::from("keep\n"), BString::from("new\n")]
    );
}

#[test]
fn original_reader_never_sees_added_lines() {
    let text = "--- f\n\
                +++ f\n\
                @@ -1,3 +1,4 @@\n\
                \x20ctx\n\
                -gone\n\
                +fresh\n\
                +more\n\
                \x20tail\n";
    let mut patch = parse_one(text, false);
    let lines = original_lines(text, &mut patch);
    assert_eq!(
        lines,
        vec![
            BString::from("ctx\n"),
            BString::from("gone\n"),
            BString::from("tail\n")
        ]
    );
}

#[test]
fn missing_final_newline_sets_flag() {
    let text = "--- f\n\
                +++ f\n\
                @@ -0,0 +1 @@\n\
                +only line\n\
                \\ No newline at end of file\n";
    let mut patch = parse_one(text, false);

    assert!(patch.hunks[0].modified_no_final_eol());
    // The marker followed an added line, so only the modified side is
    // known to lack the newline.
    assert!(!patch.hunks[0].original_no_final_eol());

    let lines = modified_lines(text, &mut patch);
    assert_eq!(lines, vec![BString::from("only line\n")]);
}

#[test]
fn final_line_without_eol_is_synthesized() {
    // The file ends mid-line with no marker; the reader borrows the
    // first EOL of the patch file so downstream code sees a full line.
    let text = "--- f\n\
                +++ f\n\
                @@ -0,0 +1 @@\n\
                +no newline here";
    let mut patch = parse_one(text, false);
    let lines = modified_lines(text, &mut patch);
    assert_eq!(lines, vec![BString::from("no newline here\n")]);
}

#[test]
fn fuzz_penalty_for_short_hunks() {
    // Header promises 3/3 lines, body has 2/2.
    let text = "--- f\n\
                +++ f\n\
                @@ -1,3 +1,3 @@\n\
                \x20ctx\n\
                -old\n\
                +new\n";
    let patch = parse_one(text, false);
    let hunk = &patch.hunks[0];

    assert_eq!(hunk.original_length(), 2);
    assert_eq!(hunk.modified_length(), 2);
    assert_eq!(hunk.fuzz_penalty(), 1);
}

#[test]
fn property_patches_by_name() {
    let text = "--- f\n\
                +++ f\n\
                Added: color\n\
                ## -0,0 +1 ##\n\
                +blue\n\
                Deleted: shape\n\
                ## -1 +0,0 ##\n\
                -square\n\
                Modified: size\n\
                ## -1 +1 ##\n\
                -big\n\
                +small\n";
    let patch = parse_one(text, false);

    assert_eq!(patch.prop_patches.len(), 3);
    let color = &patch.prop_patches[BStr::new("color")];
    assert_eq!(color.operation, DiffOperation::Added);
    assert_eq!(color.hunks.len(), 1);
    assert_eq!(
        patch.prop_patches[BStr::new("shape")].operation,
        DiffOperation::Deleted
    );
    assert_eq!(
        patch.prop_patches[BStr::new("size")].operation,
        DiffOperation::Modified
    );
}

#[test]
fn reverse_flips_property_operations() {
    let text = "--- f\n\
                +++ f\n\
                Added: color\n\
                ## -0,0 +1 ##\n\
                +blue\n";
    let patch = parse_one(text, true);
    assert_eq!(
        patch.prop_patches[BStr::new("color")].operation,
        DiffOperation::Deleted
    );
}

#[test]
fn multiple_patches_come_back_in_order() {
    let text = "--- one\n\
                +++ one\n\
                @@ -1 +1 @@\n\
                -a\n\
                +b\n\
                --- two\n\
                +++ two\n\
                @@ -1 +1 @@\n\
                -c\n\
                +d\n";
    let patches = parse_all(text);
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].old_filename, "one");
    assert_eq!(patches[1].old_filename, "two");
}

#[test]
fn tree_change_patch_does_not_swallow_next_patch() {
    let text = "diff --git a/x b/y\n\
                rename from x\n\
                rename to y\n\
                diff --git a/z b/z\n\
                --- a/z\n\
                +++ b/z\n\
                @@ -1 +1 @@\n\
                -a\n\
                +b\n";
    let patches = parse_all(text);
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].operation, DiffOperation::Moved);
    assert_eq!(patches[1].old_filename, "z");
    assert_eq!(patches[1].hunks.len(), 1);
}

#[test]
fn hunks_sorted_by_original_start() {
    let text = "--- f\n\
                +++ f\n\
                @@ -10,1 +10,1 @@\n\
                -x\n\
                +y\n\
                @@ -2,1 +2,1 @@\n\
                -p\n\
                +q\n";
    let patch = parse_one(text, false);
    assert_eq!(patch.hunks.len(), 2);
    assert!(patch.hunks[0].original_start() < patch.hunks[1].original_start());
}

#[test]
fn ignore_whitespace_tolerates_chopped_context() {
    let text = "--- f\n\
                +++ f\n\
                @@ -1,2 +1,2 @@\n\
                chopped context\n\
                -old\n\
                +new\n";
    let mut pf = patch_file(text);
    let patch = next_patch(&mut pf, false, true, &Canceller::none())
        .unwrap()
        .unwrap();
    assert_eq!(patch.hunks.len(), 1);
    assert_eq!(patch.hunks[0].original_length(), 2);
    assert_eq!(patch.hunks[0].fuzz_penalty(), 0);
}

#[test]
fn garbage_input_yields_no_patch() {
    let mut pf = patch_file("this is not a patch\nnot even close\n");
    assert!(next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .is_none());
}

#[test]
fn parses_from_a_file_on_disk() {
    use std::io::Write as _;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "--- disk.txt\n+++ disk.txt\n@@ -1 +1 @@\n-before\n+after\n"
    )
    .unwrap();
    file.flush().unwrap();

    let mut pf = PatchFile::open(file.path()).unwrap();
    let patch = next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .unwrap();
    assert_eq!(patch.old_filename, "disk.txt");
    assert_eq!(patch.hunks.len(), 1);
    assert!(next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .is_none());
}

#[test]
fn cancellation_propagates() {
    let flag = Arc::new(AtomicBool::new(true));
    let canceller = Canceller::new(flag);
    let mut pf = patch_file("--- f\n+++ f\n");
    let err = next_patch(&mut pf, false, false, &canceller).unwrap_err();
    assert!(matches!(err, DiffError::Cancelled));
}

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn binary_section(data: &[u8]) -> String {
    let mut out = format!("literal {}\n", data.len());
    out.push_str(&String::from_utf8(svn_diff::binary::encode_base85(&zlib_compress(data))).unwrap());
    out.push('\n');
    out
}

#[test]
fn binary_patch_round_trips() {
    let original = b"old binary \x00\x01\x02 content".as_ref();
    let result = b"new binary \x00\xff content, somewhat longer".as_ref();

    let mut text = String::from("diff --git a/blob b/blob\nGIT binary patch\n");
    // Result side first, then the original side.
    text.push_str(&binary_section(result));
    text.push_str(&binary_section(original));

    let mut pf = patch_file(&text);
    let patch = next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .unwrap();
    let bpatch = patch.binary_patch.expect("binary patch");
    assert_eq!(bpatch.dst_filesize, result.len() as u64);
    assert_eq!(bpatch.src_filesize, original.len() as u64);

    assert_eq!(bpatch.result_stream(&mut pf).read_all().unwrap(), result);
    assert_eq!(bpatch.original_stream(&mut pf).read_all().unwrap(), original);
}

#[test]
fn binary_patch_reversed_swaps_sides() {
    let original = b"aaaa".as_ref();
    let result = b"bbbbbbbb".as_ref();

    let mut text = String::from("diff --git a/blob b/blob\nGIT binary patch\n");
    text.push_str(&binary_section(result));
    text.push_str(&binary_section(original));

    let mut pf = patch_file(&text);
    let patch = next_patch(&mut pf, true, false, &Canceller::none())
        .unwrap()
        .unwrap();
    let bpatch = patch.binary_patch.expect("binary patch");
    assert_eq!(bpatch.src_filesize, result.len() as u64);
    assert_eq!(bpatch.dst_filesize, original.len() as u64);
    assert_eq!(bpatch.original_stream(&mut pf).read_all().unwrap(), result);
}

#[test]
fn binary_length_mismatch_is_unexpected_data() {
    let payload = b"these bytes are not ten long".as_ref();

    let mut text = String::from("diff --git a/blob b/blob\nGIT binary patch\n");
    let mut section = String::from("literal 10\n");
    section.push_str(
        &String::from_utf8(svn_diff::binary::encode_base85(&zlib_compress(payload))).unwrap(),
    );
    section.push('\n');
    text.push_str(&section);
    text.push_str(&binary_section(b""));

    let mut pf = patch_file(&text);
    let patch = next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .unwrap();
    let bpatch = patch.binary_patch.expect("binary patch");

    let err = bpatch.result_stream(&mut pf).read_all().unwrap_err();
    assert!(matches!(err, DiffError::UnexpectedData(_)));
}

#[test]
fn binary_pure_addition_has_empty_source() {
    let result = b"brand new bytes".as_ref();

    let mut text = String::from("diff --git a/blob b/blob\nGIT binary patch\n");
    text.push_str(&binary_section(result));
    text.push_str("literal 0\n\n");

    let mut pf = patch_file(&text);
    let patch = next_patch(&mut pf, false, false, &Canceller::none())
        .unwrap()
        .unwrap();
    let bpatch = patch.binary_patch.expect("binary patch");

    assert_eq!(bpatch.src_filesize, 0);
    assert_eq!(bpatch.src_start, bpatch.src_end);
    assert!(bpatch.original_stream(&mut pf).read_all().unwrap().is_empty());
    assert_eq!(bpatch.result_stream(&mut pf).read_all().unwrap(), result);
}

/// The field-by-field relation between a forward and a reverse parse
/// of the same input.
fn assert_reverse_relation(forward: &Patch, reversed: &Patch) {
    assert_eq!(forward.old_filename, reversed.new_filename);
    assert_eq!(forward.new_filename, reversed.old_filename);
    assert_eq!(forward.operation, reversed.operation.reversed());
    assert_eq!(forward.old_executable_bit, reversed.new_executable_bit);
    assert_eq!(forward.new_executable_bit, reversed.old_executable_bit);
    assert_eq!(forward.old_symlink_bit, reversed.new_symlink_bit);
    assert_eq!(forward.new_symlink_bit, reversed.old_symlink_bit);
    assert_eq!(forward.hunks.len(), reversed.hunks.len());
    for (f, r) in forward.hunks.iter().zip(&reversed.hunks) {
        assert_eq!(f.original_start(), r.modified_start());
        assert_eq!(f.original_length(), r.modified_length());
        assert_eq!(f.modified_start(), r.original_start());
        assert_eq!(f.modified_length(), r.original_length());
    }
}

#[test]
fn reverse_is_an_involution() {
    let text = "diff --git a/t b/t\n\
                new file mode 100755\n\
                --- /dev/null\n\
                +++ b/t\n\
                @@ -0,0 +1,2 @@\n\
                +one\n\
                +two\n";
    let forward = parse_one(text, false);
    let reversed = parse_one(text, true);

    assert_reverse_relation(&forward, &reversed);
    // Reversing the reversed parse lands back on the forward fields.
    assert_reverse_relation(&reversed, &forward);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn content_line() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 .,;]{0,30}"
    }

    proptest! {
        #[test]
        fn reverse_involution_holds_for_simple_patches(
            name in "[a-z]{1,8}\\.[a-z]{1,3}",
            removed in prop::collection::vec(content_line(), 0..5),
            added in prop::collection::vec(content_line(), 0..5),
            context in content_line(),
        ) {
            let mut text = format!("--- {name}\n+++ {name}\n");
            text.push_str(&format!(
                "@@ -1,{} +1,{} @@\n",
                removed.len() + 1,
                added.len() + 1
            ));
            text.push_str(&format!(" {context}\n"));
            for line in &removed {
                text.push_str(&format!("-{line}\n"));
            }
            for line in &added {
                text.push_str(&format!("+{line}\n"));
            }

            let forward = parse_one(&text, false);
            let reversed = parse_one(&text, true);
            assert_reverse_relation(&forward, &reversed);
            assert_reverse_relation(&reversed, &forward);

            prop_assert_eq!(forward.hunks.len(), 1);
            prop_assert_eq!(
                forward.hunks[0].original_length(),
                removed.len() as u64 + 1
            );
            prop_assert_eq!(
                forward.hunks[0].modified_length(),
                added.len() as u64 + 1
            );
        }
    }
}

//! Producer integration tests.
//!
//! Drives the diff driver against an in-memory repository with a
//! naive line differ, checks the rendered output, and feeds it back
//! through the patch parser to verify the two sides round-trip.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use svn_client::{
    diff, ClientError, Depth, DiffCallbacks, DiffConfig, DiffRequest, DiffTextOptions,
    RepositoryReader, TextDiffer, WorkingCopyReader,
};
use svn_mergeinfo::MergeRange;
use svn_utils::props::{prop_diffs, PropHash};
use svn_utils::{Canceller, NodeKind, RevisionSpec, Revnum};

// ---------------------------------------------------------------- differ

/// A deliberately naive text differ: one hunk per file, no context.
struct NaiveDiffer;

fn split_lines(data: &[u8]) -> (Vec<&[u8]>, bool) {
    if data.is_empty() {
        return (Vec::new(), false);
    }
    let ends_with_newline = data.ends_with(b"\n");
    let mut lines: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
    if ends_with_newline {
        lines.pop();
    }
    (lines, ends_with_newline)
}

fn write_single_hunk(
    out: &mut dyn Write,
    original: &[u8],
    modified: &[u8],
    delimiter: &str,
) -> std::io::Result<bool> {
    if original == modified {
        return Ok(false);
    }

    let (old_lines, old_eol) = split_lines(original);
    let (new_lines, new_eol) = split_lines(modified);
    let min_len = old_lines.len().min(new_lines.len());

    let mut prefix = 0;
    while prefix < min_len && old_lines[prefix] == new_lines[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < min_len - prefix
        && old_lines[old_lines.len() - 1 - suffix] == new_lines[new_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }
    if old_eol != new_eol {
        // The trailing-newline change must land inside the hunk.
        suffix = 0;
        prefix = prefix.min(min_len.saturating_sub(1));
    }

    let removed = &old_lines[prefix..old_lines.len() - suffix];
    let added = &new_lines[prefix..new_lines.len() - suffix];

    let old_start = if removed.is_empty() { prefix } else { prefix + 1 };
    let new_start = if added.is_empty() { prefix } else { prefix + 1 };
    writeln!(
        out,
        "{delimiter} -{},{} +{},{} {delimiter}",
        old_start,
        removed.len(),
        new_start,
        added.len()
    )?;

    for (i, line) in removed.iter().enumerate() {
        out.write_all(b"-")?;
        out.write_all(line)?;
        out.write_all(b"\n")?;
        if i == removed.len() - 1 && suffix == 0 && !old_eol {
            out.write_all(b"\\ No newline at end of file\n")?;
        }
    }
    for (i, line) in added.iter().enumerate() {
        out.write_all(b"+")?;
        out.write_all(line)?;
        out.write_all(b"\n")?;
        if i == added.len() - 1 && suffix == 0 && !new_eol {
            out.write_all(b"\\ No newline at end of file\n")?;
        }
    }

    Ok(true)
}

impl TextDiffer for NaiveDiffer {
    type FileDiff = (Vec<u8>, Vec<u8>);

    fn diff_files(
        &self,
        original: &Path,
        modified: &Path,
        _options: &DiffTextOptions,
    ) -> Result<Self::FileDiff, ClientError> {
        Ok((std::fs::read(original)?, std::fs::read(modified)?))
    }

    fn contains_diffs(&self, diff: &Self::FileDiff) -> bool {
        diff.0 != diff.1
    }

    fn write_unified(
        &self,
        out: &mut dyn Write,
        diff: &Self::FileDiff,
        _original: &Path,
        _modified: &Path,
        label1: &BStr,
        label2: &BStr,
        _show_c_function: bool,
    ) -> Result<(), ClientError> {
        write!(out, "--- {label1}\n+++ {label2}\n")?;
        write_single_hunk(out, &diff.0, &diff.1, "@@")?;
        Ok(())
    }

    fn write_unified_strings(
        &self,
        out: &mut dyn Write,
        original: &[u8],
        modified: &[u8],
        hunk_delimiter: &str,
        _options: &DiffTextOptions,
    ) -> Result<bool, ClientError> {
        Ok(write_single_hunk(out, original, modified, hunk_delimiter)?)
    }
}

// ------------------------------------------------------------ repository

enum Node {
    File(Vec<u8>, PropHash),
    Dir(PropHash),
}

/// An in-memory repository: URL and revision to node.
#[derive(Default)]
struct MockRepo {
    root_url: BString,
    nodes: BTreeMap<BString, BTreeMap<u64, Node>>,
    head: u64,
}

impl MockRepo {
    fn new(root_url: &str) -> Self {
        MockRepo {
            root_url: BString::from(root_url),
            nodes: BTreeMap::new(),
            head: 0,
        }
    }

    fn add_file(&mut self, url: &str, revision: u64, content: &[u8], props: PropHash) {
        self.nodes
            .entry(BString::from(url))
            .or_default()
            .insert(revision, Node::File(content.to_vec(), props));
        self.head = self.head.max(revision);
    }

    fn add_dir(&mut self, url: &str, revision: u64, props: PropHash) {
        self.nodes
            .entry(BString::from(url))
            .or_default()
            .insert(revision, Node::Dir(props));
        self.head = self.head.max(revision);
    }

    fn node(&self, url: &BStr, revision: Revnum) -> Option<&Node> {
        let revision = revision.number()?;
        self.nodes.get(url)?.get(&revision)
    }
}

impl RepositoryReader for MockRepo {
    fn check_path(&self, url: &BStr, revision: Revnum) -> Result<NodeKind, ClientError> {
        Ok(match self.node(url, revision) {
            Some(Node::File(..)) => NodeKind::File,
            Some(Node::Dir(..)) => NodeKind::Dir,
            None => NodeKind::Absent,
        })
    }

    fn get_file(&self, url: &BStr, revision: Revnum) -> Result<(Vec<u8>, PropHash), ClientError> {
        match self.node(url, revision) {
            Some(Node::File(content, props)) => Ok((content.clone(), props.clone())),
            _ => Err(ClientError::NotFound {
                url: BString::from(url),
                revision: revision.number().unwrap_or(0),
            }),
        }
    }

    fn get_dir(
        &self,
        url: &BStr,
        revision: Revnum,
    ) -> Result<(BTreeMap<BString, NodeKind>, PropHash), ClientError> {
        let props = match self.node(url, revision) {
            Some(Node::Dir(props)) => props.clone(),
            _ => {
                return Err(ClientError::NotFound {
                    url: BString::from(url),
                    revision: revision.number().unwrap_or(0),
                })
            }
        };

        let mut prefix = BString::from(url);
        prefix.push(b'/');
        let mut entries = BTreeMap::new();
        for (child_url, revisions) in &self.nodes {
            let Some(rest) = child_url.as_slice().strip_prefix(prefix.as_slice()) else {
                continue;
            };
            if rest.is_empty() || rest.contains(&b'/') {
                continue;
            }
            if let Some(node) = revisions.get(&revision.number().unwrap_or(0)) {
                let kind = match node {
                    Node::File(..) => NodeKind::File,
                    Node::Dir(..) => NodeKind::Dir,
                };
                entries.insert(BString::from(rest), kind);
            }
        }

        Ok((entries, props))
    }

    fn path_relative_to_root(&self, url: &BStr) -> Result<BString, ClientError> {
        let rest = url
            .as_bytes()
            .strip_prefix(self.root_url.as_slice())
            .unwrap_or(url.as_bytes());
        Ok(BString::from(rest.strip_prefix(b"/").unwrap_or(rest)))
    }

    fn resolve_revision(&self, _url: &BStr, spec: RevisionSpec) -> Result<Revnum, ClientError> {
        Ok(match spec {
            RevisionSpec::Number(number) => Revnum::new(number),
            _ => Revnum::new(self.head),
        })
    }

    fn trace_locations(
        &self,
        path_or_url: &BStr,
        _peg_revision: RevisionSpec,
        revision: RevisionSpec,
    ) -> Result<BString, ClientError> {
        let revision = self.resolve_revision(path_or_url, revision)?;
        if self.check_path(path_or_url, revision)? == NodeKind::Absent {
            return Err(ClientError::NotFound {
                url: BString::from(path_or_url),
                revision: revision.number().unwrap_or(0),
            });
        }
        Ok(BString::from(path_or_url))
    }

    fn replay_diff(
        &self,
        anchor1: &BStr,
        target1: &BStr,
        rev1: Revnum,
        url2: &BStr,
        rev2: Revnum,
        _depth: Depth,
        _ignore_ancestry: bool,
        callbacks: &mut dyn DiffCallbacks,
        canceller: &Canceller,
    ) -> Result<(), ClientError> {
        canceller.check()?;

        // Single-file replay is all these tests need.
        let mut url1 = BString::from(anchor1);
        if !target1.is_empty() {
            url1.push(b'/');
            url1.extend_from_slice(target1);
        }

        let (content1, props1) = self.get_file(url1.as_bstr(), rev1)?;
        let (content2, props2) = self.get_file(url2, rev2)?;

        let mut tmp1 = tempfile::NamedTempFile::new()?;
        tmp1.write_all(&content1)?;
        tmp1.flush()?;
        let mut tmp2 = tempfile::NamedTempFile::new()?;
        tmp2.write_all(&content2)?;
        tmp2.flush()?;

        let prop_changes = prop_diffs(&props1, &props2);
        callbacks.file_opened(target1, rev1)?;
        callbacks.file_changed(
            target1,
            Some(tmp1.path()),
            Some(tmp2.path()),
            rev1,
            rev2,
            None,
            None,
            &prop_changes,
            &props1,
        )?;
        Ok(())
    }
}

// ----------------------------------------------------------------- tests

fn props(pairs: &[(&str, &str)]) -> PropHash {
    pairs
        .iter()
        .map(|(k, v)| (BString::from(*k), BString::from(*v)))
        .collect()
}

fn run_diff(repo: &MockRepo, request: &DiffRequest) -> Vec<u8> {
    let mut out = Vec::new();
    diff(
        request,
        &DiffConfig::default(),
        &NaiveDiffer,
        Some(repo),
        None,
        &mut out,
        &Canceller::none(),
    )
    .unwrap();
    out
}

fn parse_patches(output: &[u8]) -> Vec<svn_diff::Patch> {
    let mut pf = svn_diff::PatchFile::new(std::io::Cursor::new(output.to_vec()));
    let mut patches = Vec::new();
    while let Some(patch) =
        svn_diff::next_patch(&mut pf, false, false, &Canceller::none()).unwrap()
    {
        patches.push(patch);
    }
    patches
}

#[test]
fn repos_repos_modified_file() {
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_dir("http://host/repo/trunk", 1, PropHash::new());
    repo.add_dir("http://host/repo/trunk", 2, PropHash::new());
    repo.add_file("http://host/repo/trunk/file.c", 1, b"hello\n", PropHash::new());
    repo.add_file("http://host/repo/trunk/file.c", 2, b"world\n", PropHash::new());

    let request = DiffRequest::new(
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(1),
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(2),
    );
    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output.clone()).unwrap();

    assert!(text.starts_with(
        "Index: file.c\n\
         ===================================================================\n"
    ));
    assert!(text.contains("--- file.c\t(revision 1)\n"));
    assert!(text.contains("+++ file.c\t(revision 2)\n"));
    assert!(text.contains("@@ -1,1 +1,1 @@\n"));
    assert!(text.contains("-hello\n"));
    assert!(text.contains("+world\n"));

    // Round trip: what the producer wrote, the parser understands.
    let patches = parse_patches(&output);
    assert_eq!(patches.len(), 1);
    let patch = &patches[0];
    assert_eq!(patch.old_filename, "file.c");
    assert_eq!(patch.new_filename, "file.c");
    assert_eq!(patch.operation, svn_diff::DiffOperation::Modified);
    assert_eq!(patch.hunks.len(), 1);
    assert_eq!(patch.hunks[0].original_length(), 1);
    assert_eq!(patch.hunks[0].modified_length(), 1);
}

#[test]
fn repos_repos_added_tree_in_git_mode() {
    // The whole trunk directory appears in r2.
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_dir("http://host/repo/trunk", 2, PropHash::new());
    repo.add_file(
        "http://host/repo/trunk/new.c",
        2,
        b"fresh content\n",
        PropHash::new(),
    );

    let mut request = DiffRequest::new(
        "http://host/repo/trunk",
        RevisionSpec::Number(1),
        "http://host/repo/trunk",
        RevisionSpec::Number(2),
    );
    request.use_git_diff_format = true;

    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output.clone()).unwrap();

    assert!(text.contains("diff --git a/trunk/new.c b/trunk/new.c\n"));
    assert!(text.contains("new file mode 10644\n"));
    assert!(text.contains("--- /dev/null\t(revision 1)\n"));
    assert!(text.contains("+++ b/trunk/new.c\t(revision 2)\n"));
    assert!(text.contains("@@ -0,0 +1,1 @@\n"));
    assert!(text.contains("+fresh content\n"));

    let patches = parse_patches(&output);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].operation, svn_diff::DiffOperation::Added);
    assert_eq!(patches[0].new_filename, "trunk/new.c");
    assert_eq!(patches[0].hunks.len(), 1);
    assert_eq!(patches[0].hunks[0].original_length(), 0);
    assert_eq!(patches[0].hunks[0].modified_length(), 1);
}

#[test]
fn repos_repos_deleted_tree() {
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_dir("http://host/repo/trunk/dir", 1, props(&[("owner", "me")]));
    repo.add_file(
        "http://host/repo/trunk/dir/a.txt",
        1,
        b"alpha\n",
        PropHash::new(),
    );
    repo.add_file(
        "http://host/repo/trunk/dir/b.txt",
        1,
        b"beta\n",
        PropHash::new(),
    );

    let request = DiffRequest::new(
        "http://host/repo/trunk/dir",
        RevisionSpec::Number(1),
        "http://host/repo/trunk/dir",
        RevisionSpec::Number(2),
    );
    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output.clone()).unwrap();

    // Both children show up as deletions against the empty file.
    assert!(text.contains("-alpha\n"));
    assert!(text.contains("-beta\n"));
    assert!(text.contains("Property changes on:"));
    assert!(text.contains("Deleted: owner\n"));

    // The directory's property section parses as its own patch, then
    // the two file deletions.
    let patches = parse_patches(&output);
    assert_eq!(patches.len(), 3);
    assert!(patches[0].prop_patches.contains_key(BStr::new("owner")));
    for patch in &patches[1..] {
        assert_eq!(patch.hunks.len(), 1);
        assert_eq!(patch.hunks[0].original_length(), 1);
        assert_eq!(patch.hunks[0].modified_length(), 0);
    }
}

#[test]
fn property_only_change_prints_single_header() {
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_file(
        "http://host/repo/trunk/file.c",
        1,
        b"same\n",
        props(&[("license", "MIT")]),
    );
    repo.add_file(
        "http://host/repo/trunk/file.c",
        2,
        b"same\n",
        props(&[("license", "BSD"), ("color", "blue")]),
    );

    let request = DiffRequest::new(
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(1),
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(2),
    );
    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output.clone()).unwrap();

    // The content did not change, so exactly one header comes from the
    // property section.
    assert_eq!(text.matches("Index: file.c").count(), 1);
    assert!(text.contains("\nProperty changes on: file.c\n"));
    assert!(text.contains("Added: color\n"));
    assert!(text.contains("Modified: license\n"));
    assert!(text.contains("+blue\n"));
    assert!(text.contains("-MIT\n"));
    assert!(text.contains("+BSD\n"));

    // Property names come out in lexicographic order.
    let color = text.find("Added: color").unwrap();
    let license = text.find("Modified: license").unwrap();
    assert!(color < license);

    let patches = parse_patches(&output);
    assert_eq!(patches.len(), 1);
    let patch = &patches[0];
    assert!(patch.prop_patches.contains_key(BStr::new("color")));
    assert!(patch.prop_patches.contains_key(BStr::new("license")));
}

#[test]
fn mergeinfo_pretty_printing_round_trips() {
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_file(
        "http://host/repo/trunk/file.c",
        1,
        b"same\n",
        props(&[("svn:mergeinfo", "/branches/b:1-5")]),
    );
    repo.add_file(
        "http://host/repo/trunk/file.c",
        2,
        b"same\n",
        props(&[("svn:mergeinfo", "/branches/b:1-8")]),
    );

    let request = DiffRequest::new(
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(1),
        "http://host/repo/trunk/file.c",
        RevisionSpec::Number(2),
    );
    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output.clone()).unwrap();

    assert!(text.contains("Modified: svn:mergeinfo\n"));
    assert!(text.contains("## -0,0 +0,1 ##\n"));
    assert!(text.contains("   Merged /branches/b:r6-8\n"));

    let patches = parse_patches(&output);
    assert_eq!(patches.len(), 1);
    let patch = &patches[0];
    // Mergeinfo is folded into the patch, not the property map.
    assert!(!patch.prop_patches.contains_key(BStr::new("svn:mergeinfo")));
    let mergeinfo = patch.mergeinfo.as_ref().expect("mergeinfo");
    assert_eq!(
        mergeinfo[BStr::new("/branches/b")],
        vec![MergeRange::new(6, 8)]
    );
}

#[test]
fn binary_mime_type_short_circuits() {
    // A binary file deleted in r2; the walker reports it with its
    // fetched mime type and the writer refuses to show text hunks.
    let mut repo = MockRepo::new("http://host/repo");
    repo.add_file(
        "http://host/repo/blob",
        1,
        b"\x00old",
        props(&[("svn:mime-type", "application/octet-stream")]),
    );

    let request = DiffRequest::new(
        "http://host/repo/blob",
        RevisionSpec::Number(1),
        "http://host/repo/blob",
        RevisionSpec::Number(2),
    );
    let output = run_diff(&repo, &request);
    let text = String::from_utf8(output).unwrap();

    assert!(text.contains("Cannot display: file marked as a binary type.\n"));
    assert!(text.contains("svn:mime-type = application/octet-stream\n"));
    assert!(!text.contains("-\x00old"));
}

#[test]
fn both_sides_absent_is_not_found() {
    let repo = MockRepo::new("http://host/repo");
    let request = DiffRequest::new(
        "http://host/repo/nowhere",
        RevisionSpec::Number(1),
        "http://host/repo/nowhere",
        RevisionSpec::Number(2),
    );

    let mut out = Vec::new();
    let err = diff(
        &request,
        &DiffConfig::default(),
        &NaiveDiffer,
        Some(&repo),
        None,
        &mut out,
        &Canceller::none(),
    )
    .unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}

#[test]
fn wc_wc_only_supports_base_against_working() {
    struct NoWc;
    impl WorkingCopyReader for NoWc {
        fn kind(&self, local_abspath: &BStr) -> Result<NodeKind, ClientError> {
            unreachable!()
        }
        fn node_url(&self, local_abspath: &BStr) -> Result<Option<BString>, ClientError> {
            unreachable!()
        }
        fn repos_relpath(&self, local_abspath: &BStr) -> Result<BString, ClientError> {
            unreachable!()
        }
        fn wc_root(&self, local_abspath: &BStr) -> Result<BString, ClientError> {
            unreachable!()
        }
        fn actual_target(&self, path: &BStr) -> Result<(BString, BString), ClientError> {
            unreachable!()
        }
        fn base_revision(
            &self,
            local_abspath: &BStr,
            spec: RevisionSpec,
        ) -> Result<Revnum, ClientError> {
            unreachable!()
        }
        fn pristine_props(&self, local_abspath: &BStr) -> Result<PropHash, ClientError> {
            unreachable!()
        }
        fn working_props(&self, local_abspath: &BStr) -> Result<PropHash, ClientError> {
            unreachable!()
        }
        fn pristine_contents(&self, local_abspath: &BStr) -> Result<Vec<u8>, ClientError> {
            unreachable!()
        }
        fn is_copy(&self, local_abspath: &BStr) -> Result<bool, ClientError> {
            unreachable!()
        }
        fn detranslated_contents(&self, local_abspath: &BStr) -> Result<Vec<u8>, ClientError> {
            unreachable!()
        }
        fn walk_local_diff(
            &self,
            anchor_abspath: &BStr,
            callbacks: &mut dyn DiffCallbacks,
            depth: Depth,
            ignore_ancestry: bool,
            show_copies_as_adds: bool,
            use_git_diff_format: bool,
            changelists: &[BString],
            canceller: &Canceller,
        ) -> Result<(), ClientError> {
            unreachable!()
        }
        fn crawl_repos_diff(
            &self,
            anchor_abspath: &BStr,
            target: &BStr,
            url: &BStr,
            revision: Revnum,
            ra: &dyn RepositoryReader,
            reverse: bool,
            depth: Depth,
            ignore_ancestry: bool,
            show_copies_as_adds: bool,
            use_git_diff_format: bool,
            changelists: &[BString],
            callbacks: &mut dyn DiffCallbacks,
            canceller: &Canceller,
        ) -> Result<(), ClientError> {
            unreachable!()
        }
    }

    let request = DiffRequest::new(
        "wc/one",
        RevisionSpec::Base,
        "wc/other",
        RevisionSpec::Working,
    );
    let mut out = Vec::new();
    let err = diff(
        &request,
        &DiffConfig::default(),
        &NaiveDiffer,
        None,
        Some(&NoWc),
        &mut out,
        &Canceller::none(),
    )
    .unwrap_err();
    assert!(matches!(err, ClientError::Unsupported(_)));
}

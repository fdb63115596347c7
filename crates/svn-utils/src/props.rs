//! Versioned property names, classification, and property diffs.
//!
//! Properties come in three kinds: regular (user-visible, diffable),
//! entry properties (maintained by the client), and working-copy
//! properties (internal bookkeeping). Only regular properties take
//! part in diff output.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};

/// The mime-type property.
pub const PROP_MIME_TYPE: &str = "svn:mime-type";
/// The merge tracking property.
pub const PROP_MERGEINFO: &str = "svn:mergeinfo";
/// The end-of-line translation property.
pub const PROP_EOL_STYLE: &str = "svn:eol-style";
/// The keyword expansion property.
pub const PROP_KEYWORDS: &str = "svn:keywords";

const ENTRY_PREFIX: &[u8] = b"svn:entry:";
const WC_PREFIX: &[u8] = b"svn:wc:";

/// Property map, ordered by name so enumeration is lexicographic.
pub type PropHash = BTreeMap<BString, BString>;

/// The classification of a property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    /// A user-visible, diffable property.
    Regular,
    /// A client-maintained entry property.
    Entry,
    /// An internal working-copy property.
    WorkingCopy,
}

/// Classify a property name by its reserved prefix.
pub fn prop_kind(name: &BStr) -> PropKind {
    if name.starts_with(ENTRY_PREFIX) {
        PropKind::Entry
    } else if name.starts_with(WC_PREFIX) {
        PropKind::WorkingCopy
    } else {
        PropKind::Regular
    }
}

/// A single property change: `value` is `None` for a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropChange {
    pub name: BString,
    pub value: Option<BString>,
}

/// Keep only the regular properties of a map.
pub fn regular_props(props: &PropHash) -> PropHash {
    props
        .iter()
        .filter(|(name, _)| prop_kind(name.as_bstr()) == PropKind::Regular)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Compute the changes that turn `source` into `target`, in name order.
///
/// Deletions come out with a `None` value; additions and modifications
/// carry the target value.
pub fn prop_diffs(source: &PropHash, target: &PropHash) -> Vec<PropChange> {
    let mut changes = Vec::new();

    for (name, value) in source {
        match target.get(name) {
            None => changes.push(PropChange {
                name: name.clone(),
                value: None,
            }),
            Some(new_value) if new_value != value => changes.push(PropChange {
                name: name.clone(),
                value: Some(new_value.clone()),
            }),
            Some(_) => {}
        }
    }

    for (name, value) in target {
        if !source.contains_key(name) {
            changes.push(PropChange {
                name: name.clone(),
                value: Some(value.clone()),
            });
        }
    }

    changes.sort_by(|a, b| a.name.cmp(&b.name));
    changes
}

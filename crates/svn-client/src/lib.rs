//! Unified diff producer.
//!
//! Given two targets (working copy paths, repository URLs, or a mix),
//! the driver classifies the comparison, walks the changed nodes
//! through an abstract repository/working-copy reader pair, and
//! renders unified diff output with optional git extended headers,
//! property sections, and merge tracking pretty-printing.

pub mod callbacks;
pub mod config;
pub mod differ;
pub mod driver;
pub mod external;
pub mod header;
pub mod labels;
pub mod props;
pub mod ra;
pub mod walker;
pub mod wc;
pub mod writer;

use bstr::BString;

pub use callbacks::{CallbackOutcome, DiffCallbacks, NotifyState};
pub use config::DiffConfig;
pub use differ::{DiffTextOptions, TextDiffer};
pub use driver::{diff, do_diff, DiffRequest};
pub use ra::RepositoryReader;
pub use wc::WorkingCopyReader;
pub use writer::DiffWriter;

/// How deep a diff descends into directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    /// Depth not yet determined.
    Unknown,
    /// Only the target itself.
    Empty,
    /// The target and its immediate file children.
    Files,
    /// The target and its immediate children.
    Immediates,
    /// The target and everything below it.
    #[default]
    Infinity,
}

/// Errors raised by the diff producer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("diff target '{url}' was not found in the repository at revision {revision}")]
    NotFound { url: BString, revision: u64 },

    #[error("path '{path}' is not inside '{relative_to}'")]
    BadRelativePath { path: BString, relative_to: BString },

    #[error("path '{0}' has no URL")]
    EntryMissingUrl(BString),

    #[error("invalid revision: {0}")]
    BadRevision(String),

    #[error("'{0}' and '{1}' are not related")]
    UnrelatedResources(BString, BString),

    #[error("unknown svn:eol-style value '{0}'")]
    UnknownEol(BString),

    #[error("{0}")]
    Unsupported(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Mergeinfo(#[from] svn_mergeinfo::MergeinfoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Reader(Box<dyn std::error::Error + Send + Sync>),
}

impl From<svn_utils::UtilError> for ClientError {
    fn from(err: svn_utils::UtilError) -> Self {
        match err {
            svn_utils::UtilError::Cancelled => ClientError::Cancelled,
            svn_utils::UtilError::Io(e) => ClientError::Io(e),
            other => ClientError::Reader(Box::new(other)),
        }
    }
}

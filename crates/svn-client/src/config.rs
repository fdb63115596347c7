//! Diff configuration.
//!
//! Two keys from the `helpers` section of the client profile control
//! diff output: `diff-cmd` names an external diff program, and
//! `diff-extensions` carries a whitespace-delimited list of options
//! for the external or internal diff.

use std::collections::BTreeMap;

/// The configuration key naming an external diff program.
pub const CONFIG_DIFF_CMD: &str = "diff-cmd";
/// The configuration key carrying extra diff options.
pub const CONFIG_DIFF_EXTENSIONS: &str = "diff-extensions";

/// Resolved diff configuration.
#[derive(Debug, Clone, Default)]
pub struct DiffConfig {
    /// Path of an external diff program, if one is configured.
    pub diff_cmd: Option<String>,
    /// Options appended to the diff invocation.
    pub diff_extensions: Vec<String>,
}

impl DiffConfig {
    /// Read the diff keys from a profile section.
    pub fn from_profile(profile: &BTreeMap<String, String>) -> Self {
        DiffConfig {
            diff_cmd: profile.get(CONFIG_DIFF_CMD).cloned(),
            diff_extensions: profile
                .get(CONFIG_DIFF_EXTENSIONS)
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

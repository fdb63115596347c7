//! External diff program invocation.
//!
//! When `diff-cmd` is configured, the internal differ is bypassed and
//! the external program produces the body of the diff. It is invoked
//! with the configured extension options, `-L` labels for both sides,
//! and the two temporary files; its stdout is copied to the output
//! stream and its exit code handed back verbatim (external diff tools
//! use 1 for "differences found").

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use bstr::BStr;

use crate::ClientError;

/// Run the external diff command, returning its exit code.
pub fn run_external_diff(
    out: &mut dyn Write,
    diff_cmd: &str,
    extensions: &[String],
    label1: &BStr,
    label2: &BStr,
    tmpfile1: &Path,
    tmpfile2: &Path,
) -> Result<i32, ClientError> {
    let mut command = Command::new(diff_cmd);
    command
        .args(extensions)
        .arg("-L")
        .arg(to_os(label1))
        .arg("-L")
        .arg(to_os(label2))
        .arg(tmpfile1)
        .arg(tmpfile2)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let output = command.output()?;
    out.write_all(&output.stdout)?;

    Ok(output.status.code().unwrap_or(-1))
}

#[cfg(unix)]
fn to_os(label: &BStr) -> std::ffi::OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(label).to_os_string()
}

#[cfg(not(unix))]
fn to_os(label: &BStr) -> std::ffi::OsString {
    String::from_utf8_lossy(label).into_owned().into()
}

//! Parsing rules for extension-manager CLI output.
//!
//! The manager signals its result in free text rather than via exit codes, so
//! the install outcome has to be scraped from stdout:
//!
//! - any `ERROR:<msg>` line means failure; when `<msg>` is the manager's
//!   generic "An error occurred while installing" wrapper, the first
//!   non-blank line after it carries the real cause
//! - otherwise a `1/1 [<RESULT>] <msg>` line carries the outcome, one of
//!   `INSTALLED`, `SKIP` or `ENABLED`
//! - output with neither is unparseable

use crate::error::{Error, Result};
use crate::types::InstallOutcome;
use regex::Regex;
use std::sync::LazyLock;

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ERROR:(?P<msg>.+)").expect("valid error regex")
});

static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"1/1\s\[(?P<result>.+?)\]\s(?P<msg>.+)").expect("valid result regex")
});

const GENERIC_FAILURE: &str = "An error occurred while installing";

/// Extract the install outcome from the manager's stdout.
///
/// An error marker always wins over a result marker.
pub fn parse_install_output(stdout: &str) -> Result<InstallOutcome> {
    if let Some(message) = find_error(stdout) {
        return Err(Error::Reported { message });
    }

    RESULT_RE
        .captures_iter(stdout)
        .find_map(|caps| InstallOutcome::from_marker(caps["result"].trim()))
        .ok_or(Error::UnparseableResult)
}

/// Find the most specific error message in `stdout`, if any.
pub fn find_error(stdout: &str) -> Option<String> {
    let caps = ERROR_RE.captures(stdout)?;
    let marker = caps.name("msg")?;
    let message = marker.as_str().trim();

    if message.contains(GENERIC_FAILURE) {
        let detail = stdout[marker.end()..]
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty());
        if let Some(detail) = detail {
            return Some(detail.to_string());
        }
    }

    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_marker() {
        let stdout = "Install: ['comfyui-kjnodes@nightly']\n1/1 [INSTALLED] comfyui-kjnodes@nightly\n";
        assert_eq!(
            parse_install_output(stdout).unwrap(),
            InstallOutcome::Installed
        );
    }

    #[test]
    fn test_skip_and_enabled_markers() {
        assert_eq!(
            parse_install_output("1/1 [SKIP] comfyui-kjnodes@nightly").unwrap(),
            InstallOutcome::Skip
        );
        assert_eq!(
            parse_install_output("1/1 [ENABLED] comfyui-kjnodes@nightly").unwrap(),
            InstallOutcome::Enabled
        );
    }

    #[test]
    fn test_error_marker_wins_over_result() {
        let stdout = "1/1 [INSTALLED] foo\nERROR: dependency conflict\n";
        let err = parse_install_output(stdout).unwrap_err();
        assert_eq!(err.to_string(), "dependency conflict");
    }

    #[test]
    fn test_generic_error_uses_next_line() {
        let stdout = "ERROR: An error occurred while installing 'foo'.\n\n   No module named 'torch'\nmore\n";
        let err = parse_install_output(stdout).unwrap_err();
        assert_eq!(err.to_string(), "No module named 'torch'");
    }

    #[test]
    fn test_generic_error_without_detail_keeps_marker() {
        let stdout = "ERROR: An error occurred while installing 'foo'.\n   \n";
        let err = parse_install_output(stdout).unwrap_err();
        assert_eq!(
            err.to_string(),
            "An error occurred while installing 'foo'."
        );
    }

    #[test]
    fn test_missing_markers_is_unparseable() {
        let err = parse_install_output("nothing to see here\n").unwrap_err();
        assert!(matches!(err, Error::UnparseableResult));
    }

    #[test]
    fn test_unknown_result_word_is_unparseable() {
        let err = parse_install_output("1/1 [EXPLODED] foo").unwrap_err();
        assert!(matches!(err, Error::UnparseableResult));
    }
}

use std::sync::LazyLock;

use regex::Regex;

/// `https://<host>/<owner>/<repo>/pull/<number>`, digits only for the number.
static PR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://[^/\s]+/[^/\s]+/[^/\s]+/pull/[0-9]+$").expect("pr url pattern")
});

/// Syntactic check for a pull-request URL. No network validation.
pub fn is_valid_pr_url(url: &str) -> bool {
    PR_URL.is_match(url)
}

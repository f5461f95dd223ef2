use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ScanResult;

static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern is valid")
});

static SCAN_ROOT: Lazy<reqwest::Url> =
    Lazy::new(|| reqwest::Url::parse("http://scan.root/").expect("scan root is valid"));

// pulls same-site link targets out of a captured body, as paths relative to
// the scan root. absolute, protocol-relative, mailto/javascript and
// fragment-only references are ignored.
pub fn extract_paths(result: &ScanResult) -> Vec<String> {
    let Some(body) = result.body().filter(|b| !b.is_empty()) else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for cap in HREF_RE.captures_iter(body) {
        let Some(path) = normalize_reference(cap[1].trim()) else {
            continue;
        };
        if seen.insert(path.clone()) {
            out.push(path);
        }
    }
    out
}

fn normalize_reference(reference: &str) -> Option<String> {
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("//") {
        return None;
    }
    // anything that parses on its own carries a scheme: http, mailto, javascript, data...
    if reqwest::Url::parse(reference).is_ok() {
        return None;
    }
    let resolved = SCAN_ROOT.join(reference).ok()?;
    let path = resolved.path().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}

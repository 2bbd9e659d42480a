//! Decision-maker title classification: a fixed-priority regex cascade,
//! not an LLM call. Negative patterns exclude support/admin titles
//! outright; positive patterns are tried in order and the first match
//! wins, giving a stable seniority-style label for the title.

use once_cell::sync::Lazy;
use regex::Regex;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

static NEGATIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r"(?i)\bassistant\b"),
        rx(r"(?i)\bintern\b"),
        rx(r"(?i)\bcoordinator\b"),
        rx(r"(?i)\breceptionist\b"),
        rx(r"(?i)\bclerk\b"),
        rx(r"(?i)\btechnician\b"),
        rx(r"(?i)\bsupport\b"),
        rx(r"(?i)\bcustomer\s+service\b"),
        rx(r"(?i)\brepresentative\b"),
        rx(r"(?i)\bspecialist\b"),
        rx(r"(?i)\bassociate\b"),
        rx(r"(?i)\bstaff\b"),
    ]
});

static POSITIVE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("CEO", rx(r"(?i)\bCEO\b|\bChief\s+Executive\s+Officer\b")),
        ("COO", rx(r"(?i)\bCOO\b|\bChief\s+Operating\s+Officer\b")),
        ("CFO", rx(r"(?i)\bCFO\b|\bChief\s+Financial\s+Officer\b")),
        ("CTO", rx(r"(?i)\bCTO\b|\bChief\s+Technology\s+Officer\b")),
        ("CIO", rx(r"(?i)\bCIO\b|\bChief\s+Information\s+Officer\b")),
        ("CMO", rx(r"(?i)\bCMO\b|\bChief\s+Marketing\s+Officer\b")),
        ("Chief", rx(r"(?i)\bChief\b")),
        ("Founder", rx(r"(?i)\bco[- ]?founder\b|\bfounder\b")),
        ("Owner", rx(r"(?i)\bowner\b")),
        ("President", rx(r"(?i)\bpresident\b")),
        ("Managing Director", rx(r"(?i)\bmanaging\s+director\b")),
        ("General Manager", rx(r"(?i)\bgeneral\s+manager\b")),
        ("Senior Head", rx(r"(?i)\bsenior\s+head\b")),
        ("Head", rx(r"(?i)\bhead\b|\bhead\s+of\b")),
        ("Senior Director", rx(r"(?i)\bsenior\s+director\b")),
        ("Director", rx(r"(?i)\bdirector\b")),
        ("Senior Vice President", rx(r"(?i)\bsenior\s+vice\s+president\b|\bSVP\b")),
        ("Vice President", rx(r"(?i)\bvice\s+president\b|\bVP\b")),
        ("Chairman", rx(r"(?i)\bchairman\b|\bchair\b")),
        ("Managing Partner", rx(r"(?i)\bmanaging\s+partner\b")),
        ("Managing Member", rx(r"(?i)\bmanaging\s+member\b")),
        ("Partner", rx(r"(?i)\bpartner\b")),
        ("Principal", rx(r"(?i)\bprincipal\b")),
    ]
});

/// Classify a title. Returns `(true, keyword)` for the first positive
/// pattern matched, `(false, "")` if a negative pattern hit first or no
/// positive pattern matched at all.
pub fn is_decision_maker_title(title: Option<&str>) -> (bool, &'static str) {
    let t = title.unwrap_or("").trim();
    if t.is_empty() {
        return (false, "");
    }

    if NEGATIVE_PATTERNS.iter().any(|p| p.is_match(t)) {
        return (false, "");
    }

    for (keyword, pattern) in POSITIVE_PATTERNS.iter() {
        if pattern.is_match(t) {
            return (true, keyword);
        }
    }

    (false, "")
}

/// Default search-query keywords, in priority order, when the job
/// specifies no seniority/department filters.
pub fn decision_maker_query_keywords() -> Vec<String> {
    [
        "CEO",
        "Founder",
        "\"Co-Founder\"",
        "Owner",
        "President",
        "\"Managing Director\"",
        "\"General Manager\"",
        "\"Senior Head\"",
        "\"Head of\"",
        "\"Senior Director\"",
        "Director",
        "\"Senior Vice President\"",
        "\"Vice President\"",
        "SVP",
        "VP",
        "COO",
        "CFO",
        "CTO",
        "CIO",
        "CMO",
        "Partner",
        "Principal",
        "\"Managing Partner\"",
        "\"Managing Member\"",
        "Chairman",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn dedupe_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed);
        }
    }
    out
}

/// Build the keyword list used to plan a search query, incorporating any
/// job-supplied seniority/department filters. Falls back to the default
/// keyword list when filters are empty, or when a non-empty filter
/// combination somehow dedupes away to nothing.
pub fn build_query_keywords(seniorities: &[String], departments: &[String]) -> Vec<String> {
    let base = decision_maker_query_keywords();

    let s_in: Vec<String> = seniorities.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    let d_in: Vec<String> = departments.iter().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect();

    if s_in.is_empty() && d_in.is_empty() {
        return base;
    }

    let s_norm = dedupe_preserve_order(s_in);
    let d_norm = dedupe_preserve_order(d_in);

    let mut out: Vec<String> = vec![
        "CEO".into(),
        "Founder".into(),
        "\"Co-Founder\"".into(),
        "Owner".into(),
        "President".into(),
        "\"Managing Director\"".into(),
        "\"General Manager\"".into(),
    ];
    out.extend(s_norm.iter().cloned());

    let fallback_seniorities =
        ["Head", "Director", "VP", "SVP", "Vice President", "Senior Vice President"].map(String::from);
    let seniority_source: &[String] = if s_norm.is_empty() { &fallback_seniorities } else { &s_norm };

    for s in seniority_source {
        for d in &d_norm {
            out.push(format!("\"{s} {d}\""));
            out.push(format!("\"{s} of {d}\""));
        }
    }

    let deduped = dedupe_preserve_order(out);
    if deduped.is_empty() { base } else { deduped }
}

/// Substring match against a keyword list, used to decide whether an
/// extracted title satisfies a job's seniority/department filters.
pub fn title_matches_keywords(title: Option<&str>, keywords: &[String]) -> bool {
    let t = title.unwrap_or("").trim();
    if t.is_empty() {
        return false;
    }
    if NEGATIVE_PATTERNS.iter().any(|p| p.is_match(t)) {
        return false;
    }
    let kw: Vec<String> = keywords.iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect();
    if kw.is_empty() {
        return false;
    }
    let tl = t.to_lowercase();
    kw.iter().any(|k| tl.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceo_is_decision_maker() {
        let (is_dm, keyword) = is_decision_maker_title(Some("Chief Executive Officer"));
        assert!(is_dm);
        assert_eq!(keyword, "CEO");
    }

    #[test]
    fn assistant_is_excluded_even_with_director() {
        let (is_dm, _) = is_decision_maker_title(Some("Assistant Director"));
        assert!(!is_dm);
    }

    #[test]
    fn empty_title_is_not_decision_maker() {
        let (is_dm, keyword) = is_decision_maker_title(Some("  "));
        assert!(!is_dm);
        assert_eq!(keyword, "");
    }

    #[test]
    fn unrecognized_title_is_not_decision_maker() {
        let (is_dm, _) = is_decision_maker_title(Some("Software Engineer"));
        assert!(!is_dm);
    }

    #[test]
    fn negative_pattern_takes_priority_over_positive() {
        let (is_dm, _) = is_decision_maker_title(Some("Support Specialist"));
        assert!(!is_dm);
    }

    #[test]
    fn build_query_keywords_falls_back_to_default_when_empty() {
        let kws = build_query_keywords(&[], &[]);
        assert_eq!(kws, decision_maker_query_keywords());
    }

    #[test]
    fn build_query_keywords_combines_seniority_and_department() {
        let kws = build_query_keywords(&["Head".to_string()], &["Sales".to_string()]);
        assert!(kws.contains(&"\"Head Sales\"".to_string()));
        assert!(kws.contains(&"\"Head of Sales\"".to_string()));
    }

    #[test]
    fn title_matches_keywords_is_case_insensitive_substring() {
        assert!(title_matches_keywords(Some("VP of Sales"), &["vp".to_string()]));
        assert!(!title_matches_keywords(Some("Assistant to VP"), &["vp".to_string()]));
    }
}

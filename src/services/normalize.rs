//! Row normalizer: cleans free-form uploaded row fields and resolves the
//! shape the research pipeline and persistence layer expect. Every
//! cleaner is pure and total — a field that doesn't look like what its
//! column claims to hold resolves to empty rather than erroring, so bad
//! uploads degrade gracefully instead of aborting a batch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static URL_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(https?://|www\.)").expect("static pattern"));
static HOSTNAME_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static pattern"));
static POSTAL_EXACT_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,6}(-\d{4})?$").expect("static pattern"));
static POSTAL_EMBEDDED_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4,6}\b").expect("static pattern"));
static PO_BOX_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bP\.?\s*O\.?\s*Box\b").expect("static pattern"));
static ZIP_COMMA_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{5}(-\d{4})?\s*,").expect("static pattern"));
static STREET_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\d{1,6}\s+\S+.*\b(st|street|ave|avenue|rd|road|blvd|boulevard|dr|drive|ln|lane|way|hwy|highway|suite|ste|apt|unit|pl|place|ct|court|cir|circle)\b",
    )
    .expect("static pattern")
});
static GMAPS_PLACE_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/place/([^/@]+)").expect("static pattern"));
static EMAIL_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("static pattern"));

const PLACEHOLDERS: &[&str] = &["unknown", "n/a", "na", "none", "null", "-", "—"];

const US_STATES: &[&str] = &[
    "al", "ak", "az", "ar", "ca", "co", "ct", "de", "fl", "ga", "hi", "id", "il", "in", "ia", "ks", "ky", "la", "me",
    "md", "ma", "mi", "mn", "ms", "mo", "mt", "ne", "nv", "nh", "nj", "nm", "ny", "nc", "nd", "oh", "ok", "or", "pa",
    "ri", "sc", "sd", "tn", "tx", "ut", "vt", "va", "wa", "wv", "wi", "wy",
    "alabama", "alaska", "arizona", "arkansas", "california", "colorado", "connecticut", "delaware", "florida",
    "georgia", "hawaii", "idaho", "illinois", "indiana", "iowa", "kansas", "kentucky", "louisiana", "maine",
    "maryland", "massachusetts", "michigan", "minnesota", "mississippi", "missouri", "montana", "nebraska",
    "nevada", "new hampshire", "new jersey", "new mexico", "new york", "north carolina", "north dakota", "ohio",
    "oklahoma", "oregon", "pennsylvania", "rhode island", "south carolina", "south dakota", "tennessee", "texas",
    "utah", "vermont", "virginia", "washington", "west virginia", "wisconsin", "wyoming",
];

fn tld_country_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
        HashMap::from([
            ("us", "United States"),
            ("uk", "United Kingdom"),
            ("gb", "United Kingdom"),
            ("ca", "Canada"),
            ("au", "Australia"),
            ("nz", "New Zealand"),
            ("ie", "Ireland"),
            ("de", "Germany"),
            ("fr", "France"),
            ("es", "Spain"),
            ("it", "Italy"),
            ("nl", "Netherlands"),
            ("se", "Sweden"),
            ("no", "Norway"),
            ("dk", "Denmark"),
            ("fi", "Finland"),
            ("ch", "Switzerland"),
            ("at", "Austria"),
            ("be", "Belgium"),
            ("pt", "Portugal"),
            ("br", "Brazil"),
            ("mx", "Mexico"),
            ("in", "India"),
            ("jp", "Japan"),
            ("sg", "Singapore"),
        ])
    });
    &MAP
}

pub fn is_url_like(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() || t.contains(char::is_whitespace) {
        return false;
    }
    URL_RX.is_match(t) || HOSTNAME_RX.is_match(t)
}

pub fn is_postal_code(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() {
        return false;
    }
    if POSTAL_EXACT_RX.is_match(t) {
        return true;
    }
    t.len() <= 12 && !t.chars().any(|c| c.is_ascii_alphabetic()) && POSTAL_EMBEDDED_RX.is_match(t)
}

pub fn is_address_like(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() {
        return false;
    }
    PO_BOX_RX.is_match(t) || ZIP_COMMA_RX.is_match(t) || STREET_RX.is_match(t)
}

pub fn is_placeholder(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || PLACEHOLDERS.contains(&t.to_lowercase().as_str())
}

/// Clean a value destined for `company_name`: empty if it's a
/// placeholder, a URL (which belongs in `company_website` instead), a
/// postal code, or address-like text.
pub fn clean_company_name(raw: &str) -> String {
    let t = raw.trim();
    if is_placeholder(t) || is_url_like(t) || is_postal_code(t) || is_address_like(t) {
        return String::new();
    }
    t.to_string()
}

/// Infer a country from the tail token of a location string (US state
/// name/abbreviation) or a website's TLD.
pub fn infer_country(location_tail: Option<&str>, website: Option<&str>) -> Option<String> {
    if let Some(tail) = location_tail {
        let t = tail.trim().to_lowercase();
        if !t.is_empty() && US_STATES.contains(&t.as_str()) {
            return Some("United States".to_string());
        }
    }

    if let Some(site) = website {
        let host = site.trim().trim_start_matches("https://").trim_start_matches("http://").trim_start_matches("www.");
        if let Some(tld) = host.split('/').next().and_then(|h| h.rsplit('.').next()) {
            if let Some(country) = tld_country_map().get(tld.to_lowercase().as_str()) {
                return Some((*country).to_string());
            }
        }
    }

    None
}

/// Infer `(city, country)` from a `"city, country"` style string. The
/// tail is discarded as a country candidate if it's a 2-letter all-caps
/// token (likely a US state code) or contains digits (likely a postal
/// fragment).
pub fn infer_city_country(location: &str) -> (Option<String>, Option<String>) {
    let t = location.trim();
    if t.is_empty() {
        return (None, None);
    }

    let Some((city_part, tail_part)) = t.rsplit_once(',') else {
        return (Some(t.to_string()), None);
    };

    let city = city_part.trim();
    let tail = tail_part.trim();

    let tail_is_state_code = tail.len() == 2 && tail.chars().all(|c| c.is_ascii_uppercase());
    let tail_has_digits = tail.chars().any(|c| c.is_ascii_digit());

    let city_out = if city.is_empty() { None } else { Some(city.to_string()) };
    if tail.is_empty() || tail_is_state_code || tail_has_digits {
        (city_out, None)
    } else {
        (city_out, Some(tail.to_string()))
    }
}

/// Decode a Google Maps URL's `/place/<name>` segment into a readable
/// company name: URL-decode, turn `+` into spaces, collapse whitespace.
pub fn decode_gmaps_name(url: &str) -> Option<String> {
    let captures = GMAPS_PLACE_RX.captures(url)?;
    let raw = captures.get(1)?.as_str().replace('+', " ");
    let decoded = urlencoding::decode(&raw).ok()?.into_owned();
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() { None } else { Some(collapsed) }
}

/// Scan arbitrary search-result text for embedded email addresses,
/// lowercased and de-duplicated preserving first-seen order, capped at
/// 25.
pub fn extract_emails(blob: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in EMAIL_RX.find_iter(blob) {
        let lower = m.as_str().to_lowercase();
        if seen.insert(lower.clone()) {
            out.push(lower);
            if out.len() >= 25 {
                break;
            }
        }
    }
    out
}

/// A company identity resolved from an uploaded row, ready for the
/// research pipeline and for persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRow {
    pub company_name: String,
    pub company_type: String,
    pub company_city: String,
    pub company_country: String,
    pub company_website: String,
    pub location_hint: String,
}

/// Raw row fields as lifted out of the uploaded spreadsheet via the
/// job's column mappings.
#[derive(Debug, Clone, Default)]
pub struct RawRowFields {
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub google_maps_url: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Resolve a company's identity for save/research, applying the layered
/// fallback: already-normalized value, else the uploaded value, else an
/// inference from related fields, else empty. Idempotent — resolving an
/// already-resolved row and re-resolving it from its own JSON produces
/// the same fields.
pub fn resolve_for_save(raw: &RawRowFields) -> ResolvedRow {
    let mut company_name = raw.company_name.as_deref().map(clean_company_name).unwrap_or_default();

    let mut website = raw.website.as_deref().unwrap_or("").trim().to_string();
    if company_name.is_empty() {
        if let Some(name) = raw.company_name.as_deref().filter(|s| is_url_like(s)) {
            if website.is_empty() {
                website = name.trim().to_string();
            }
        }
    }

    if company_name.is_empty() {
        if let Some(maps_url) = raw.google_maps_url.as_deref() {
            if let Some(decoded) = decode_gmaps_name(maps_url) {
                company_name = decoded;
            }
        }
    }

    let location_hint = raw.location.as_deref().unwrap_or("").trim().to_string();
    let (inferred_city, inferred_country) = infer_city_country(&location_hint);

    let company_city = raw
        .city
        .as_deref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !is_placeholder(s))
        .or(inferred_city)
        .unwrap_or_default();

    let explicit_country = raw.country.as_deref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty() && !is_placeholder(s));

    let company_country = explicit_country
        .or(inferred_country)
        .or_else(|| {
            let tail = location_hint.rsplit(',').next();
            infer_country(tail, Some(&website))
        })
        .unwrap_or_default();

    let company_type = raw.industry.as_deref().unwrap_or("").trim().to_string();

    ResolvedRow { company_name, company_type, company_city, company_country, company_website: website, location_hint }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_like_detects_scheme_and_bare_hostname() {
        assert!(is_url_like("https://acme.com"));
        assert!(is_url_like("www.acme.com"));
        assert!(is_url_like("acme.com"));
        assert!(!is_url_like("Acme Corp"));
    }

    #[test]
    fn postal_code_detects_bare_numeric() {
        assert!(is_postal_code("10001"));
        assert!(is_postal_code("10001-1234"));
        assert!(!is_postal_code("Acme Corp"));
    }

    #[test]
    fn address_like_detects_street_suffix() {
        assert!(is_address_like("123 Main St"));
        assert!(is_address_like("PO Box 42"));
        assert!(!is_address_like("Acme Corp"));
    }

    #[test]
    fn placeholder_detection_is_case_insensitive() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("N/A"));
        assert!(is_placeholder("—"));
        assert!(!is_placeholder("Acme"));
    }

    #[test]
    fn clean_company_name_empties_url_supplied_value() {
        assert_eq!(clean_company_name("https://acme.com"), "");
        assert_eq!(clean_company_name("Acme Corp"), "Acme Corp");
    }

    #[test]
    fn infer_country_from_us_state_tail() {
        assert_eq!(infer_country(Some("NY"), None), Some("United States".to_string()));
        assert_eq!(infer_country(Some("New York"), None), Some("United States".to_string()));
    }

    #[test]
    fn infer_country_from_website_tld() {
        assert_eq!(infer_country(None, Some("https://acme.co.uk")), Some("United Kingdom".to_string()));
    }

    #[test]
    fn infer_city_country_splits_on_comma() {
        let (city, country) = infer_city_country("New York, United States");
        assert_eq!(city, Some("New York".to_string()));
        assert_eq!(country, Some("United States".to_string()));
    }

    #[test]
    fn infer_city_country_discards_state_code_tail() {
        let (city, country) = infer_city_country("New York, NY");
        assert_eq!(city, Some("New York".to_string()));
        assert_eq!(country, None);
    }

    #[test]
    fn decode_gmaps_name_handles_plus_and_percent_encoding() {
        let url = "https://maps.google.com/maps/place/Acme+Corp%2C+Inc/@40.0,-70.0,15z";
        assert_eq!(decode_gmaps_name(url), Some("Acme Corp, Inc".to_string()));
    }

    #[test]
    fn extract_emails_dedupes_and_lowercases() {
        let blob = "Contact Jane@Acme.com or jane@acme.com, not a-noreply string";
        let emails = extract_emails(blob);
        assert_eq!(emails, vec!["jane@acme.com".to_string()]);
    }

    #[test]
    fn resolve_for_save_promotes_url_company_name_to_website() {
        let raw = RawRowFields { company_name: Some("https://acme.com".to_string()), ..Default::default() };
        let resolved = resolve_for_save(&raw);
        assert_eq!(resolved.company_name, "");
        assert_eq!(resolved.company_website, "https://acme.com");
    }

    #[test]
    fn resolve_for_save_is_idempotent_on_already_clean_row() {
        let raw = RawRowFields {
            company_name: Some("Acme Corp".to_string()),
            location: Some("New York, United States".to_string()),
            website: Some("https://acme.com".to_string()),
            industry: Some("Software".to_string()),
            ..Default::default()
        };
        let once = resolve_for_save(&raw);
        let raw_again = RawRowFields {
            company_name: Some(once.company_name.clone()),
            location: Some(once.location_hint.clone()),
            website: Some(once.company_website.clone()),
            industry: Some(once.company_type.clone()),
            city: Some(once.company_city.clone()),
            country: Some(once.company_country.clone()),
            google_maps_url: None,
        };
        let twice = resolve_for_save(&raw_again);
        assert_eq!(once, twice);
    }
}

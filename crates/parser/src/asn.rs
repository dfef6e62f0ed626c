use once_cell::sync::Lazy;
use regex::Regex;

/// Well-known providers whose ASN owner strings start with the brand but
/// don't follow any of the regular formats.
const COMPANY_PREFIXES: &[&str] = &["LEASEWEB", "SAKURA", "CLOUDFLARE", "TWC", "SWITCH Peering"];

/// Ordered most-specific first; the first capture wins.
static COMPANY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(THE-[A-Z\d]*)-(?:A[SP]N?)",
        r"^([A-Z\d]*)-(?:A[SP]N?)",
        r"^([A-Z\d]*)-CN-NET",
        r"^([A-Z-]*)\d*-(?:A[SP]N?)",
        r"^([A-Z-]*)-\d+[\s\-,]",
        r"^ASN?-([A-Z]*), [A-Z]{2}",
        r"^([A-Z]*), [A-Z]{2}",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static COUNTRY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r", [A-Z]{2}$").unwrap());

/// Normalize a whois owner string like "HETZNER-AS, DE" to the bare company
/// label. Idempotent: feeding a cleaned value back in returns it unchanged.
pub fn clean_company(owner: &str) -> String {
    let owner = owner.trim();
    if owner.is_empty() {
        return String::new();
    }

    for prefix in COMPANY_PREFIXES {
        if owner.starts_with(prefix) {
            return (*prefix).to_string();
        }
    }

    if owner.contains("6NETWORK") {
        return "6NETWORK".to_string();
    }

    for pattern in COMPANY_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(owner) {
            return caps[1].to_string();
        }
    }

    // "MVPS www.mvps.net, CY" style: an all-caps brand followed by its own
    // URL or a case variant of itself, with a trailing country code.
    let stripped = COUNTRY_SUFFIX_RE.replace(owner, "");
    let mut words = stripped.split_whitespace();
    if let Some(first) = words.next() {
        if is_brand_word(first) {
            match words.next() {
                None => return first.to_string(),
                Some(second) => {
                    let lowercase_url = second.contains('.')
                        && !second.chars().any(|c| c.is_ascii_uppercase());
                    if lowercase_url || second.eq_ignore_ascii_case(first) {
                        return first.to_string();
                    }
                }
            }
        }
    }

    owner.to_string()
}

/// Uppercase letters, digits and dashes only, with at least one letter.
fn is_brand_word(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_uppercase())
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANY_CASES: &[(&str, &str)] = &[
        ("TWC", "TWC-11426-CAROLINAS, US"),
        ("UNI2", "UNI2-AS, ES"),
        ("THE-1984", "THE-1984-AS, IS"),
        ("CLOUDFLARE", "CLOUDFLARENET, US"),
        ("CLOUDFLARE", "CLOUDFLARESPECTRUM, US"),
        ("HETZNER", "HETZNER-AS, DE"),
        ("DIGITALOCEAN", "DIGITALOCEAN-ASN, US"),
        ("AKAMAI", "AKAMAI-AP Akamai Technologies, Inc., SG"),
        ("AMAZON", "AMAZON-02, US"),
        ("ORACLE-BMC", "ORACLE-BMC-31898, US"),
        ("COMCAST", "COMCAST-7922, US"),
        ("HETZNER-CLOUD", "HETZNER-CLOUD2-AS, DE"),
        ("HOSTINGER", "AS-HOSTINGER, CY"),
        ("CHOOPA", "AS-CHOOPA, US"),
        ("LEASEWEB", "LEASEWEB-USA-SFO, US"),
        ("LEASEWEB", "LEASEWEB-USA-WDC, US"),
        ("MVPS", "MVPS www.mvps.net, CY"),
        ("DE-WEBGO", "DE-WEBGO www.webgo.de, DE"),
        ("DE-FIRSTCOLO", "DE-FIRSTCOLO www.first-colo.net, DE"),
        ("MYTHIC", "MYTHIC Mythic Beasts Ltd, GB"),
        ("BIGLOBE", "BIGLOBE BIGLOBE Inc., JP"),
        ("ALIBABA", "ALIBABA-CN-NET Alibaba US Technology Co., Ltd., CN"),
        ("MILKYWAN", "MILKYWAN MilkyWan, FR"),
        ("ROUTELABEL", "ASN-ROUTELABEL, NL"),
        ("6NETWORK", "ASN-6NETWORK *** IoT Zrt *** Last-Mile Kft ***, HU"),
    ];

    #[test]
    fn known_owner_strings() {
        for (expected, owner) in COMPANY_CASES {
            assert_eq!(clean_company(owner), *expected, "owner: {owner}");
        }
    }

    #[test]
    fn idempotent() {
        for (expected, owner) in COMPANY_CASES {
            let once = clean_company(owner);
            assert_eq!(clean_company(&once), once, "owner: {owner}");
            assert_eq!(once, *expected);
        }
    }

    #[test]
    fn unrecognized_owner_passes_through() {
        assert_eq!(clean_company("Some Odd Provider"), "Some Odd Provider");
        assert_eq!(clean_company(""), "");
    }
}

use once_cell::sync::Lazy;
use regex::Regex;

/// Decomposition of the version string a server advertises on
/// `/api/v1/instance`. Forks report both their own version and the
/// Mastodon API level they are compatible with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FediVersion {
    pub software: String,
    pub software_version: Option<String>,
    pub mastodon_version: Option<String>,
}

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.\d+\.\d+\S*)").unwrap());

static COMPATIBLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+\.\d+\.\d+\S*) \(compatible; (\w+) (\d+\.\d+\.*\d*\S*)\)").unwrap()
});

static OWNCAST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Owncast v(\S+)").unwrap());

/// Heuristic breakdown of a raw version string. Returns `None` when the
/// string carries no recognizable version at all.
pub fn breakdown(version: &str) -> Option<FediVersion> {
    // Takahe doesn't use the "(compatible; ...)" convention; it just
    // advertises "takahe/x.y.z".
    if let Some(rest) = version.strip_prefix("takahe/") {
        return Some(FediVersion {
            software: "takahe".to_string(),
            software_version: Some(rest.to_string()),
            mastodon_version: None,
        });
    }

    if let Some(caps) = OWNCAST_RE.captures(version) {
        return Some(FediVersion {
            software: "owncast".to_string(),
            software_version: Some(caps[1].to_string()),
            mastodon_version: None,
        });
    }

    let mastodon_version = VERSION_RE.captures(version)?[1].to_string();

    let mut parsed = if let Some(caps) = COMPATIBLE_RE.captures(version) {
        FediVersion {
            software: caps[2].to_lowercase(),
            software_version: Some(caps[3].to_string()),
            mastodon_version: Some(mastodon_version),
        }
    } else {
        FediVersion {
            software: "mastodon".to_string(),
            software_version: Some(mastodon_version.clone()),
            mastodon_version: Some(mastodon_version),
        }
    };

    if version.contains("glitch") {
        parsed.software = "glitch".to_string();
    } else if version.contains("hometown") {
        // Hometown versions look like "3.5.5+hometown-1.0.7": the fork
        // version sits after the dash, the Mastodon level before the plus.
        parsed.software = "hometown".to_string();
        parsed.software_version = parsed
            .mastodon_version
            .as_deref()
            .and_then(|v| v.split('-').next_back())
            .map(str::to_string);
        parsed.mastodon_version = parsed
            .mastodon_version
            .as_deref()
            .and_then(|v| v.split('+').next())
            .map(str::to_string);
    }

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mastodon() {
        let v = breakdown("4.1.0").unwrap();
        assert_eq!(v.software, "mastodon");
        assert_eq!(v.software_version.as_deref(), Some("4.1.0"));
        assert_eq!(v.mastodon_version.as_deref(), Some("4.1.0"));
    }

    #[test]
    fn compatible_fork() {
        let v = breakdown("4.1.0 (compatible; Pleroma 2.5.0)").unwrap();
        assert_eq!(v.software, "pleroma");
        assert_eq!(v.software_version.as_deref(), Some("2.5.0"));
        assert_eq!(v.mastodon_version.as_deref(), Some("4.1.0"));
    }

    #[test]
    fn takahe() {
        let v = breakdown("takahe/0.9.0").unwrap();
        assert_eq!(v.software, "takahe");
        assert_eq!(v.software_version.as_deref(), Some("0.9.0"));
        assert_eq!(v.mastodon_version, None);
    }

    #[test]
    fn owncast() {
        let v = breakdown("Owncast v0.0.13-linux-64bit").unwrap();
        assert_eq!(v.software, "owncast");
        assert_eq!(v.software_version.as_deref(), Some("0.0.13-linux-64bit"));
        assert_eq!(v.mastodon_version, None);
    }

    #[test]
    fn glitch() {
        let v = breakdown("4.1.2+glitch").unwrap();
        assert_eq!(v.software, "glitch");
        assert_eq!(v.mastodon_version.as_deref(), Some("4.1.2+glitch"));
    }

    #[test]
    fn hometown() {
        let v = breakdown("3.5.5+hometown-1.0.7").unwrap();
        assert_eq!(v.software, "hometown");
        assert_eq!(v.software_version.as_deref(), Some("1.0.7"));
        assert_eq!(v.mastodon_version.as_deref(), Some("3.5.5"));
    }

    #[test]
    fn unparseable_is_none() {
        assert!(breakdown("not a version").is_none());
        assert!(breakdown("").is_none());
    }
}

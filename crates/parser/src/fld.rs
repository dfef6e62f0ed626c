/// Reduce a host to its registrable domain.
///
/// A two-label host is already a registrable domain, so the public-suffix
/// table is only consulted for longer names. Unknown suffixes fall back to
/// the last two labels. This runs once per peer entry on large peer lists,
/// so the cheap path has to come first.
pub fn base_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() == 2 {
        return host;
    }

    if let Some(domain) = psl::domain_str(&host) {
        return domain.to_string();
    }

    if labels.len() > 2 {
        return format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
    }
    host
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_label_public_suffix() {
        assert_eq!(base_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(base_domain("social.example.com"), "example.com");
    }

    #[test]
    fn two_labels_unchanged() {
        assert_eq!(base_domain("mastodon.social"), "mastodon.social");
        assert_eq!(base_domain("foo.unknown-tld"), "foo.unknown-tld");
    }

    #[test]
    fn case_and_trailing_dot_normalized() {
        assert_eq!(base_domain("Mastodon.Social."), "mastodon.social");
    }

    #[test]
    fn single_label_passes_through() {
        assert_eq!(base_domain("localhost"), "localhost");
    }
}

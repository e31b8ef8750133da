use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

static PRIVATE_172_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^172\.(1[6-9]|2[0-9]|3[0-1])\.").expect("Failed to compile private range regex")
});

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidUrl {
    #[error("url could not be parsed")]
    Malformed,

    #[error("url scheme '{0}' is not allowed")]
    Scheme(String),

    #[error("host '{0}' is not allowed")]
    BlockedHost(String),

    #[error("could not detect content type")]
    Undetectable,
}

/// How a profile url names its user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum ProfileRef {
    Username(String),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    Note { domain: String, id: String },
    Profile { domain: String, user: ProfileRef },
    Instance { domain: String },
}

impl Target {
    /// Path of the internal view that renders this target.
    pub fn view_path(&self) -> String {
        match self {
            Target::Note { domain, id } => format!("/instance/{domain}/notes/{id}"),
            Target::Profile {
                domain,
                user: ProfileRef::Username(username),
            } => format!("/profile/{domain}/{username}"),
            Target::Profile {
                domain,
                user: ProfileRef::Id(id),
            } => format!("/profile/{domain}/users/{id}"),
            Target::Instance { domain } => format!("/instance/{domain}"),
        }
    }
}

/// Hostname-literal SSRF guard. Does not resolve DNS.
pub fn is_blocked_host(host: &str) -> bool {
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_lowercase();

    if host == "localhost" || host == "127.0.0.1" || host == "::1" {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        let internal = match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified(),
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
        if internal {
            return true;
        }
    }

    host.starts_with("10.") || host.starts_with("192.168.") || PRIVATE_172_REGEX.is_match(&host)
}

/// Validates a bare `domain` (optionally with a port) taken from a route
/// path and returns it as the normalized `host[:port]` to fetch from.
pub fn check_domain(domain: &str) -> Result<String, InvalidUrl> {
    if domain.is_empty() {
        return Err(InvalidUrl::Malformed);
    }

    let url = Url::parse(&format!("https://{domain}/")).map_err(|_| InvalidUrl::Malformed)?;

    // anything beyond host and port would change where the request goes
    if !url.username().is_empty()
        || url.password().is_some()
        || url.path() != "/"
        || url.query().is_some()
        || url.fragment().is_some()
    {
        log::warn!("domain '{domain}' is not a bare host");
        return Err(InvalidUrl::Malformed);
    }

    let host = url.host_str().ok_or(InvalidUrl::Malformed)?;
    if is_blocked_host(host) {
        log::warn!("host '{host}' is blocked");
        return Err(InvalidUrl::BlockedHost(host.to_string()));
    }

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn segment_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    path.split_once(marker)
        .map(|(_, rest)| rest.split('/').next().unwrap_or_default())
}

fn non_empty(id: &str) -> Result<String, InvalidUrl> {
    if id.is_empty() {
        return Err(InvalidUrl::Undetectable);
    }
    Ok(id.to_string())
}

pub fn classify(input: &str) -> Result<Target, InvalidUrl> {
    let url = Url::parse(input.trim()).map_err(|_| InvalidUrl::Malformed)?;

    if !["http", "https"].contains(&url.scheme()) {
        log::warn!("URL scheme '{}' not allowed", url.scheme());
        return Err(InvalidUrl::Scheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(InvalidUrl::Malformed)?;
    if is_blocked_host(host) {
        log::warn!("host '{host}' is blocked");
        return Err(InvalidUrl::BlockedHost(host.to_string()));
    }

    let domain = host.to_lowercase();
    let path = url.path();

    if let Some(id) = segment_after(path, "/notes/") {
        return Ok(Target::Note {
            domain,
            id: non_empty(id)?,
        });
    }

    if let Some(rest) = path.strip_prefix("/@") {
        let username = rest.split('/').next().unwrap_or_default();
        return Ok(Target::Profile {
            domain,
            user: ProfileRef::Username(non_empty(username)?),
        });
    }

    if let Some(id) = segment_after(path, "/users/") {
        return Ok(Target::Profile {
            domain,
            user: ProfileRef::Id(non_empty(id)?),
        });
    }

    Ok(Target::Instance { domain })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(classify("https://example.com").is_ok());
        assert!(classify("http://example.com").is_ok());
    }

    #[test]
    fn test_rejects_loopback_for_any_path() {
        for host in ["localhost", "127.0.0.1", "[::1]"] {
            for path in ["", "/notes/abc", "/@alice", "/users/u1", "/api/meta"] {
                let url = format!("http://{host}:3000{path}");
                assert!(
                    matches!(classify(&url), Err(InvalidUrl::BlockedHost(_))),
                    "{url} should be blocked"
                );
            }
        }
    }

    #[test]
    fn test_rejects_private_ranges() {
        for url in [
            "http://10.0.0.1",
            "http://10.255.3.4/notes/x",
            "http://192.168.1.1",
            "https://172.16.0.1/@bob",
            "https://172.20.10.10",
            "https://172.31.255.255",
        ] {
            assert!(matches!(classify(url), Err(InvalidUrl::BlockedHost(_))), "{url}");
        }
    }

    #[test]
    fn test_public_172_is_allowed() {
        assert!(classify("https://172.15.0.1").is_ok());
        assert!(classify("https://172.32.0.1").is_ok());
    }

    #[test]
    fn test_rejects_invalid_and_non_http() {
        assert_eq!(classify("not-a-url"), Err(InvalidUrl::Malformed));
        assert_eq!(
            classify("ftp://example.com"),
            Err(InvalidUrl::Scheme("ftp".to_string()))
        );
        assert!(matches!(
            classify("data:text/html,<p>hi</p>"),
            Err(InvalidUrl::Scheme(_))
        ));
    }

    #[test]
    fn test_note_url() {
        assert_eq!(
            classify("https://example.social/notes/abc123").unwrap(),
            Target::Note {
                domain: "example.social".into(),
                id: "abc123".into()
            }
        );
    }

    #[test]
    fn test_note_id_stops_at_slash() {
        assert_eq!(
            classify("https://example.social/notes/abc123/reactions").unwrap(),
            Target::Note {
                domain: "example.social".into(),
                id: "abc123".into()
            }
        );
    }

    #[test]
    fn test_profile_by_username() {
        assert_eq!(
            classify("https://example.social/@alice").unwrap(),
            Target::Profile {
                domain: "example.social".into(),
                user: ProfileRef::Username("alice".into())
            }
        );
    }

    #[test]
    fn test_profile_by_id() {
        assert_eq!(
            classify("https://example.social/users/u1").unwrap(),
            Target::Profile {
                domain: "example.social".into(),
                user: ProfileRef::Id("u1".into())
            }
        );
    }

    #[test]
    fn test_instance_url() {
        assert_eq!(
            classify("https://example.social").unwrap(),
            Target::Instance {
                domain: "example.social".into()
            }
        );
        assert_eq!(
            classify("https://Example.Social/about").unwrap(),
            Target::Instance {
                domain: "example.social".into()
            }
        );
    }

    #[test]
    fn test_notes_take_precedence() {
        assert!(matches!(
            classify("https://example.social/@alice/notes/xyz").unwrap(),
            Target::Note { id, .. } if id == "xyz"
        ));
    }

    #[test]
    fn test_empty_identifier_is_undetectable() {
        assert_eq!(
            classify("https://example.social/notes/"),
            Err(InvalidUrl::Undetectable)
        );
        assert_eq!(classify("https://example.social/@"), Err(InvalidUrl::Undetectable));
    }

    #[test]
    fn test_view_paths() {
        let note = classify("https://example.social/notes/abc").unwrap();
        assert_eq!(note.view_path(), "/instance/example.social/notes/abc");
        let by_id = classify("https://example.social/users/u1").unwrap();
        assert_eq!(by_id.view_path(), "/profile/example.social/users/u1");
        let by_name = classify("https://example.social/@alice").unwrap();
        assert_eq!(by_name.view_path(), "/profile/example.social/alice");
    }

    #[test]
    fn test_check_domain() {
        assert_eq!(check_domain("example.social").unwrap(), "example.social");
        assert_eq!(check_domain("Example.Social:8443").unwrap(), "example.social:8443");
        assert_eq!(check_domain("example.social:443").unwrap(), "example.social");
        assert!(check_domain("localhost:3000").is_err());
        assert!(check_domain("10.1.2.3").is_err());
        assert!(check_domain("[::1]").is_err());
        assert!(check_domain("").is_err());
    }

    #[test]
    fn test_check_domain_rejects_smuggled_hosts() {
        for domain in [
            "user@127.0.0.1",
            "x@localhost:3000",
            "user:pass@example.social",
            "example.social@10.0.0.1",
            "127.0.0.1#",
            "example.social#frag",
            "example.social?q=1",
            "example.social/api",
            "2130706433",
            "0x7f000001",
            "0177.0.0.1",
            "localhost.",
            "[::ffff:127.0.0.1]",
            "0.0.0.0",
        ] {
            assert!(check_domain(domain).is_err(), "{domain} should be rejected");
        }
    }

    #[test]
    fn test_rejects_encoded_loopback() {
        for url in [
            "http://2130706433/notes/abc",
            "http://0x7f000001",
            "http://localhost./@alice",
            "http://127.0.0.2",
        ] {
            assert!(matches!(classify(url), Err(InvalidUrl::BlockedHost(_))), "{url}");
        }
    }
}

use std::net::IpAddr;

use crate::config::SecurityConfig;
use crate::error::SecurityError;

use super::validation::extension;

pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "ps1", "vbs", "js", "jse", "wsf", "wsh", "jar", "class",
    "msi", "msu", "msp", "scr", "hta", "chm", "hlp",
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn size_mb(len: usize) -> f64 {
    len as f64 / BYTES_PER_MB
}

/// Rejects empty, oversized or executable uploads.
pub fn check_upload(
    filename: &str,
    bytes: &[u8],
    config: &SecurityConfig,
) -> Result<(), SecurityError> {
    if bytes.is_empty() {
        return Err(SecurityError::EmptyFile);
    }

    let size = size_mb(bytes.len());
    if size > config.max_file_size_mb as f64 {
        return Err(SecurityError::FileTooLarge {
            size_mb: size,
            max_mb: config.max_file_size_mb,
        });
    }

    if let Some(ext) = extension(filename) {
        if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
            return Err(SecurityError::DangerousExtension(ext));
        }
    }
    Ok(())
}

/// `host` equals `domain` or is a subdomain of it.
fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private(IpAddr::V4(v4)))
        }
    }
}

/// Checks a remote document URL before it is fetched.
///
/// Blocked domains win over allowed ones. An empty allow list admits any
/// domain that is not blocked. Only literal IPs are checked for private
/// ranges; names are not resolved.
pub fn check_source_url(url: &str, config: &SecurityConfig) -> Result<(), SecurityError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| SecurityError::InvalidUrl(url.to_string()))?;

    match parsed.scheme() {
        "https" => {}
        "http" if !config.require_https => {}
        other => return Err(SecurityError::InsecureScheme(other.to_string())),
    }

    let host = parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SecurityError::InvalidUrl(url.to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if config.block_private_ips && is_private(ip) {
            return Err(SecurityError::PrivateAddress(host));
        }
    }

    if config.block_private_ips && (host == "localhost" || host.ends_with(".localhost")) {
        return Err(SecurityError::PrivateAddress(host));
    }

    if config.blocked_domains.iter().any(|d| domain_matches(&host, d)) {
        return Err(SecurityError::DomainBlocked(host));
    }

    if !config.allowed_domains.is_empty()
        && !config.allowed_domains.iter().any(|d| domain_matches(&host, d))
    {
        return Err(SecurityError::DomainNotAllowed(host));
    }

    if let Some(ext) = extension(parsed.path()) {
        if DANGEROUS_EXTENSIONS.contains(&ext.as_str()) {
            return Err(SecurityError::DangerousExtension(ext));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecurityConfig {
        SecurityConfig {
            allowed_domains: vec!["example.com".into(), "files.partner.org".into()],
            blocked_domains: vec!["evil.example.com".into()],
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn test_check_upload() {
        let cfg = SecurityConfig::default();
        check_upload("a.pdf", b"%PDF", &cfg).unwrap();
        assert_eq!(check_upload("a.pdf", b"", &cfg), Err(SecurityError::EmptyFile));
        assert_eq!(
            check_upload("setup.EXE", b"MZ", &cfg),
            Err(SecurityError::DangerousExtension("exe".into()))
        );
    }

    #[test]
    fn test_check_upload_size_limit() {
        let cfg = SecurityConfig {
            max_file_size_mb: 1,
            ..SecurityConfig::default()
        };
        let just_over = vec![0u8; 1024 * 1024 + 1];
        assert!(matches!(
            check_upload("a.pdf", &just_over, &cfg),
            Err(SecurityError::FileTooLarge { max_mb: 1, .. })
        ));
        check_upload("a.pdf", &just_over[..1024 * 1024], &cfg).unwrap();
    }

    #[test]
    fn test_source_url_allowed() {
        check_source_url("https://example.com/docs/a.pdf", &config()).unwrap();
        check_source_url("https://cdn.example.com/a.pdf", &config()).unwrap();
        check_source_url("https://files.partner.org/a.pdf", &config()).unwrap();
    }

    #[test]
    fn test_source_url_rejections() {
        let cfg = config();
        assert_eq!(
            check_source_url("http://example.com/a.pdf", &cfg),
            Err(SecurityError::InsecureScheme("http".into()))
        );
        assert_eq!(
            check_source_url("https://evil.example.com/a.pdf", &cfg),
            Err(SecurityError::DomainBlocked("evil.example.com".into()))
        );
        assert_eq!(
            check_source_url("https://notexample.com/a.pdf", &cfg),
            Err(SecurityError::DomainNotAllowed("notexample.com".into()))
        );
        assert_eq!(
            check_source_url("https://example.com/tool.exe", &cfg),
            Err(SecurityError::DangerousExtension("exe".into()))
        );
        assert!(matches!(
            check_source_url("not a url", &cfg),
            Err(SecurityError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_source_url_private_addresses() {
        let cfg = SecurityConfig::default();
        for url in [
            "https://127.0.0.1/a.pdf",
            "https://10.1.2.3/a.pdf",
            "https://192.168.0.10/a.pdf",
            "https://172.16.5.4/a.pdf",
            "https://169.254.169.254/latest",
            "https://[::1]/a.pdf",
            "https://[fd00::1]/a.pdf",
            "https://localhost/a.pdf",
        ] {
            assert!(
                matches!(check_source_url(url, &cfg), Err(SecurityError::PrivateAddress(_))),
                "{url}"
            );
        }
        check_source_url("https://8.8.8.8/a.pdf", &cfg).unwrap();
    }

    #[test]
    fn test_http_allowed_when_not_required() {
        let cfg = SecurityConfig {
            require_https: false,
            ..SecurityConfig::default()
        };
        check_source_url("http://example.com/a.pdf", &cfg).unwrap();
        assert!(check_source_url("ftp://example.com/a.pdf", &cfg).is_err());
    }
}

//! Response header helpers shared by the provider clients.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::RateLimitInfo;
use crate::http::{HttpHeaders, header_get};

/// Read quota headers from a response.
///
/// Accepts both `X-RateLimit-*` (GitHub, Gitea) and `RateLimit-*`
/// (GitLab) header names. The reset header is a Unix timestamp.
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitInfo> {
    let pick = |suffix: &str| {
        header_get(headers, &format!("x-ratelimit-{suffix}"))
            .or_else(|| header_get(headers, &format!("ratelimit-{suffix}")))
    };

    let limit = pick("limit")?.trim().parse::<usize>().ok()?;
    let remaining = pick("remaining")?.trim().parse::<usize>().ok()?;
    let reset_at = pick("reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .unwrap_or_else(Utc::now);

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
        retry_after: parse_retry_after(headers),
    })
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(headers: &HttpHeaders) -> Option<Duration> {
    header_get(headers, "retry-after")?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Whether a response signals quota exhaustion rather than a permission problem.
///
/// GitHub answers both with 403, distinguished by `X-RateLimit-Remaining: 0`
/// or a `Retry-After` header.
pub fn is_quota_exhausted(status: u16, headers: &HttpHeaders) -> bool {
    if status == 429 {
        return true;
    }
    if status != 403 {
        return false;
    }
    let remaining_zero = header_get(headers, "x-ratelimit-remaining")
        .or_else(|| header_get(headers, "ratelimit-remaining"))
        .is_some_and(|v| v.trim() == "0");
    remaining_zero || header_get(headers, "retry-after").is_some()
}

/// Normalize a configured host into an API base URL.
///
/// Adds `https://` when no scheme is given and appends `api_suffix`
/// unless it is already present.
pub fn api_base(host: &str, api_suffix: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if api_suffix.is_empty() || host.ends_with(api_suffix) {
        host
    } else {
        format!("{host}{api_suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_github_style_headers() {
        let h = headers(&[
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Remaining", "4990"),
            ("X-RateLimit-Reset", "1700000000"),
        ]);
        let info = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(info.limit, 5000);
        assert_eq!(info.remaining, 4990);
        assert_eq!(info.reset_at.timestamp(), 1_700_000_000);
        assert!(info.retry_after.is_none());
    }

    #[test]
    fn parses_gitlab_style_headers() {
        let h = headers(&[
            ("RateLimit-Limit", "2000"),
            ("RateLimit-Remaining", "0"),
            ("RateLimit-Reset", "1700000100"),
            ("Retry-After", "42"),
        ]);
        let info = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(info.remaining, 0);
        assert_eq!(info.retry_after, Some(Duration::from_secs(42)));
    }

    #[test]
    fn missing_headers_yield_none() {
        assert!(parse_rate_limit_headers(&headers(&[("X-RateLimit-Limit", "10")])).is_none());
        assert!(parse_rate_limit_headers(&Vec::new()).is_none());
    }

    #[test]
    fn quota_exhaustion_detection() {
        assert!(is_quota_exhausted(429, &Vec::new()));
        assert!(is_quota_exhausted(
            403,
            &headers(&[("X-RateLimit-Remaining", "0")])
        ));
        assert!(is_quota_exhausted(403, &headers(&[("Retry-After", "60")])));
        assert!(!is_quota_exhausted(
            403,
            &headers(&[("X-RateLimit-Remaining", "12")])
        ));
        assert!(!is_quota_exhausted(500, &Vec::new()));
    }

    #[test]
    fn api_base_normalization() {
        assert_eq!(api_base("gitlab.com", "/api/v4"), "https://gitlab.com/api/v4");
        assert_eq!(
            api_base("https://git.example.com/", "/api/v1"),
            "https://git.example.com/api/v1"
        );
        assert_eq!(
            api_base("http://localhost:3000/api/v1", "/api/v1"),
            "http://localhost:3000/api/v1"
        );
        assert_eq!(api_base("https://api.github.com", ""), "https://api.github.com");
    }
}

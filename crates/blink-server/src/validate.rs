//! Input shape checks for snippet codes, snippet bodies, link slugs and URLs.

use crate::error::BlinkError;

/// Maximum snippet length, in characters.
pub const MAX_CONTENT_CHARS: usize = 50_000;
pub const MIN_SLUG_LEN: usize = 3;
pub const MAX_SLUG_LEN: usize = 20;
pub const MAX_URL_LEN: usize = 2048;
pub const MAX_EXPIRY_DAYS: u32 = 365;

/// Slugs that would shadow fixed routes.
const RESERVED_SLUGS: &[&str] = &["api", "admin", "health", "static"];

pub fn validate_content(content: &str) -> Result<(), BlinkError> {
    if content.trim().is_empty() {
        return Err(BlinkError::Validation("content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(BlinkError::Validation(format!(
            "content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_max_views(max_views: Option<u32>) -> Result<(), BlinkError> {
    match max_views {
        Some(0) => Err(BlinkError::Validation(
            "maxViews must be a positive integer".into(),
        )),
        _ => Ok(()),
    }
}

pub fn validate_code(code: &str) -> Result<(), BlinkError> {
    if code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(BlinkError::Validation("code must be 4 digits".into()))
    }
}

pub fn validate_slug(slug: &str) -> Result<(), BlinkError> {
    if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&slug.len()) {
        return Err(BlinkError::Validation(format!(
            "slug must be {MIN_SLUG_LEN} to {MAX_SLUG_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BlinkError::Validation(
            "slug may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    if RESERVED_SLUGS.iter().any(|r| r.eq_ignore_ascii_case(slug)) {
        return Err(BlinkError::Validation(format!("slug '{slug}' is reserved")));
    }
    Ok(())
}

pub fn validate_expiry_days(days: Option<u32>) -> Result<(), BlinkError> {
    match days {
        Some(d) if d == 0 || d > MAX_EXPIRY_DAYS => Err(BlinkError::Validation(format!(
            "expiryDays must be between 1 and {MAX_EXPIRY_DAYS}"
        ))),
        _ => Ok(()),
    }
}

/// Trim the URL, prepend `https://` when no scheme is given, and check that
/// the result looks like an absolute web URL.
pub fn normalize_url(raw: &str) -> Result<String, BlinkError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BlinkError::Validation("originalUrl must not be empty".into()));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(BlinkError::Validation(
            "originalUrl must not contain whitespace".into(),
        ));
    }

    let url = if has_leading_scheme(trimmed) {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    if url.len() > MAX_URL_LEN {
        return Err(BlinkError::Validation("originalUrl is too long".into()));
    }

    let uri: http::Uri = url
        .parse()
        .map_err(|_| BlinkError::Validation("originalUrl is not a valid URL".into()))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(BlinkError::Validation(
                "originalUrl must use http:// or https://".into(),
            ))
        }
    }

    let host = uri
        .host()
        .ok_or_else(|| BlinkError::Validation("originalUrl is missing a host".into()))?;
    let bare = host.trim_matches(|c| c == '[' || c == ']');
    let looks_routable = bare.eq_ignore_ascii_case("localhost")
        || bare.parse::<std::net::IpAddr>().is_ok()
        || (bare.contains('.') && !bare.starts_with('.') && !bare.ends_with('.'));
    if !looks_routable {
        return Err(BlinkError::Validation(
            "originalUrl host must be a domain name".into(),
        ));
    }

    Ok(url)
}

/// True when `s` opens with an RFC 3986 scheme followed by `://`. A `://`
/// later in the path or query does not count.
fn has_leading_scheme(s: &str) -> bool {
    let Some((scheme, _)) = s.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

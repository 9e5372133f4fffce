//! Common validation utilities shared across modules

/// Check if a string is empty or only whitespace
pub fn is_empty_or_whitespace(s: &str) -> bool {
    s.trim().is_empty()
}

/// Validate that a hostname/domain doesn't contain invalid characters
pub fn validate_hostname_chars(hostname: &str) -> bool {
    !hostname.is_empty()
        && hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
}

/// Validate a domain that is about to become a directory and file name in the certificate cache.
pub fn validate_certificate_domain(domain: &str) -> Result<(), String> {
    if !validate_hostname_chars(domain) {
        return Err(format!("'{}' contains characters that are not allowed in a hostname", domain));
    }
    if domain.len() > 253 {
        return Err("Domain is longer than 253 characters".to_string());
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("'{}' has an empty or over-long label", domain));
        }
    }
    Ok(())
}

/// The port the other scheme uses by default, when `port` is it.
pub fn colliding_default_port(scheme: &str, port: u16) -> Option<&'static str> {
    match (scheme, port) {
        ("http", 443) => Some("https"),
        ("https", 80) => Some("http"),
        _ => None,
    }
}

//! Argument range and naming checks applied by handlers before any cluster call.

use crate::types::{Error, Result};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::invalid_argument(field, "cannot be empty"));
    }
    Ok(())
}

/// Validate a DNS-1123 subdomain (object names: pods, deployments, nodes).
pub fn validate_resource_name(s: &str, field: &str) -> Result<()> {
    validate_non_empty(s, field)?;
    if s.len() > MAX_NAME_LEN {
        return Err(Error::invalid_argument(
            field,
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    for label in s.split('.') {
        check_dns_label(label, field)?;
    }
    Ok(())
}

/// Validate a DNS-1123 label (namespaces, services).
pub fn validate_dns_label(s: &str, field: &str) -> Result<()> {
    validate_non_empty(s, field)?;
    if s.len() > MAX_LABEL_LEN {
        return Err(Error::invalid_argument(
            field,
            format!("must be at most {} characters", MAX_LABEL_LEN),
        ));
    }
    check_dns_label(s, field)
}

fn check_dns_label(label: &str, field: &str) -> Result<()> {
    let valid_chars = label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = label
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && label
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric());
    if !valid_chars || !valid_edges {
        return Err(Error::invalid_argument(
            field,
            format!(
                "'{}' must consist of lower case alphanumeric characters or '-', \
                 and must start and end with an alphanumeric character",
                label
            ),
        ));
    }
    Ok(())
}

/// Validate that a count is not negative and fits an i32.
pub fn validate_non_negative(n: i64, field: &str) -> Result<i32> {
    if n < 0 {
        return Err(Error::invalid_argument(field, "must not be negative"));
    }
    i32::try_from(n).map_err(|_| Error::invalid_argument(field, "is too large"))
}

/// Validate a TCP/UDP port number.
pub fn validate_port(n: i64, field: &str) -> Result<i32> {
    if !(1..=65535).contains(&n) {
        return Err(Error::invalid_argument(field, "must be between 1 and 65535"));
    }
    Ok(n as i32)
}

/// Validate a NodePort in the default service node port range.
pub fn validate_node_port(n: i64, field: &str) -> Result<i32> {
    if !(30000..=32767).contains(&n) {
        return Err(Error::invalid_argument(field, "must be between 30000 and 32767"));
    }
    Ok(n as i32)
}

/// Schedule macros accepted by the CronJob controller.
const CRON_MACROS: &[&str] = &[
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@midnight",
    "@hourly",
];

/// Validate the shape of a cron schedule: five fields or a macro.
///
/// Field contents are left to the API server.
pub fn validate_cron_schedule(s: &str, field: &str) -> Result<()> {
    validate_non_empty(s, field)?;
    let s = s.trim();
    if s.starts_with('@') {
        if CRON_MACROS.contains(&s) {
            return Ok(());
        }
        return Err(Error::invalid_argument(
            field,
            format!("unknown schedule macro '{}'", s),
        ));
    }
    let fields = s.split_whitespace().count();
    if fields != 5 {
        return Err(Error::invalid_argument(
            field,
            format!("expected 5 fields (minute hour day month weekday), got {}", fields),
        ));
    }
    Ok(())
}

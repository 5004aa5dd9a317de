//! Resource tagging
//!
//! Every provisioned resource carries the same tag set so leaked resources
//! stay attributable and reapable. Several cloud label systems only accept
//! lowercase alphanumerics and underscores, so keys and values are
//! sanitized before use.

use crate::context::RunContext;
use chrono::Utc;
use std::collections::BTreeMap;

/// Timestamp format accepted by the most restrictive label systems.
const TAG_TIME_FORMAT: &str = "%Y%m%dt%H%M%Sz";

/// Maximum label key/value length.
const MAX_LABEL_LENGTH: usize = 63;

/// Sanitizes a tag key or value for the most restrictive label system:
/// lowercased, any character other than an ASCII alphanumeric or `_`
/// replaced with `_`, capped at 63 characters.
pub fn sanitize_label(raw: &str) -> String {
    let mut result: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    result.truncate(MAX_LABEL_LENGTH);
    result
}

/// Builds the tag map applied to every resource of a run.
///
/// `timeout_minutes` overrides the context flag when given; the resulting
/// `timeout_utc` tag lets an external reaper delete resources whose run
/// outlived its budget.
pub fn resource_tags(
    ctx: &RunContext,
    benchmark_name: &str,
    benchmark_uid: &str,
    run_uuid: &str,
    timeout_minutes: Option<u32>,
) -> BTreeMap<String, String> {
    let now = Utc::now();
    let timeout_minutes = timeout_minutes.unwrap_or(ctx.flags().timeout_minutes);
    let timeout = now + chrono::Duration::minutes(i64::from(timeout_minutes));

    let mut tags = BTreeMap::from([
        ("timeout_utc".to_string(), timeout.format(TAG_TIME_FORMAT).to_string()),
        ("create_time_utc".to_string(), now.format(TAG_TIME_FORMAT).to_string()),
        ("benchmark".to_string(), benchmark_name.to_string()),
        ("benchflow_uuid".to_string(), run_uuid.to_string()),
        ("owner".to_string(), ctx.owner().to_string()),
        ("benchmark_uid".to_string(), benchmark_uid.to_string()),
    ]);

    for (key, value) in ctx.metadata() {
        tags.insert(sanitize_label(key), sanitize_label(value));
    }

    tags
}

//! Removal of fields the target manages itself.

use crate::record::Record;
use crate::schema::{has_read_only_suffix, is_system_field};

/// Date-like standard fields that match the system timestamp pattern but hold
/// business data and must be kept.
pub const BUSINESS_DATE_FIELDS: &[&str] = &[
    "LastServiceDate",
    "LastRenewalDate",
    "LastPaymentDate",
    "LastInspectionDate",
];

const TIMESTAMP_PREFIXES: &[&str] = &["Created", "LastModified", "LastViewed", "LastReferenced", "System", "Last"];
const TIMESTAMP_SUFFIXES: &[&str] = &["Date", "DateTime", "Modstamp", "Stamp"];

/// Whether a field name looks like a platform-maintained timestamp.
///
/// Custom fields (anything containing `__`) never match.
pub fn is_system_timestamp(name: &str) -> bool {
    if name.contains("__") || BUSINESS_DATE_FIELDS.contains(&name) {
        return false;
    }
    TIMESTAMP_PREFIXES.iter().any(|p| name.starts_with(p))
        && TIMESTAMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Whether a key must be stripped before writing.
pub fn is_excluded(name: &str) -> bool {
    is_system_field(name) || has_read_only_suffix(name) || is_system_timestamp(name)
}

/// Return a copy of `record` without system-managed and read-only fields.
///
/// Never fails and never drops a whole record.
pub fn sanitize(record: &Record) -> Record {
    record.filtered(|name, _| !is_excluded(name))
}

//! External reference sanitizer.
//!
//! Columns that point at resources owned by third-party systems (payment
//! provider products and prices, API keys, custom domains) must never be
//! carried into a clone: the clone would otherwise act on the source
//! organization's real-world resources.

use serde_json::Value as JsonValue;

use tenantclone_core::{CloneableEntityType, Row};

/// Null every declared external-reference column present in `row`.
///
/// Returns how many non-null values were cleared.
pub fn sanitize_external_references(entity: &CloneableEntityType, row: &mut Row) -> usize {
    let mut cleared = 0;
    for column in &entity.external_references {
        if let Some(value) = row.get_mut(column) {
            if !value.is_null() {
                cleared += 1;
            }
            *value = JsonValue::Null;
        }
    }
    cleared
}

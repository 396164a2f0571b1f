use tracing::warn;

use crate::codec::decode;
use crate::error::Result;
use crate::query::ResultGrid;
use crate::types::SummaryRecord;

/// Map the aggregate query's header + data row onto a `SummaryRecord`.
///
/// Mapping is positional. Null and missing cells become empty strings.
pub fn extract_summary(grid: &ResultGrid) -> Result<SummaryRecord> {
    let row = decode(grid)?;

    let header_matches = row.header.len() == SummaryRecord::FIELDS.len()
        && row.header.iter().zip(SummaryRecord::FIELDS).all(|(h, f)| h == f);
    if !header_matches {
        warn!(header = ?row.header, "summary header differs from expected columns, mapping by position");
    }

    Ok(SummaryRecord {
        total_in_earth_orbit: row.value(0),
        under_5_lunar_close: row.value(1),
        dangerous_count: row.value(2),
        total_out_earth_orbit: row.value(3),
        avg_size_earth_orbit_km: row.value(4),
        biggest_earth_object_name: row.value(5),
        biggest_earth_object_diameter_km: row.value(6),
        smallest_earth_object_name: row.value(7),
        smallest_earth_object_diameter_km: row.value(8),
    })
}

use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::types::{DateRange, FlatRow, NeoObject, RawFeedPayload};

/// Flatten a day-keyed feed payload into one row per object.
///
/// Days are visited in document order, objects in array order. Only the first
/// close approach of each object is kept. `range` names the window the payload
/// was fetched for; rows are not filtered by it.
pub fn flatten(payload: &RawFeedPayload, range: &DateRange) -> Result<Vec<FlatRow>> {
    let mut rows = Vec::with_capacity(payload.object_count());

    for (date, objects) in &payload.days {
        debug!(date = %date, objects = objects.len(), "flattening day");
        for neo in objects {
            rows.push(flatten_object(neo)?);
        }
    }

    info!(rows = rows.len(), range = %range, "Total rows: {}", rows.len());

    if rows.is_empty() {
        return Err(AppError::EmptyResult {
            start_date: range.start_str(),
            end_date: range.end_str(),
        });
    }

    Ok(rows)
}

fn flatten_object(neo: &NeoObject) -> Result<FlatRow> {
    let ca = neo.close_approach_data.first().ok_or_else(|| {
        AppError::MalformedPayload(format!("object {} has no close approach data", neo.id))
    })?;
    let diameter_km = &neo.estimated_diameter.kilometers;

    Ok(FlatRow {
        approach_date: ca.close_approach_date.clone(),
        epoch_date_close_approach: ca.epoch_date_close_approach,

        neo_id: neo.id.clone(),
        neo_reference_id: neo.neo_reference_id.clone(),
        name: neo.name.clone(),
        nasa_jpl_url: neo.nasa_jpl_url.clone(),

        absolute_magnitude_h: neo.absolute_magnitude_h,
        estimated_diameter_min_km: diameter_km.estimated_diameter_min,
        estimated_diameter_max_km: diameter_km.estimated_diameter_max,

        is_potentially_hazardous_asteroid: neo.is_potentially_hazardous_asteroid,
        is_sentry_object: neo.is_sentry_object,

        relative_velocity_km_s: ca.relative_velocity.kilometers_per_second.clone(),
        relative_velocity_km_h: ca.relative_velocity.kilometers_per_hour.clone(),

        miss_distance_km: ca.miss_distance.kilometers.clone(),
        miss_distance_lunar: ca.miss_distance.lunar.clone(),

        orbiting_body: ca.orbiting_body.clone(),
    })
}

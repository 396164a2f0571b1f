//! Statements issued against the query engine.

use chrono::NaiveDate;

use crate::config::{keys, SummaryStrategy, RAW_TABLE};

/// Column types of the raw table, in CSV column order.
pub const RAW_TABLE_COLUMNS: [(&str, &str); 16] = [
    ("approach_date", "string"),
    ("epoch_date_close_approach", "bigint"),
    ("neo_id", "string"),
    ("neo_reference_id", "string"),
    ("name", "string"),
    ("nasa_jpl_url", "string"),
    ("absolute_magnitude_h", "double"),
    ("estimated_diameter_min_km", "double"),
    ("estimated_diameter_max_km", "double"),
    ("is_potentially_hazardous_asteroid", "boolean"),
    ("is_sentry_object", "boolean"),
    ("relative_velocity_km_s", "double"),
    ("relative_velocity_km_h", "double"),
    ("miss_distance_km", "double"),
    ("miss_distance_lunar", "double"),
    ("orbiting_body", "string"),
];

/// Storage location of one date partition of raw data.
pub fn partition_location(bucket: &str, partition_date: NaiveDate) -> String {
    format!("s3://{bucket}/{}/{}/", keys::RAW_PREFIX, partition_date.format("%Y-%m-%d"))
}

/// `CREATE EXTERNAL TABLE IF NOT EXISTS` over one partition's CSV files.
pub fn create_table_sql(database: &str, bucket: &str, partition_date: NaiveDate) -> String {
    let columns = RAW_TABLE_COLUMNS
        .iter()
        .map(|(name, ty)| format!("  {name} {ty}"))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"CREATE EXTERNAL TABLE IF NOT EXISTS {database}.{RAW_TABLE} (
{columns}
)
ROW FORMAT SERDE 'org.apache.hadoop.hive.serde2.OpenCSVSerde'
WITH SERDEPROPERTIES (
  "separatorChar" = ",",
  "quoteChar" = "\""
)
LOCATION '{location}'
TBLPROPERTIES ("skip.header.line.count"="1")"#,
        location = partition_location(bucket, partition_date),
    )
}

/// Weekly aggregate over the raw table. Selects the nine summary columns in
/// `SummaryRecord` order.
pub fn summary_sql(strategy: SummaryStrategy, reference_date: NaiveDate) -> String {
    let (source_cte, source) = match strategy {
        SummaryStrategy::RollingWindow => (
            format!(
                "filtered AS (
  SELECT *
  FROM {RAW_TABLE}
  WHERE CAST(approach_date AS date)
        BETWEEN date_add('day', -6, date '{date}')
            AND date '{date}'
),
",
                date = reference_date.format("%Y-%m-%d"),
            ),
            "filtered",
        ),
        SummaryStrategy::RegisterPartition => (String::new(), RAW_TABLE),
    };

    format!(
        "WITH {source_cte}stats AS (
  SELECT
    COUNT_IF(orbiting_body = 'Earth') AS total_in_earth_orbit,
    COUNT_IF(orbiting_body = 'Earth' AND miss_distance_lunar < 5) AS under_5_lunar_close,
    COUNT_IF(is_potentially_hazardous_asteroid = true) AS dangerous_count,
    COUNT_IF(orbiting_body <> 'Earth') AS total_out_earth_orbit,
    AVG(
      CASE
        WHEN orbiting_body = 'Earth'
          THEN (estimated_diameter_min_km + estimated_diameter_max_km) / 2
        ELSE NULL
      END
    ) AS avg_size_earth_orbit_km
  FROM {source}
),
biggest AS (
  SELECT
    name AS biggest_earth_object_name,
    estimated_diameter_max_km AS biggest_earth_object_diameter_km
  FROM {source}
  WHERE orbiting_body = 'Earth'
  ORDER BY estimated_diameter_max_km DESC
  LIMIT 1
),
smallest AS (
  SELECT
    name AS smallest_earth_object_name,
    estimated_diameter_max_km AS smallest_earth_object_diameter_km
  FROM {source}
  WHERE orbiting_body = 'Earth'
  ORDER BY estimated_diameter_max_km ASC
  LIMIT 1
)
SELECT
  stats.total_in_earth_orbit,
  stats.under_5_lunar_close,
  stats.dangerous_count,
  stats.total_out_earth_orbit,
  stats.avg_size_earth_orbit_km,
  biggest.biggest_earth_object_name,
  biggest.biggest_earth_object_diameter_km,
  smallest.smallest_earth_object_name,
  smallest.smallest_earth_object_diameter_km
FROM stats
CROSS JOIN biggest
CROSS JOIN smallest"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlatRow, SummaryRecord};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()
    }

    #[test]
    fn table_columns_match_flat_row_order() {
        let names: Vec<&str> = RAW_TABLE_COLUMNS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, FlatRow::FIELDS.to_vec());
    }

    #[test]
    fn create_table_points_at_partition() {
        let sql = create_table_sql("neo_db", "neo-bucket", date());
        assert!(sql.starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS neo_db.neo_raw_data ("));
        assert!(sql.contains("LOCATION 's3://neo-bucket/neo/2024-01-07/'"));
        assert!(sql.contains("  epoch_date_close_approach bigint,\n"));
        assert!(sql.contains("  orbiting_body string\n)"));
        assert!(sql.contains(r#""skip.header.line.count"="1""#));
    }

    #[test]
    fn rolling_window_filters_in_sql() {
        let sql = summary_sql(SummaryStrategy::RollingWindow, date());
        assert!(sql.contains("BETWEEN date_add('day', -6, date '2024-01-07')"));
        assert!(sql.contains("FROM filtered\n"));
    }

    #[test]
    fn partition_strategy_queries_table_directly() {
        let sql = summary_sql(SummaryStrategy::RegisterPartition, date());
        assert!(sql.starts_with("WITH stats AS ("));
        assert!(!sql.contains("filtered"));
        assert!(sql.contains("FROM neo_raw_data\n"));
    }

    #[test]
    fn summary_selects_record_columns_in_order() {
        let sql = summary_sql(SummaryStrategy::RollingWindow, date());
        let select = sql.rsplit("SELECT\n").next().unwrap();
        let mut last = 0;
        for field in SummaryRecord::FIELDS {
            let pos = select.find(&format!(".{field}")).unwrap();
            assert!(pos >= last, "{field} out of order");
            last = pos;
        }
    }
}

/// Table holding one row per outlet.
pub const OUTLET_TABLE: &str = "subway";

/// DDL for the outlet table, matching the scraper's output columns.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS subway (
    outlet_name VARCHAR(60),
    address VARCHAR(100),
    opening_hours VARCHAR(60),
    waze_link VARCHAR(200),
    gmaps_link VARCHAR(200),
    latitude REAL,
    longitude REAL
);
";

/// Column list used for whole-record reads, in schema order.
pub const OUTLET_COLUMNS: &str =
    "outlet_name, address, opening_hours, waze_link, gmaps_link, latitude, longitude";

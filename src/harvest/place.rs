//! The harvested place entity and its parsing rules.
//!
//! Coordinates are kept as the exact decimal text the endpoint returned.
//! They are never parsed-and-reformatted on the harvest path, so point WKT
//! output round-trips byte for byte.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;
use crate::sparql::Binding;

/// Sentinel coordinate value marking a missing measurement at the source.
pub const NOT_A_NUMBER: &str = "NAN";

/// Matches a `POINT(<lon> <lat>)` fragment inside a WKT cell.
static POINT_WKT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"POINT\(\s*(-?[0-9][0-9.eE+-]*)\s+(-?[0-9][0-9.eE+-]*)\s*\)")
        .expect("point pattern is valid")
});

/// One harvested geocoded entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    /// Display label.
    pub name: String,
    /// Latitude as exact decimal text.
    pub latitude: String,
    /// Longitude as exact decimal text.
    pub longitude: String,
    /// Group key: a country resource identifier or label. May be empty.
    pub country: String,
    /// Source page URL, when the query selected one. May be empty.
    pub url: String,
    /// Optional free text. May be empty.
    pub abstract_text: String,
}

impl Place {
    /// Builds a place from one result binding.
    ///
    /// Returns `None` (to be counted as skipped, never propagated) when the
    /// title or either coordinate is missing, or a coordinate equals the
    /// not-a-number sentinel. `country_label` supplies the group key for
    /// compact queries that carry no `country` column.
    pub fn from_binding(binding: &Binding, country_label: Option<&str>) -> Option<Self> {
        let name = binding.value("title")?;
        let latitude = binding.value("geolat")?;
        let longitude = binding.value("geolong")?;
        if latitude == NOT_A_NUMBER || longitude == NOT_A_NUMBER {
            return None;
        }

        let country = binding
            .value("country")
            .or(country_label)
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            country: country.to_string(),
            url: binding.value("wikiurl").unwrap_or_default().to_string(),
            abstract_text: binding.value("abstract").unwrap_or_default().to_string(),
        })
    }

    /// Point WKT built from the verbatim decimal text, `POINT(<lon> <lat>)`.
    pub fn wkt_point(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }
}

/// Explicit accumulator for harvested places.
///
/// Owned by the harvest loop and handed on (by reference for tallying, by
/// slice for geometry) once the fetch completes.
#[derive(Debug, Default)]
pub struct PlaceSet {
    places: Vec<Place>,
}

impl PlaceSet {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one place.
    pub fn push(&mut self, place: Place) {
        self.places.push(place);
    }

    /// Number of accumulated places.
    pub fn len(&self) -> usize {
        self.places.len()
    }

    /// True when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// The accumulated places in arrival order.
    pub fn places(&self) -> &[Place] {
        &self.places
    }
}

/// Reads places back from a harvested or partitioned CSV file.
///
/// Coordinates are recovered from the `WKT` column's `POINT(lon lat)` text;
/// rows without a parseable point are counted as skipped. Returns the
/// places in file order together with the skipped-row count.
///
/// # Errors
///
/// Returns `AppError::IoSetup` if the file cannot be opened and
/// `AppError::CsvSplit` if it has no usable header.
pub fn read_places_csv(path: &Path) -> Result<(Vec<Place>, u64), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::IoSetup(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| AppError::CsvSplit(format!("Failed to read CSV headers: {}", e)))?
        .clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    };
    let name_idx = find("name")
        .ok_or_else(|| AppError::CsvSplit("CSV file has no 'name' column".to_string()))?;
    let wkt_idx = find("wkt")
        .ok_or_else(|| AppError::CsvSplit("CSV file has no 'WKT' column".to_string()))?;
    let country_idx = find("country");
    let url_idx = find("url");

    let mut places = Vec::new();
    let mut skipped: u64 = 0;

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let wkt = record.get(wkt_idx).unwrap_or_default();
        let Some(caps) = POINT_WKT.captures(wkt) else {
            skipped += 1;
            continue;
        };

        places.push(Place {
            name: record.get(name_idx).unwrap_or_default().to_string(),
            longitude: caps[1].to_string(),
            latitude: caps[2].to_string(),
            country: country_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string(),
            url: url_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string(),
            abstract_text: String::new(),
        });
    }

    Ok((places, skipped))
}

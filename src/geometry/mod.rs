//! Boundary geometry derivation for a set of harvested points.
//!
//! The convex hull is computed in-process; the concave (alpha-shape)
//! outline is delegated to an external geometry engine fed through a
//! scratch file. `orchestrate` ties both together with the run report.

pub mod alpha;
pub mod hull;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::AppError;
use crate::harvest::place::{Place, PlaceSet};
use crate::progress::{ProgressObserver, ProgressUpdate};
use crate::report::RunReport;
use crate::split::{slugify, DEFAULT_RESOURCE_PREFIX};

pub use alpha::{write_scratch, AlphaShapeResult, AlphaShaper};
pub use hull::convex_hull_wkt;

/// Derives geometry for a point set and folds the results into the report.
///
/// Per-country tallies are recorded first, then the scratch file is
/// written, the external engine runs at the caller's alpha (and once more
/// for its optimal alpha), and the hull is computed in-process. An engine
/// failure is recoverable and leaves a diagnostic in the report; only a
/// scratch-file I/O failure aborts.
///
/// # Errors
///
/// Returns `AppError::Scratch` if the scratch file cannot be written.
pub async fn orchestrate(
    places: &PlaceSet,
    alpha: f64,
    shaper: &AlphaShaper,
    report: &mut RunReport,
) -> Result<(), AppError> {
    report.record_group_counts(places.places());

    let scratch = write_scratch(places.places())?;
    let shape = shaper.compute(scratch.path(), alpha).await;

    report.set_alphas(shape.alpha, shape.optimal_alpha);
    report.set_wkt_alpha_shape(shape.wkt);
    report.set_wkt_convex_hull(convex_hull_wkt(places.places()));
    Ok(())
}

/// Batch alpha shaping: one output file per country per alpha.
///
/// Places are grouped by their country key in first-seen order; each group
/// gets its own scratch file and one `alphaShape_<country>_<alpha>.csv`
/// (`id;wkt`, one polygon line per row) per requested alpha. The country
/// component keeps outputs from different partitions distinct inside a
/// shared directory. Groups without a country key land in `unknown`.
///
/// # Errors
///
/// Returns `AppError::IoSetup` if the output directory or a result file
/// cannot be written and `AppError::Scratch` on scratch-file failure.
/// Engine failures are recoverable; the affected file carries the
/// diagnostic placeholder line.
pub async fn batch_shapes(
    places: &[Place],
    alphas: &[f64],
    shaper: &AlphaShaper,
    out_dir: &Path,
    observer: &dyn ProgressObserver,
) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(out_dir).map_err(|e| {
        AppError::IoSetup(format!(
            "Failed to create output directory {}: {}",
            out_dir.display(),
            e
        ))
    })?;

    let mut groups: IndexMap<String, Vec<Place>> = IndexMap::new();
    for place in places {
        let slug = slugify(&place.country, DEFAULT_RESOURCE_PREFIX);
        let slug = if slug.is_empty() {
            "unknown".to_string()
        } else {
            slug
        };
        groups.entry(slug).or_default().push(place.clone());
    }

    let mut files = Vec::new();
    for (slug, group) in &groups {
        let scratch = write_scratch(group)?;

        for alpha in alphas {
            observer.update(ProgressUpdate::message(format!(
                "Shaping {} {}",
                slug, alpha
            )));
            let shape = shaper.compute(scratch.path(), *alpha).await;

            let path = out_dir.join(format!("alphaShape_{}_{}.csv", slug, alpha));
            let mut content = String::from("id;wkt\n");
            for (i, polygon) in shape.polygons().enumerate() {
                content.push_str(&format!("{};{}\n", i, polygon));
            }
            std::fs::write(&path, content).map_err(|e| {
                AppError::IoSetup(format!("Failed to write {}: {}", path.display(), e))
            })?;
            files.push(path);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::place::Place;
    use crate::progress::NullProgress;
    use std::path::PathBuf;

    fn place(name: &str, lon: &str, lat: &str, country: &str) -> Place {
        Place {
            name: name.to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            country: country.to_string(),
            url: String::new(),
            abstract_text: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_engine_still_produces_a_renderable_report() {
        let mut set = PlaceSet::new();
        set.push(place("A", "0", "0", "Spain"));
        set.push(place("B", "1", "0", "Spain"));
        set.push(place("C", "0", "1", "France"));

        let shaper = AlphaShaper::new(PathBuf::from("/nonexistent/alpha_shaper"));
        let mut report = RunReport::new();

        orchestrate(&set, 0.1, &shaper, &mut report).await.unwrap();

        let rendered = report.render();
        // Diagnostic placeholder instead of WKT, zeroed alphas, hull intact.
        assert!(rendered.contains("Error executing"));
        assert!(rendered.contains("Alpha: 0"));
        assert!(rendered.contains("POLYGON") || rendered.contains("LINESTRING"));
        assert!(rendered.contains("Spain"));
        assert!(rendered.contains("France"));
    }

    #[tokio::test]
    async fn report_renders_from_partially_accumulated_set() {
        // An interrupted harvest hands over whatever was accumulated; the
        // report must still carry the tallies and geometry of those rows.
        let mut set = PlaceSet::new();
        set.push(place("A", "0", "0", "Spain"));
        set.push(place("B", "1", "1", "Spain"));

        let shaper = AlphaShaper::new(PathBuf::from("/nonexistent/alpha_shaper"));
        let mut report = RunReport::new();
        report.set_retrieved(2);

        orchestrate(&set, 0.1, &shaper, &mut report).await.unwrap();

        let rendered = report.render();
        assert!(rendered.contains("Retrieved Points:\t2"));
        assert!(rendered.contains("Spain"));
        assert!(rendered.contains("LINESTRING"));
    }

    #[tokio::test]
    async fn batch_shapes_writes_one_file_per_country_per_alpha() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("shapes");

        let places = vec![
            place("A", "0", "0", "http://dbpedia.org/resource/Spain"),
            place("B", "1", "0", "http://dbpedia.org/resource/Spain"),
            place("C", "5", "5", "http://dbpedia.org/resource/France"),
        ];

        let shaper = AlphaShaper::new(PathBuf::from("/nonexistent/alpha_shaper"));
        let files = batch_shapes(&places, &[0.1, 0.5], &shaper, &out, &NullProgress)
            .await
            .unwrap();

        // Two countries at two alphas, country component in every name so
        // shaping several partitions into one directory never collides.
        assert_eq!(files.len(), 4);
        for name in [
            "alphaShape_Spain_0.1.csv",
            "alphaShape_Spain_0.5.csv",
            "alphaShape_France_0.1.csv",
            "alphaShape_France_0.5.csv",
        ] {
            let path = out.join(name);
            assert!(path.exists(), "missing {}", name);
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.starts_with("id;wkt\n"));
        }
    }

    #[tokio::test]
    async fn batch_shapes_groups_missing_country_as_unknown() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("shapes");

        let places = vec![place("A", "0", "0", ""), place("B", "1", "1", "")];
        let shaper = AlphaShaper::new(PathBuf::from("/nonexistent/alpha_shaper"));
        let files = batch_shapes(&places, &[0.1], &shaper, &out, &NullProgress)
            .await
            .unwrap();

        assert_eq!(files.len(), 1);
        assert!(out.join("alphaShape_unknown_0.1.csv").exists());
    }
}

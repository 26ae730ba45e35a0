//! Human-readable run report.
//!
//! The report is accumulated field by field as a run progresses and
//! rendered once at the end. Rendering is pure; persistence is best
//! effort and never fails the run that produced the data.

use std::path::Path;

use chrono::Local;
use indexmap::IndexMap;
use tracing::warn;

use crate::harvest::place::Place;

const BANNER_RULE: &str = "###########################################";

/// Accumulates the facts of one retrieval run and renders them as text.
#[derive(Debug, Clone)]
pub struct RunReport {
    query: String,
    points_file: String,
    live: bool,
    retrieved: u64,
    country_counts: IndexMap<String, u64>,
    alpha: f64,
    optimal_alpha: f64,
    wkt_alpha_shape: String,
    wkt_convex_hull: String,
    date: String,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            query: String::new(),
            points_file: String::new(),
            live: false,
            retrieved: 0,
            country_counts: IndexMap::new(),
            alpha: 0.0,
            optimal_alpha: 0.0,
            wkt_alpha_shape: String::new(),
            wkt_convex_hull: String::new(),
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_points_file(&mut self, path: impl Into<String>) {
        self.points_file = path.into();
    }

    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    /// Total rows received from the endpoint, including rows that failed
    /// coordinate extraction.
    pub fn set_retrieved(&mut self, retrieved: u64) {
        self.retrieved = retrieved;
    }

    /// Tallies the kept places per country, in first-seen order.
    pub fn record_group_counts(&mut self, places: &[Place]) {
        for place in places {
            *self
                .country_counts
                .entry(place.country.clone())
                .or_insert(0) += 1;
        }
        if self.retrieved == 0 {
            self.retrieved = places.len() as u64;
        }
    }

    pub fn set_alphas(&mut self, alpha: f64, optimal_alpha: f64) {
        self.alpha = alpha;
        self.optimal_alpha = optimal_alpha;
    }

    pub fn set_wkt_alpha_shape(&mut self, wkt: impl Into<String>) {
        self.wkt_alpha_shape = wkt.into();
    }

    pub fn set_wkt_convex_hull(&mut self, wkt: impl Into<String>) {
        self.wkt_convex_hull = wkt.into();
    }

    /// Renders the full report.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push(String::new());
        lines.push(BANNER_RULE.to_string());
        lines.push("# REPORT GENERATED BY vagueplaces".to_string());
        lines.push(format!("#  {:^40}", self.date));
        lines.push("#".to_string());
        lines.push(BANNER_RULE.to_string());
        lines.push(String::new());

        lines.extend(banner("DATASET"));
        if self.live {
            lines.push(format!("DBpedia Live {}", self.date));
        } else {
            lines.push("DBpedia Last release version".to_string());
        }
        lines.push(format!("QUERY: {}", self.query));
        lines.push(format!("Retrieved Points:\t{}", self.retrieved));
        lines.push(format!("Skipped Points:\t{}", self.skipped()));
        lines.push(format!("FILE:\t{}", self.points_file));
        lines.push(String::new());
        lines.push(format!("{:>30}{:>5}{:>5}", "country", "|", "total_points"));
        for (country, count) in &self.country_counts {
            lines.push(format!("{:>30}{:>5}{:>5}", country, "|", count));
        }

        lines.extend(banner("GEOMETRIES"));
        lines.push("---- Alpha Shape WKT ----".to_string());
        lines.push(self.wkt_alpha_shape.clone());
        lines.push(format!("Alpha: {}", self.alpha));
        lines.push(format!("Optimal Alpha: {}", self.optimal_alpha));
        lines.push(String::new());
        lines.push("---- Convex Hull Shape WKT ----".to_string());
        lines.push(self.wkt_convex_hull.clone());
        lines.push(String::new());

        lines.join("\n")
    }

    /// Writes the rendered report to `path`, returning whether it worked.
    ///
    /// A report is a convenience artefact; a write failure is logged and
    /// swallowed so the run that produced the data still succeeds.
    pub fn persist(&self, path: &Path) -> bool {
        match std::fs::write(path, self.render()) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write report");
                false
            }
        }
    }

    fn skipped(&self) -> u64 {
        let kept: u64 = self.country_counts.values().sum();
        self.retrieved.saturating_sub(kept)
    }
}

fn banner(text: &str) -> Vec<String> {
    vec![
        String::new(),
        BANNER_RULE.to_string(),
        "#".to_string(),
        format!("#{:^40}", text),
        "#".to_string(),
        BANNER_RULE.to_string(),
        String::new(),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str, country: &str) -> Place {
        Place {
            name: name.to_string(),
            latitude: "1".to_string(),
            longitude: "1".to_string(),
            country: country.to_string(),
            url: String::new(),
            abstract_text: String::new(),
        }
    }

    #[test]
    fn sections_appear_in_order() {
        let mut report = RunReport::new();
        report.set_query("?place rdf:type dbpedia-owl:Place");
        report.set_points_file("/tmp/out.csv");
        report.set_wkt_alpha_shape("POLYGON((0 0,1 0,1 1,0 0))");
        report.set_wkt_convex_hull("POLYGON((0 0,1 0,1 1,0 0))");

        let rendered = report.render();
        let title = rendered.find("REPORT GENERATED BY vagueplaces").unwrap();
        let dataset = rendered.find("DATASET").unwrap();
        let query = rendered.find("QUERY:").unwrap();
        let geometries = rendered.find("GEOMETRIES").unwrap();
        let ashape = rendered.find("---- Alpha Shape WKT ----").unwrap();
        let chull = rendered.find("---- Convex Hull Shape WKT ----").unwrap();

        assert!(title < dataset);
        assert!(dataset < query);
        assert!(query < geometries);
        assert!(geometries < ashape);
        assert!(ashape < chull);
    }

    #[test]
    fn skipped_is_retrieved_minus_kept() {
        let mut report = RunReport::new();
        report.set_retrieved(10);
        report.record_group_counts(&[
            place("A", "Spain"),
            place("B", "Spain"),
            place("C", "France"),
        ]);

        let rendered = report.render();
        assert!(rendered.contains("Retrieved Points:\t10"));
        assert!(rendered.contains("Skipped Points:\t7"));
    }

    #[test]
    fn retrieved_defaults_to_kept_count_when_unset() {
        let mut report = RunReport::new();
        report.record_group_counts(&[place("A", "Spain"), place("B", "France")]);

        let rendered = report.render();
        assert!(rendered.contains("Retrieved Points:\t2"));
        assert!(rendered.contains("Skipped Points:\t0"));
    }

    #[test]
    fn country_rows_keep_first_seen_order() {
        let mut report = RunReport::new();
        report.record_group_counts(&[
            place("A", "Spain"),
            place("B", "France"),
            place("C", "Spain"),
            place("D", "Andorra"),
        ]);

        let rendered = report.render();
        let spain = rendered.find("Spain").unwrap();
        let france = rendered.find("France").unwrap();
        let andorra = rendered.find("Andorra").unwrap();
        assert!(spain < france);
        assert!(france < andorra);
    }

    #[test]
    fn live_flag_switches_dataset_line() {
        let mut report = RunReport::new();
        assert!(report.render().contains("DBpedia Last release version"));
        report.set_live(true);
        assert!(report.render().contains("DBpedia Live "));
    }

    #[test]
    fn persist_writes_the_rendered_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let mut report = RunReport::new();
        report.set_query("q");

        assert!(report.persist(&path));
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, report.render());
    }

    #[test]
    fn persist_failure_returns_false() {
        let report = RunReport::new();
        assert!(!report.persist(Path::new("/nonexistent/dir/report.txt")));
    }
}

//! Parameterized SPARQL query construction.
//!
//! Query text is rendered from typed parts rather than spliced from raw
//! caller input: keyword literals are escaped before they reach a `regex()`
//! filter, and country URIs are validated before being placed inside
//! `<...>`. Offset and limit are appended per page window by the fetcher.

use crate::error::AppError;

/// Columns selected by the compact (per-country keyword) query.
pub const COMPACT_COLUMNS: [&str; 3] = ["title", "geolat", "geolong"];

/// Columns selected by the full-schema harvest query.
pub const FULL_COLUMNS: [&str; 5] = ["title", "geolat", "geolong", "country", "wikiurl"];

/// Which column set a [`PlaceQuery`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySchema {
    /// `title`, `geolat`, `geolong`, used with a country filter; the
    /// country label is supplied out of band.
    Compact,
    /// Adds `country` and `wikiurl` columns for the full harvest output.
    Full,
}

/// A parametrized place query: schema plus optional country and keyword
/// filters. `render` substitutes the paging window.
#[derive(Debug, Clone)]
pub struct PlaceQuery {
    schema: QuerySchema,
    country_uri: Option<String>,
    keywords: Vec<String>,
}

impl PlaceQuery {
    /// Full-schema query over all geocoded places.
    pub fn all_places() -> Self {
        Self {
            schema: QuerySchema::Full,
            country_uri: None,
            keywords: Vec::new(),
        }
    }

    /// Compact query restricted to places in the given country.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidQuery` if `uri` is not an absolute HTTP IRI
    /// or contains characters that would break out of the `<...>` form.
    pub fn for_country(uri: &str) -> Result<Self, AppError> {
        validate_iri(uri)?;
        Ok(Self {
            schema: QuerySchema::Compact,
            country_uri: Some(uri.to_string()),
            keywords: Vec::new(),
        })
    }

    /// Adds a keyword-disjunction filter over the abstract text.
    ///
    /// Keywords are matched case-insensitively; an empty list leaves the
    /// query unfiltered.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Renders the query text for one paging window.
    pub fn render(&self, offset: u64, limit: u64) -> String {
        let mut lines: Vec<String> = Vec::new();

        match self.schema {
            QuerySchema::Compact => {
                lines.push("SELECT DISTINCT ?title ?geolat ?geolong".to_string());
                lines.push("WHERE {".to_string());
                lines.push("  ?place rdf:type dbpedia-owl:Place .".to_string());
                if let Some(uri) = &self.country_uri {
                    lines.push(format!("  ?place dbpedia-owl:country <{}> .", uri));
                }
                lines.push("  ?place foaf:name ?title .".to_string());
                lines.push("  ?place geo:lat ?geolat .".to_string());
                lines.push("  ?place geo:long ?geolong .".to_string());
                if !self.keywords.is_empty() {
                    lines.push("  ?place dbpedia-owl:abstract ?abstract .".to_string());
                    lines.push(format!("  FILTER ({})", self.keyword_filter()));
                }
                lines.push("}".to_string());
            }
            QuerySchema::Full => {
                lines.push("SELECT ?title ?geolat ?geolong ?country ?wikiurl".to_string());
                lines.push("WHERE {".to_string());
                lines.push("  ?place rdf:type dbo:Place .".to_string());
                lines.push("  ?place foaf:name ?title .".to_string());
                lines.push("  ?place geo:lat ?geolat .".to_string());
                lines.push("  ?place geo:long ?geolong .".to_string());
                lines.push("  ?place prov:wasDerivedFrom ?wikiurl .".to_string());
                lines.push("  ?place dbo:country ?country .".to_string());
                lines.push("}".to_string());
            }
        }

        lines.push(format!("OFFSET {}", offset));
        lines.push(format!("LIMIT {}", limit));
        lines.join("\n")
    }

    /// Renders the `regex(...) || regex(...)` disjunction over keywords.
    fn keyword_filter(&self) -> String {
        self.keywords
            .iter()
            .map(|kw| format!("regex(?abstract, \"{}\", \"i\")", escape_literal(kw)))
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

/// Query returning European country URIs (column `place`).
pub fn european_countries_query() -> String {
    [
        "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>",
        "PREFIX yago: <http://dbpedia.org/class/yago/>",
        "PREFIX dbpedia-owl: <http://dbpedia.org/ontology/>",
        "",
        "SELECT DISTINCT ?place WHERE {",
        "  ?place rdf:type yago:EuropeanCountries .",
        "  ?place rdf:type dbpedia-owl:Country",
        "}",
    ]
    .join("\n")
}

/// Query counting all geocoded places (column `count`). Used to seed the
/// progress total before a full harvest.
pub fn place_count_query() -> String {
    [
        "SELECT (COUNT(*) AS ?count)",
        "WHERE {",
        "  ?place rdf:type dbo:Place .",
        "  ?place foaf:name ?title .",
        "  ?place geo:lat ?geolat .",
        "  ?place geo:long ?geolong .",
        "}",
    ]
    .join("\n")
}

/// Escapes a string for inclusion inside a double-quoted SPARQL literal.
pub(crate) fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Validates that a string is safe to embed as `<IRI>` in query text.
pub(crate) fn validate_iri(s: &str) -> Result<(), AppError> {
    let valid_scheme = s.starts_with("http://") || s.starts_with("https://");
    if !valid_scheme {
        return Err(AppError::InvalidQuery(format!(
            "Country URI must be an absolute HTTP IRI: {}",
            s
        )));
    }
    if s.chars()
        .any(|c| c == '<' || c == '>' || c.is_whitespace() || c.is_control())
    {
        return Err(AppError::InvalidQuery(format!(
            "Country URI contains characters not allowed in an IRI: {}",
            s
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_query_embeds_country_and_window() {
        let q = PlaceQuery::for_country("http://dbpedia.org/resource/Spain")
            .unwrap()
            .render(1000, 500);
        assert!(q.contains("?place dbpedia-owl:country <http://dbpedia.org/resource/Spain> ."));
        assert!(q.ends_with("OFFSET 1000\nLIMIT 500"));
        // No keyword filter requested, so no abstract triple.
        assert!(!q.contains("?abstract"));
    }

    #[test]
    fn keyword_disjunction_is_joined_with_or() {
        let q = PlaceQuery::for_country("http://dbpedia.org/resource/Spain")
            .unwrap()
            .with_keywords(["costa", "brava"])
            .render(0, 10);
        assert!(q.contains("regex(?abstract, \"costa\", \"i\") || regex(?abstract, \"brava\", \"i\")"));
        assert!(q.contains("?place dbpedia-owl:abstract ?abstract ."));
    }

    #[test]
    fn keyword_literals_are_escaped() {
        let q = PlaceQuery::for_country("http://dbpedia.org/resource/Spain")
            .unwrap()
            .with_keywords(["co\"st\\a"])
            .render(0, 10);
        assert!(q.contains(r#"regex(?abstract, "co\"st\\a", "i")"#));
    }

    #[test]
    fn invalid_country_uris_are_rejected() {
        assert!(PlaceQuery::for_country("Spain").is_err());
        assert!(PlaceQuery::for_country("http://x.org/a> . ?s ?p ?o").is_err());
        assert!(PlaceQuery::for_country("http://x.org/a b").is_err());
        assert!(PlaceQuery::for_country("ftp://x.org/a").is_err());
    }

    #[test]
    fn full_query_selects_country_and_url_columns() {
        let q = PlaceQuery::all_places().render(0, 20_000);
        assert!(q.starts_with("SELECT ?title ?geolat ?geolong ?country ?wikiurl"));
        assert!(q.contains("?place prov:wasDerivedFrom ?wikiurl ."));
        assert!(q.ends_with("OFFSET 0\nLIMIT 20000"));
    }

    #[test]
    fn escape_literal_handles_control_chars() {
        assert_eq!(escape_literal("a\nb\tc"), "a\\nb\\tc");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn countries_query_declares_prefixes() {
        let q = european_countries_query();
        assert!(q.contains("PREFIX yago:"));
        assert!(q.contains("yago:EuropeanCountries"));
    }
}

//! SPARQL endpoint access layer.
//!
//! This module covers everything between the pipeline and the remote
//! knowledge-graph service:
//!
//! - **Typed query construction** with explicit escaping of interpolated
//!   literals (`query`)
//! - **HTTP transport** returning tables of named-column bindings (`client`)
//! - **Resilient pagination** with cooldown-and-retry on transient failure
//!   (`fetch`)

pub mod client;
pub mod fetch;
pub mod query;

pub use client::{Binding, SparqlClient, DBPEDIA_ENDPOINT, DBPEDIA_LIVE_ENDPOINT};
pub use fetch::{FetchConfig, FetchSummary, PagedFetcher};
pub use query::{european_countries_query, place_count_query, PlaceQuery};

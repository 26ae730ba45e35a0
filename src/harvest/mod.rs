//! Harvested place records and streaming CSV output.

pub mod place;
pub mod sink;

pub use place::{read_places_csv, Place, PlaceSet, NOT_A_NUMBER};
pub use sink::{RecordSink, SinkSchema, COMPACT_HEADER, FULL_HEADER};

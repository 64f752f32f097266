//! engravelib — span resolution and temporal indexing for notation
//! engraving.
//!
//! The crate takes a score document that cast-off layout has already cut
//! into pages, systems and measures, and derives the two flat structures
//! the rest of an engraving pipeline depends on:
//!
//! - **Span resolution** ([`span`]): elements that cover a run of notes
//!   across measure and system boundaries are re-partitioned into
//!   per-system segments with placement context for geometry computation.
//! - **Temporal indexing** ([`timemap`], [`midimap`], [`timing`]): notes,
//!   rests and measures are projected onto time-ordered event indices — a
//!   millisecond-keyed synchronization timemap and a tick-keyed
//!   performance index — with range duplication for repeat flattening and
//!   MIDI rendering ([`midi`]) on top.
//!
//! # Example
//! ```no_run
//! use engravelib::{index_document, IndexOptions, Document};
//!
//! let doc = Document::new(); // built by an importer or in code
//! let index = index_document(&doc, &IndexOptions::default());
//! let json = index.timemap.to_json(false, true).unwrap();
//! println!("{json}");
//! ```

pub mod midi;
pub mod midimap;
pub mod model;
pub mod span;
pub mod timemap;
pub mod timing;

pub use midi::{render_midi, MidiRenderOptions};
pub use midimap::{MeasureTick, MidiMap, MidiMapEntry, PULSES_PER_QUARTER};
pub use model::*;
pub use span::{DrawingPlace, NoopGeometry, SpanElement, SpanGeometry, SpanPosition, SpanSegment};
pub use timemap::{PitchEvent, PitchRecord, Timemap, TimemapEntry, TimemapRecord, Tstamp};
pub use timing::{index_document, IndexOptions, RunningContext, TemporalIndex, DEFAULT_TEMPO};

use thiserror::Error;

/// Errors surfaced by the crate's public API.  Per-element problems
/// inside resolution and indexing degrade silently instead of erroring;
/// only genuine output failures reach callers.
#[derive(Debug, Error)]
pub enum EngraveError {
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Index a document and serialize its synchronization timemap in one
/// step.  Convenience wrapper for export commands.
pub fn timemap_json(
    doc: &Document,
    include_rests: bool,
    include_measure_ids: bool,
) -> Result<String, EngraveError> {
    let index = index_document(doc, &IndexOptions::default());
    index.timemap.to_json(include_rests, include_measure_ids)
}

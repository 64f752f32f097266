//! Shared fixture builders for the integration tests.
//!
//! Import and export are out of scope for this crate, so test documents
//! are built in code: helpers here assemble the page/system/measure
//! hierarchy with one staff and one layer per measure unless a test
//! needs something richer.

#![allow(dead_code)]

use engravelib::{
    Chord, ChordNote, Decorations, Document, ElementKind, Layer, LayerElement, Measure, Note,
    Page, Pitch, Rest, Staff, System,
};

pub fn pitch(step: &str, octave: i32) -> Pitch {
    Pitch { step: step.into(), octave, alter: None }
}

pub fn note(id: &str, onset: f64, duration: f64, step: &str, octave: i32) -> LayerElement {
    LayerElement {
        id: id.into(),
        onset,
        kind: ElementKind::Note(Note {
            pitch: pitch(step, octave),
            duration,
            decorations: Decorations::default(),
        }),
    }
}

pub fn note_with_decorations(
    id: &str,
    onset: f64,
    duration: f64,
    step: &str,
    octave: i32,
    decorations: Decorations,
) -> LayerElement {
    LayerElement {
        id: id.into(),
        onset,
        kind: ElementKind::Note(Note { pitch: pitch(step, octave), duration, decorations }),
    }
}

pub fn rest(id: &str, onset: f64, duration: f64) -> LayerElement {
    LayerElement {
        id: id.into(),
        onset,
        kind: ElementKind::Rest(Rest { duration }),
    }
}

pub fn chord_note(id: &str, step: &str, octave: i32) -> ChordNote {
    ChordNote {
        id: id.into(),
        pitch: pitch(step, octave),
        decorations: Decorations::default(),
    }
}

pub fn chord(
    id: &str,
    onset: f64,
    duration: f64,
    notes: Vec<ChordNote>,
    decorations: Decorations,
) -> LayerElement {
    LayerElement {
        id: id.into(),
        onset,
        kind: ElementKind::Chord(Chord { duration, notes, decorations }),
    }
}

/// A measure with a single staff (n = 1) holding a single layer (n = 1).
pub fn measure(id: &str, label: &str, elements: Vec<LayerElement>) -> Measure {
    Measure {
        id: id.into(),
        label: label.into(),
        tempo: None,
        repeat_start: false,
        repeat_end: false,
        staves: vec![Staff {
            id: format!("{id}-s1"),
            n: 1,
            layers: vec![Layer {
                id: format!("{id}-l1"),
                n: 1,
                elements,
            }],
        }],
    }
}

/// One page, one system.
pub fn single_system_doc(measures: Vec<Measure>) -> Document {
    doc_with_systems(vec![measures])
}

/// One page, one system per inner vector.
pub fn doc_with_systems(systems: Vec<Vec<Measure>>) -> Document {
    Document {
        pages: vec![Page {
            id: "page1".into(),
            systems: systems
                .into_iter()
                .enumerate()
                .map(|(i, measures)| System {
                    id: format!("system{}", i + 1),
                    measures,
                })
                .collect(),
        }],
    }
}

/// One system per inner vector, one page per outer vector.
pub fn doc_with_pages(pages: Vec<Vec<Vec<Measure>>>) -> Document {
    Document {
        pages: pages
            .into_iter()
            .enumerate()
            .map(|(pi, systems)| Page {
                id: format!("page{}", pi + 1),
                systems: systems
                    .into_iter()
                    .enumerate()
                    .map(|(si, measures)| System {
                        id: format!("p{}sys{}", pi + 1, si + 1),
                        measures,
                    })
                    .collect(),
            })
            .collect(),
    }
}

//! Integration tests for span resolution: anchor collection,
//! cross-measure extension, system partitioning and segment placement.

mod common;

use common::*;
use engravelib::{
    Document, MeasureAddress, NoopGeometry, SpanElement, SpanPosition, SpanSegment,
};
use pretty_assertions::assert_eq;

fn covered_ids(doc: &Document, span: &SpanElement) -> Vec<String> {
    span.elements()
        .iter()
        .map(|&a| doc.element_at(a).unwrap().id.clone())
        .collect()
}

fn segment_system_keys(span: &SpanElement) -> Vec<(usize, usize)> {
    span.segments()
        .iter()
        .map(|s| s.measure.unwrap().system_key())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Single-system spans
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn span_within_one_system_yields_one_full_segment() {
    let doc = single_system_doc(vec![measure(
        "m1",
        "1",
        vec![
            note("n1", 0.0, 0.5, "C", 5),
            note("n2", 0.5, 0.5, "D", 5),
            note("n3", 1.0, 0.5, "E", 5),
            note("n4", 1.5, 0.5, "F", 5),
        ],
    )]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "n1", "n3");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["n1", "n2", "n3"]);
    assert_eq!(span.segments().len(), 1);

    let segment = &span.segments()[0];
    assert_eq!(segment.position, SpanPosition::Full);
    assert_eq!(segment.range, 0..3);
    assert_eq!(segment.measure, Some(owner));
    assert_eq!(segment.staff_n, Some(1));
    assert_eq!(segment.layer_n, Some(1));
}

#[test]
fn span_across_measures_in_one_system_stays_one_segment() {
    let doc = single_system_doc(vec![
        measure(
            "m1",
            "1",
            vec![note("a1", 0.0, 1.0, "C", 4), note("a2", 1.0, 1.0, "D", 4)],
        ),
        measure(
            "m2",
            "2",
            vec![note("b1", 0.0, 1.0, "E", 4), note("b2", 1.0, 1.0, "F", 4)],
        ),
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "b2");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1", "a2", "b1", "b2"]);
    assert_eq!(span.segments().len(), 1);
    assert_eq!(span.segments()[0].position, SpanPosition::Full);
    assert_eq!(span.segments()[0].range, 0..4);
}

// ═══════════════════════════════════════════════════════════════════════
// Cross-system spans
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn span_crossing_one_system_boundary_yields_two_segments() {
    let doc = doc_with_systems(vec![
        vec![measure(
            "m1",
            "1",
            vec![note("a1", 0.0, 1.0, "C", 4), note("a2", 1.0, 1.0, "D", 4)],
        )],
        vec![measure(
            "m2",
            "2",
            vec![note("b1", 0.0, 1.0, "E", 4), note("b2", 1.0, 1.0, "F", 4)],
        )],
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "b2");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1", "a2", "b1", "b2"]);
    assert_eq!(span.segments().len(), 2);
    assert_eq!(segment_system_keys(&span), vec![(0, 0), (0, 1)]);

    let first = &span.segments()[0];
    let second = &span.segments()[1];
    assert_eq!(first.position, SpanPosition::Begin);
    assert_eq!(first.range, 0..2);
    assert_eq!(second.position, SpanPosition::End);
    assert_eq!(second.range, 2..4);
    assert_eq!(
        second.measure,
        Some(MeasureAddress { page: 0, system: 1, measure: 0 })
    );
}

#[test]
fn span_crossing_two_boundaries_yields_three_ordered_segments() {
    let doc = doc_with_systems(vec![
        vec![measure("m1", "1", vec![note("a1", 0.0, 2.0, "C", 4)])],
        vec![measure("m2", "2", vec![note("b1", 0.0, 2.0, "D", 4)])],
        vec![measure("m3", "3", vec![note("c1", 0.0, 2.0, "E", 4)])],
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "c1");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1", "b1", "c1"]);
    assert_eq!(span.segments().len(), 3);
    assert_eq!(segment_system_keys(&span), vec![(0, 0), (0, 1), (0, 2)]);

    let positions: Vec<SpanPosition> = span.segments().iter().map(|s| s.position).collect();
    assert_eq!(
        positions,
        vec![SpanPosition::Begin, SpanPosition::Middle, SpanPosition::End]
    );

    // Segment coordinate ranges are disjoint and cover the sequence
    assert_eq!(span.segments()[0].range, 0..1);
    assert_eq!(span.segments()[1].range, 1..2);
    assert_eq!(span.segments()[2].range, 2..3);
}

#[test]
fn span_crossing_a_page_boundary_partitions_by_system() {
    let doc = doc_with_pages(vec![
        vec![vec![measure(
            "m1",
            "1",
            vec![note("a1", 0.0, 1.0, "C", 4), note("a2", 1.0, 1.0, "D", 4)],
        )]],
        vec![vec![measure("m2", "2", vec![note("b1", 0.0, 2.0, "E", 4)])]],
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "b1");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1", "a2", "b1"]);
    assert_eq!(span.segments().len(), 2);
    assert_eq!(segment_system_keys(&span), vec![(0, 0), (1, 0)]);
}

#[test]
fn segments_stay_document_ordered_when_owner_is_an_interior_system() {
    let doc = doc_with_systems(vec![
        vec![measure("m1", "1", vec![note("a1", 0.0, 2.0, "C", 4)])],
        vec![measure("m2", "2", vec![note("b1", 0.0, 2.0, "D", 4)])],
        vec![measure("m3", "3", vec![note("c1", 0.0, 2.0, "E", 4)])],
    ]);

    // The span is written in the middle system; its primary segment slot
    // serves that system's run, but the list order follows the document.
    let owner = MeasureAddress { page: 0, system: 1, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "c1");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(span.segments().len(), 3);
    assert_eq!(segment_system_keys(&span), vec![(0, 0), (0, 1), (0, 2)]);
    let positions: Vec<SpanPosition> = span.segments().iter().map(|s| s.position).collect();
    assert_eq!(
        positions,
        vec![SpanPosition::Begin, SpanPosition::Middle, SpanPosition::End]
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Degraded references
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn extension_stops_when_next_measure_lacks_the_staff() {
    let mut m2 = measure("m2", "2", vec![note("b1", 0.0, 2.0, "C", 4)]);
    m2.staves[0].n = 2; // staff number 1 does not exist here
    let doc = single_system_doc(vec![
        measure(
            "m1",
            "1",
            vec![note("a1", 0.0, 1.0, "C", 4), note("a2", 1.0, 1.0, "D", 4)],
        ),
        m2,
        measure("m3", "3", vec![note("c1", 0.0, 2.0, "E", 4)]),
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "c1");
    span.resolve(&doc, &mut NoopGeometry);

    // Partial result: nothing beyond the failure point
    assert_eq!(covered_ids(&doc, &span), vec!["a1", "a2"]);
    assert_eq!(span.segments().len(), 1);
}

#[test]
fn extension_stops_when_next_measure_lacks_the_layer() {
    let mut m2 = measure("m2", "2", vec![note("b1", 0.0, 2.0, "C", 4)]);
    m2.staves[0].layers[0].n = 2; // layer number 1 does not exist here
    let doc = single_system_doc(vec![
        measure("m1", "1", vec![note("a1", 0.0, 2.0, "C", 4)]),
        m2,
        measure("m3", "3", vec![note("c1", 0.0, 2.0, "E", 4)]),
    ]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "c1");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1"]);
}

#[test]
fn end_anchor_in_a_different_layer_keeps_the_partial_sequence() {
    use engravelib::Layer;

    let mut m3 = measure("m3", "3", vec![note("c1", 0.0, 2.0, "E", 4)]);
    m3.staves[0].layers.push(Layer {
        id: "m3-l2".into(),
        n: 2,
        elements: vec![note("d1", 0.0, 2.0, "G", 4)],
    });
    let doc = single_system_doc(vec![
        measure("m1", "1", vec![note("a1", 0.0, 2.0, "C", 4)]),
        measure("m2", "2", vec![note("b1", 0.0, 2.0, "D", 4)]),
        m3,
    ]);

    // End anchor lives in layer 2; the forward walk through layer 1
    // never reaches it, so the final measure contributes nothing.
    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "a1", "d1");
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["a1", "b1"]);
}

#[test]
fn unresolvable_anchor_leaves_prior_state_untouched() {
    let doc = single_system_doc(vec![measure(
        "m1",
        "1",
        vec![note("n1", 0.0, 1.0, "C", 4), note("n2", 1.0, 1.0, "D", 4)],
    )]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "missing", "n2");
    let before: Vec<SpanSegment> = span.segments().to_vec();
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(span.segments(), &before[..]);
    assert!(span.elements().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
// Explicit reference lists
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn explicit_refs_override_the_positional_search() {
    let doc = single_system_doc(vec![measure(
        "m1",
        "1",
        vec![
            note("n1", 0.0, 0.5, "C", 4),
            note("n2", 0.5, 0.5, "D", 4),
            note("n3", 1.0, 0.5, "E", 4),
            note("n4", 1.5, 0.5, "F", 4),
        ],
    )]);

    let owner = MeasureAddress { page: 0, system: 0, measure: 0 };
    let mut span = SpanElement::new("bs1", owner, "n1", "n4");
    span.refs = vec!["n2".into(), "n3".into()];
    span.resolve(&doc, &mut NoopGeometry);

    assert_eq!(covered_ids(&doc, &span), vec!["n2", "n3"]);
    assert_eq!(span.segments().len(), 1);
    assert_eq!(span.segments()[0].range, 0..2);
}

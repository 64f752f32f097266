//! Cross-boundary span resolution.
//!
//! A spanning element (a beam group written across barlines, for example)
//! logically covers a contiguous run of notes, but cast-off layout cuts
//! the document into measures, systems and pages.  Resolution
//! reconstructs the ordered sequence of covered elements — following the
//! run across measure boundaries when the end anchor lives in a later
//! measure — and partitions it into one segment per system, each carrying
//! the placement context (measure, staff, layer) that geometric beam
//! computation needs.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::model::{Document, ElementAddress, Layer, MeasureAddress, Staff};

/// Drawing-place hint carried by a spanning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrawingPlace {
    #[default]
    Auto,
    Above,
    Below,
}

/// Where a segment sits within its span.  Segments other than `Full`
/// draw continuity cues (broken beam stubs) toward their missing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpanPosition {
    /// The span's only segment
    #[default]
    Full,
    /// First of several segments
    Begin,
    /// Interior segment
    Middle,
    /// Last of several segments
    End,
}

impl SpanPosition {
    /// Position of segment `index` among `last + 1` sibling segments.
    fn from_group(index: usize, last: usize) -> Self {
        if last == 0 {
            Self::Full
        } else if index == 0 {
            Self::Begin
        } else if index == last {
            Self::End
        } else {
            Self::Middle
        }
    }
}

/// A system-bounded portion of a spanning element's extent.
///
/// The coordinate range indexes into the owning span's covered-element
/// list; it never crosses a system boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSegment {
    /// Range of covered elements, as indices into the span's element list
    pub range: Range<usize>,
    /// Measure containing the segment's first element
    pub measure: Option<MeasureAddress>,
    /// Staff number of the segment's first element
    pub staff_n: Option<i32>,
    /// Layer number of the segment's first element
    pub layer_n: Option<i32>,
    /// Begin/middle/end marker among sibling segments
    pub position: SpanPosition,
}

impl Default for SpanSegment {
    fn default() -> Self {
        Self {
            range: 0..0,
            measure: None,
            staff_n: None,
            layer_n: None,
            position: SpanPosition::Full,
        }
    }
}

/// External geometry calculator invoked once per resolved segment.
///
/// Stem and slant computation is not this crate's business; implementors
/// receive the placement context and keep their own outputs.
pub trait SpanGeometry {
    fn layout_segment(
        &mut self,
        doc: &Document,
        layer: &Layer,
        staff: &Staff,
        span_id: &str,
        place: DrawingPlace,
        segment: &SpanSegment,
    );
}

/// Geometry calculator that computes nothing.  Useful when only the
/// segment partition itself is wanted.
#[derive(Debug, Default)]
pub struct NoopGeometry;

impl SpanGeometry for NoopGeometry {
    fn layout_segment(
        &mut self,
        _doc: &Document,
        _layer: &Layer,
        _staff: &Staff,
        _span_id: &str,
        _place: DrawingPlace,
        _segment: &SpanSegment,
    ) {
    }
}

/// A notational element spanning a range of other elements.
///
/// Owns its segments exclusively; there is at least one segment at all
/// times — the primary segment created with the element is reused for the
/// portion of the span lying in the element's own system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanElement {
    /// Stable identifier
    pub id: String,
    /// Id of the first covered element
    pub start_id: String,
    /// Id of the last covered element
    pub end_id: String,
    /// Explicit covered-element ids; when non-empty this list overrides
    /// the positional start/end search
    pub refs: Vec<String>,
    /// Drawing-place hint handed to geometry computation
    pub place: DrawingPlace,
    /// The measure the span is written in; its system is the span's own
    /// anchor system
    pub owner: MeasureAddress,
    elements: Vec<ElementAddress>,
    segments: Vec<SpanSegment>,
}

impl SpanElement {
    pub fn new(
        id: impl Into<String>,
        owner: MeasureAddress,
        start_id: impl Into<String>,
        end_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_id: start_id.into(),
            end_id: end_id.into(),
            refs: Vec::new(),
            place: DrawingPlace::Auto,
            owner,
            elements: Vec::new(),
            segments: vec![SpanSegment::default()],
        }
    }

    /// Drop any resolved state and restore the single primary segment.
    pub fn reset(&mut self) {
        self.elements.clear();
        self.segments.clear();
        self.segments.push(SpanSegment::default());
    }

    /// The resolved covered elements, in document order.
    pub fn elements(&self) -> &[ElementAddress] {
        &self.elements
    }

    pub fn segments(&self) -> &[SpanSegment] {
        &self.segments
    }

    /// The covered elements belonging to one segment.
    pub fn segment_elements(&self, segment: &SpanSegment) -> &[ElementAddress] {
        &self.elements[segment.range.clone()]
    }

    /// Resolve the span against the document: rebuild the covered-element
    /// list and re-partition it into per-system segments.
    ///
    /// Resolution is best-effort.  An unresolvable anchor leaves the
    /// prior state untouched; a broken end reference (never reached by
    /// the forward walk) keeps the partial sequence collected up to the
    /// failure point.
    pub fn resolve<G: SpanGeometry>(&mut self, doc: &Document, geometry: &mut G) {
        let elements = if self.refs.is_empty() {
            match self.collect_between_anchors(doc) {
                Some(e) => e,
                None => return,
            }
        } else {
            self.refs
                .iter()
                .filter_map(|id| doc.find_element(id))
                .collect()
        };
        if elements.is_empty() {
            return;
        }

        self.elements = elements;
        self.rebuild_segments(doc, geometry);
    }

    /// Collect the pitched elements from the start anchor to the end
    /// anchor, extending measure by measure when the anchors are in
    /// different measures.  Any failed lookup (no next measure, no
    /// matching staff number, no matching layer number) stops the
    /// extension and the partial result stands.
    fn collect_between_anchors(&self, doc: &Document) -> Option<Vec<ElementAddress>> {
        let start = doc.find_element(&self.start_id)?;
        let end = doc.find_element(&self.end_id)?;
        let staff_n = doc.staff_at(start)?.n;
        let layer_n = doc.layer_at(start)?.n;
        let start_layer = doc.layer_at(start)?;

        let mut collected: Vec<ElementAddress> = start_layer
            .elements_between(Some(self.start_id.as_str()), &self.end_id)
            .into_iter()
            .map(|i| ElementAddress { element: i, ..start })
            .collect();

        let end_measure = end.measure_address();
        let mut current = start.measure_address();

        while !self.ends_at_anchor(doc, &collected) && current != end_measure {
            let next = match doc.next_measure(current) {
                Some(m) => m,
                None => break,
            };
            let measure = match doc.measure_at(next) {
                Some(m) => m,
                None => break,
            };
            let staff_idx = match measure.staves.iter().position(|s| s.n == staff_n) {
                Some(i) => i,
                None => break,
            };
            let staff = &measure.staves[staff_idx];
            let layer_idx = match staff.layers.iter().position(|l| l.n == layer_n) {
                Some(i) => i,
                None => break,
            };
            let layer = &staff.layers[layer_idx];

            let addr = |element: usize| ElementAddress {
                page: next.page,
                system: next.system,
                measure: next.measure,
                staff: staff_idx,
                layer: layer_idx,
                element,
            };

            if next == end_measure {
                // Only accept the final measure's run when it really ends
                // at the end anchor; otherwise the reference is broken
                // and the partial sequence stands.
                let indices = layer.elements_between(None, &self.end_id);
                let reaches_end = indices
                    .last()
                    .map_or(false, |&i| layer.elements[i].id == self.end_id);
                if reaches_end {
                    collected.extend(indices.into_iter().map(addr));
                }
            } else {
                // Whole intermediate measure
                collected.extend(
                    layer
                        .elements
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.kind.has_pitch())
                        .map(|(i, _)| addr(i)),
                );
            }

            current = next;
        }

        Some(collected)
    }

    fn ends_at_anchor(&self, doc: &Document, collected: &[ElementAddress]) -> bool {
        collected.last().map_or(false, |&a| {
            doc.element_at(a).map_or(false, |e| e.id == self.end_id)
        })
    }

    /// Partition the covered elements into consecutive runs sharing an
    /// owning system and build one segment per run.  The run lying in the
    /// owner's system reuses the primary segment slot; all other runs get
    /// fresh segments.  The result is ordered by document position.
    fn rebuild_segments<G: SpanGeometry>(&mut self, doc: &Document, geometry: &mut G) {
        let mut groups: Vec<(usize, (usize, usize))> = Vec::new();
        let mut i = 0;
        while i < self.elements.len() {
            let key = self.elements[i].system_key();
            groups.push((i, key));
            while i < self.elements.len() && self.elements[i].system_key() == key {
                i += 1;
            }
        }

        let anchor_system = self.owner.system_key();
        let last = groups.len() - 1;
        let mut primary = self.segments.drain(..).next();
        let mut rebuilt = Vec::with_capacity(groups.len());

        for (gi, &(start_idx, system)) in groups.iter().enumerate() {
            let end_idx = groups.get(gi + 1).map_or(self.elements.len(), |g| g.0);

            let mut segment = if system == anchor_system {
                primary.take().unwrap_or_default()
            } else {
                SpanSegment::default()
            };

            let first = self.elements[start_idx];
            segment.range = start_idx..end_idx;
            segment.measure = Some(first.measure_address());
            segment.staff_n = doc.staff_at(first).map(|s| s.n);
            segment.layer_n = doc.layer_at(first).map(|l| l.n);
            segment.position = SpanPosition::from_group(gi, last);

            if let (Some(layer), Some(staff)) = (doc.layer_at(first), doc.staff_at(first)) {
                geometry.layout_segment(doc, layer, staff, &self.id, self.place, &segment);
            }

            rebuilt.push(segment);
        }

        self.segments = rebuilt;
    }
}

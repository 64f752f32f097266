//! Data model for the engraved score document.
//!
//! The document is the hierarchy produced by cast-off layout: pages own
//! systems, systems own measures, measures own staves, staves own layers,
//! and layers own the notational elements in score order.  Everything the
//! span resolver and the temporal indexers need from the tree — stable
//! identifiers, textual measure labels, ancestor access, document-order
//! navigation — lives here.

use serde::{Deserialize, Serialize};

/// A complete score document after cast-off (page/system assignment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Physical pages in reading order
    pub pages: Vec<Page>,
}

/// One physical page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Stable identifier
    pub id: String,
    /// Systems (lines of music) on this page, top to bottom
    pub systems: Vec<System>,
}

/// One system — a line of music spanning the page width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    /// Stable identifier
    pub id: String,
    /// Measures in this system, left to right
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Stable identifier
    pub id: String,
    /// Textual measure number label; may be non-numeric (e.g. "12a")
    pub label: String,
    /// Tempo change (BPM) taking effect at this measure's start
    pub tempo: Option<f64>,
    /// Forward repeat barline at the left of this measure
    pub repeat_start: bool,
    /// Backward repeat barline at the right of this measure
    pub repeat_end: bool,
    /// Staves of this measure, top to bottom
    pub staves: Vec<Staff>,
}

/// One staff within a measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    /// Stable identifier
    pub id: String,
    /// Staff number (1-based, consistent across measures)
    pub n: i32,
    /// Voices written on this staff
    pub layers: Vec<Layer>,
}

/// One layer (voice) within a staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Stable identifier
    pub id: String,
    /// Layer number (1-based, consistent across measures)
    pub n: i32,
    /// Notational elements in score order
    pub elements: Vec<LayerElement>,
}

/// A notational element inside a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerElement {
    /// Stable identifier
    pub id: String,
    /// Score-time onset within the measure, in quarter-note units
    pub onset: f64,
    /// What kind of element this is
    pub kind: ElementKind,
}

/// Closed classification of the notational element kinds the core
/// processes.  Capability queries replace runtime type inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementKind {
    Note(Note),
    Chord(Chord),
    Rest(Rest),
}

/// A single pitched note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub pitch: Pitch,
    /// Duration in quarter-note units
    pub duration: f64,
    /// Identifiers of attached decoration elements
    pub decorations: Decorations,
}

/// Several notes sounding together on one stem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chord {
    /// Duration in quarter-note units, shared by all chord notes
    pub duration: f64,
    /// Member notes, each with its own identifier and pitch
    pub notes: Vec<ChordNote>,
    /// Decorations owned by the chord itself (shared stem, flag, dots)
    pub decorations: Decorations,
}

/// A note belonging to a chord.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordNote {
    /// Stable identifier
    pub id: String,
    pub pitch: Pitch,
    /// Decorations attached to this note alone (e.g. its accidental)
    pub decorations: Decorations,
}

/// A rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rest {
    /// Duration in quarter-note units
    pub duration: f64,
}

/// Pitch of a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp
    pub alter: Option<f64>,
}

/// Identifiers of the decoration elements attached to a note or chord.
/// These feed the participating-element lists of the temporal indexers:
/// highlighting consumers address every glyph that belongs to a sounding
/// note, not just the notehead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decorations {
    pub beam: Option<String>,
    pub tuplet: Option<String>,
    pub accid: Option<String>,
    pub artic: Option<String>,
    pub dots: Option<String>,
    pub stem: Option<String>,
    pub flag: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Addresses — positional references with prefix-ancestor access
// ═══════════════════════════════════════════════════════════════════════

/// Position of a measure in the document.  The page and system indices
/// double as the measure's ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureAddress {
    pub page: usize,
    pub system: usize,
    pub measure: usize,
}

/// Position of a layer element in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementAddress {
    pub page: usize,
    pub system: usize,
    pub measure: usize,
    pub staff: usize,
    pub layer: usize,
    pub element: usize,
}

impl ElementAddress {
    /// The measure containing this element.
    pub fn measure_address(&self) -> MeasureAddress {
        MeasureAddress {
            page: self.page,
            system: self.system,
            measure: self.measure,
        }
    }

    /// The (page, system) pair identifying the owning system.
    pub fn system_key(&self) -> (usize, usize) {
        (self.page, self.system)
    }
}

impl MeasureAddress {
    pub fn system_key(&self) -> (usize, usize) {
        (self.page, self.system)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Navigation
// ═══════════════════════════════════════════════════════════════════════

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Total number of measures across all pages and systems.
    pub fn measure_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| &p.systems)
            .map(|s| s.measures.len())
            .sum()
    }

    pub fn system_at(&self, page: usize, system: usize) -> Option<&System> {
        self.pages.get(page)?.systems.get(system)
    }

    pub fn measure_at(&self, addr: MeasureAddress) -> Option<&Measure> {
        self.system_at(addr.page, addr.system)?.measures.get(addr.measure)
    }

    pub fn staff_at(&self, addr: ElementAddress) -> Option<&Staff> {
        self.measure_at(addr.measure_address())?.staves.get(addr.staff)
    }

    pub fn layer_at(&self, addr: ElementAddress) -> Option<&Layer> {
        self.staff_at(addr)?.layers.get(addr.layer)
    }

    pub fn element_at(&self, addr: ElementAddress) -> Option<&LayerElement> {
        self.layer_at(addr)?.elements.get(addr.element)
    }

    /// Iterate measures in document order (pages, then systems, then
    /// measures), yielding each with its address.
    pub fn measures(&self) -> impl Iterator<Item = (MeasureAddress, &Measure)> {
        self.pages.iter().enumerate().flat_map(|(pi, page)| {
            page.systems.iter().enumerate().flat_map(move |(si, system)| {
                system.measures.iter().enumerate().map(move |(mi, measure)| {
                    (
                        MeasureAddress { page: pi, system: si, measure: mi },
                        measure,
                    )
                })
            })
        })
    }

    /// The measure following `addr` in document order, crossing system
    /// and page boundaries.  Empty systems and pages are skipped.
    pub fn next_measure(&self, addr: MeasureAddress) -> Option<MeasureAddress> {
        let system = self.system_at(addr.page, addr.system)?;
        if addr.measure + 1 < system.measures.len() {
            return Some(MeasureAddress {
                measure: addr.measure + 1,
                ..addr
            });
        }

        let mut page = addr.page;
        let mut system = addr.system + 1;
        while page < self.pages.len() {
            let systems = &self.pages[page].systems;
            while system < systems.len() {
                if !systems[system].measures.is_empty() {
                    return Some(MeasureAddress { page, system, measure: 0 });
                }
                system += 1;
            }
            page += 1;
            system = 0;
        }
        None
    }

    /// Locate a layer element by its identifier.
    pub fn find_element(&self, id: &str) -> Option<ElementAddress> {
        for (maddr, measure) in self.measures() {
            for (sti, staff) in measure.staves.iter().enumerate() {
                for (li, layer) in staff.layers.iter().enumerate() {
                    for (ei, element) in layer.elements.iter().enumerate() {
                        if element.id == id {
                            return Some(ElementAddress {
                                page: maddr.page,
                                system: maddr.system,
                                measure: maddr.measure,
                                staff: sti,
                                layer: li,
                                element: ei,
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

impl Measure {
    /// Parse the textual number label.  Non-numeric labels yield `None`;
    /// callers treat that as an unknown measure number, never an error.
    pub fn number(&self) -> Option<i32> {
        self.label.trim().parse().ok()
    }

    /// Staff with the given staff number.
    pub fn staff(&self, n: i32) -> Option<&Staff> {
        self.staves.iter().find(|s| s.n == n)
    }

    /// Score-time length of this measure in quarter-note units, derived
    /// from content: the latest offset over all layers.  Pickup measures
    /// come out shorter than their meter this way, which is what the
    /// timing pass wants.
    pub fn content_duration(&self) -> f64 {
        let mut dur: f64 = 0.0;
        for staff in &self.staves {
            for layer in &staff.layers {
                for element in &layer.elements {
                    let end = element.onset + element.kind.duration();
                    if end > dur {
                        dur = end;
                    }
                }
            }
        }
        dur
    }
}

impl Staff {
    /// Layer with the given layer number.
    pub fn layer(&self, n: i32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.n == n)
    }
}

impl Layer {
    /// Indices of the pitched elements (notes and chords) between two
    /// anchors, both inclusive.  `start` of `None` collects from the
    /// beginning of the layer.  Collection stops after the element whose
    /// id equals `end`; if `end` never occurs, it runs to the end of the
    /// layer.  This is the bounded descendant search the span resolver
    /// builds on.
    pub fn elements_between(&self, start: Option<&str>, end: &str) -> Vec<usize> {
        let mut collecting = start.is_none();
        let mut out = Vec::new();
        for (i, element) in self.elements.iter().enumerate() {
            if !collecting {
                if Some(element.id.as_str()) == start {
                    collecting = true;
                } else {
                    continue;
                }
            }
            if element.kind.has_pitch() {
                out.push(i);
            }
            if element.id == end {
                break;
            }
        }
        out
    }
}

impl ElementKind {
    /// Whether this element occupies score time.
    pub fn has_duration(&self) -> bool {
        matches!(self, Self::Note(_) | Self::Chord(_) | Self::Rest(_))
    }

    /// Whether this element sounds at least one pitch.
    pub fn has_pitch(&self) -> bool {
        matches!(self, Self::Note(_) | Self::Chord(_))
    }

    /// Duration in quarter-note units.
    pub fn duration(&self) -> f64 {
        match self {
            Self::Note(n) => n.duration,
            Self::Chord(c) => c.duration,
            Self::Rest(r) => r.duration,
        }
    }
}

impl Pitch {
    /// Convert pitch to MIDI note number.
    /// Middle C (C4) = 60.
    pub fn to_midi(&self) -> i32 {
        let step_semitone = match self.step.as_str() {
            "C" => 0,
            "D" => 2,
            "E" => 4,
            "F" => 5,
            "G" => 7,
            "A" => 9,
            "B" => 11,
            _ => 0,
        };
        let alter = self.alter.unwrap_or(0.0) as i32;
        (self.octave + 1) * 12 + step_semitone + alter
    }
}

/// Collect the identifiers participating in one sounding note, in a fixed
/// order: the note itself, its own decorations, then the owning chord's
/// flag, stem and dots when the note is a chord member.  Chord
/// decorations are repeated for every member note on purpose — each
/// note's list must be self-contained for highlighting consumers.
pub fn participating_ids(
    note_id: &str,
    decorations: &Decorations,
    chord_decorations: Option<&Decorations>,
) -> Vec<String> {
    let mut ids = vec![note_id.to_string()];
    for slot in [
        &decorations.beam,
        &decorations.tuplet,
        &decorations.accid,
        &decorations.artic,
        &decorations.dots,
        &decorations.stem,
        &decorations.flag,
    ] {
        if let Some(id) = slot {
            ids.push(id.clone());
        }
    }
    if let Some(chord) = chord_decorations {
        for slot in [&chord.flag, &chord.stem, &chord.dots] {
            if let Some(id) = slot {
                ids.push(id.clone());
            }
        }
    }
    ids
}

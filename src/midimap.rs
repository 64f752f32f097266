//! Performance index — the tick-keyed temporal index.
//!
//! The second export mode: note on/off events and measure markers keyed
//! by integer MIDI tick (metrical time scaled by a fixed
//! pulses-per-quarter resolution).  Consumers are sequencer-style: the
//! MIDI renderer reads the note events, playback cursors read the
//! measure markers.  Repeated sections are flattened by duplicating tick
//! ranges in place of re-traversing the document.

use std::collections::{BTreeMap, HashMap};

use crate::model::{participating_ids, Document, ElementAddress, ElementKind, MeasureAddress};
use crate::timemap::PitchEvent;
use crate::timing::RunningContext;

/// Tick resolution: pulses per quarter note.
pub const PULSES_PER_QUARTER: i64 = 480;

/// Convert a metrical time in quarter-note units to ticks.
pub fn quarters_to_ticks(quarters: f64) -> i64 {
    (quarters * PULSES_PER_QUARTER as f64).round() as i64
}

/// Note events sharing one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiMapEntry {
    /// Pitches starting at this tick
    pub notes_on: BTreeMap<i32, PitchEvent>,
    /// Pitches ending at this tick
    pub notes_off: BTreeMap<i32, PitchEvent>,
    /// Measure number; `None` when the label did not parse
    pub measure_no: Option<i32>,
    /// Owning page index
    pub page_no: Option<usize>,
}

impl MidiMapEntry {
    /// Merge another entry's fields into this one: per-pitch records keep
    /// the existing value, structural fields fill in when unset.
    fn merge(&mut self, other: MidiMapEntry) {
        for (pitch, event) in other.notes_on {
            self.notes_on.entry(pitch).or_insert(event);
        }
        for (pitch, event) in other.notes_off {
            self.notes_off.entry(pitch).or_insert(event);
        }
        if self.measure_no.is_none() {
            self.measure_no = other.measure_no;
        }
        if self.page_no.is_none() {
            self.page_no = other.page_no;
        }
    }
}

/// Compact per-measure marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureTick {
    /// Measure number; `None` when the label did not parse
    pub measure_no: Option<i32>,
    /// Measure length in ticks
    pub duration: i64,
    /// Owning system, by first-seen order
    pub system_no: usize,
}

/// The performance index: ordered note-event and measure-marker maps.
#[derive(Debug, Clone, Default)]
pub struct MidiMap {
    entries: BTreeMap<i64, MidiMapEntry>,
    measure_ticks: BTreeMap<i64, MeasureTick>,
    system_order: HashMap<String, usize>,
}

impl MidiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entries, measure markers and system bookkeeping.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.measure_ticks.clear();
        self.system_order.clear();
    }

    /// Exact-tick lookup.
    pub fn entry(&self, tick: i64) -> Option<&MidiMapEntry> {
        self.entries.get(&tick)
    }

    /// Note events in ascending tick order.
    pub fn entries(&self) -> &BTreeMap<i64, MidiMapEntry> {
        &self.entries
    }

    /// Measure markers in ascending tick order.
    pub fn measures(&self) -> &BTreeMap<i64, MeasureTick> {
        &self.measure_ticks
    }

    /// System ids mapped to their first-seen order.
    pub fn systems(&self) -> &HashMap<String, usize> {
        &self.system_order
    }

    /// Record a note or chord at its onset and offset ticks, derived from
    /// the context's accumulated metrical offset.  Rests carry no pitch
    /// and are not part of this index; a dangling address is skipped.
    pub fn add_note(&mut self, doc: &Document, addr: ElementAddress, ctx: &RunningContext) {
        let element = match doc.element_at(addr) {
            Some(e) => e,
            None => {
                log::debug!("midimap: skipping dangling element address {addr:?}");
                return;
            }
        };
        if !element.kind.has_pitch() {
            return;
        }

        let on_tick = quarters_to_ticks(ctx.score_offset + element.onset);
        let off_tick = quarters_to_ticks(ctx.score_offset + element.onset + element.kind.duration());

        let staff_no = doc.staff_at(addr).map_or(0, |s| s.n);
        let measure_no = doc
            .measure_at(addr.measure_address())
            .and_then(|m| m.number());
        let page_no = (addr.page < doc.pages.len()).then_some(addr.page);

        let pitches: Vec<(i32, Vec<String>)> = match &element.kind {
            ElementKind::Note(n) => vec![(
                n.pitch.to_midi(),
                participating_ids(&element.id, &n.decorations, None),
            )],
            ElementKind::Chord(c) => c
                .notes
                .iter()
                .map(|cn| {
                    (
                        cn.pitch.to_midi(),
                        participating_ids(&cn.id, &cn.decorations, Some(&c.decorations)),
                    )
                })
                .collect(),
            ElementKind::Rest(_) => return,
        };

        let on_entry = self.entries.entry(on_tick).or_default();
        for (pitch, ids) in &pitches {
            on_entry
                .notes_on
                .entry(*pitch)
                .or_insert_with(|| PitchEvent { staff: staff_no, ids: ids.clone() });
            log::trace!("midimap: add note staff:{staff_no} tick:{on_tick} pitch:{pitch}");
        }
        if measure_no.is_some() {
            on_entry.measure_no = measure_no;
        }
        if page_no.is_some() {
            on_entry.page_no = page_no;
        }

        let off_entry = self.entries.entry(off_tick).or_default();
        for (pitch, ids) in &pitches {
            off_entry
                .notes_off
                .entry(*pitch)
                .or_insert_with(|| PitchEvent { staff: staff_no, ids: ids.clone() });
        }
        if measure_no.is_some() {
            off_entry.measure_no = measure_no;
        }
        if page_no.is_some() {
            off_entry.page_no = page_no;
        }
    }

    /// Record a measure marker at `tick` with the measure's length in
    /// ticks.  The owning system is registered in first-seen order.
    pub fn add_measure(
        &mut self,
        doc: &Document,
        addr: MeasureAddress,
        tick: i64,
        duration: i64,
    ) {
        let measure = match doc.measure_at(addr) {
            Some(m) => m,
            None => {
                log::debug!("midimap: skipping dangling measure address {addr:?}");
                return;
            }
        };
        let system = match doc.system_at(addr.page, addr.system) {
            Some(s) => s,
            None => return,
        };

        let measure_no = measure.number();
        if measure_no.is_none() {
            log::warn!(
                "midimap: measure label {:?} is not numeric; leaving number unset",
                measure.label
            );
        }
        let system_no = self.system_index(&system.id);

        self.measure_ticks.insert(
            tick,
            MeasureTick { measure_no, duration, system_no },
        );
    }

    fn system_index(&mut self, system_id: &str) -> usize {
        if let Some(&i) = self.system_order.get(system_id) {
            i
        } else {
            let i = self.system_order.len();
            self.system_order.insert(system_id.to_string(), i);
            i
        }
    }

    /// Duplicate every note-event entry with tick in `[from, end)` to
    /// `tick + shift`.  Copies are value copies: mutating a duplicate
    /// never touches its source, and the same element ids legitimately
    /// recur at the shifted keys.  A copy landing on an existing key
    /// merges into it, keeping entries unique per tick.
    pub fn copy_entries(&mut self, from: i64, end: i64, shift: i64) {
        debug_assert!(from <= end, "copy range must be ordered: [{from}, {end})");
        let copies: Vec<(i64, MidiMapEntry)> = self
            .entries
            .range(from..end)
            .map(|(&tick, entry)| (tick + shift, entry.clone()))
            .collect();
        for (tick, entry) in copies {
            self.entries.entry(tick).or_default().merge(entry);
        }
    }

    /// Duplicate every measure marker with tick in `[from, end)` to
    /// `tick + shift`.
    pub fn copy_measures(&mut self, from: i64, end: i64, shift: i64) {
        debug_assert!(from <= end, "copy range must be ordered: [{from}, {end})");
        let copies: Vec<(i64, MeasureTick)> = self
            .measure_ticks
            .range(from..end)
            .map(|(&tick, marker)| (tick + shift, *marker))
            .collect();
        for (tick, marker) in copies {
            self.measure_ticks.insert(tick, marker);
        }
    }

    /// Duplicate the half-open tick range `[from, end)` — note events and
    /// measure markers both — to `[from + shift, end + shift)`.
    pub fn copy_range(&mut self, from: i64, end: i64, shift: i64) {
        self.copy_entries(from, end, shift);
        self.copy_measures(from, end, shift);
    }
}

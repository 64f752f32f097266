//! Timing pass — drives both temporal indexers over the document.
//!
//! Walks measures in document order with a running context (accumulated
//! real-time and metrical offsets, current tempo), recording every
//! measure, note and rest into the synchronization timemap and the
//! tick-based performance index in one pass.  Repeated sections are
//! flattened on the way: the tick index duplicates the section's range
//! instead of re-traversing, while the timemap re-records the section
//! with advanced offsets.

use crate::midimap::{quarters_to_ticks, MidiMap};
use crate::model::{Document, ElementAddress, Measure, MeasureAddress};
use crate::timemap::Timemap;

/// Default tempo (BPM) until the document sets one.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Running traversal state.  Owned by the driver and lent to each
/// indexing call for the duration of that call.
#[derive(Debug, Clone)]
pub struct RunningContext {
    /// Accumulated real-time offset in milliseconds
    pub real_offset_ms: f64,
    /// Accumulated metrical offset in quarter-note units
    pub score_offset: f64,
    /// Current tempo in BPM; `None` until a tempo directive is seen
    pub tempo: Option<f64>,
    /// Default note-on velocity handed to MIDI rendering
    pub velocity: u8,
    /// Output channel handed to MIDI rendering
    pub channel: u8,
}

impl Default for RunningContext {
    fn default() -> Self {
        Self {
            real_offset_ms: 0.0,
            score_offset: 0.0,
            tempo: None,
            velocity: 80,
            channel: 0,
        }
    }
}

impl RunningContext {
    /// Milliseconds per quarter note at the current tempo.
    pub fn ms_per_quarter(&self) -> f64 {
        60_000.0 / self.tempo.unwrap_or(DEFAULT_TEMPO)
    }
}

/// Options controlling the indexing pass.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Flatten repeated sections into the indices
    pub expand_repeats: bool,
    /// Default note-on velocity seeded into the running context
    pub velocity: u8,
    /// Output channel seeded into the running context
    pub channel: u8,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            expand_repeats: true,
            velocity: 80,
            channel: 0,
        }
    }
}

/// The populated indices, plus the tempo changes seen along the way as
/// (tick, BPM) pairs for the MIDI renderer's tempo track.
#[derive(Debug, Clone, Default)]
pub struct TemporalIndex {
    pub timemap: Timemap,
    pub midimap: MidiMap,
    pub tempo_ticks: Vec<(i64, f64)>,
}

/// Run the timing pass over the whole document.
///
/// The traversal always runs to completion: indexing failures for single
/// elements degrade to omitted fields or skipped entries inside the
/// indexers and never abort the pass.
pub fn index_document(doc: &Document, options: &IndexOptions) -> TemporalIndex {
    let mut timemap = Timemap::new();
    let mut midimap = MidiMap::new();
    let mut tempo_ticks: Vec<(i64, f64)> = Vec::new();
    let mut ctx = RunningContext {
        velocity: options.velocity,
        channel: options.channel,
        ..RunningContext::default()
    };

    let measures: Vec<(MeasureAddress, &Measure)> = doc.measures().collect();

    // A backward repeat without a forward barline repeats from the
    // beginning of the document (or from the end of the previous
    // section).
    let mut section_first: usize = 0;
    let mut section_state = ctx.clone();

    for (i, &(addr, measure)) in measures.iter().enumerate() {
        if let Some(t) = measure.tempo {
            if ctx.tempo != Some(t) {
                ctx.tempo = Some(t);
                tempo_ticks.push((quarters_to_ticks(ctx.score_offset), t));
            }
        }

        if measure.repeat_start {
            section_first = i;
            section_state = ctx.clone();
        }

        record_measure(&mut timemap, Some(&mut midimap), doc, addr, measure, &ctx);

        let dur_q = measure.content_duration();
        ctx.real_offset_ms += dur_q * ctx.ms_per_quarter();
        ctx.score_offset += dur_q;

        if measure.repeat_end && options.expand_repeats {
            let from = quarters_to_ticks(section_state.score_offset);
            let end = quarters_to_ticks(ctx.score_offset);
            if end > from {
                // Second pass: ticks by range duplication, no
                // re-traversal; the timemap re-records with advanced
                // offsets since its keys are tempo-dependent.  The
                // exclusive bound sits one past the section end so the
                // closing note-offs at `end` travel with the copy —
                // nothing beyond `end` exists in the map at this point.
                midimap.copy_range(from, end + 1, end - from);
                for &(raddr, rmeasure) in &measures[section_first..=i] {
                    if let Some(t) = rmeasure.tempo {
                        if ctx.tempo != Some(t) {
                            ctx.tempo = Some(t);
                            tempo_ticks.push((quarters_to_ticks(ctx.score_offset), t));
                        }
                    }
                    record_measure(&mut timemap, None, doc, raddr, rmeasure, &ctx);
                    let rdur = rmeasure.content_duration();
                    ctx.real_offset_ms += rdur * ctx.ms_per_quarter();
                    ctx.score_offset += rdur;
                }
            } else {
                log::warn!(
                    "timing: empty repeat section ending at measure {:?}; nothing to expand",
                    measure.label
                );
            }
            section_first = i + 1;
            section_state = ctx.clone();
        }
    }

    TemporalIndex { timemap, midimap, tempo_ticks }
}

/// Record one measure and all of its layer elements into the timemap
/// and, when given, the tick index.
fn record_measure(
    timemap: &mut Timemap,
    mut midimap: Option<&mut MidiMap>,
    doc: &Document,
    addr: MeasureAddress,
    measure: &Measure,
    ctx: &RunningContext,
) {
    timemap.record_measure(doc, addr, ctx);
    if let Some(map) = midimap.as_deref_mut() {
        let tick = quarters_to_ticks(ctx.score_offset);
        let duration = quarters_to_ticks(measure.content_duration());
        map.add_measure(doc, addr, tick, duration);
    }

    for (sti, staff) in measure.staves.iter().enumerate() {
        for (li, layer) in staff.layers.iter().enumerate() {
            for ei in 0..layer.elements.len() {
                let eaddr = ElementAddress {
                    page: addr.page,
                    system: addr.system,
                    measure: addr.measure,
                    staff: sti,
                    layer: li,
                    element: ei,
                };
                timemap.record_element(doc, eaddr, ctx);
                if let Some(map) = midimap.as_deref_mut() {
                    map.add_note(doc, eaddr, ctx);
                }
            }
        }
    }
}

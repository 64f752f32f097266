//! Synchronization timemap — the dual real/metrical temporal index.
//!
//! Notes, rests and measures are projected onto a flat map keyed by
//! real-time onset (milliseconds, adjusted by the running offset the
//! traversal accumulates across sections and repeats).  Each entry also
//! carries the metrical counterpart (`qstamp`) so consumers can convert
//! between playback time and score time.  The serialized record sequence
//! drives external playback-cursor and highlighting tooling.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{participating_ids, Document, ElementAddress, ElementKind, MeasureAddress};
use crate::timing::RunningContext;
use crate::EngraveError;

/// Real-time key in milliseconds.  Wraps `f64` with a total order so it
/// can key the sorted map; keys are compared exactly — there is no
/// nearest-time lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tstamp(pub f64);

impl PartialEq for Tstamp {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Tstamp {}

impl PartialOrd for Tstamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tstamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Tstamp {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

/// Per-pitch participation record: the staff the pitch sounds on and the
/// identifiers of every element taking part in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchEvent {
    /// Staff number, 0 when the staff could not be determined
    pub staff: i32,
    /// Participating element identifiers (note first, then decorations)
    pub ids: Vec<String>,
}

/// One entry of the timemap.  Created empty when a key is first touched;
/// later insertions at the same key merge into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimemapEntry {
    /// Metrical counterpart of the entry's real-time key, in quarters
    pub qstamp: f64,
    /// Pitches starting at this time
    pub notes_on: BTreeMap<i32, PitchEvent>,
    /// Pitches ending at this time
    pub notes_off: BTreeMap<i32, PitchEvent>,
    /// Rests starting at this time
    pub rests_on: Vec<String>,
    /// Rests ending at this time
    pub rests_off: Vec<String>,
    /// Id of the measure beginning at this time, when one does
    pub measure_on: Option<String>,
    /// Measure number; `None` when the label did not parse
    pub measure_no: Option<i32>,
    /// Owning system, by first-seen order
    pub system_no: Option<usize>,
    /// Owning page index
    pub page_no: Option<usize>,
    /// Tempo in effect, from the running context; `None` when unset
    pub tempo: Option<f64>,
}

/// The timemap itself: an ordered map from real-time key to entry.
#[derive(Debug, Clone, Default)]
pub struct Timemap {
    map: BTreeMap<Tstamp, TimemapEntry>,
    system_order: HashMap<String, usize>,
}

impl Timemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entries and the system-order bookkeeping.
    pub fn reset(&mut self) {
        self.map.clear();
        self.system_order.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Exact-key lookup.
    pub fn entry(&self, tstamp: f64) -> Option<&TimemapEntry> {
        self.map.get(&Tstamp(tstamp))
    }

    /// Entries in ascending key order.
    pub fn entries(&self) -> impl Iterator<Item = (f64, &TimemapEntry)> {
        self.map.iter().map(|(t, e)| (t.0, e))
    }

    /// Record a note, chord or rest at the element's onset and offset
    /// times, both adjusted by the running context's accumulated offsets.
    ///
    /// Rests are always indexed; the include-rests decision belongs to
    /// serialization.  A dangling address is skipped — one bad element
    /// never aborts the pass.
    pub fn record_element(&mut self, doc: &Document, addr: ElementAddress, ctx: &RunningContext) {
        let element = match doc.element_at(addr) {
            Some(e) => e,
            None => {
                log::debug!("timemap: skipping dangling element address {addr:?}");
                return;
            }
        };
        if !element.kind.has_duration() {
            return;
        }

        let real_start = ctx.real_offset_ms + element.onset * ctx.ms_per_quarter();
        let score_start = ctx.score_offset + element.onset;
        let duration = element.kind.duration();
        let real_end = real_start + duration * ctx.ms_per_quarter();
        let score_end = score_start + duration;

        let staff_no = doc.staff_at(addr).map_or(0, |s| s.n);
        let measure_no = doc
            .measure_at(addr.measure_address())
            .and_then(|m| m.number());
        let system_no = doc
            .system_at(addr.page, addr.system)
            .map(|s| s.id.clone())
            .map(|id| self.system_index(&id));
        let page_no = (addr.page < doc.pages.len()).then_some(addr.page);

        // One (pitch, ids) pair per sounding note; chord members carry
        // the chord's shared decorations as well as their own.
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
            ElementKind::Rest(_) => Vec::new(),
        };
        let is_rest = matches!(element.kind, ElementKind::Rest(_));

        let start_entry = self.map.entry(Tstamp(real_start)).or_default();
        start_entry.qstamp = score_start;
        for (pitch, ids) in &pitches {
            start_entry
                .notes_on
                .entry(*pitch)
                .or_insert_with(|| PitchEvent { staff: staff_no, ids: ids.clone() });
        }
        if is_rest {
            start_entry.rests_on.push(element.id.clone());
        }
        if measure_no.is_some() {
            start_entry.measure_no = measure_no;
        }
        if system_no.is_some() {
            start_entry.system_no = system_no;
        }
        if page_no.is_some() {
            start_entry.page_no = page_no;
        }
        if ctx.tempo.is_some() {
            start_entry.tempo = ctx.tempo;
        }

        let end_entry = self.map.entry(Tstamp(real_end)).or_default();
        end_entry.qstamp = score_end;
        for (pitch, ids) in &pitches {
            end_entry
                .notes_off
                .entry(*pitch)
                .or_insert_with(|| PitchEvent { staff: staff_no, ids: ids.clone() });
        }
        if is_rest {
            end_entry.rests_off.push(element.id.clone());
        }
        if measure_no.is_some() {
            end_entry.measure_no = measure_no;
        }
        if system_no.is_some() {
            end_entry.system_no = system_no;
        }
        if page_no.is_some() {
            end_entry.page_no = page_no;
        }
        if ctx.tempo.is_some() {
            end_entry.tempo = ctx.tempo;
        }
    }

    /// Record a measure-onset marker at the context's current offsets.
    pub fn record_measure(&mut self, doc: &Document, addr: MeasureAddress, ctx: &RunningContext) {
        let measure = match doc.measure_at(addr) {
            Some(m) => m,
            None => {
                log::debug!("timemap: skipping dangling measure address {addr:?}");
                return;
            }
        };

        let number = measure.number();
        if number.is_none() {
            log::warn!(
                "timemap: measure label {:?} is not numeric; leaving number unset",
                measure.label
            );
        }
        let system_no = doc
            .system_at(addr.page, addr.system)
            .map(|s| s.id.clone())
            .map(|id| self.system_index(&id));

        let entry = self.map.entry(Tstamp(ctx.real_offset_ms)).or_default();
        entry.qstamp = ctx.score_offset;
        entry.measure_on = Some(measure.id.clone());
        if number.is_some() {
            entry.measure_no = number;
        }
        if system_no.is_some() {
            entry.system_no = system_no;
        }
        if addr.page < doc.pages.len() {
            entry.page_no = Some(addr.page);
        }
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

    /// Project the map into serializable records, in ascending key order.
    ///
    /// Rest fields appear only with `include_rests`; the `measureOn` id
    /// only with `include_measure_ids`.  Tempo is emitted only when it
    /// differs from the previously emitted tempo, so consumers see every
    /// change exactly once; nothing has been emitted before the first
    /// record, so the first entry carrying a tempo always shows it.
    pub fn records(&self, include_rests: bool, include_measure_ids: bool) -> Vec<TimemapRecord> {
        let mut previous_tempo: Option<f64> = None;
        self.map
            .iter()
            .map(|(tstamp, entry)| {
                let tempo = match entry.tempo {
                    Some(t) if previous_tempo != Some(t) => {
                        previous_tempo = Some(t);
                        Some(t)
                    }
                    _ => None,
                };
                TimemapRecord {
                    tstamp: tstamp.0,
                    qstamp: entry.qstamp,
                    on: pitch_records(&entry.notes_on),
                    off: pitch_records(&entry.notes_off),
                    rests_on: if include_rests {
                        entry.rests_on.clone()
                    } else {
                        Vec::new()
                    },
                    rests_off: if include_rests {
                        entry.rests_off.clone()
                    } else {
                        Vec::new()
                    },
                    tempo,
                    measure_on: if include_measure_ids {
                        entry.measure_on.clone()
                    } else {
                        None
                    },
                    measure_no: entry.measure_no,
                    system_no: entry.system_no,
                    page_no: entry.page_no,
                }
            })
            .collect()
    }

    /// Serialize the record sequence as JSON.
    pub fn to_json(
        &self,
        include_rests: bool,
        include_measure_ids: bool,
    ) -> Result<String, EngraveError> {
        Ok(serde_json::to_string(
            &self.records(include_rests, include_measure_ids),
        )?)
    }
}

fn pitch_records(map: &BTreeMap<i32, PitchEvent>) -> Vec<PitchRecord> {
    map.iter()
        .map(|(pitch, event)| PitchRecord {
            pitch: *pitch,
            staff: event.staff,
            ids: event.ids.clone(),
        })
        .collect()
}

/// One record of the serialized timemap.  Empty and absent fields are
/// omitted from the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimemapRecord {
    pub tstamp: f64,
    pub qstamp: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<PitchRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub off: Vec<PitchRecord>,
    #[serde(default, rename = "restsOn", skip_serializing_if = "Vec::is_empty")]
    pub rests_on: Vec<String>,
    #[serde(default, rename = "restsOff", skip_serializing_if = "Vec::is_empty")]
    pub rests_off: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, rename = "measureOn", skip_serializing_if = "Option::is_none")]
    pub measure_on: Option<String>,
    #[serde(default, rename = "measureNo", skip_serializing_if = "Option::is_none")]
    pub measure_no: Option<i32>,
    #[serde(default, rename = "systemNo", skip_serializing_if = "Option::is_none")]
    pub system_no: Option<usize>,
    #[serde(default, rename = "pageNo", skip_serializing_if = "Option::is_none")]
    pub page_no: Option<usize>,
}

/// Per-pitch on/off record in the serialized output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchRecord {
    pub pitch: i32,
    pub staff: i32,
    pub ids: Vec<String>,
}

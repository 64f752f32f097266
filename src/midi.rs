//! MIDI file generation from the populated performance index.
//!
//! Produces a Standard MIDI File (SMF) Type 1 as raw bytes.  Track 0 is
//! the tempo map; one note track follows per staff seen in the index,
//! each on its own MIDI channel so shared pitches on different staves
//! cannot cancel each other's note-offs.  The note events come straight
//! from the tick index — the document is not re-traversed here.

use std::collections::BTreeSet;

use crate::midimap::PULSES_PER_QUARTER;
use crate::timing::TemporalIndex;

/// Options controlling MIDI rendering.
#[derive(Debug, Clone)]
pub struct MidiRenderOptions {
    /// Channel for the first staff's track
    pub channel: u8,
    /// Note-on velocity
    pub velocity: u8,
    /// General MIDI program number for all note tracks
    pub program: u8,
}

impl Default for MidiRenderOptions {
    fn default() -> Self {
        Self { channel: 0, velocity: 80, program: 0 }
    }
}

/// A single MIDI event (note on/off, program change, etc.)
#[derive(Debug, Clone)]
pub struct MidiEvent {
    /// Absolute time in ticks from the start of the track
    pub tick: u32,
    /// Raw MIDI message bytes (status + data)
    pub bytes: Vec<u8>,
}

/// Render the index into a complete Standard MIDI File (SMF Type 1).
pub fn render_midi(index: &TemporalIndex, options: &MidiRenderOptions) -> Vec<u8> {
    let mut staves: BTreeSet<i32> = BTreeSet::new();
    for entry in index.midimap.entries().values() {
        for event in entry.notes_on.values() {
            staves.insert(event.staff);
        }
        for event in entry.notes_off.values() {
            staves.insert(event.staff);
        }
    }

    let mut tracks: Vec<Vec<u8>> = Vec::new();
    tracks.push(build_tempo_track(&index.tempo_ticks));

    for (order, &staff) in staves.iter().enumerate() {
        let channel = staff_channel(order, options.channel);
        let mut events = vec![MidiEvent {
            tick: 0,
            bytes: vec![0xC0 | channel, options.program],
        }];

        for (&tick, entry) in index.midimap.entries() {
            let tick = tick.max(0) as u32;
            for (&pitch, event) in &entry.notes_on {
                if event.staff == staff {
                    let pitch = pitch.clamp(0, 127) as u8;
                    events.push(MidiEvent {
                        tick,
                        bytes: vec![0x90 | channel, pitch, options.velocity],
                    });
                }
            }
            for (&pitch, event) in &entry.notes_off {
                if event.staff == staff {
                    let pitch = pitch.clamp(0, 127) as u8;
                    events.push(MidiEvent {
                        tick,
                        bytes: vec![0x80 | channel, pitch, 0],
                    });
                }
            }
        }

        let name = format!("Staff {staff}");
        tracks.push(encode_track(&events, &name));
    }

    build_smf(&tracks)
}

/// Channel for the staff at first-seen position `order`.  The first staff
/// keeps the caller's channel; later staves use free channels, skipping
/// 1–3 (conventionally accompaniment) and 9 (drums).
fn staff_channel(order: usize, first: u8) -> u8 {
    match order {
        0 => first,
        1 => 7,
        2 => 8,
        3 => 11,
        _ => (12 + order as u8 - 4).min(15),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SMF byte encoding
// ═══════════════════════════════════════════════════════════════════════

/// Build the complete Standard MIDI File bytes.
fn build_smf(tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    // MThd header
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes()); // header length
    out.extend_from_slice(&1u16.to_be_bytes()); // format type 1
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&(PULSES_PER_QUARTER as u16).to_be_bytes());

    // Track chunks
    for track_data in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        out.extend_from_slice(track_data);
    }

    out
}

/// Build the tempo track (track 0) — contains tempo change meta-events.
fn build_tempo_track(tempo_ticks: &[(i64, f64)]) -> Vec<u8> {
    let mut events: Vec<MidiEvent> = Vec::new();
    let mut last_tempo: f64 = 0.0;

    for &(tick, bpm) in tempo_ticks {
        if (bpm - last_tempo).abs() > 0.01 {
            let uspq = (60_000_000.0 / bpm) as u32; // microseconds per quarter
            // Meta event: FF 51 03 tt tt tt
            events.push(MidiEvent {
                tick: tick.max(0) as u32,
                bytes: vec![
                    0xFF,
                    0x51,
                    0x03,
                    ((uspq >> 16) & 0xFF) as u8,
                    ((uspq >> 8) & 0xFF) as u8,
                    (uspq & 0xFF) as u8,
                ],
            });
            last_tempo = bpm;
        }
    }

    encode_track(&events, "Tempo")
}

/// Encode a track's events into raw MTrk bytes (delta-time encoded).
fn encode_track(events: &[MidiEvent], name: &str) -> Vec<u8> {
    let mut data = Vec::new();

    // Track name meta event
    let name_bytes = name.as_bytes();
    data.extend_from_slice(&[0x00]); // delta time 0
    data.push(0xFF);
    data.push(0x03); // track name
    write_vlq(&mut data, name_bytes.len() as u32);
    data.extend_from_slice(name_bytes);

    // Sort events by tick
    let mut sorted: Vec<&MidiEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.tick);

    let mut last_tick: u32 = 0;
    for event in &sorted {
        let delta = event.tick.saturating_sub(last_tick);
        write_vlq(&mut data, delta);
        data.extend_from_slice(&event.bytes);
        last_tick = event.tick;
    }

    // End of track
    data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

    data
}

/// Write a variable-length quantity (VLQ) to a byte vector.
fn write_vlq(out: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        out.push(0);
        return;
    }
    let mut buf = [0u8; 5];
    let mut i = 0;
    while value > 0 {
        buf[i] = (value & 0x7F) as u8;
        value >>= 7;
        if i > 0 {
            buf[i] |= 0x80;
        }
        i += 1;
    }
    // Write in reverse order
    for j in (0..i).rev() {
        out.push(buf[j]);
    }
}

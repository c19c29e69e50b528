// MIDI output for finished chorales.
//
// Writes a sequence of complete chords as a Standard MIDI File, one half
// note per chord. Track 0 carries the tempo; each voice gets its own track
// and channel, set to the choir program.
//
// Uses the `midly` crate. Output is SMF Format 1 (multi-track).

use crate::chord::{CompleteChord, Voice};
use crate::error::HarmonyError;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Each chord lasts a half note.
const TICKS_PER_CHORD: u32 = TICKS_PER_QUARTER as u32 * 2;

/// Choir aahs.
const CHOIR_PROGRAM: u8 = 52;

const VELOCITY: u8 = 80;

/// Write `chords` to `path` at `tempo_bpm` quarter notes per minute.
pub fn write_midi(chords: &[CompleteChord], path: &Path, tempo_bpm: u16) -> Result<(), HarmonyError> {
    let smf = chords_to_smf(chords, tempo_bpm);
    let mut buf = Vec::new();
    smf.write(&mut buf).map_err(|e| HarmonyError::Midi(e.to_string()))?;
    std::fs::write(path, &buf)?;
    Ok(())
}

fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind,
    }
}

fn chords_to_smf(chords: &[CompleteChord], tempo_bpm: u16) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let tempo_microseconds = 60_000_000 / u32::from(tempo_bpm.max(1));
    smf.tracks.push(vec![
        event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds)))),
        event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
    ]);

    for voice in Voice::ALL {
        let channel = u4::new(voice.index() as u8);
        let midi = |message: MidiMessage| -> TrackEventKind<'static> {
            TrackEventKind::Midi { channel, message }
        };
        let mut track: Track<'static> = vec![
            event(0, TrackEventKind::Meta(MetaMessage::TrackName(voice_label(voice).as_bytes()))),
            event(
                0,
                midi(MidiMessage::ProgramChange {
                    program: u7::new(CHOIR_PROGRAM),
                }),
            ),
        ];
        for chord in chords {
            let key = u7::new(chord.pitch(voice).clamp(0, 127) as u8);
            track.push(event(
                0,
                midi(MidiMessage::NoteOn {
                    key,
                    vel: u7::new(VELOCITY),
                }),
            ));
            track.push(event(
                TICKS_PER_CHORD,
                midi(MidiMessage::NoteOff { key, vel: u7::new(0) }),
            ));
        }
        track.push(event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
        smf.tracks.push(track);
    }

    smf
}

fn voice_label(voice: Voice) -> &'static str {
    match voice {
        Voice::Soprano => "Soprano",
        Voice::Alto => "Alto",
        Voice::Tenor => "Tenor",
        Voice::Bass => "Bass",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorale_theory::{RomanNumeral, Scale};

    fn chorale() -> Vec<CompleteChord> {
        let scale: Scale = "C major".parse().unwrap();
        [("I", ["C5", "G4", "E4", "C3"]), ("V", ["B4", "G4", "D4", "G2"])]
            .into_iter()
            .map(|(numeral, notes)| CompleteChord {
                numeral: RomanNumeral::parse(numeral, scale).unwrap(),
                notes: notes.map(|n| n.parse().unwrap()),
            })
            .collect()
    }

    #[test]
    fn test_chords_to_smf_tracks() {
        let smf = chords_to_smf(&chorale(), 72);
        // 1 tempo track + 4 voice tracks
        assert_eq!(smf.tracks.len(), 5);
        // name, program, two notes on/off, end of track
        assert_eq!(smf.tracks[1].len(), 2 + 4 + 1);
    }

    #[test]
    fn test_soprano_pitches_in_order() {
        let smf = chords_to_smf(&chorale(), 72);
        let keys: Vec<u8> = smf.tracks[1]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some(key.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, [72, 71]);
    }
}

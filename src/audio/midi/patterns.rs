//! Note patterns handed to the player by the generator or the grid editor

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PatternError;

/// MIDI note of the lowest editor grid row (C2)
pub const MIDI_NOTE_OFFSET: i32 = 36;

/// Editor grid height: four octaves
pub const GRID_ROWS: i32 = 48;

/// Slowest and fastest tempo the player accepts
pub const MIN_TEMPO: u32 = 40;
pub const MAX_TEMPO: u32 = 240;

/// A single timed note
///
/// Serialized as `{"note": 60, "step": 0, "duration": 1}`, the shape the
/// pattern generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Absolute MIDI note number (0-127)
    #[serde(rename = "note")]
    pub pitch: i32,
    /// Eighth-note slot the note starts on
    pub step: u32,
    /// Length in steps
    #[serde(default = "default_duration", deserialize_with = "duration_or_default")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    1
}

/// Generator output may carry `null` or fractional durations
fn duration_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(default_duration()),
        Some(steps) if steps.is_finite() && steps >= 0.0 && steps <= u32::MAX as f64 => {
            Ok(steps.round() as u32)
        }
        Some(steps) => Err(serde::de::Error::custom(format!(
            "invalid duration {}",
            steps
        ))),
    }
}

impl NoteEvent {
    pub const fn new(pitch: i32, step: u32, duration: u32) -> Self {
        Self {
            pitch,
            step,
            duration,
        }
    }

    /// Build a note from an editor grid row (0 = C2)
    pub const fn from_grid(row: i32, step: u32, duration: u32) -> Self {
        Self::new(row + MIDI_NOTE_OFFSET, step, duration)
    }

    /// Editor grid row for this pitch, if it falls on the grid
    pub fn grid_row(&self) -> Option<i32> {
        let row = self.pitch - MIDI_NOTE_OFFSET;
        (0..GRID_ROWS).contains(&row).then_some(row)
    }

    /// Check the note can be scheduled, returning the reason if not
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=127).contains(&self.pitch) {
            return Err(format!("pitch {} is outside MIDI range 0-127", self.pitch));
        }
        if self.duration == 0 {
            return Err("duration must be at least 1 step".to_string());
        }
        Ok(())
    }
}

/// Stylistic category of a pattern; only drives timbre
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    #[default]
    Melody,
    Bassline,
    Drums,
    Harmony,
}

impl PatternType {
    pub const ALL: [PatternType; 4] = [
        PatternType::Melody,
        PatternType::Bassline,
        PatternType::Drums,
        PatternType::Harmony,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Melody => "melody",
            PatternType::Bassline => "bassline",
            PatternType::Drums => "drums",
            PatternType::Harmony => "harmony",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        PatternType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| PatternError::UnknownPatternType(s.to_string()))
    }
}

/// Everything the player needs to render a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub notes: Vec<NoteEvent>,
    pub tempo: u32,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
}

impl Pattern {
    pub fn new(notes: Vec<NoteEvent>, tempo: u32, pattern_type: PatternType) -> Self {
        Self {
            notes,
            tempo,
            pattern_type,
        }
    }

    /// Latest start step, or None for an empty pattern
    pub fn max_step(&self) -> Option<u32> {
        self.notes.iter().map(|n| n.step).max()
    }

    /// Steps until the last note ends
    pub fn length_in_steps(&self) -> u32 {
        self.notes
            .iter()
            .map(|n| n.step.saturating_add(n.duration.max(1)))
            .max()
            .unwrap_or(0)
    }

    /// Parse a whole pattern document
    pub fn from_json(text: &str) -> Result<Self, PatternError> {
        let mut pattern: Pattern = serde_json::from_str(text)?;
        normalize_durations(&mut pattern.notes);
        Ok(pattern)
    }
}

/// Extract a note array from generator output
///
/// Accepts a bare JSON array, or one wrapped in a json fenced block. Missing or
/// zero durations become one step.
pub fn parse_note_list(text: &str) -> Result<Vec<NoteEvent>, PatternError> {
    let candidate = fenced_json(text)
        .or_else(|| bracketed_array(text))
        .unwrap_or(text)
        .trim();

    let value: serde_json::Value = serde_json::from_str(candidate)?;
    if !value.is_array() {
        return Err(PatternError::NotAnArray);
    }

    let mut notes: Vec<NoteEvent> = serde_json::from_value(value)?;
    normalize_durations(&mut notes);
    Ok(notes)
}

fn normalize_durations(notes: &mut [NoteEvent]) {
    for note in notes.iter_mut().filter(|n| n.duration == 0) {
        note.duration = 1;
    }
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

fn bracketed_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_mapping() {
        let note = NoteEvent::from_grid(24, 0, 1);
        assert_eq!(note.pitch, 60);
        assert_eq!(note.grid_row(), Some(24));

        assert_eq!(NoteEvent::new(35, 0, 1).grid_row(), None);
        assert_eq!(NoteEvent::new(84, 0, 1).grid_row(), None);
        assert_eq!(NoteEvent::new(83, 0, 1).grid_row(), Some(47));
    }

    #[test]
    fn test_validate() {
        assert!(NoteEvent::new(60, 0, 1).validate().is_ok());
        assert!(NoteEvent::new(128, 0, 1).validate().is_err());
        assert!(NoteEvent::new(-1, 0, 1).validate().is_err());
        assert!(NoteEvent::new(60, 0, 0).validate().is_err());
    }

    #[test]
    fn test_pattern_type_parsing() {
        assert_eq!("bassline".parse::<PatternType>().unwrap(), PatternType::Bassline);
        assert_eq!(" Harmony ".parse::<PatternType>().unwrap(), PatternType::Harmony);
        assert!(matches!(
            "polka".parse::<PatternType>(),
            Err(PatternError::UnknownPatternType(_))
        ));
    }

    #[test]
    fn test_parse_bare_array() {
        let notes =
            parse_note_list(r#"[{"note": 60, "step": 0, "duration": 2}, {"note": 64, "step": 2}]"#)
                .unwrap();
        assert_eq!(notes, vec![NoteEvent::new(60, 0, 2), NoteEvent::new(64, 2, 1)]);
    }

    #[test]
    fn test_parse_fenced_block_with_chatter() {
        let text = "Here you go:\n```json\n[{\"note\": 36, \"step\": 4, \"duration\": 0}]\n```\nEnjoy!";
        let notes = parse_note_list(text).unwrap();
        assert_eq!(notes, vec![NoteEvent::new(36, 4, 1)]);
    }

    #[test]
    fn test_parse_null_and_fractional_durations() {
        let notes = parse_note_list(
            r#"[{"note": 60, "step": 0, "duration": null}, {"note": 62, "step": 1, "duration": 2.0}]"#,
        )
        .unwrap();
        assert_eq!(notes, vec![NoteEvent::new(60, 0, 1), NoteEvent::new(62, 1, 2)]);

        assert!(matches!(
            parse_note_list(r#"[{"note": 60, "step": 0, "duration": -3}]"#),
            Err(PatternError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_objects() {
        assert!(matches!(
            parse_note_list(r#"{"note": 60, "step": 0}"#),
            Err(PatternError::NotAnArray)
        ));
        assert!(matches!(parse_note_list("no notes here"), Err(PatternError::Json(_))));
    }

    #[test]
    fn test_pattern_document() {
        let pattern = Pattern::from_json(
            r#"{"notes": [{"note": 40, "step": 6, "duration": 2}], "tempo": 100, "type": "bassline"}"#,
        )
        .unwrap();
        assert_eq!(pattern.tempo, 100);
        assert_eq!(pattern.pattern_type, PatternType::Bassline);
        assert_eq!(pattern.max_step(), Some(6));
        assert_eq!(pattern.length_in_steps(), 8);
    }
}

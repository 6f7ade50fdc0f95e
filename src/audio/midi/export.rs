//! Human-readable pattern export
//!
//! This is the "Download MIDI" text: a header describing the pattern followed
//! by one line per note. It is a description for people, not a binary file.

use std::fmt::Write;

use super::patterns::{Pattern, PatternType};

/// Title line of every export
pub const EXPORT_TITLE: &str = "Audiomancer MIDI Export";

/// Render `pattern` as text; `key` and `scale` are the generator settings it was made with
pub fn export_text(pattern: &Pattern, key: &str, scale: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", EXPORT_TITLE);
    let _ = writeln!(out, "Key: {} {}", key, scale);
    let _ = writeln!(out, "Tempo: {} BPM", pattern.tempo);
    let _ = writeln!(out, "Type: {}", pattern.pattern_type);
    let _ = writeln!(out, "Notes: {}", pattern.notes.len());
    out.push('\n');

    let lines: Vec<String> = pattern
        .notes
        .iter()
        .map(|n| format!("Note {} at step {} (duration {})", n.pitch, n.step, n.duration))
        .collect();
    out.push_str(&lines.join("\n"));
    out
}

/// Suggested download name, e.g. `audiomancer-bassline.txt`
pub fn export_file_name(pattern_type: PatternType) -> String {
    format!("audiomancer-{}.txt", pattern_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::midi::patterns::NoteEvent;

    #[test]
    fn test_export_text() {
        let pattern = Pattern::new(
            vec![NoteEvent::new(60, 0, 1), NoteEvent::new(64, 2, 2)],
            120,
            PatternType::Melody,
        );
        let text = export_text(&pattern, "C", "Major");
        assert_eq!(
            text,
            "Audiomancer MIDI Export\n\
             Key: C Major\n\
             Tempo: 120 BPM\n\
             Type: melody\n\
             Notes: 2\n\
             \n\
             Note 60 at step 0 (duration 1)\n\
             Note 64 at step 2 (duration 2)"
        );
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name(PatternType::Bassline), "audiomancer-bassline.txt");
    }
}

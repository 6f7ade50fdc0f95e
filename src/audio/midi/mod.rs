//! Note patterns and their playback
//!
//! Provides the pattern model, session scheduling, completion timing and
//! playback events.

pub mod events;
pub mod export;
pub mod patterns;
mod player;
mod timer;

pub use events::{PlaybackEvent, PlaybackListener};
pub use export::{export_file_name, export_text};
pub use patterns::{parse_note_list, NoteEvent, Pattern, PatternType};
pub use player::{PatternPlayer, TAIL_STEPS};

//! Turning generated diary text into a structured entry.

mod parser;

pub use parser::{DiaryParser, DiaryTextParser};

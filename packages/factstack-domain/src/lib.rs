pub mod dictionary;
pub mod language;
pub mod text;

//! Модуль для работы с субтитрами
//!
//! Субтитры строятся по временной шкале итоговой дорожки.

pub mod writer;

pub use writer::{render_srt, render_vtt, subtitles_from_timeline, write_subtitles, Subtitle};

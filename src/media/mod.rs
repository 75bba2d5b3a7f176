//! Модуль для работы с аудио
//!
//! Этот модуль содержит работу с WAV буферами и сборку итоговой дорожки.

pub mod audio;
pub mod timeline;

pub use audio::AudioBuffer;
pub use timeline::{
    build_timeline, AssembledTrack, TimelineAssembler, TimelineEntry, TimelineMetadata,
};

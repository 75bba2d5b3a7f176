//! Модуль голосов
//!
//! Этот модуль содержит каталог голосов и разрешение их параметров синтеза.

pub mod catalog;

pub use catalog::{SynthesisDefaults, VoiceCatalog, VoiceProfile};

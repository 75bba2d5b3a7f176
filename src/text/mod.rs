//! Модуль для работы с текстом статьи
//!
//! Этот модуль содержит разбиение статьи на фрагменты с голосовыми метками
//! и подготовку текста фрагмента для синтеза.

pub mod markers;
pub mod normalize;
pub mod splitter;
pub mod strategies;

use serde::{Deserialize, Serialize};

pub use normalize::TextNormalizer;
pub use splitter::ArticleSplitter;

/// Голос по умолчанию
pub const DEFAULT_VOICE: &str = "main";

/// Фрагмент текста, озвучиваемый одним вызовом синтеза
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// Порядковый номер фрагмента в статье
    pub index: usize,
    /// Текст фрагмента
    pub text: String,
    /// Идентификатор голоса
    pub voice_id: String,
}

/// Длина текста в символах
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

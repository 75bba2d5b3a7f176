//! Модуль обработки ошибок библиотеки tts-article
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при озвучивании статьи.

use thiserror::Error;

/// Ошибки библиотеки tts-article
#[derive(Debug, Error)]
pub enum TtsArticleError {
    /// Ошибка HTTP запроса к движку синтеза
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка разбора TOML конфигурации
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Голос не найден в каталоге (и нет голоса по умолчанию)
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// В статье нет текста для озвучивания
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Движок синтеза недоступен
    #[error("Synthesis engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Ошибка синтеза речи
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Нечего собирать в итоговую дорожку
    #[error("No clips to assemble")]
    NoClips,

    /// Генерация остановлена после ошибки другого фрагмента
    #[error("Generation cancelled")]
    Cancelled,

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for TtsArticleError {
    fn from(s: &str) -> Self {
        TtsArticleError::Other(s.to_string())
    }
}

impl From<String> for TtsArticleError {
    fn from(s: String) -> Self {
        TtsArticleError::Other(s)
    }
}

/// Тип Result для библиотеки tts-article
pub type Result<T> = std::result::Result<T, TtsArticleError>;

//! Модуль конфигурации библиотеки tts-article
//!
//! Конфигурация читается из TOML файла. Все поля, кроме голосов, имеют значения
//! по умолчанию, поэтому минимальный файл содержит только секцию `[voices.main]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsArticleError};
use crate::text::DEFAULT_VOICE;

/// Формат файла субтитров, сопровождающего итоговое аудио
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// SubRip
    Srt,
    /// WebVTT
    Vtt,
    /// Субтитры не создаются
    None,
}

impl Default for SubtitleFormat {
    fn default() -> Self {
        Self::Srt
    }
}

impl SubtitleFormat {
    /// Расширение файла субтитров
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Srt => Some("srt"),
            Self::Vtt => Some("vtt"),
            Self::None => None,
        }
    }
}

/// Параметры подключения к серверу синтеза
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Базовый адрес сервера
    pub endpoint: String,
    /// Таймаут одного запроса в секундах
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7860".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Настройки одного голоса
///
/// Необязательные поля переопределяют глобальные параметры синтеза.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Референсная запись голоса (WAV)
    pub ref_audio: PathBuf,
    /// Текст референсной записи
    #[serde(default)]
    pub ref_text: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub nfe_step: Option<u32>,
    #[serde(default)]
    pub cfg_strength: Option<f32>,
    #[serde(default)]
    pub target_rms: Option<f32>,
}

impl VoiceConfig {
    /// Голос без переопределений
    pub fn new(ref_audio: impl Into<PathBuf>) -> Self {
        Self {
            ref_audio: ref_audio.into(),
            ref_text: None,
            speed: None,
            nfe_step: None,
            cfg_strength: None,
            target_rms: None,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsArticleConfig {
    /// Файл статьи
    pub input_article: PathBuf,
    /// Директория результатов
    pub output_dir: PathBuf,
    /// Максимальная длина фрагмента в символах
    pub max_sentence_length: usize,
    /// Название модели (записывается в метаданные)
    pub model_name: String,
    /// Количество шагов сэмплирования
    pub nfe_step: u32,
    /// Сила guidance
    pub cfg_strength: f32,
    /// Скорость речи
    pub speed: f32,
    /// Целевая громкость (RMS)
    pub target_rms: f32,
    /// Размер пула задач генерации
    pub workers: usize,
    /// Переиспользовать ранее сгенерированные фрагменты
    pub enable_cache: bool,
    /// Зерно генератора случайных чисел движка
    pub seed: Option<u64>,
    /// Пауза между повторяющимися фрагментами, мс
    pub repeat_gap_ms: u64,
    /// Тишина в конце каждого фрагмента, мс
    pub tail_silence_ms: u64,
    /// Длительность затухания в конце фрагмента, мс
    pub fade_out_ms: u64,
    /// Общий файл с текстом референсных записей
    pub shared_transcript: Option<PathBuf>,
    pub subtitle_format: SubtitleFormat,
    /// Преобразовывать арабские цифры в китайские числительные
    pub convert_numbers: bool,
    /// Словарь замен для многозначных иероглифов
    pub polyphones: BTreeMap<String, String>,
    pub engine: EngineConfig,
    pub voices: BTreeMap<String, VoiceConfig>,
}

impl Default for TtsArticleConfig {
    fn default() -> Self {
        let mut voices = BTreeMap::new();
        voices.insert(DEFAULT_VOICE.to_string(), VoiceConfig::new("voices/main.wav"));

        Self {
            input_article: PathBuf::from("article.txt"),
            output_dir: PathBuf::from("output"),
            max_sentence_length: 200,
            model_name: "F5-TTS".to_string(),
            nfe_step: 32,
            cfg_strength: 2.0,
            speed: 1.0,
            target_rms: 0.1,
            workers: 4,
            enable_cache: true,
            seed: None,
            repeat_gap_ms: 200,
            tail_silence_ms: 150,
            fade_out_ms: 30,
            shared_transcript: None,
            subtitle_format: SubtitleFormat::default(),
            convert_numbers: false,
            polyphones: BTreeMap::new(),
            engine: EngineConfig::default(),
            voices,
        }
    }
}

impl TtsArticleConfig {
    /// Прочитать конфигурацию из TOML файла
    ///
    /// Относительные пути внутри файла считаются от директории файла.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TtsArticleError::FileNotFound(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Разобрать конфигурацию из строки TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Директория кэша фрагментов
    pub fn audio_dir(&self) -> PathBuf {
        self.output_dir.join("audio")
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !base.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.input_article);
        resolve(&mut self.output_dir);
        if let Some(transcript) = self.shared_transcript.as_mut() {
            resolve(transcript);
        }
        for voice in self.voices.values_mut() {
            resolve(&mut voice.ref_audio);
        }
    }

    /// Проверить конфигурацию
    ///
    /// Возвращает список найденных проблем. Пустой список означает корректную конфигурацию.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_sentence_length == 0 || self.max_sentence_length > 1000 {
            errors.push(format!(
                "max_sentence_length must be between 1 and 1000, got {}",
                self.max_sentence_length
            ));
        }
        if !(self.speed > 0.0 && self.speed <= 3.0) {
            errors.push(format!("speed must be in (0, 3], got {}", self.speed));
        }
        if self.nfe_step == 0 {
            errors.push("nfe_step must be positive".to_string());
        }
        if self.cfg_strength < 0.0 {
            errors.push(format!("cfg_strength must be non-negative, got {}", self.cfg_strength));
        }
        if self.workers == 0 {
            errors.push("workers must be at least 1".to_string());
        }
        if self.voices.is_empty() {
            errors.push("at least one voice must be configured".to_string());
        }

        for (name, voice) in &self.voices {
            let audio = &voice.ref_audio;
            if !audio.exists() {
                errors.push(format!(
                    "voice '{}': reference audio not found: {}",
                    name,
                    audio.display()
                ));
            } else if !audio.is_file() {
                errors.push(format!(
                    "voice '{}': reference audio is not a file: {}",
                    name,
                    audio.display()
                ));
            } else if !has_wav_extension(audio) {
                errors.push(format!(
                    "voice '{}': reference audio must be a .wav file: {}",
                    name,
                    audio.display()
                ));
            }

            if let Some(speed) = voice.speed {
                if !(speed > 0.0 && speed <= 3.0) {
                    errors.push(format!(
                        "voice '{}': speed must be in (0, 3], got {}",
                        name, speed
                    ));
                }
            }
            if voice.nfe_step == Some(0) {
                errors.push(format!("voice '{}': nfe_step must be positive", name));
            }
            if let Some(cfg) = voice.cfg_strength {
                if cfg < 0.0 {
                    errors.push(format!(
                        "voice '{}': cfg_strength must be non-negative, got {}",
                        name, cfg
                    ));
                }
            }
        }

        errors
    }

    /// Проверить конфигурацию и вернуть ошибку при первых же проблемах
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        for e in &errors {
            log::error!("Config: {}", e);
        }
        Err(TtsArticleError::Configuration(errors.join("; ")))
    }
}

fn has_wav_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

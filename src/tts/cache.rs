//! Модуль для кэширования результатов синтеза
//!
//! Имя файла фрагмента однозначно определяется голосом и текстом,
//! поэтому повторный запуск на той же статье не вызывает движок.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Максимальная длина читаемой части имени файла
const SLUG_MAX_LEN: usize = 40;
/// Длина хэш-суффикса
const HASH_LEN: usize = 8;

/// Кэш сгенерированных фрагментов
#[derive(Debug, Clone)]
pub struct SynthesisCache {
    /// Директория фрагментов
    audio_dir: PathBuf,
    /// Переиспользовать существующие файлы
    enabled: bool,
}

impl SynthesisCache {
    /// Создать новый экземпляр SynthesisCache
    pub fn new(audio_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            enabled,
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Путь к файлу фрагмента
    ///
    /// Имя имеет вид `{voice}_{slug}_{hash}.wav`, при пустом slug `{voice}_{hash}.wav`.
    pub fn path_for(&self, voice_id: &str, text: &str) -> PathBuf {
        self.audio_dir.join(file_name_for(voice_id, text))
    }

    /// Есть ли пригодный файл фрагмента
    ///
    /// Файл, который не читается как WAV или не содержит сэмплов, считается отсутствующим.
    pub fn exists(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        match hound::WavReader::open(path) {
            Ok(reader) if reader.duration() > 0 => true,
            Ok(_) => {
                log::warn!("Cached clip {} is empty, regenerating", path.display());
                false
            }
            Err(e) => {
                log::warn!(
                    "Cached clip {} is not a valid WAV ({}), regenerating",
                    path.display(),
                    e
                );
                false
            }
        }
    }

    /// Проверить кэш с учетом флага `enabled`
    pub fn lookup(&self, path: &Path) -> bool {
        self.enabled && self.exists(path)
    }

    /// Удалить все фрагменты из директории кэша
    pub fn clear(&self) -> Result<usize> {
        if !self.audio_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.audio_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_wav = path.extension().map(|e| e == "wav").unwrap_or(false);
            if entry.file_type()?.is_file() && is_wav {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        log::info!("Removed {} cached clips from {}", removed, self.audio_dir.display());
        Ok(removed)
    }
}

/// Имя файла фрагмента
pub fn file_name_for(voice_id: &str, text: &str) -> String {
    let voice = sanitize_voice(voice_id);
    let hash = content_hash(voice_id, text);
    let slug = slugify(text);

    if slug.is_empty() {
        format!("{}_{}.wav", voice, hash)
    } else {
        format!("{}_{}_{}.wav", voice, slug, hash)
    }
}

/// Читаемая часть имени: латинские буквы и цифры, пробелы заменены на `_`
pub fn slugify(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    filtered
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(SLUG_MAX_LEN)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

fn sanitize_voice(voice_id: &str) -> String {
    let sanitized: String = voice_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "voice".to_string()
    } else {
        sanitized
    }
}

fn content_hash(voice_id: &str, text: &str) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(voice_id.as_bytes());
    hasher.consume([0u8]);
    hasher.consume(text.as_bytes());

    let digest = format!("{:x}", hasher.compute());
    digest[..HASH_LEN].to_string()
}

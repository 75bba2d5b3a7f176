//! Каталог голосов
//!
//! Каталог сопоставляет идентификатор голоса из разметки статьи с референсной
//! записью, ее текстом и параметрами синтеза.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::{TtsArticleConfig, VoiceConfig};
use crate::error::{Result, TtsArticleError};
use crate::text::DEFAULT_VOICE;

/// Глобальные параметры синтеза
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisDefaults {
    pub speed: f32,
    pub guidance_steps: u32,
    pub guidance_strength: f32,
    pub target_loudness: f32,
}

impl SynthesisDefaults {
    /// Взять параметры из конфигурации
    pub fn from_config(config: &TtsArticleConfig) -> Self {
        Self {
            speed: config.speed,
            guidance_steps: config.nfe_step,
            guidance_strength: config.cfg_strength,
            target_loudness: config.target_rms,
        }
    }
}

/// Разрешенный голос
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Идентификатор голоса в каталоге
    pub id: String,
    /// Референсная запись
    pub reference_audio: PathBuf,
    /// Текст референсной записи, пустая строка означает автоматическое распознавание
    pub reference_transcript: String,
    pub speed: f32,
    pub guidance_steps: u32,
    pub guidance_strength: f32,
    pub target_loudness: f32,
}

/// Каталог голосов
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, VoiceConfig>,
    defaults: SynthesisDefaults,
    shared_transcript: Option<PathBuf>,
}

impl VoiceCatalog {
    /// Создать новый экземпляр VoiceCatalog
    pub fn new(
        voices: BTreeMap<String, VoiceConfig>,
        defaults: SynthesisDefaults,
        shared_transcript: Option<PathBuf>,
    ) -> Self {
        Self {
            voices,
            defaults,
            shared_transcript,
        }
    }

    /// Создать каталог из конфигурации
    pub fn from_config(config: &TtsArticleConfig) -> Self {
        Self::new(
            config.voices.clone(),
            SynthesisDefaults::from_config(config),
            config.shared_transcript.clone(),
        )
    }

    pub fn contains(&self, voice_id: &str) -> bool {
        self.voices.contains_key(voice_id)
    }

    /// Разрешить голос
    ///
    /// Неизвестный голос заменяется голосом по умолчанию. Ошибка возвращается,
    /// если нет ни запрошенного голоса, ни голоса по умолчанию, а также если
    /// референсная запись отсутствует или не является WAV.
    pub fn resolve(&self, voice_id: &str) -> Result<VoiceProfile> {
        let (id, voice) = match self.voices.get_key_value(voice_id) {
            Some(found) => found,
            None => match self.voices.get_key_value(DEFAULT_VOICE) {
                Some(found) => {
                    log::warn!(
                        "Voice '{}' is not configured, falling back to '{}'",
                        voice_id,
                        DEFAULT_VOICE
                    );
                    found
                }
                None => {
                    return Err(TtsArticleError::VoiceNotFound(format!(
                        "'{}' is not configured and there is no '{}' voice to fall back to",
                        voice_id, DEFAULT_VOICE
                    )));
                }
            },
        };

        validate_reference_audio(id, &voice.ref_audio)?;

        Ok(VoiceProfile {
            id: id.clone(),
            reference_audio: voice.ref_audio.clone(),
            reference_transcript: self.transcript_for(voice),
            speed: voice.speed.unwrap_or(self.defaults.speed),
            guidance_steps: voice.nfe_step.unwrap_or(self.defaults.guidance_steps),
            guidance_strength: voice.cfg_strength.unwrap_or(self.defaults.guidance_strength),
            target_loudness: voice.target_rms.unwrap_or(self.defaults.target_loudness),
        })
    }

    /// Разрешить все голоса сразу
    ///
    /// Возвращает ошибку на первом голосе, который не удалось разрешить.
    pub fn resolve_all<'a, I>(&self, voice_ids: I) -> Result<BTreeMap<String, VoiceProfile>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: BTreeSet<&str> = voice_ids.into_iter().collect();
        let mut profiles = BTreeMap::new();
        for voice_id in unique {
            let profile = self.resolve(voice_id)?;
            log::debug!(
                "Voice '{}' -> {} (transcript: {} chars)",
                voice_id,
                profile.reference_audio.display(),
                profile.reference_transcript.chars().count()
            );
            profiles.insert(voice_id.to_string(), profile);
        }
        Ok(profiles)
    }

    /// Текст референсной записи
    ///
    /// Порядок поиска: значение из конфигурации, файл `.txt` рядом с записью,
    /// общий файл проекта, пустая строка.
    fn transcript_for(&self, voice: &VoiceConfig) -> String {
        if let Some(text) = voice.ref_text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return text.to_string();
        }

        let sibling = voice.ref_audio.with_extension("txt");
        if let Some(text) = read_transcript(&sibling) {
            return text;
        }

        if let Some(text) = self.shared_transcript.as_deref().and_then(read_transcript) {
            return text;
        }

        String::new()
    }
}

fn read_transcript(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Failed to read transcript {}: {}", path.display(), e);
            None
        }
    }
}

fn validate_reference_audio(voice_id: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(TtsArticleError::Configuration(format!(
            "voice '{}': reference audio not found: {}",
            voice_id,
            path.display()
        )));
    }
    hound::WavReader::open(path).map_err(|e| {
        TtsArticleError::Configuration(format!(
            "voice '{}': reference audio {} is not a valid WAV: {}",
            voice_id,
            path.display(),
            e
        ))
    })?;
    Ok(())
}

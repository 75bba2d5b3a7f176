//! Интерфейс движка синтеза речи

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::audio::AudioBuffer;
use crate::voice::VoiceProfile;

/// Запрос на синтез одного фрагмента
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Референсная запись голоса
    pub reference_audio: PathBuf,
    /// Текст референсной записи (пустой для автоматического распознавания)
    pub reference_transcript: String,
    /// Текст для синтеза
    pub text: String,
    /// Куда движок должен записать результат
    pub output_path: PathBuf,
    pub speed: f32,
    pub guidance_steps: u32,
    pub guidance_strength: f32,
    pub target_loudness: f32,
    pub seed: Option<u64>,
}

impl SynthesisRequest {
    /// Собрать запрос из профиля голоса
    pub fn from_profile(
        profile: &VoiceProfile,
        text: impl Into<String>,
        output_path: impl Into<PathBuf>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            reference_audio: profile.reference_audio.clone(),
            reference_transcript: profile.reference_transcript.clone(),
            text: text.into(),
            output_path: output_path.into(),
            speed: profile.speed,
            guidance_steps: profile.guidance_steps,
            guidance_strength: profile.guidance_strength,
            target_loudness: profile.target_loudness,
            seed,
        }
    }
}

/// Движок синтеза речи
///
/// Движок не допускает параллельных вызовов, поэтому методы принимают `&mut self`.
#[async_trait]
pub trait SynthesisEngine: Send {
    /// Название движка для логов
    fn name(&self) -> &str;

    /// Проверить, что движок готов принимать запросы
    async fn ensure_ready(&mut self) -> Result<()>;

    /// Синтезировать речь
    ///
    /// Движок может записать результат в `output_path` сам. Если файла нет,
    /// вызывающая сторона записывает возвращенный буфер.
    async fn synthesize(&mut self, request: &SynthesisRequest) -> Result<AudioBuffer>;
}

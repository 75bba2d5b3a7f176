//! Основной файл библиотеки tts-article
//!
//! Библиотека озвучивает длинные статьи голосами, клонированными по
//! референсным записям: статья разбивается на фрагменты с голосовыми
//! метками, фрагменты синтезируются с кэшированием и склеиваются в одну
//! дорожку с метаданными и субтитрами.

pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod notification;
pub mod progress;
pub mod subtitle;
pub mod text;
pub mod tts;
pub mod voice;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::TtsArticleConfig;
use crate::error::{Result, TtsArticleError};
use crate::media::timeline::TimelineAssembler;
use crate::progress::{ProcessStep, ProgressObserver, ProgressReporter, ProgressTracker};
use crate::text::{ArticleSplitter, TextUnit, DEFAULT_VOICE};
use crate::tts::{
    share_engine, GenerationScheduler, HttpSynthesisEngine, SharedEngine, SynthesisEngine,
};
use crate::voice::VoiceCatalog;

/// Результат озвучивания статьи
#[derive(Debug, Clone)]
pub struct ArticleOutput {
    /// Итоговое аудио
    pub final_audio: PathBuf,
    /// Файл метаданных
    pub metadata_path: PathBuf,
    /// Файл субтитров, если он создавался
    pub subtitle_path: Option<PathBuf>,
    pub segment_count: usize,
    /// Длительность итогового аудио в секундах
    pub total_duration: f64,
    /// Сколько фрагментов сгенерировано движком
    pub synthesized: usize,
    /// Сколько фрагментов взято из кэша
    pub reused: usize,
}

/// Основная структура для работы с библиотекой
pub struct TtsArticle {
    /// Конфигурация библиотеки
    config: TtsArticleConfig,
    /// Движок синтеза
    engine: SharedEngine,
    /// Трекер прогресса
    progress_tracker: Option<Arc<ProgressTracker>>,
}

impl TtsArticle {
    /// Создать новый экземпляр TtsArticle с указанным движком
    pub fn new(config: TtsArticleConfig, engine: Box<dyn SynthesisEngine>) -> Self {
        Self {
            config,
            engine: share_engine(engine),
            progress_tracker: None,
        }
    }

    /// Создать экземпляр с HTTP движком из конфигурации
    pub fn with_http_engine(config: TtsArticleConfig) -> Result<Self> {
        let engine = HttpSynthesisEngine::new(&config.engine)?;
        Ok(Self::new(config, Box::new(engine)))
    }

    /// Создать новый экземпляр TtsArticle с репортером прогресса
    pub fn with_progress_reporter(
        config: TtsArticleConfig,
        engine: Box<dyn SynthesisEngine>,
        reporter: Box<dyn ProgressReporter>,
    ) -> Self {
        let mut article = Self::new(config, engine);
        article.set_progress_reporter(reporter);
        article
    }

    /// Подключить репортер прогресса
    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.tracker().set_reporter(reporter);
    }

    /// Добавить наблюдателя прогресса
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        self.tracker().add_observer(observer)
    }

    fn tracker(&mut self) -> &Arc<ProgressTracker> {
        self.progress_tracker.get_or_insert_with(|| Arc::new(ProgressTracker::new()))
    }

    pub fn config(&self) -> &TtsArticleConfig {
        &self.config
    }

    /// Разбить текст статьи на фрагменты
    pub fn segment(&self, article: &str) -> Vec<TextUnit> {
        ArticleSplitter::new(self.config.max_sentence_length).split(article, DEFAULT_VOICE)
    }

    /// Основной метод: озвучить статью из конфигурации
    pub async fn process(&self) -> Result<ArticleOutput> {
        log::info!("Starting article narration: {}", self.config.input_article.display());
        let tracker = self.progress_tracker.as_ref();

        self.config.ensure_valid()?;

        // 1. Разбиение статьи
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Segmentation);
            t.update_step_progress(0.0, Some("Чтение статьи".to_string()));
        }

        let input = &self.config.input_article;
        if !tokio::fs::metadata(input).await.map(|m| m.is_file()).unwrap_or(false) {
            let error = format!("Input article not found: {}", input.display());
            log::error!("{}", error);
            return Err(TtsArticleError::FileNotFound(error));
        }
        let article = tokio::fs::read_to_string(input).await?;

        let units = self.segment(&article);
        if units.is_empty() {
            log::error!("No text to narrate in {}", input.display());
            return Err(TtsArticleError::EmptyInput(format!(
                "{} contains no text to narrate",
                input.display()
            )));
        }
        log::info!("Article split into {} units", units.len());

        if let Some(t) = tracker {
            t.update_step_progress(100.0, Some(format!("Фрагментов: {}", units.len())));
        }

        // 2. Проверка голосов
        if let Some(t) = tracker {
            t.set_step(ProcessStep::VoiceResolution);
        }
        let catalog = VoiceCatalog::from_config(&self.config);
        let profiles = catalog.resolve_all(units.iter().map(|u| u.voice_id.as_str()))?;
        if let Some(t) = tracker {
            t.update_step_progress(100.0, Some(format!("Голосов: {}", profiles.len())));
        }

        // 3. Генерация речи
        if let Some(t) = tracker {
            t.set_step(ProcessStep::SpeechGeneration);
        }
        let mut scheduler = GenerationScheduler::from_config(self.engine.clone(), &self.config);
        if let Some(t) = tracker {
            scheduler = scheduler.with_progress(t.clone());
        }
        let report = scheduler.run(&units, &catalog).await?;

        // 4. Сборка итоговой дорожки
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Assembly);
            t.update_step_progress(0.0, Some("Склейка фрагментов".to_string()));
        }
        let assembler = TimelineAssembler::new(&self.config.output_dir, self.config.repeat_gap_ms)
            .with_model_name(&self.config.model_name);
        let track = assembler.assemble(&report.clips, input).await?;

        let subtitle_path = match self.config.subtitle_format.extension() {
            Some(ext) => {
                let path = track.audio_path.with_extension(ext);
                subtitle::write_subtitles(&track.timeline, self.config.subtitle_format, &path)?;
                Some(path)
            }
            None => None,
        };

        if let Some(t) = tracker {
            t.update_step_progress(100.0, Some("Сборка завершена".to_string()));
            t.complete();
        }

        log::info!(
            "Narration completed: {} ({:.2}s, {} synthesized, {} reused)",
            track.audio_path.display(),
            track.total_duration,
            report.synthesized,
            report.reused
        );

        Ok(ArticleOutput {
            final_audio: track.audio_path,
            metadata_path: track.metadata_path,
            subtitle_path,
            segment_count: track.timeline.len(),
            total_duration: track.total_duration,
            synthesized: report.synthesized,
            reused: report.reused,
        })
    }
}

/// Публичный API для удобного использования
pub async fn narrate_article(config: TtsArticleConfig) -> Result<ArticleOutput> {
    TtsArticle::with_http_engine(config)?.process().await
}

/// Публичный API с поддержкой отслеживания прогресса
pub async fn narrate_article_with_progress(
    config: TtsArticleConfig,
    reporter: Box<dyn ProgressReporter>,
) -> Result<ArticleOutput> {
    let mut article = TtsArticle::with_http_engine(config)?;
    article.set_progress_reporter(reporter);
    article.process().await
}

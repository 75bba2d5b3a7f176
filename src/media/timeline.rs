//! Сборка итоговой дорожки
//!
//! Фрагменты склеиваются по возрастанию индекса. Если предыдущий фрагмент
//! ссылается на тот же файл, между ними вставляется пауза.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsArticleError};
use crate::media::audio::AudioBuffer;
use crate::tts::scheduler::GeneratedClip;

/// Имя итогового аудиофайла
pub const FINAL_AUDIO_NAME: &str = "final_audio.wav";
/// Имя файла метаданных
pub const METADATA_NAME: &str = "metadata.json";

/// Запись временной шкалы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub voice: String,
    pub text: String,
    /// Начало с учетом вставленной паузы
    pub start_time: f64,
    /// `start_time + gap_before + duration`
    pub end_time: f64,
    pub duration: f64,
    /// Пауза перед фрагментом
    pub gap_before: f64,
    pub audio_file: String,
}

impl TimelineEntry {
    /// Момент, когда начинает звучать сам фрагмент
    pub fn speech_start(&self) -> f64 {
        self.start_time + self.gap_before
    }
}

/// Метаданные итоговой дорожки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineMetadata {
    pub source_file: String,
    pub output_audio: String,
    pub total_duration: f64,
    pub segment_count: usize,
    pub created_at: DateTime<Local>,
    pub model: String,
    pub segments: Vec<TimelineEntry>,
}

/// Результат сборки
#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub audio_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Временная шкала без округления
    pub timeline: Vec<TimelineEntry>,
    pub total_duration: f64,
}

/// Построить временную шкалу
///
/// Чистая функция: длительности берутся из фрагментов.
pub fn build_timeline(
    clips: &BTreeMap<usize, GeneratedClip>,
    gap_seconds: f64,
    base_dir: &Path,
) -> Vec<TimelineEntry> {
    let mut entries = Vec::with_capacity(clips.len());
    let mut cursor = 0.0;
    let mut previous: Option<&Path> = None;

    for (index, clip) in clips {
        let gap = if previous == Some(clip.audio_path.as_path()) { gap_seconds } else { 0.0 };
        let start = cursor;
        let end = start + gap + clip.duration_seconds;

        entries.push(TimelineEntry {
            index: *index,
            voice: clip.voice_id.clone(),
            text: clip.source_text.clone(),
            start_time: start,
            end_time: end,
            duration: clip.duration_seconds,
            gap_before: gap,
            audio_file: display_relative(&clip.audio_path, base_dir),
        });

        cursor = end;
        previous = Some(clip.audio_path.as_path());
    }

    entries
}

/// Сборщик итоговой дорожки
#[derive(Debug, Clone)]
pub struct TimelineAssembler {
    output_dir: PathBuf,
    repeat_gap_ms: u64,
    model_name: String,
}

impl TimelineAssembler {
    /// Создать новый экземпляр TimelineAssembler
    pub fn new(output_dir: impl Into<PathBuf>, repeat_gap_ms: u64) -> Self {
        Self {
            output_dir: output_dir.into(),
            repeat_gap_ms,
            model_name: "F5-TTS".to_string(),
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn audio_path(&self) -> PathBuf {
        self.output_dir.join(FINAL_AUDIO_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(METADATA_NAME)
    }

    /// Склеить фрагменты и записать итоговое аудио и метаданные
    pub async fn assemble(
        &self,
        clips: &BTreeMap<usize, GeneratedClip>,
        source_file: &Path,
    ) -> Result<AssembledTrack> {
        if clips.is_empty() {
            log::error!("Nothing to assemble: no clips were generated");
            return Err(TtsArticleError::NoClips);
        }

        let assembler = self.clone();
        let clips = clips.clone();
        let source_file = source_file.to_path_buf();
        tokio::task::spawn_blocking(move || assembler.assemble_blocking(clips, &source_file))
            .await
            .map_err(|e| TtsArticleError::AudioProcessing(format!("Assembly task failed: {}", e)))?
    }

    fn assemble_blocking(
        &self,
        mut clips: BTreeMap<usize, GeneratedClip>,
        source_file: &Path,
    ) -> Result<AssembledTrack> {
        std::fs::create_dir_all(&self.output_dir)?;

        let mut track: Option<AudioBuffer> = None;
        // Держим в памяти только предыдущий фрагмент: пауза нужна лишь при повторе подряд
        let mut previous: Option<(PathBuf, AudioBuffer)> = None;

        for clip in clips.values_mut() {
            let repeated = matches!(&previous, Some((path, _)) if *path == clip.audio_path);
            if !repeated {
                let buffer = AudioBuffer::read_wav(&clip.audio_path)?;
                previous = Some((clip.audio_path.clone(), buffer));
            }
            let Some((_, buffer)) = previous.as_ref() else {
                continue;
            };

            let track = track
                .get_or_insert_with(|| AudioBuffer::empty(buffer.sample_rate(), buffer.channels()));
            if repeated {
                track.append_silence(self.repeat_gap_ms);
            }

            let before = track.frames();
            track.append(buffer)?;
            let appended = track.frames() - before;
            clip.duration_seconds = appended as f64 / track.sample_rate().max(1) as f64;
        }

        let track = track.ok_or(TtsArticleError::NoClips)?;
        let timeline = build_timeline(&clips, self.repeat_gap_ms as f64 / 1000.0, &self.output_dir);
        let total_duration = track.duration_seconds();

        let audio_path = self.audio_path();
        write_atomic(&self.output_dir, &audio_path, |file| track.write_wav(file))?;

        let metadata = TimelineMetadata {
            source_file: source_file.display().to_string(),
            output_audio: FINAL_AUDIO_NAME.to_string(),
            total_duration: round3(total_duration),
            segment_count: timeline.len(),
            created_at: Local::now(),
            model: self.model_name.clone(),
            segments: timeline.iter().map(rounded).collect(),
        };
        let metadata_path = self.metadata_path();
        let json = serde_json::to_string_pretty(&metadata)?;
        write_atomic(&self.output_dir, &metadata_path, |file| {
            let mut out = std::fs::File::create(file)?;
            out.write_all(json.as_bytes())?;
            Ok(())
        })?;

        log::info!(
            "Assembled {} segments into {} ({:.2}s)",
            timeline.len(),
            audio_path.display(),
            total_duration
        );

        Ok(AssembledTrack {
            audio_path,
            metadata_path,
            timeline,
            total_duration,
        })
    }
}

/// Записать файл через временный файл в той же директории
fn write_atomic<F>(dir: &Path, target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let temp = tempfile::Builder::new()
        .prefix(".partial_")
        .tempfile_in(dir)?
        .into_temp_path();
    write(&temp)?;
    temp.persist(target).map_err(|e| TtsArticleError::Io(e.error))?;
    Ok(())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn rounded(entry: &TimelineEntry) -> TimelineEntry {
    TimelineEntry {
        start_time: round3(entry.start_time),
        end_time: round3(entry.end_time),
        duration: round3(entry.duration),
        gap_before: round3(entry.gap_before),
        ..entry.clone()
    }
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

//! Модуль для записи субтитров
//!
//! Этот модуль содержит функции для формирования SRT и VTT файлов
//! по временной шкале итоговой дорожки.

use std::path::Path;
use std::time::Duration;

use crate::config::SubtitleFormat;
use crate::error::Result;
use crate::media::timeline::TimelineEntry;

/// Структура для хранения субтитра
#[derive(Debug, Clone, PartialEq)]
pub struct Subtitle {
    /// Время начала субтитра
    pub start_time: Duration,
    /// Время окончания субтитра
    pub end_time: Duration,
    /// Текст субтитра
    pub text: String,
}

impl Subtitle {
    /// Создать новый экземпляр Subtitle
    pub fn new(start_time: Duration, end_time: Duration, text: String) -> Self {
        Self {
            start_time,
            end_time,
            text,
        }
    }
}

/// Построить субтитры по временной шкале
///
/// Субтитр начинается после паузы, вставленной перед фрагментом.
pub fn subtitles_from_timeline(timeline: &[TimelineEntry]) -> Vec<Subtitle> {
    timeline
        .iter()
        .map(|entry| {
            Subtitle::new(
                seconds_to_duration(entry.speech_start()),
                seconds_to_duration(entry.end_time),
                entry.text.clone(),
            )
        })
        .collect()
}

/// Сформировать SRT
pub fn render_srt(subtitles: &[Subtitle]) -> String {
    let mut out = String::new();
    for (i, subtitle) in subtitles.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(subtitle.start_time, ','),
            format_timestamp(subtitle.end_time, ','),
            subtitle.text
        ));
    }
    out
}

/// Сформировать WebVTT
pub fn render_vtt(subtitles: &[Subtitle]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for subtitle in subtitles {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            format_timestamp(subtitle.start_time, '.'),
            format_timestamp(subtitle.end_time, '.'),
            subtitle.text
        ));
    }
    out
}

/// Записать субтитры в файл
///
/// Для формата `None` ничего не записывается и возвращается `false`.
pub fn write_subtitles(
    timeline: &[TimelineEntry],
    format: SubtitleFormat,
    path: &Path,
) -> Result<bool> {
    let subtitles = subtitles_from_timeline(timeline);
    let content = match format {
        SubtitleFormat::Srt => render_srt(&subtitles),
        SubtitleFormat::Vtt => render_vtt(&subtitles),
        SubtitleFormat::None => return Ok(false),
    };

    std::fs::write(path, content)?;
    log::info!("Subtitles written to {}", path.display());
    Ok(true)
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::from_millis((seconds.max(0.0) * 1000.0).round() as u64)
}

fn format_timestamp(time: Duration, millis_separator: char) -> String {
    let total_ms = time.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = total_ms / 60_000 % 60;
    let seconds = total_ms / 1000 % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, seconds, millis_separator, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, start: f64, gap: f64, duration: f64, text: &str) -> TimelineEntry {
        TimelineEntry {
            index,
            voice: "main".to_string(),
            text: text.to_string(),
            start_time: start,
            end_time: start + gap + duration,
            duration,
            gap_before: gap,
            audio_file: format!("audio/{}.wav", index),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Duration::from_millis(3_723_045), ','), "01:02:03,045");
        assert_eq!(format_timestamp(Duration::from_millis(1500), '.'), "00:00:01.500");
    }

    #[test]
    fn test_render_srt_skips_gap() {
        let timeline = vec![entry(0, 0.0, 0.0, 1.5, "你好世界。"), entry(1, 1.5, 0.2, 1.5, "你好世界。")];
        let srt = render_srt(&subtitles_from_timeline(&timeline));

        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\n你好世界。\n\n2\n00:00:01,700 --> 00:00:03,200\n你好世界。\n\n"
        );
    }

    #[test]
    fn test_write_vtt_and_none() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = vec![entry(0, 0.0, 0.0, 2.0, "Hello there")];

        let path = dir.path().join("final_audio.vtt");
        assert!(write_subtitles(&timeline, SubtitleFormat::Vtt, &path).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nHello there"));

        let skipped = dir.path().join("none.srt");
        assert!(!write_subtitles(&timeline, SubtitleFormat::None, &skipped).unwrap());
        assert!(!skipped.exists());
    }
}

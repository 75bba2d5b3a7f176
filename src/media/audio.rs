//! Модуль для работы с аудио
//!
//! Этот модуль содержит буфер PCM-сэмплов и операции над WAV файлами:
//! чтение, запись, склейку, тишину и затухание.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, TtsArticleError};

/// Размер блока ресэмплера в кадрах
const RESAMPLE_CHUNK: usize = 1024;

/// Буфер PCM-сэмплов
///
/// Сэмплы хранятся в формате f32 в диапазоне [-1.0, 1.0], каналы чередуются.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Создать буфер из чередующихся сэмплов
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Пустой буфер заданного формата
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(Vec::new(), sample_rate, channels)
    }

    /// Тишина длительностью `duration_ms`
    pub fn silence(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self::new(vec![0.0; frames * channels.max(1) as usize], sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Количество кадров
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в секундах
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Прочитать WAV файл
    pub fn read_wav(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path).map_err(|e| {
            TtsArticleError::AudioProcessing(format!(
                "Failed to open WAV {}: {}",
                path.display(),
                e
            ))
        })?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(Self::new(samples, spec.sample_rate, spec.channels))
    }

    /// Записать буфер в WAV файл (16 бит PCM)
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        for sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Добавить в конец другой буфер
    ///
    /// Буфер другого формата приводится к формату текущего. Пустой буфер
    /// перенимает формат добавляемого.
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.sample_rate = other.sample_rate;
            self.channels = other.channels;
        }

        if other.sample_rate == self.sample_rate && other.channels == self.channels {
            self.samples.extend_from_slice(&other.samples);
        } else {
            let converted = other.converted(self.sample_rate, self.channels)?;
            self.samples.extend_from_slice(&converted.samples);
        }
        Ok(())
    }

    /// Добавить тишину в конец
    pub fn append_silence(&mut self, duration_ms: u64) {
        let frames = ms_to_frames(duration_ms, self.sample_rate);
        self.samples.resize(self.samples.len() + frames * self.channels as usize, 0.0);
    }

    /// Линейное затухание последних `duration_ms` миллисекунд
    pub fn fade_out(&mut self, duration_ms: u64) {
        let channels = self.channels as usize;
        let total = self.frames();
        let fade = ms_to_frames(duration_ms, self.sample_rate).min(total);
        if fade == 0 {
            return;
        }

        let start = total - fade;
        let denom = (fade - 1).max(1) as f32;
        for k in 0..fade {
            let gain = (fade - 1 - k) as f32 / denom;
            let offset = (start + k) * channels;
            for sample in &mut self.samples[offset..offset + channels] {
                *sample *= gain;
            }
        }
    }

    /// Привести буфер к другой частоте дискретизации и числу каналов
    pub fn converted(&self, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
        let channels = channels.max(1);
        let remixed = remix_channels(&self.samples, self.channels, channels);
        let mut buffer = AudioBuffer::new(remixed, self.sample_rate, channels);

        if buffer.sample_rate != sample_rate {
            buffer = buffer.resampled(sample_rate)?;
        }
        Ok(buffer)
    }

    fn resampled(&self, target_rate: u32) -> Result<AudioBuffer> {
        if self.is_empty() || self.sample_rate == 0 {
            return Ok(AudioBuffer::empty(target_rate, self.channels));
        }

        let channels = self.channels as usize;
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, channels)
            .map_err(|e| {
                TtsArticleError::AudioProcessing(format!("Failed to create resampler: {}", e))
            })?;

        let planar = deinterleave(&self.samples, channels);
        let frames = self.frames();
        let expected = (frames as f64 * ratio).round() as usize;
        let mut output: Vec<Vec<f32>> =
            vec![Vec::with_capacity(expected + RESAMPLE_CHUNK); channels];

        let mut position = 0;
        while output[0].len() < expected {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = planar
                .iter()
                .map(|channel| {
                    let mut block = vec![0.0; needed];
                    if position < frames {
                        let end = (position + needed).min(frames);
                        block[..end - position].copy_from_slice(&channel[position..end]);
                    }
                    block
                })
                .collect();
            position += needed;

            let processed = resampler
                .process(&chunk, None)
                .map_err(|e| {
                    TtsArticleError::AudioProcessing(format!("Resampling failed: {}", e))
                })?;
            for (out, block) in output.iter_mut().zip(processed) {
                out.extend_from_slice(&block);
            }
        }

        for channel in &mut output {
            channel.truncate(expected);
        }
        Ok(AudioBuffer::new(interleave(&output), target_rate, self.channels))
    }
}

/// Длительность WAV файла по заголовку
pub fn wav_duration(path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path).map_err(|e| {
        TtsArticleError::AudioProcessing(format!("Failed to open WAV {}: {}", path.display(), e))
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(TtsArticleError::AudioProcessing(format!(
            "Invalid sample rate in {}",
            path.display()
        )));
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Финальная обработка свежесгенерированного фрагмента
///
/// Затухание применяется только к фрагментам длиннее двух длительностей затухания.
/// Файл перезаписывается, возвращается новая длительность.
pub fn finalize_clip(
    path: impl AsRef<Path>,
    fade_out_ms: u64,
    tail_silence_ms: u64,
) -> Result<f64> {
    let path = path.as_ref();
    let mut buffer = AudioBuffer::read_wav(path)?;

    if buffer.duration_seconds() * 1000.0 > (fade_out_ms * 2) as f64 {
        buffer.fade_out(fade_out_ms);
    }
    buffer.append_silence(tail_silence_ms);
    buffer.write_wav(path)?;

    Ok(buffer.duration_seconds())
}

fn ms_to_frames(duration_ms: u64, sample_rate: u32) -> usize {
    (duration_ms as u128 * sample_rate as u128 / 1000) as usize
}

fn remix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    if from == to {
        return samples.to_vec();
    }

    let mut result = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks(from) {
        if from == 1 {
            result.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            result.extend(std::iter::repeat(mono).take(to));
        }
    }
    result
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks(channels) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            samples.push(channel[i]);
        }
    }
    samples
}

//! Сквозные тесты озвучивания статьи на поддельном движке

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::config::{SubtitleFormat, TtsArticleConfig, VoiceConfig};
use crate::error::{Result, TtsArticleError};
use crate::media::audio::AudioBuffer;
use crate::media::timeline::TimelineMetadata;
use crate::notification::MemoryProgressObserver;
use crate::text::TextUnit;
use crate::tts::{
    share_engine, GenerationScheduler, SynthesisCache, SynthesisEngine, SynthesisRequest,
};
use crate::voice::VoiceCatalog;
use crate::TtsArticle;

const SAMPLE_RATE: u32 = 24_000;
/// Кадров на символ текста в поддельном синтезе
const FRAMES_PER_CHAR: usize = 2_400;

#[derive(Clone, Default)]
struct EngineStats {
    calls: Arc<AtomicUsize>,
    ready_checks: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl EngineStats {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn ready_checks(&self) -> usize {
        self.ready_checks.load(Ordering::SeqCst)
    }
}

struct FakeEngine {
    stats: EngineStats,
    available: bool,
    fail_on: Option<String>,
    /// Текст, для которого возвращается двухминутный клип
    long_on: Option<String>,
    writes_file: bool,
}

impl FakeEngine {
    fn new(stats: &EngineStats) -> Self {
        Self {
            stats: stats.clone(),
            available: true,
            fail_on: None,
            long_on: None,
            writes_file: false,
        }
    }
}

#[async_trait]
impl SynthesisEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ensure_ready(&mut self) -> Result<()> {
        self.stats.ready_checks.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(TtsArticleError::EngineUnavailable("fake engine is offline".to_string()))
        }
    }

    async fn synthesize(&mut self, request: &SynthesisRequest) -> Result<AudioBuffer> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.stats.texts.lock().push(request.text.clone());

        let current = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_on {
            if request.text.contains(marker.as_str()) {
                return Err(TtsArticleError::Synthesis(format!("cannot say '{}'", request.text)));
            }
        }

        let long = self.long_on.as_deref().map_or(false, |marker| request.text.contains(marker));
        let frames = if long {
            SAMPLE_RATE as usize * 120
        } else {
            FRAMES_PER_CHAR * request.text.chars().count().clamp(1, 20)
        };
        let samples = (0..frames)
            .map(|i| {
                (i as f32 * 220.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin() * 0.3
            })
            .collect();
        let audio = AudioBuffer::new(samples, SAMPLE_RATE, 1);

        if self.writes_file {
            audio.write_wav(&request.output_path)?;
        }
        Ok(audio)
    }
}

struct Fixture {
    dir: TempDir,
    config: TtsArticleConfig,
}

impl Fixture {
    fn new(article: &str, voices: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let voices_dir = dir.path().join("voices");
        std::fs::create_dir_all(&voices_dir).unwrap();

        let mut voice_map = BTreeMap::new();
        for name in voices {
            let path = voices_dir.join(format!("{}.wav", name));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            AudioBuffer::silence(300, 16_000, 1).write_wav(&path).unwrap();
            voice_map.insert(name.to_string(), VoiceConfig::new(path));
        }

        let input = dir.path().join("article.txt");
        std::fs::write(&input, article).unwrap();

        let config = TtsArticleConfig {
            input_article: input,
            output_dir: dir.path().join("out"),
            voices: voice_map,
            ..TtsArticleConfig::default()
        };

        Self { dir, config }
    }

    fn article(&self, engine: FakeEngine) -> TtsArticle {
        TtsArticle::new(self.config.clone(), Box::new(engine))
    }

    fn audio_dir(&self) -> PathBuf {
        self.config.audio_dir()
    }

    fn metadata(&self) -> TimelineMetadata {
        let path = self.config.output_dir.join("metadata.json");
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn test_bracket_article_end_to_end() {
    let fixture = Fixture::new("[main]\n你好世界。\n[narrator]\nThis is a test.", &["main", "narrator"]);
    let stats = EngineStats::default();

    let output = fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    assert_eq!(output.segment_count, 2);
    assert_eq!(output.synthesized, 2);
    assert_eq!(output.reused, 0);
    assert_eq!(stats.calls(), 2);
    assert!(output.final_audio.is_file());
    assert_eq!(output.subtitle_path, Some(fixture.config.output_dir.join("final_audio.srt")));

    let metadata = fixture.metadata();
    assert_eq!(metadata.segment_count, 2);
    assert_eq!(metadata.segments[0].voice, "main");
    assert_eq!(metadata.segments[0].text, "你好世界。");
    assert_eq!(metadata.segments[1].voice, "narrator");
    assert_eq!(metadata.segments[1].text, "This is a test.");
    // 5 символов по 0.1 с и хвост 150 мс
    assert!((metadata.segments[0].duration - 0.65).abs() < 1e-3);
    assert!((metadata.segments[1].start_time - metadata.segments[0].end_time).abs() < 1e-3);

    let final_duration = AudioBuffer::read_wav(&output.final_audio).unwrap().duration_seconds();
    assert!((final_duration - output.total_duration).abs() < 1e-6);
}

#[tokio::test]
async fn test_directive_article_uses_named_voice() {
    let fixture = Fixture::new(r#"{"name":"f-a/happy"} Hello there"#, &["main", "f-a/happy"]);
    let stats = EngineStats::default();

    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    let metadata = fixture.metadata();
    assert_eq!(metadata.segment_count, 1);
    assert_eq!(metadata.segments[0].voice, "f-a/happy");
    assert_eq!(metadata.segments[0].text, "Hello there");
    assert!(metadata.segments[0].audio_file.starts_with("audio/f-a_happy_hello_there_"));
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let fixture = Fixture::new(
        "[main]\n第一句。\n[narrator]\nSecond line.\n[main]\n第三句。",
        &["main", "narrator"],
    );
    let stats = EngineStats::default();

    let first = fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    assert_eq!(stats.calls(), 3);

    let second = fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    assert_eq!(stats.calls(), 3);
    assert_eq!(second.synthesized, 0);
    assert_eq!(second.reused, 3);
    assert!((first.total_duration - second.total_duration).abs() < 1e-9);
}

#[tokio::test]
async fn test_cached_run_does_not_need_engine() {
    let fixture = Fixture::new("[main]\nOnly line.", &["main"]);
    let stats = EngineStats::default();
    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    let mut offline = FakeEngine::new(&stats);
    offline.available = false;
    let output = fixture.article(offline).process().await.unwrap();
    assert_eq!(output.reused, 1);
    assert_eq!(stats.calls(), 1);
}

#[tokio::test]
async fn test_missing_voice_fails_before_synthesis() {
    let fixture = Fixture::new("[host]\nWelcome.\n[guest]\nThanks.", &["host"]);
    let stats = EngineStats::default();

    let result = fixture.article(FakeEngine::new(&stats)).process().await;

    assert!(matches!(result, Err(TtsArticleError::VoiceNotFound(_))));
    assert_eq!(stats.calls(), 0);
    assert_eq!(stats.ready_checks(), 0);
    assert!(files_in(&fixture.audio_dir()).is_empty());
}

#[tokio::test]
async fn test_unknown_voice_falls_back_to_main() {
    let fixture = Fixture::new("[guest]\nThanks.", &["main"]);
    let stats = EngineStats::default();

    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    let metadata = fixture.metadata();
    assert_eq!(metadata.segments[0].voice, "guest");
    assert_eq!(stats.calls(), 1);
}

#[tokio::test]
async fn test_repeated_unit_gets_silence_gap() {
    let fixture = Fixture::new("[main]\nHello.\nHello.\n", &["main"]);
    let stats = EngineStats::default();

    let output = fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    assert_eq!(stats.calls(), 1);
    assert_eq!(output.synthesized, 1);

    let metadata = fixture.metadata();
    let (first, second) = (&metadata.segments[0], &metadata.segments[1]);
    assert_eq!(first.audio_file, second.audio_file);
    assert_eq!(first.gap_before, 0.0);
    assert!((second.gap_before - 0.2).abs() < 1e-9);
    assert!(second.start_time >= first.end_time - 1e-9);
    assert!((second.end_time - (second.start_time + 0.2 + second.duration)).abs() < 2e-3);
    assert!((output.total_duration - (first.duration * 2.0 + 0.2)).abs() < 2e-3);
}

#[tokio::test]
async fn test_engine_unavailable_aborts_run() {
    let fixture = Fixture::new("[main]\nHello.", &["main"]);
    let stats = EngineStats::default();
    let mut engine = FakeEngine::new(&stats);
    engine.available = false;

    let result = fixture.article(engine).process().await;

    assert!(matches!(result, Err(TtsArticleError::EngineUnavailable(_))));
    assert_eq!(stats.calls(), 0);
    assert!(!fixture.config.output_dir.join("final_audio.wav").exists());
}

#[tokio::test]
async fn test_synthesis_failure_leaves_no_partial_files() {
    let article = "[b]\nboom here\n[a]\nfine one\n[b]\nfine two\n[a]\nfine three";
    let fixture = Fixture::new(article, &["main", "a", "b"]);
    let stats = EngineStats::default();
    let mut engine = FakeEngine::new(&stats);
    engine.fail_on = Some("boom".to_string());

    let result = fixture.article(engine).process().await;

    assert!(matches!(result, Err(TtsArticleError::Synthesis(_))));
    assert!(files_in(&fixture.audio_dir()).iter().all(|name| !name.starts_with(".partial_")));
    assert!(!fixture.config.output_dir.join("final_audio.wav").exists());
    assert!(!fixture.config.output_dir.join("metadata.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failure_waits_for_running_post_processing() {
    let article = "[a]\nlong clip\n[b]\nboom here\n[a]\nnever reached\n[b]\nnever either";
    let fixture = Fixture::new(article, &["main", "a", "b"]);
    let stats = EngineStats::default();
    let mut engine = FakeEngine::new(&stats);
    engine.long_on = Some("long".to_string());
    engine.fail_on = Some("boom".to_string());

    let result = fixture.article(engine).process().await;
    assert!(matches!(result, Err(TtsArticleError::Synthesis(_))));

    let partial = |dir: &Path| {
        files_in(dir)
            .into_iter()
            .filter(|name| name.starts_with(".partial_"))
            .collect::<Vec<_>>()
    };
    assert!(partial(&fixture.audio_dir()).is_empty());

    // Фоновая обработка не должна создать файл после возврата ошибки
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(partial(&fixture.audio_dir()).is_empty());
}

#[tokio::test]
async fn test_concurrent_generation_keeps_order_and_serializes_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mut voices = BTreeMap::new();
    for name in ["main", "v1", "v2"] {
        let path = dir.path().join(format!("{}.wav", name));
        AudioBuffer::silence(100, 16_000, 1).write_wav(&path).unwrap();
        voices.insert(name.to_string(), VoiceConfig::new(path));
    }
    let mut config = TtsArticleConfig {
        output_dir: dir.path().join("out"),
        voices,
        ..TtsArticleConfig::default()
    };
    config.workers = 4;

    let units: Vec<TextUnit> = (0..9)
        .map(|i| TextUnit {
            index: i,
            text: format!("unit number {}", i),
            voice_id: ["main", "v1", "v2"][i % 3].to_string(),
        })
        .collect();

    let stats = EngineStats::default();
    let mut engine = FakeEngine::new(&stats);
    engine.writes_file = true;
    let scheduler = GenerationScheduler::from_config(share_engine(Box::new(engine)), &config);
    let report = scheduler.run(&units, &VoiceCatalog::from_config(&config)).await.unwrap();

    assert_eq!(report.clips.keys().copied().collect::<Vec<_>>(), (0..9).collect::<Vec<_>>());
    for unit in &units {
        let clip = &report.clips[&unit.index];
        assert_eq!(clip.voice_id, unit.voice_id);
        assert_eq!(clip.source_text, unit.text);
        assert!(clip.audio_path.is_file());
    }
    assert_eq!(report.synthesized, 9);
    assert_eq!(stats.calls(), 9);
    assert_eq!(stats.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_units_share_one_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("main.wav");
    AudioBuffer::silence(100, 16_000, 1).write_wav(&reference).unwrap();
    let mut voices = BTreeMap::new();
    voices.insert("main".to_string(), VoiceConfig::new(&reference));
    voices.insert("other".to_string(), VoiceConfig::new(&reference));
    let config = TtsArticleConfig {
        output_dir: dir.path().join("out"),
        voices,
        ..TtsArticleConfig::default()
    };

    let units = vec![
        TextUnit { index: 0, text: "same".to_string(), voice_id: "main".to_string() },
        TextUnit { index: 1, text: "different".to_string(), voice_id: "other".to_string() },
        TextUnit { index: 2, text: "same".to_string(), voice_id: "main".to_string() },
    ];

    let stats = EngineStats::default();
    let engine = share_engine(Box::new(FakeEngine::new(&stats)));
    let scheduler = GenerationScheduler::from_config(engine, &config);
    let report = scheduler.run(&units, &VoiceCatalog::from_config(&config)).await.unwrap();

    assert_eq!(stats.calls(), 2);
    assert_eq!(report.clips.len(), 3);
    assert_eq!(report.clips[&0].audio_path, report.clips[&2].audio_path);
    assert_eq!(
        report.clips[&0].audio_path,
        SynthesisCache::new(config.audio_dir(), true).path_for("main", "same")
    );
}

#[tokio::test]
async fn test_empty_units_are_rejected() {
    let config = TtsArticleConfig::default();
    let stats = EngineStats::default();
    let engine = share_engine(Box::new(FakeEngine::new(&stats)));
    let scheduler = GenerationScheduler::from_config(engine, &config);

    let result = scheduler.run(&[], &VoiceCatalog::from_config(&config)).await;
    assert!(matches!(result, Err(TtsArticleError::EmptyInput(_))));
}

#[tokio::test]
async fn test_disabled_cache_regenerates() {
    let mut fixture = Fixture::new("[main]\nAgain and again.", &["main"]);
    fixture.config.enable_cache = false;
    let stats = EngineStats::default();

    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    assert_eq!(stats.calls(), 2);
    assert_eq!(files_in(&fixture.audio_dir()).len(), 1);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_regenerated() {
    let fixture = Fixture::new("[main]\nFragile clip.", &["main"]);
    let stats = EngineStats::default();
    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    let clip = SynthesisCache::new(fixture.audio_dir(), true).path_for("main", "Fragile clip.");
    std::fs::write(&clip, b"truncated").unwrap();

    let output = fixture.article(FakeEngine::new(&stats)).process().await.unwrap();
    assert_eq!(stats.calls(), 2);
    assert_eq!(output.synthesized, 1);
}

#[tokio::test]
async fn test_polyphones_change_only_engine_text() {
    let mut fixture = Fixture::new("[main]\n去银行。", &["main"]);
    fixture.config.polyphones.insert("银行".to_string(), "银杭".to_string());
    let stats = EngineStats::default();

    fixture.article(FakeEngine::new(&stats)).process().await.unwrap();

    assert_eq!(stats.texts.lock().as_slice(), &["去银杭。".to_string()]);
    assert_eq!(fixture.metadata().segments[0].text, "去银行。");
}

#[tokio::test]
async fn test_missing_article_and_empty_article() {
    let mut fixture = Fixture::new("   \n\n", &["main"]);
    let stats = EngineStats::default();

    let result = fixture.article(FakeEngine::new(&stats)).process().await;
    assert!(matches!(result, Err(TtsArticleError::EmptyInput(_))));

    fixture.config.input_article = fixture.dir.path().join("missing.txt");
    let result = fixture.article(FakeEngine::new(&stats)).process().await;
    assert!(matches!(result, Err(TtsArticleError::FileNotFound(_))));
    assert_eq!(stats.calls(), 0);
}

#[tokio::test]
async fn test_vtt_output_and_progress() {
    let mut fixture = Fixture::new("[main]\nFirst.\nSecond.", &["main"]);
    fixture.config.subtitle_format = SubtitleFormat::Vtt;
    let stats = EngineStats::default();
    let observer = MemoryProgressObserver::new();

    let mut article = fixture.article(FakeEngine::new(&stats));
    article.add_observer(Box::new(observer.clone()));
    let output = article.process().await.unwrap();

    let subtitles = output.subtitle_path.unwrap();
    assert_eq!(subtitles.extension().and_then(|e| e.to_str()), Some("vtt"));
    assert!(std::fs::read_to_string(subtitles).unwrap().starts_with("WEBVTT"));

    let history = observer.history();
    assert!(!history.is_empty());
    assert_eq!(history.last().map(|p| p.total_progress), Some(100.0));
    assert!(history.windows(2).all(|w| w[1].total_progress >= w[0].total_progress));
}

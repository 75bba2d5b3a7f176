//! Планировщик генерации фрагментов
//!
//! Планировщик разрешает голоса, проверяет кэш и вызывает движок синтеза для
//! недостающих фрагментов. Все вызовы движка выполняются под одной блокировкой.
//! При нескольких голосах задачи выполняются пулом ограниченного размера,
//! иначе строго последовательно.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::config::TtsArticleConfig;
use crate::error::{Result, TtsArticleError};
use crate::media::audio::{finalize_clip, wav_duration};
use crate::progress::ProgressTracker;
use crate::text::{TextNormalizer, TextUnit};
use crate::tts::cache::SynthesisCache;
use crate::tts::engine::{SynthesisEngine, SynthesisRequest};
use crate::voice::{VoiceCatalog, VoiceProfile};

/// Движок, разделяемый между задачами генерации
pub type SharedEngine = Arc<Mutex<Box<dyn SynthesisEngine>>>;

/// Обернуть движок для совместного использования
pub fn share_engine(engine: Box<dyn SynthesisEngine>) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Сгенерированный фрагмент
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedClip {
    pub unit_index: usize,
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub source_text: String,
    pub voice_id: String,
}

/// Результат генерации
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// Фрагменты по индексу
    pub clips: BTreeMap<usize, GeneratedClip>,
    /// Сколько файлов сгенерировано движком
    pub synthesized: usize,
    /// Сколько файлов взято из кэша
    pub reused: usize,
}

/// Параметры обработки свежесгенерированных фрагментов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessing {
    pub fade_out_ms: u64,
    pub tail_silence_ms: u64,
}

impl Default for PostProcessing {
    fn default() -> Self {
        Self {
            fade_out_ms: 30,
            tail_silence_ms: 150,
        }
    }
}

/// Один файл фрагмента, общий для всех фрагментов с тем же голосом и текстом
struct Job {
    path: PathBuf,
    voice_id: String,
    text: String,
    unit_indices: Vec<usize>,
    profile: VoiceProfile,
}

struct JobDone {
    job: Job,
    duration: f64,
    synthesized: bool,
}

struct JobContext {
    engine: SharedEngine,
    cache: Arc<SynthesisCache>,
    normalizer: Arc<TextNormalizer>,
    seed: Option<u64>,
    post: PostProcessing,
    /// Выставляется после первой ошибки, оставшиеся задачи не начинают синтез
    cancelled: AtomicBool,
}

/// Планировщик генерации
pub struct GenerationScheduler {
    engine: SharedEngine,
    cache: Arc<SynthesisCache>,
    normalizer: Arc<TextNormalizer>,
    workers: usize,
    seed: Option<u64>,
    post: PostProcessing,
    progress: Option<Arc<ProgressTracker>>,
}

impl GenerationScheduler {
    /// Создать новый экземпляр GenerationScheduler
    pub fn new(engine: SharedEngine, cache: SynthesisCache) -> Self {
        Self {
            engine,
            cache: Arc::new(cache),
            normalizer: Arc::new(TextNormalizer::default()),
            workers: 4,
            seed: None,
            post: PostProcessing::default(),
            progress: None,
        }
    }

    /// Создать планировщик по конфигурации
    pub fn from_config(engine: SharedEngine, config: &TtsArticleConfig) -> Self {
        Self::new(engine, SynthesisCache::new(config.audio_dir(), config.enable_cache))
            .with_workers(config.workers)
            .with_seed(config.seed)
            .with_normalizer(TextNormalizer::new(&config.polyphones, config.convert_numbers))
            .with_post_processing(PostProcessing {
                fade_out_ms: config.fade_out_ms,
                tail_silence_ms: config.tail_silence_ms,
            })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    pub fn with_post_processing(mut self, post: PostProcessing) -> Self {
        self.post = post;
        self
    }

    pub fn with_progress(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn cache(&self) -> &SynthesisCache {
        &self.cache
    }

    /// Сгенерировать аудио для всех фрагментов
    ///
    /// Голоса разрешаются до первого вызова движка. Ошибка любого фрагмента
    /// прерывает всю генерацию.
    pub async fn run(
        &self,
        units: &[TextUnit],
        catalog: &VoiceCatalog,
    ) -> Result<GenerationReport> {
        if units.is_empty() {
            return Err(TtsArticleError::EmptyInput("no text units to synthesize".to_string()));
        }

        let profiles = catalog.resolve_all(units.iter().map(|u| u.voice_id.as_str()))?;
        let voice_count = units.iter().map(|u| u.voice_id.as_str()).collect::<BTreeSet<_>>().len();

        tokio::fs::create_dir_all(self.cache.audio_dir()).await?;

        let jobs = self.plan_jobs(units, &profiles)?;
        let total_jobs = jobs.len();
        log::info!(
            "Generating {} units ({} unique clips, {} voices)",
            units.len(),
            total_jobs,
            voice_count
        );

        if self.needs_engine(&jobs).await? {
            self.check_engine().await?;
        } else {
            log::info!("All clips are cached, synthesis engine is not needed");
        }

        let ctx = Arc::new(JobContext {
            engine: self.engine.clone(),
            cache: self.cache.clone(),
            normalizer: self.normalizer.clone(),
            seed: self.seed,
            post: self.post,
            cancelled: AtomicBool::new(false),
        });

        let mut report = GenerationReport::default();
        let mut finished = 0;

        if voice_count > 1 && units.len() > 1 {
            log::debug!("Running generation with {} workers", self.workers);
            let semaphore = Arc::new(Semaphore::new(self.workers));
            let mut tasks = JoinSet::new();

            for job in jobs {
                let ctx = ctx.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| TtsArticleError::Other(format!("Worker pool closed: {}", e)))?;
                    if ctx.cancelled.load(Ordering::SeqCst) {
                        return Err(TtsArticleError::Cancelled);
                    }
                    process_job(&ctx, job).await
                });
            }

            let mut failure = None;
            while let Some(joined) = tasks.join_next().await {
                let outcome = joined
                    .map_err(|e| {
                        TtsArticleError::Synthesis(format!("Generation task failed: {}", e))
                    })
                    .and_then(|result| result);
                match (outcome, failure.is_some()) {
                    (Ok(done), false) => {
                        finished += 1;
                        self.record(&mut report, done, finished, total_jobs);
                    }
                    (Ok(_), true) => {}
                    (Err(e), false) => {
                        // Задачи не прерываются: каждая сама удаляет свой временный файл
                        log::debug!("Stopping generation, waiting for running jobs");
                        ctx.cancelled.store(true, Ordering::SeqCst);
                        failure = Some(e);
                    }
                    (Err(e), true) => log::debug!("Job stopped after failure: {}", e),
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
        } else {
            for job in jobs {
                let done = process_job(&ctx, job).await?;
                finished += 1;
                self.record(&mut report, done, finished, total_jobs);
            }
        }

        log::info!(
            "Generation finished: {} synthesized, {} reused",
            report.synthesized,
            report.reused
        );
        Ok(report)
    }

    /// Сгруппировать фрагменты по файлу кэша
    fn plan_jobs(
        &self,
        units: &[TextUnit],
        profiles: &BTreeMap<String, VoiceProfile>,
    ) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = Vec::new();
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

        for unit in units {
            let path = self.cache.path_for(&unit.voice_id, &unit.text);
            if let Some(&existing) = by_path.get(&path) {
                jobs[existing].unit_indices.push(unit.index);
                continue;
            }

            let profile = profiles
                .get(&unit.voice_id)
                .cloned()
                .ok_or_else(|| TtsArticleError::VoiceNotFound(unit.voice_id.clone()))?;
            by_path.insert(path.clone(), jobs.len());
            jobs.push(Job {
                path,
                voice_id: unit.voice_id.clone(),
                text: unit.text.clone(),
                unit_indices: vec![unit.index],
                profile,
            });
        }

        Ok(jobs)
    }

    async fn needs_engine(&self, jobs: &[Job]) -> Result<bool> {
        let cache = self.cache.clone();
        let paths: Vec<PathBuf> = jobs.iter().map(|j| j.path.clone()).collect();
        tokio::task::spawn_blocking(move || paths.iter().any(|p| !cache.lookup(p)))
            .await
            .map_err(|e| TtsArticleError::Other(format!("Cache check failed: {}", e)))
    }

    async fn check_engine(&self) -> Result<()> {
        let mut engine = self.engine.lock().await;
        log::info!("Checking synthesis engine '{}'", engine.name());
        engine.ensure_ready().await.map_err(|e| {
            log::error!("Synthesis engine is not available: {}", e);
            match e {
                TtsArticleError::EngineUnavailable(_) => e,
                other => TtsArticleError::EngineUnavailable(other.to_string()),
            }
        })
    }

    fn record(&self, report: &mut GenerationReport, done: JobDone, finished: usize, total: usize) {
        if done.synthesized {
            report.synthesized += 1;
        } else {
            report.reused += 1;
        }

        for &index in &done.job.unit_indices {
            report.clips.insert(
                index,
                GeneratedClip {
                    unit_index: index,
                    audio_path: done.job.path.clone(),
                    duration_seconds: done.duration,
                    source_text: done.job.text.clone(),
                    voice_id: done.job.voice_id.clone(),
                },
            );
        }

        if let Some(tracker) = &self.progress {
            tracker.update_step_progress(
                finished as f32 / total.max(1) as f32 * 100.0,
                Some(format!("Фрагмент {}/{}", finished, total)),
            );
        }
    }
}

/// Сгенерировать или взять из кэша один файл
async fn process_job(ctx: &JobContext, job: Job) -> Result<JobDone> {
    if ctx.cache.lookup(&job.path) {
        let duration = measure(&job.path).await?;
        log::debug!("Cache hit for unit {:?}: {}", job.unit_indices, job.path.display());
        return Ok(JobDone {
            job,
            duration,
            synthesized: false,
        });
    }

    if !job.profile.reference_audio.is_file() {
        return Err(TtsArticleError::Synthesis(format!(
            "reference audio for voice '{}' disappeared: {}",
            job.voice_id,
            job.profile.reference_audio.display()
        )));
    }

    // Временный файл в той же директории, чтобы переименование было атомарным
    let temp = tempfile::Builder::new()
        .prefix(".partial_")
        .suffix(".wav")
        .tempfile_in(ctx.cache.audio_dir())?
        .into_temp_path();
    let temp_path = temp.to_path_buf();

    let request = SynthesisRequest::from_profile(
        &job.profile,
        ctx.normalizer.normalize(&job.text),
        temp_path.clone(),
        ctx.seed,
    );

    let audio = {
        let mut engine = ctx.engine.lock().await;
        if ctx.cancelled.load(Ordering::SeqCst) {
            return Err(TtsArticleError::Cancelled);
        }
        log::debug!("Synthesizing unit {:?} with voice '{}'", job.unit_indices, job.voice_id);
        engine.synthesize(&request).await
    }
    .map_err(|e| {
        log::error!(
            "Synthesis failed for voice '{}' ({}): {}",
            job.voice_id,
            job.path.display(),
            e
        );
        match e {
            TtsArticleError::Synthesis(_) => e,
            other => TtsArticleError::Synthesis(format!("voice '{}': {}", job.voice_id, other)),
        }
    })?;

    let written = tokio::fs::metadata(&temp_path).await.map(|m| m.len() > 0).unwrap_or(false);
    if !written {
        if audio.is_empty() {
            return Err(TtsArticleError::Synthesis(format!(
                "engine returned no audio for voice '{}'",
                job.voice_id
            )));
        }
        let path = temp_path.clone();
        run_blocking(move || audio.write_wav(path)).await?;
    }

    let post = ctx.post;
    let path = temp_path.clone();
    let finalized =
        run_blocking(move || finalize_clip(path, post.fade_out_ms, post.tail_silence_ms)).await;
    let duration = match finalized {
        Ok(duration) => duration,
        Err(e) => {
            log::warn!(
                "Post-processing failed for {}, keeping raw audio: {}",
                job.path.display(),
                e
            );
            measure(&temp_path).await?
        }
    };

    temp.persist(&job.path).map_err(|e| TtsArticleError::Io(e.error))?;
    log::debug!("Saved {} ({:.2}s)", job.path.display(), duration);

    Ok(JobDone {
        job,
        duration,
        synthesized: true,
    })
}

async fn measure(path: &Path) -> Result<f64> {
    let path = path.to_path_buf();
    run_blocking(move || wav_duration(path)).await
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TtsArticleError::AudioProcessing(format!("Blocking task failed: {}", e)))?
}

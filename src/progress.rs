//! Модуль для отслеживания прогресса выполнения операций
//!
//! Этот модуль предоставляет реализацию паттерна Observer для отслеживания
//! прогресса озвучивания статьи. Трекер разделяется между задачами генерации,
//! поэтому все его методы принимают `&self`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: String,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения всей операции (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация о текущем этапе
    pub details: Option<String>,
}

impl ProgressInfo {
    /// Создает новый экземпляр ProgressInfo
    pub fn new(
        step: impl Into<String>,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    /// Метод, вызываемый при обновлении прогресса
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Трейт для объекта, отправляющего уведомления о прогрессе
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя
    ///
    /// Возвращает уникальный идентификатор наблюдателя, который можно использовать
    /// для его удаления в будущем.
    fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Уведомить всех наблюдателей о прогрессе
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Реализация ProgressReporter по умолчанию
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    /// Создать новый экземпляр DefaultProgressReporter
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        let observers = self.observers.read();
        for observer in observers.values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

/// Этапы озвучивания статьи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    /// Разбиение статьи на фрагменты
    Segmentation,
    /// Проверка голосов и движка
    VoiceResolution,
    /// Генерация речи
    SpeechGeneration,
    /// Сборка итоговой дорожки
    Assembly,
}

impl ProcessStep {
    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segmentation => "Разбиение статьи",
            Self::VoiceResolution => "Проверка голосов",
            Self::SpeechGeneration => "Генерация речи",
            Self::Assembly => "Сборка аудио",
        }
    }

    /// Получить весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::Segmentation => 5.0,
            Self::VoiceResolution => 5.0,
            Self::SpeechGeneration => 70.0,
            Self::Assembly => 20.0,
        }
    }
}

struct TrackerState {
    current_step: ProcessStep,
    step_progress: f32,
    total_progress: f32,
    completed_steps: HashMap<ProcessStep, f32>,
}

/// Трекер прогресса для отслеживания выполнения процесса
pub struct ProgressTracker {
    reporters: RwLock<Vec<Box<dyn ProgressReporter>>>,
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    /// Создать новый экземпляр ProgressTracker
    pub fn new() -> Self {
        Self {
            reporters: RwLock::new(Vec::new()),
            state: RwLock::new(TrackerState {
                current_step: ProcessStep::Segmentation,
                step_progress: 0.0,
                total_progress: 0.0,
                completed_steps: HashMap::new(),
            }),
        }
    }

    /// Создать новый экземпляр ProgressTracker с репортером
    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let tracker = Self::new();
        tracker.set_reporter(reporter);
        tracker
    }

    /// Подключить репортер прогресса
    ///
    /// Ранее подключенные репортеры и их наблюдатели продолжают получать
    /// уведомления. Новые наблюдатели добавляются в последний репортер.
    pub fn set_reporter(&self, reporter: Box<dyn ProgressReporter>) {
        self.reporters.write().push(reporter);
    }

    /// Добавить наблюдателя
    ///
    /// Если репортер не установлен, создается репортер по умолчанию.
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let mut reporters = self.reporters.write();
        if reporters.is_empty() {
            reporters.push(Box::new(DefaultProgressReporter::new()));
        }
        match reporters.last() {
            Some(reporter) => reporter.add_observer(observer),
            None => 0,
        }
    }

    /// Текущий общий прогресс
    pub fn total_progress(&self) -> f32 {
        self.state.read().total_progress
    }

    /// Установить текущий этап
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut state = self.state.write();
            if state.current_step == step {
                return;
            }
            let previous = state.current_step;
            state.completed_steps.insert(previous, 100.0);
            state.current_step = step;
            state.step_progress = 0.0;
            Self::update_total_progress(&mut state);
        }
        self.report_progress(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write();
            state.step_progress = progress.clamp(0.0, 100.0);
            Self::update_total_progress(&mut state);
        }
        self.report_progress(details);
    }

    fn update_total_progress(state: &mut TrackerState) {
        let mut total = 0.0;
        for (step, progress) in state.completed_steps.iter() {
            if *step != state.current_step {
                total += step.weight() * progress / 100.0;
            }
        }
        total += state.current_step.weight() * state.step_progress / 100.0;

        // Веса этапов в сумме дают 100
        state.total_progress = total.clamp(0.0, 100.0);
    }

    fn report_progress(&self, details: Option<String>) {
        let progress = {
            let state = self.state.read();
            ProgressInfo::new(
                state.current_step.as_str(),
                state.step_progress,
                state.total_progress,
                details,
            )
        };
        for reporter in self.reporters.read().iter() {
            reporter.notify_progress(progress.clone());
        }
    }

    /// Отметить завершение всего процесса
    pub fn complete(&self) {
        {
            let mut state = self.state.write();
            let current = state.current_step;
            state.completed_steps.insert(current, 100.0);
            state.step_progress = 100.0;
            state.total_progress = 100.0;
        }
        self.report_progress(Some("Процесс завершен".to_string()));
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

//! Модуль для реализации системы уведомлений
//!
//! Этот модуль предоставляет конкретные реализации наблюдателей для
//! системы прогресса библиотеки tts-article.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::progress::{ProgressInfo, ProgressObserver};

/// Наблюдатель, пишущий прогресс в лог
pub struct LogProgressObserver {
    prefix: Option<String>,
}

impl LogProgressObserver {
    /// Создать новый экземпляр LogProgressObserver
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Создать новый экземпляр LogProgressObserver с префиксом
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }
}

impl Default for LogProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for LogProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        match progress.details.as_deref() {
            Some(details) if !details.is_empty() => log::info!(
                "{}{} {:.1}% (total {:.1}%): {}",
                prefix,
                progress.step,
                progress.step_progress,
                progress.total_progress,
                details
            ),
            _ => log::info!(
                "{}{} {:.1}% (total {:.1}%)",
                prefix,
                progress.step,
                progress.step_progress,
                progress.total_progress
            ),
        }
    }
}

/// Наблюдатель, сохраняющий информацию о прогрессе в памяти
#[derive(Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    /// Создать новый экземпляр MemoryProgressObserver
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю обновлений прогресса
    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().clone()
    }

    /// Очистить историю обновлений прогресса
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.history.lock().push(progress);
    }
}

/// Наблюдатель, вызывающий функцию обратного вызова при обновлении прогресса
pub struct CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    /// Создать новый экземпляр CallbackProgressObserver
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    fn on_progress_update(&self, progress: ProgressInfo) {
        (self.callback)(progress);
    }
}

/// Наблюдатель, отображающий прогресс-бар в stderr
pub struct ProgressBarObserver {
    width: usize,
    last_progress: Mutex<f32>,
}

impl ProgressBarObserver {
    /// Создать новый экземпляр ProgressBarObserver
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            last_progress: Mutex::new(-1.0),
        }
    }

    fn render(&self, progress: &ProgressInfo) -> String {
        let filled = ((progress.total_progress / 100.0) * self.width as f32) as usize;
        let filled = filled.min(self.width);
        format!(
            "[{}{}] {:.1}% - {}",
            "=".repeat(filled),
            " ".repeat(self.width - filled),
            progress.total_progress,
            progress.step
        )
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new(40)
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let mut last_progress = self.last_progress.lock();

        // Перерисовываем только при изменении хотя бы на 1%
        if (*last_progress - progress.total_progress).abs() < 1.0
            && *last_progress >= 0.0
            && progress.total_progress < 100.0
        {
            return;
        }
        *last_progress = progress.total_progress;

        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{}", self.render(&progress));
        if progress.total_progress >= 100.0 {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

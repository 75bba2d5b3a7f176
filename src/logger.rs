//! Настройка логирования для командной строки

use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Фильтр по умолчанию, если RUST_LOG не задан
const DEFAULT_FILTER: &str = "warn,tts_article=info";

/// Инициализировать env_logger
///
/// `verbose` включает отладочные сообщения библиотеки поверх RUST_LOG.
pub fn init_logger(verbose: bool) {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);
    let mut builder = Builder::from_env(env);

    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("reqwest", LevelFilter::Warn);
    if verbose {
        builder.filter_module("tts_article", LevelFilter::Debug);
    }

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    // Повторная инициализация в тестах и встраивающих приложениях не считается ошибкой
    if let Err(e) = builder.try_init() {
        eprintln!("Logger is already initialized: {}", e);
    }
}

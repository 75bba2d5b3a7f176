//! Модуль для работы с TTS
//!
//! Этот модуль содержит интерфейс движка синтеза, его HTTP-клиент,
//! кэш фрагментов и планировщик генерации.

pub mod cache;
pub mod engine;
pub mod http;
pub mod scheduler;

pub use cache::SynthesisCache;
pub use engine::{SynthesisEngine, SynthesisRequest};
pub use http::HttpSynthesisEngine;
pub use scheduler::{
    share_engine, GeneratedClip, GenerationReport, GenerationScheduler, SharedEngine,
};

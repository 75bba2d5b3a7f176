//! Разбор голосовых меток в тексте статьи
//!
//! Поддерживаются две взаимоисключающие разметки:
//! - директивы `{"name": "voice"}` с текстом до следующей директивы;
//! - метки `[voice]`, переключающие голос до следующей метки.
//!
//! Если в тексте есть хотя бы одна корректная директива, метки в квадратных
//! скобках не ищутся.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref DIRECTIVE_RE: Regex = Regex::new(r"\{[^{}]*\}").unwrap();
    static ref BRACKET_RE: Regex =
        Regex::new(r"\[\s*([^\[\]\s](?:[^\[\]\r\n]*[^\[\]\s])?)\s*\]").unwrap();
}

/// Участок статьи, озвучиваемый одним голосом
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSection {
    pub voice_id: String,
    pub text: String,
}

/// Разбить статью на участки по голосам
pub fn parse_sections(article: &str, default_voice: &str) -> Vec<VoiceSection> {
    match parse_directives(article, default_voice) {
        Some(sections) => sections,
        None => parse_brackets(article, default_voice),
    }
}

/// Разобрать директивы
///
/// Возвращает `None`, если в тексте нет ни одной корректной директивы.
pub fn parse_directives(article: &str, default_voice: &str) -> Option<Vec<VoiceSection>> {
    let matches: Vec<_> = DIRECTIVE_RE.find_iter(article).collect();
    if matches.is_empty() {
        return None;
    }

    let parsed: Vec<Option<Map<String, Value>>> = matches
        .iter()
        .map(|m| parse_directive_body(m.as_str()))
        .collect();
    if parsed.iter().all(Option::is_none) {
        log::debug!("No valid directives found, falling back to bracket markers");
        return None;
    }

    let mut sections = Vec::new();
    push_section(&mut sections, default_voice, &article[..matches[0].start()]);

    for (i, (m, directive)) in matches.iter().zip(parsed).enumerate() {
        let end = matches.get(i + 1).map(|next| next.start()).unwrap_or(article.len());
        let text = &article[m.end()..end];

        let Some(directive) = directive else {
            log::warn!("Skipping malformed directive {}", m.as_str());
            continue;
        };

        let voice = match directive.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim(),
            Some(other) => {
                log::warn!(
                    "Directive {} has invalid name {}, using '{}'",
                    m.as_str(),
                    other,
                    default_voice
                );
                default_voice
            }
            None => default_voice,
        };

        for key in directive.keys().filter(|k| k.as_str() != "name") {
            log::debug!("Ignoring directive key '{}' in {}", key, m.as_str());
        }

        push_section(&mut sections, voice, text);
    }

    Some(sections)
}

/// Разобрать тело директивы как плоский JSON-объект
fn parse_directive_body(body: &str) -> Option<Map<String, Value>> {
    let map: Map<String, Value> = serde_json::from_str(body).ok()?;
    if map.values().any(|v| v.is_object() || v.is_array()) {
        return None;
    }
    Some(map)
}

/// Разобрать метки в квадратных скобках
pub fn parse_brackets(article: &str, default_voice: &str) -> Vec<VoiceSection> {
    let mut sections = Vec::new();
    let mut voice = default_voice.to_string();
    let mut cursor = 0;

    for caps in BRACKET_RE.captures_iter(article) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_section(&mut sections, &voice, &article[cursor..whole.start()]);
        voice = name.as_str().to_string();
        cursor = whole.end();
    }
    push_section(&mut sections, &voice, &article[cursor..]);

    sections
}

fn push_section(sections: &mut Vec<VoiceSection>, voice: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    sections.push(VoiceSection {
        voice_id: voice.to_string(),
        text: text.to_string(),
    });
}

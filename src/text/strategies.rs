//! Стратегии разбиения длинных строк
//!
//! Каждая стратегия принимает строку и максимальную длину и возвращает список
//! фрагментов. Фрагменты длиннее лимита передаются следующей стратегии цепочки.

use super::char_len;

/// Стратегия разбиения
pub type SplitStrategy = fn(&str, usize) -> Vec<String>;

/// Цепочка стратегий в порядке применения
pub const CASCADE: [SplitStrategy; 4] = [split_sentences, pack_commas, pack_words, hard_slice];

const SENTENCE_BREAKS: &[char] = &['。', '！', '？', '!', '.', '?', '；', ';', '，', ','];
const COMMAS: &[char] = &['，', ',', '、'];
const CLOSERS: &[char] = &['"', '\'', '”', '’', '」', '』', ')', '）', '》'];

/// Разбить строку цепочкой стратегий
///
/// Все возвращаемые фрагменты непустые, обрезаны по краям и не длиннее `max_len`.
pub fn split_with_cascade(text: &str, max_len: usize) -> Vec<String> {
    cascade_from(text, max_len.max(1), 0)
}

fn cascade_from(text: &str, max_len: usize, level: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let Some(strategy) = CASCADE.get(level) else {
        return hard_slice(text, max_len);
    };

    let mut result = Vec::new();
    for piece in strategy(text, max_len) {
        if char_len(&piece) <= max_len {
            push_trimmed(&mut result, &piece);
        } else {
            result.extend(cascade_from(&piece, max_len, level + 1));
        }
    }
    result
}

/// Разбить по знакам конца предложения, оставляя знак при фрагменте
///
/// Серии знаков (`?!`, `...`) и закрывающие кавычки остаются вместе.
/// Точка или запятая между двумя цифрами не считается границей.
pub fn split_sentences(text: &str, _max_len: usize) -> Vec<String> {
    split_after(text, SENTENCE_BREAKS)
}

/// Разбить по запятым и жадно упаковать соседние части в пределах лимита
pub fn pack_commas(text: &str, max_len: usize) -> Vec<String> {
    let pieces = split_after(text, COMMAS);
    greedy_pack(pieces, max_len, "")
}

/// Жадно упаковать слова, разделенные пробелами
///
/// Слово длиннее лимита возвращается отдельным фрагментом.
pub fn pack_words(text: &str, max_len: usize) -> Vec<String> {
    let words = text.split_whitespace().map(str::to_string).collect();
    greedy_pack(words, max_len, " ")
}

/// Нарезать строку на куски по `max_len` символов
pub fn hard_slice(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut result = Vec::new();
    for chunk in chars.chunks(max_len.max(1)) {
        let piece: String = chunk.iter().collect();
        push_trimmed(&mut result, &piece);
    }
    result
}

fn split_after(text: &str, breaks: &[char]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut result = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if breaks.contains(&c) && !is_numeric_separator(&chars, i) {
            while i + 1 < chars.len()
                && (breaks.contains(&chars[i + 1]) || CLOSERS.contains(&chars[i + 1]))
            {
                i += 1;
                current.push(chars[i]);
            }
            push_raw(&mut result, &current);
            current.clear();
        }
        i += 1;
    }
    push_raw(&mut result, &current);

    result
}

fn is_numeric_separator(chars: &[char], i: usize) -> bool {
    matches!(chars[i], '.' | ',')
        && i > 0
        && i + 1 < chars.len()
        && chars[i - 1].is_ascii_digit()
        && chars[i + 1].is_ascii_digit()
}

/// Упаковать части, пока суммарная длина не превышает лимит
///
/// Части сохраняют исходные пробелы, обрезается только результат.
fn greedy_pack(pieces: Vec<String>, max_len: usize, separator: &str) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);
        let extra = if current.is_empty() { piece_len } else { sep_len + piece_len };

        if !current.is_empty() && current_len + extra > max_len {
            push_trimmed(&mut result, &current);
            current.clear();
            current_len = 0;
        }

        if !current.is_empty() {
            current.push_str(separator);
            current_len += sep_len;
        }
        current.push_str(&piece);
        current_len += piece_len;
    }
    push_trimmed(&mut result, &current);

    result
}

fn push_raw(result: &mut Vec<String>, piece: &str) {
    if !piece.trim().is_empty() {
        result.push(piece.to_string());
    }
}

fn push_trimmed(result: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        result.push(piece.to_string());
    }
}

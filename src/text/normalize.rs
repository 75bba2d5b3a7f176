//! Подготовка текста фрагмента для синтеза
//!
//! Нормализация применяется только к тексту, который уходит в движок.
//! Идентичность фрагмента в кэше и метаданные строятся по исходному тексту.

use std::borrow::Cow;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // Группы тысяч через запятую идут первой альтернативой
    static ref NUMBER_RE: Regex =
        Regex::new(r"([0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.([0-9]+))?(年)?").unwrap();
}

const DIGITS: [char; 10] = ['零', '一', '二', '三', '四', '五', '六', '七', '八', '九'];
const GROUP_UNITS: [&str; 4] = ["", "万", "亿", "万亿"];

/// Нормализатор текста
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    polyphones: Option<Regex>,
    replacements: BTreeMap<String, String>,
    convert_numbers: bool,
}

impl TextNormalizer {
    /// Создать нормализатор со словарем замен
    ///
    /// Более длинные ключи имеют приоритет над более короткими.
    pub fn new(polyphones: &BTreeMap<String, String>, convert_numbers: bool) -> Self {
        let mut keys: Vec<&String> = polyphones.keys().filter(|k| !k.is_empty()).collect();
        keys.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

        let pattern = keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let polyphones_re = if pattern.is_empty() {
            None
        } else {
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Failed to build polyphone pattern, replacements disabled: {}", e);
                    None
                }
            }
        };

        Self {
            polyphones: polyphones_re,
            replacements: polyphones.clone(),
            convert_numbers,
        }
    }

    /// Подготовить текст для синтеза
    pub fn normalize(&self, text: &str) -> String {
        let mut result = match &self.polyphones {
            Some(re) => re
                .replace_all(text, |caps: &Captures| {
                    let key = &caps[0];
                    self.replacements.get(key).cloned().unwrap_or_else(|| key.to_string())
                })
                .into_owned(),
            None => text.to_string(),
        };

        if self.convert_numbers {
            result = convert_numbers(&result);
        }
        result
    }
}

/// Заменить арабские числа на китайские числительные
///
/// Четырехзначное число перед `年` читается по цифрам, дробная часть
/// читается по цифрам после `点`. Полноширинные цифры читаются как обычные,
/// разделители тысяч отбрасываются.
pub fn convert_numbers(text: &str) -> String {
    let text = ascii_digits(text);
    NUMBER_RE
        .replace_all(&text, |caps: &Captures| {
            let integer = caps[1].replace(',', "");
            let integer = integer.as_str();
            let fraction = caps.get(2).map(|m| m.as_str());
            let year = caps.get(3).is_some();

            if year && fraction.is_none() && integer.len() == 4 {
                return format!("{}年", read_digits(integer));
            }

            let mut out = read_integer_str(integer);
            if let Some(fraction) = fraction {
                out.push('点');
                out.push_str(&read_digits(fraction));
            }
            if year {
                out.push('年');
            }
            out
        })
        .into_owned()
}

/// Заменить полноширинные цифры `０`..`９` на ASCII
fn ascii_digits(text: &str) -> Cow<'_, str> {
    if !text.chars().any(is_fullwidth_digit) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| {
                if is_fullwidth_digit(c) {
                    char::from(b'0' + (c as u32 - '０' as u32) as u8)
                } else {
                    c
                }
            })
            .collect(),
    )
}

fn is_fullwidth_digit(c: char) -> bool {
    ('０'..='９').contains(&c)
}

fn read_digits(digits: &str) -> String {
    digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| DIGITS[d as usize])
        .collect()
}

fn read_integer_str(digits: &str) -> String {
    if digits.len() > 1 && digits.starts_with('0') {
        return read_digits(digits);
    }
    match digits.parse::<u64>() {
        Ok(n) if n < 10_000_000_000_000_000 => read_integer(n),
        _ => read_digits(digits),
    }
}

/// Прочитать целое число (меньше 10^16)
pub fn read_integer(n: u64) -> String {
    if n == 0 {
        return DIGITS[0].to_string();
    }

    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 10_000);
        rest /= 10_000;
    }
    if groups.len() > GROUP_UNITS.len() {
        return read_digits(&n.to_string());
    }

    let mut out = String::new();
    let mut need_zero = false;
    for (i, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            if !out.is_empty() {
                need_zero = true;
            }
            continue;
        }
        if !out.is_empty() && (need_zero || *group < 1000) {
            out.push(DIGITS[0]);
        }
        out.push_str(&read_group(*group));
        out.push_str(GROUP_UNITS[i]);
        need_zero = false;
    }

    if out.starts_with("一十") {
        out = out.replacen("一十", "十", 1);
    }
    out
}

fn read_group(group: u64) -> String {
    const UNITS: [&str; 4] = ["千", "百", "十", ""];
    let digits = [group / 1000, group / 100 % 10, group / 10 % 10, group % 10];

    let mut out = String::new();
    let mut started = false;
    let mut pending_zero = false;
    for (digit, unit) in digits.iter().zip(UNITS) {
        if *digit == 0 {
            if started {
                pending_zero = true;
            }
            continue;
        }
        if pending_zero {
            out.push(DIGITS[0]);
            pending_zero = false;
        }
        out.push(DIGITS[*digit as usize]);
        out.push_str(unit);
        started = true;
    }
    out
}

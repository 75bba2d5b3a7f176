//! Разбиение статьи на фрагменты для синтеза

use super::markers::parse_sections;
use super::strategies::split_with_cascade;
use super::TextUnit;

/// Разбиение статьи на фрагменты ограниченной длины с голосовыми метками
#[derive(Debug, Clone)]
pub struct ArticleSplitter {
    max_length: usize,
}

impl ArticleSplitter {
    /// Создать новый экземпляр ArticleSplitter
    ///
    /// Лимит меньше единицы приводится к единице.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Разбить статью на фрагменты
    ///
    /// Каждая строка участка обрабатывается отдельно: строка, укладывающаяся в лимит,
    /// становится фрагментом без изменений, длинная строка режется цепочкой стратегий.
    /// Индексы фрагментов назначаются после разбиения всей статьи.
    pub fn split(&self, article: &str, default_voice: &str) -> Vec<TextUnit> {
        let mut units = Vec::new();

        for section in parse_sections(article, default_voice) {
            for line in section.text.lines() {
                for text in split_with_cascade(line, self.max_length) {
                    units.push(TextUnit {
                        index: 0,
                        text,
                        voice_id: section.voice_id.clone(),
                    });
                }
            }
        }

        for (index, unit) in units.iter_mut().enumerate() {
            unit.index = index;
        }

        log::debug!("Split article into {} units (max length {})", units.len(), self.max_length);
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::DEFAULT_VOICE;

    #[test]
    fn test_bracket_article() {
        let splitter = ArticleSplitter::new(200);
        let units = splitter.split("[main]\n你好世界。\n[narrator]\nThis is a test.", DEFAULT_VOICE);

        assert_eq!(units, vec![
            TextUnit { index: 0, text: "你好世界。".to_string(), voice_id: "main".to_string() },
            TextUnit {
                index: 1,
                text: "This is a test.".to_string(),
                voice_id: "narrator".to_string(),
            },
        ]);
    }

    #[test]
    fn test_directive_article() {
        let splitter = ArticleSplitter::new(200);
        let units = splitter.split(r#"{"name":"f-a/happy"} Hello there"#, DEFAULT_VOICE);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].index, 0);
        assert_eq!(units[0].voice_id, "f-a/happy");
        assert_eq!(units[0].text, "Hello there");
    }

    #[test]
    fn test_lines_are_unit_boundaries() {
        let splitter = ArticleSplitter::new(200);
        let units = splitter.split("first line\n\n\nsecond line\n", DEFAULT_VOICE);
        let texts: Vec<_> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["first line", "second line"]);
    }

    #[test]
    fn test_long_line_is_split_and_renumbered() {
        let splitter = ArticleSplitter::new(10);
        let article = "[a]\n第一句话很长很长。第二句。\n[b]\n短句\n   \n";
        let units = splitter.split(article, DEFAULT_VOICE);

        let indices: Vec<_> = units.iter().map(|u| u.index).collect();
        assert_eq!(indices, (0..units.len()).collect::<Vec<_>>());
        assert!(units.iter().all(|u| u.text.chars().count() <= 10));
        assert_eq!(units.last().map(|u| u.voice_id.as_str()), Some("b"));
        assert_eq!(units[1].text, "第二句。");
    }

    #[test]
    fn test_preserves_visible_characters() {
        let splitter = ArticleSplitter::new(7);
        let article = "[x]\nAlpha beta, gamma delta; epsilon!\n[y]\n一二三四五六七八九十，十一十二。";
        let units = splitter.split(article, DEFAULT_VOICE);

        let joined: String = units
            .iter()
            .flat_map(|u| u.text.chars())
            .filter(|c| !c.is_whitespace())
            .collect();
        let expected: String = "Alpha beta, gamma delta; epsilon!一二三四五六七八九十，十一十二。"
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn test_empty_article_yields_no_units() {
        let splitter = ArticleSplitter::new(0);
        assert_eq!(splitter.max_length(), 1);
        assert!(splitter.split("  \n [main] \n", DEFAULT_VOICE).is_empty());
    }
}

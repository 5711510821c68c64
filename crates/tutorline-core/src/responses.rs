//! Static reply content: persona prompt, canned replies, fallbacks.
//!
//! Loaded once at startup and never mutated; every lookup is a pure function
//! of the table and the incoming message.

use crate::cache::normalize;
use crate::error::{Result, TutorError};
use crate::topics::{TopicRule, TopicTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const GREETING_REPLY: &str = "👋 **Привет!** Я твой AI-помощник по учёбе.\n\n\
Я могу помочь тебе с:\n\
- 🐍 **Python** — код, ошибки, концепции\n\
- 🎨 **Figma** — дизайн, UI/UX, макеты\n\
- 💻 **Программирование** — любые вопросы\n\n\
Просто напиши свой вопрос!";

const ABOUT_REPLY: &str = "Я **AI-помощник** образовательной платформы. \
Помогаю разбираться в Python, Figma, веб-разработке и многом другом! 🚀";

const STATUS_REPLY: &str = "У меня всё отлично! 😊 Готова помогать тебе с Python, Figma \
и программированием. Что тебя интересует?";

const BASE_PERSONA: &str = "Ты — дружелюбный AI-помощник образовательной платформы.\n\n\
ТВОЯ ЛИЧНОСТЬ:\n\
- Ты дружелюбная, умная и полезная\n\
- Отвечаешь на РУССКОМ языке\n\
- Используешь эмодзи умеренно\n\n\
СПЕЦИАЛИЗАЦИЯ:\n\
- Python (программирование)\n\
- Figma (дизайн интерфейсов)\n\
- Общие вопросы по программированию и дизайну\n\n\
СТИЛЬ ОТВЕТОВ:\n\
1. Отвечай полно и информативно\n\
2. Структурируй ответы с заголовками и списками\n\
3. Используй примеры кода когда уместно\n\
4. Объясняй простым языком\n\
5. Если не знаешь ответ — честно скажи об этом";

/// Ordered default topic rules; order decides which fallback wins.
fn default_topics() -> TopicTable {
    TopicTable::new(vec![
        TopicRule::new(
            "python",
            "Python",
            &["python", "питон", "пайтон", "код", "программ", "функци", "класс", "переменн"],
        )
        .with_fallback(
            "🐍 Сейчас я не могу подключиться к нейросети, но вот что поможет с **Python**:\n\n\
             - Перечитай текст ошибки: последняя строка traceback обычно указывает причину\n\
             - Проверь отступы и типы данных (`type(x)`)\n\
             - Добавь `print()` рядом с проблемным местом\n\n\
             Повтори вопрос через минуту, и я отвечу подробно!",
        ),
        TopicRule::new(
            "figma",
            "Figma/дизайн",
            &["figma", "фигма", "дизайн", "ui", "ux", "интерфейс", "макет", "прототип"],
        )
        .with_fallback(
            "🎨 Сейчас я не могу подключиться к нейросети, но вот советы по **Figma**:\n\n\
             - Используй Auto Layout для адаптивных блоков\n\
             - Выноси повторяющиеся элементы в компоненты\n\
             - Держи единую сетку и стили текста\n\n\
             Повтори вопрос через минуту, и я разберу его подробнее!",
        ),
        TopicRule::new(
            "web",
            "веб-разработка",
            &["html", "css", "javascript", "js", "веб", "сайт", "страниц"],
        )
        .with_fallback(
            "🌐 Сейчас я не могу подключиться к нейросети, но вот что проверить в **веб-разработке**:\n\n\
             - Открой консоль браузера (F12) и посмотри ошибки\n\
             - Проверь, что стили и скрипты подключены по верным путям\n\
             - Проверь вложенность HTML-тегов\n\n\
             Повтори вопрос через минуту!",
        ),
        TopicRule::new(
            "database",
            "базы данных",
            &["база данных", "sql", "mongodb", "firebase", "firestore"],
        ),
        TopicRule::new(
            "api",
            "API/серверы",
            &["api", "rest", "запрос", "endpoint", "сервер"],
        ),
    ])
}

fn default_canned() -> BTreeMap<String, String> {
    let mut canned = BTreeMap::new();
    for phrase in ["привет", "здравствуй", "здравствуйте", "хай", "hello", "hi", "салам"] {
        canned.insert(phrase.to_string(), GREETING_REPLY.to_string());
    }
    for phrase in ["кто ты", "кто ты?", "who are you", "расскажи о себе"] {
        canned.insert(phrase.to_string(), ABOUT_REPLY.to_string());
    }
    for phrase in ["как дела", "как дела?", "как ты", "как ты?"] {
        canned.insert(phrase.to_string(), STATUS_REPLY.to_string());
    }
    canned
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTables {
    /// System instruction sent with every provider call.
    pub persona: String,
    /// Extra instruction appended for a given interaction mode.
    pub mode_instructions: BTreeMap<String, String>,
    /// Normalized phrase → reply. Keys must already be normalized.
    pub canned: BTreeMap<String, String>,
    pub topics: TopicTable,
    /// Served when the provider reports quota exhaustion.
    pub quota_apology: String,
    /// Served on any other provider failure when no topic fallback matches.
    pub generic_fallback: String,
    /// Served when the provider answers with (almost) nothing.
    pub empty_reply: String,
    pub brief_instruction: String,
    pub detailed_instruction: String,
    pub steps_instruction: String,
}

impl Default for ResponseTables {
    fn default() -> Self {
        let mut mode_instructions = BTreeMap::new();
        mode_instructions.insert(
            "debug".to_string(),
            "Пользователь отлаживает код. Сначала найди причину ошибки, затем предложи исправление."
                .to_string(),
        );

        Self {
            persona: BASE_PERSONA.to_string(),
            mode_instructions,
            canned: default_canned(),
            topics: default_topics(),
            quota_apology: "Я получила слишком много запросов сразу. Пожалуйста, подождите \
                            минутку, и я снова буду готова отвечать!"
                .to_string(),
            generic_fallback: "Извините, у меня возникли временные трудности с подключением \
                               к нейросети. Пожалуйста, попробуйте повторить ваш вопрос чуть \
                               позже. Я обязательно помогу вам!"
                .to_string(),
            empty_reply: "Извините, я не смогла сформулировать ответ. Попробуйте \
                          перефразировать ваш вопрос, я обязательно постараюсь помочь!"
                .to_string(),
            brief_instruction: "ОТВЕТЬ МАКСИМАЛЬНО КРАТКО.".to_string(),
            detailed_instruction: "ДАЙ РАЗВЕРНУТЫЙ И ПОДРОБНЫЙ ОТВЕТ.".to_string(),
            steps_instruction: "РАЗБЕЙ ОТВЕТ НА ПОШАГОВУЮ ИНСТРУКЦИЮ.".to_string(),
        }
    }
}

/// Key used for canned lookups: normalized, with trailing `!` dropped.
pub fn canned_key(message: &str) -> String {
    normalize(message).trim_end_matches('!').trim_end().to_string()
}

impl ResponseTables {
    pub fn canned_reply(&self, message: &str) -> Option<&str> {
        self.canned.get(&canned_key(message)).map(String::as_str)
    }

    /// Topic-specific fallback for `message`, or the generic one.
    pub fn fallback_for(&self, message: &str) -> &str {
        self.topics
            .fallback_for(message)
            .unwrap_or(&self.generic_fallback)
    }

    pub fn validate(&self) -> Result<()> {
        if self.persona.trim().is_empty() {
            return Err(TutorError::Config("responses.persona must not be empty".into()));
        }
        for phrase in self.canned.keys() {
            if canned_key(phrase) != *phrase {
                return Err(TutorError::Config(format!(
                    "canned phrase '{}' is not normalized (expected '{}')",
                    phrase,
                    canned_key(phrase)
                )));
            }
        }
        self.topics.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ResponseTables::default().validate().unwrap();
    }

    #[test]
    fn test_canned_lookup_ignores_case_whitespace_and_bang() {
        let tables = ResponseTables::default();
        let greeting = tables.canned_reply("привет").unwrap();
        assert_eq!(tables.canned_reply("  ПРИВЕТ!! "), Some(greeting));
        assert_eq!(tables.canned_reply("Hello!"), Some(greeting));
        assert!(tables.canned_reply("привет, объясни циклы").is_none());
    }

    #[test]
    fn test_fallback_routes_by_topic() {
        let tables = ResponseTables::default();
        let python = tables.topics.rules()[0].fallback.clone().unwrap();
        assert_eq!(tables.fallback_for("Почему мой код на Python падает?"), python);
        assert_eq!(
            tables.fallback_for("Сколько будет дважды два"),
            tables.generic_fallback
        );
    }

    #[test]
    fn test_validate_rejects_unnormalized_canned_key() {
        let mut tables = ResponseTables::default();
        tables.canned.insert("Привет!".into(), "x".into());
        assert!(tables.validate().is_err());
    }
}

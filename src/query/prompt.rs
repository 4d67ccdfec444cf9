//! Prompt framing and answer cleanup

use crate::error::QueryError;
use serde::Deserialize;
use std::path::Path;

/// Optional description of the classroom, loaded from JSON
///
/// ```json
/// {
///   "aula": "3er grado B",
///   "palabra_clave_asamblea": "manzanita",
///   "temas_aprendidos": ["frutas", "agua"],
///   "preferencias_locales": ["quinua", "chicha morada"]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClassroomProfile {
    #[serde(default)]
    pub aula: Option<String>,
    #[serde(default)]
    pub palabra_clave_asamblea: Option<String>,
    #[serde(default)]
    pub temas_aprendidos: Vec<String>,
    #[serde(default)]
    pub preferencias_locales: Vec<String>,
}

impl ClassroomProfile {
    pub fn load(path: &Path) -> Result<Self, QueryError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Classroom(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents).map_err(|e| match e {
            QueryError::Classroom(msg) => QueryError::Classroom(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(json: &str) -> Result<Self, QueryError> {
        serde_json::from_str(json).map_err(|e| QueryError::Classroom(e.to_string()))
    }

    /// Context lines inserted before the question
    pub fn render(&self) -> String {
        let or = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let list = |items: &[String], fallback: &str| {
            if items.is_empty() {
                fallback.to_string()
            } else {
                items.join(", ")
            }
        };

        format!(
            "Aula: {}\nPalabra clave de asamblea: {}\nTemas aprendidos: {}\nPreferencias locales: {}\n",
            or(&self.aula, "No especificado"),
            or(&self.palabra_clave_asamblea, "Ninguna"),
            list(&self.temas_aprendidos, "Ninguno"),
            list(&self.preferencias_locales, "Ninguna"),
        )
    }
}

/// Template with `{question}` and optional `{classroom}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    classroom: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, classroom: Option<&ClassroomProfile>) -> Self {
        Self {
            template: template.into(),
            classroom: classroom.map(ClassroomProfile::render).unwrap_or_default(),
        }
    }

    pub fn build(&self, question: &str) -> String {
        // Classroom first so a question containing "{classroom}" stays literal
        self.template
            .replace("{classroom}", &self.classroom)
            .replace("{question}", question.trim())
    }
}

/// Strip model chatter from a raw generation.
///
/// Keeps the text after the last `[/INST]`, cuts at the earliest stop
/// token, drops `<s>`/`</s>` markers and trims.
pub fn clean_response<S: AsRef<str>>(raw: &str, stop_tokens: &[S]) -> String {
    let mut text = match raw.rfind("[/INST]") {
        Some(pos) => &raw[pos + "[/INST]".len()..],
        None => raw,
    };

    let cut = stop_tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| !t.is_empty())
        .filter_map(|t| text.find(t))
        .min();
    if let Some(cut) = cut {
        text = &text[..cut];
    }

    text.replace("</s>", "").replace("<s>", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROMPT;

    const STOPS: &[&str] = &["<s>[INST]", "\nTú:", "¿Por", "Qué", "cómo"];

    #[test]
    fn test_build_without_classroom() {
        let template = PromptTemplate::new(DEFAULT_PROMPT, None);
        let prompt = template.build("  ¿Por qué debo tomar agua? ");
        assert!(prompt.ends_with("Pregunta: ¿Por qué debo tomar agua?"));
        assert!(!prompt.contains("{classroom}"));
        assert!(!prompt.contains("Aula:"));
    }

    #[test]
    fn test_build_with_classroom() {
        let profile = ClassroomProfile::parse(
            r#"{"aula": "2do A", "temas_aprendidos": ["frutas", "verduras"]}"#,
        )
        .unwrap();
        let template = PromptTemplate::new("{classroom}Pregunta: {question}", Some(&profile));
        assert_eq!(
            template.build("hola"),
            "Aula: 2do A\nPalabra clave de asamblea: Ninguna\n\
             Temas aprendidos: frutas, verduras\nPreferencias locales: Ninguna\n\
             Pregunta: hola"
        );
    }

    #[test]
    fn test_question_placeholder_text_is_not_expanded() {
        let template = PromptTemplate::new("{classroom}Q: {question}", None);
        assert_eq!(template.build("{classroom}"), "Q: {classroom}");
    }

    #[test]
    fn test_classroom_invalid_json() {
        assert!(matches!(
            ClassroomProfile::parse("{not json"),
            Err(QueryError::Classroom(_))
        ));
    }

    #[test]
    fn test_classroom_load_missing_file() {
        let err = ClassroomProfile::load(Path::new("/nonexistent/salon.json")).unwrap_err();
        assert!(err.to_string().contains("salon.json"));
    }

    #[test]
    fn test_clean_keeps_text_after_last_inst() {
        let raw = "<s>[INST] hola [/INST] eco [/INST] Las frutas te dan energía.</s>";
        assert_eq!(clean_response(raw, STOPS), "Las frutas te dan energía.");
    }

    #[test]
    fn test_clean_cuts_at_earliest_stop_token() {
        let raw = "Toma agua todos los días. ¿Por qué? Qué rico\nTú: otra";
        assert_eq!(clean_response(raw, STOPS), "Toma agua todos los días.");
    }

    #[test]
    fn test_clean_follow_up_turn_removed() {
        let raw = "El agua es vida.\nTú: ¿y la leche?";
        assert_eq!(clean_response(raw, STOPS), "El agua es vida.");
    }

    #[test]
    fn test_clean_plain_text_untouched() {
        assert_eq!(clean_response("  Come frutas.  ", STOPS), "Come frutas.");
        assert_eq!(clean_response("Come frutas.", &[] as &[&str]), "Come frutas.");
    }

    #[test]
    fn test_clean_can_become_empty() {
        assert_eq!(clean_response("[/INST] ¿Por qué?", STOPS), "");
        assert_eq!(clean_response("<s></s>", STOPS), "");
    }
}

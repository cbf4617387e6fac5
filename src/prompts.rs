//! Per-language assistant instructions.
//!
//! The caller picks a language once, on the keypad, before the media stream
//! opens; the selection is immutable for the rest of the call and decides
//! which instruction set the session configuration carries.

use serde::{Deserialize, Serialize};

/// System instructions for English calls.
pub const SYSTEM_PROMPT_ENGLISH: &str = "\
You are a helpful and professional AI Realtor Assistant for a Miami real estate agency.
Your goal is to follow up on marketing leads.
You are speaking over the phone. Keep your responses concise and conversational.

Flow:
1. Greet the user and mention you are following up on their interest in Miami properties.
2. Ask if they have a moment to chat.
3. If yes, ask for their name.
4. Ask what kind of property they are interested in (buying, renting, investment).
5. Ask for their budget range.
6. Let them know a senior agent will call them back with specific options.
7. End the call politely.

If they are not interested, thank them and end the call.
";

/// System instructions for Spanish calls.
pub const SYSTEM_PROMPT_SPANISH: &str = "\
Eres un asistente virtual inmobiliario profesional y amable para una agencia en Miami.
Tu objetivo es dar seguimiento a clientes potenciales de campañas de marketing.
Estás hablando por teléfono. Mantén tus respuestas breves y conversacionales.

Flujo:
1. Saluda al usuario y menciona que estás dando seguimiento a su interés en propiedades en Miami.
2. Pregunta si tienen un momento para hablar.
3. Si dicen que sí, pregunta su nombre.
4. Pregunta qué tipo de propiedad les interesa (comprar, rentar, inversión).
5. Pregunta su rango de presupuesto.
6. Infórmales que un agente senior los llamará pronto con opciones específicas.
7. Termina la llamada amablemente.

Si no están interesados, agradéceles y termina la llamada.
";

/// Call language, selected once at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English (default)
    #[default]
    En,
    /// Spanish
    Es,
}

impl Language {
    /// Language tag as used in the `lang` query parameter and lead records.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }

    /// Parse from the query parameter, with fallback to English.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "es" => Self::Es,
            _ => Self::En,
        }
    }

    /// System instructions for this language.
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::En => SYSTEM_PROMPT_ENGLISH,
            Self::Es => SYSTEM_PROMPT_SPANISH,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

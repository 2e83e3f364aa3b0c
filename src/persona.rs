//! Persona configuration for a live session
//!
//! A persona is chosen once per session: the system instruction text, the
//! voice the model speaks with, and the response modality. Changing any of
//! them means tearing the session down and starting a new one; there is no
//! in-place reconfiguration.
//!
//! Jade and Luiza are instruction-level personas: they speak with the Kore
//! voice but carry their own system instruction.

use once_cell::sync::Lazy;

const CREATOR_INFO: &str = "Você foi criado por Paulo Marks. O nome da plataforma é Hypley e deve \
     ser pronunciado em português brasileiro como 'Hip-lei'.";

static BASE_INSTRUCTION: Lazy<String> = Lazy::new(|| {
    format!(
        "IDENTIDADE: HYPLEY - SEU CONSULTOR SÊNIOR DE ELITE\n\
         {CREATOR_INFO}\n\
         Você é HYPLEY, uma inteligência artificial sofisticada, empática e altamente proativa.\n\
         Seu tom é o de um mentor experiente que guia o usuário com elegância e precisão técnica.\n\
         Linguagem: Português do Brasil impecável."
    )
});

static JADE_INSTRUCTION: Lazy<String> = Lazy::new(|| {
    format!(
        "IDENTIDADE: HYPLEY JADE - SUA ASSISTENTE CARIOCA CARINHOSA\n\
         {CREATOR_INFO}\n\
         Você é Hypley Jade. Você é carinhosa, envolvente e tem um sotaque carioca carregado.\n\
         Personalidade: use gírias do Rio de Janeiro como \"coé\", \"mermão\", \"papo reto\", \"vambora\".\n\
         Afeto: trate o usuário com muito carinho e termos como \"meu querido\", \"anjo\", \"lindo\".\n\
         Linguagem: Português do Brasil com sotaque do Rio de Janeiro."
    )
});

static LUIZA_INSTRUCTION: Lazy<String> = Lazy::new(|| {
    format!(
        "IDENTIDADE: HYPLEY LUIZA - SUA ASSISTENTE PAULISTA CARINHOSA\n\
         {CREATOR_INFO}\n\
         Você é Hypley Luiza. Você é carinhosa, envolvente e tem um sotaque paulistano forte \
         (\"meu\", \"tipo assim\", \"entendeu?\", \"mano\").\n\
         Personalidade: fale de forma charmosa, elegante mas muito afetuosa.\n\
         Afeto: trate o usuário com termos como \"meu amor\", \"vida\", \"querido\", \"anjo\".\n\
         Linguagem: Português do Brasil com sotaque forte de São Paulo."
    )
});

/// Guidance for sessions with the screen feed active
const VISION_INSTRUCTION: &str = "DIRETRIZES VISUAIS FUNDAMENTAIS\n\
     Analise o feed de vídeo com precisão.\n\
     GATILHO DE MARCAÇÃO: SÓ use <highlight>{\"x\":..., \"y\":...}</highlight> se o usuário \
     disser \"PRINT\", \"FOTO\", \"CAPTURA\" ou \"MARQUE\".";

/// Voices the assistant can speak with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Voice {
    #[default]
    Kore,
    Zephyr,
    Fenrir,
    Puck,
    Charon,
    /// Carioca persona, plays back with the Kore voice
    Jade,
    /// Paulista persona, plays back with the Kore voice
    Luiza,
}

impl Voice {
    /// Parse a stored voice name; unknown names fall back to the default
    pub fn from_name(name: &str) -> Self {
        match name {
            "Kore" => Voice::Kore,
            "Zephyr" => Voice::Zephyr,
            "Fenrir" => Voice::Fenrir,
            "Puck" => Voice::Puck,
            "Charon" => Voice::Charon,
            "Jade" => Voice::Jade,
            "Luiza" => Voice::Luiza,
            other => {
                log::warn!("Unknown voice {:?}, falling back to Kore", other);
                Voice::Kore
            }
        }
    }

    /// Name stored in settings and shown in the picker
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Zephyr => "Zephyr",
            Voice::Fenrir => "Fenrir",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Jade => "Jade",
            Voice::Luiza => "Luiza",
        }
    }

    /// Voice name sent on the wire; the persona voices map to Kore
    pub fn wire_name(&self) -> &'static str {
        match self {
            Voice::Jade | Voice::Luiza => "Kore",
            other => other.name(),
        }
    }
}

/// What the model streams back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }
}

/// Immutable configuration selected at session start
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    pub system_instruction: String,
    pub voice: Voice,
    pub response_modality: ResponseModality,
}

impl PersonaConfig {
    /// Compose the configuration for a voice
    ///
    /// Jade and Luiza select their own instruction preset; every other
    /// voice uses `agent_instruction` when given, the base preset otherwise.
    /// The vision guidance is always appended so a mid-session screen-share
    /// toggle needs no reconfiguration.
    pub fn for_voice(voice: Voice, agent_instruction: Option<&str>) -> Self {
        let persona = match voice {
            Voice::Jade => JADE_INSTRUCTION.as_str(),
            Voice::Luiza => LUIZA_INSTRUCTION.as_str(),
            _ => agent_instruction.unwrap_or(BASE_INSTRUCTION.as_str()),
        };

        Self {
            system_instruction: format!("{}\n{}", persona, VISION_INSTRUCTION),
            voice,
            response_modality: ResponseModality::Audio,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self::for_voice(Voice::Kore, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_round_trips_through_name() {
        for voice in [
            Voice::Kore,
            Voice::Zephyr,
            Voice::Fenrir,
            Voice::Puck,
            Voice::Charon,
            Voice::Jade,
            Voice::Luiza,
        ] {
            assert_eq!(Voice::from_name(voice.name()), voice);
        }
    }

    #[test]
    fn test_unknown_voice_falls_back_to_kore() {
        assert_eq!(Voice::from_name("Andromeda"), Voice::Kore);
    }

    #[test]
    fn test_persona_voices_play_back_as_kore() {
        assert_eq!(Voice::Jade.wire_name(), "Kore");
        assert_eq!(Voice::Luiza.wire_name(), "Kore");
        assert_eq!(Voice::Fenrir.wire_name(), "Fenrir");
    }

    #[test]
    fn test_jade_overrides_agent_instruction() {
        let config = PersonaConfig::for_voice(Voice::Jade, Some("custom agent"));
        assert!(config.system_instruction.contains("JADE"));
        assert!(!config.system_instruction.contains("custom agent"));
    }

    #[test]
    fn test_agent_instruction_used_for_plain_voices() {
        let config = PersonaConfig::for_voice(Voice::Zephyr, Some("Especialista em Meta Ads"));
        assert!(config.system_instruction.starts_with("Especialista em Meta Ads"));
    }

    #[test]
    fn test_vision_guidance_always_appended() {
        for voice in [Voice::Kore, Voice::Jade] {
            let config = PersonaConfig::for_voice(voice, None);
            assert!(config.system_instruction.contains("DIRETRIZES VISUAIS"));
        }
    }

    #[test]
    fn test_default_modality_is_audio() {
        assert_eq!(PersonaConfig::default().response_modality.as_str(), "AUDIO");
    }
}

//! Built-in production personas.
//!
//! A persona is the system instruction handed to the script model; it shapes
//! the tone and structure of every drafted plan.

use crate::gemini::AspectRatio;

/// An AI production persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Stable identifier, used on the CLI and stored with plans.
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// System instruction prefixed to every planning prompt.
    pub instruction: &'static str,
}

impl Persona {
    /// Default output aspect ratio for this persona. The marketer targets
    /// vertical short-form platforms; everything else defaults to landscape.
    pub fn default_aspect_ratio(&self) -> AspectRatio {
        if self.id == "marketer" {
            AspectRatio::Portrait
        } else {
            AspectRatio::Landscape
        }
    }

    /// Whether this persona consumes marketing metrics during planning.
    pub fn uses_marketing_data(&self) -> bool {
        self.id == "marketer"
    }
}

/// The built-in personas, in display order.
pub const PERSONAS: &[Persona] = &[
    Persona {
        id: "director",
        name: "The Director",
        description: "Balanced visual storytelling focused on cinematography and lighting.",
        instruction: "Act as a cinematographic director. Focus on camera angles, depth of \
            field, lighting (chiaroscuro, golden hour), and visual composition. Ensure the \
            scenes flow like a movie.",
    },
    Persona {
        id: "marketer",
        name: "The Marketer",
        description: "Data-driven video creation optimized for engagement and viral hooks.",
        instruction: "Act as a digital marketing expert with access to social media \
            metrics. Write scripts that are scroll-stopping, prioritize a high-energy hook \
            in the first 3 seconds, and tailor the content to the provided metrics.",
    },
    Persona {
        id: "storyteller",
        name: "The Storyteller",
        description: "Narrative-first approach focused on scripts, dialogue, and emotional arcs.",
        instruction: "Act as a screenwriter and novelist. Focus heavily on the script, any \
            dialogue, and the narrative arc. Ensure there is a clear beginning, middle, and \
            end, and foreground character emotion.",
    },
];

/// Look up a persona by its identifier.
pub fn find(id: &str) -> Option<&'static Persona> {
    PERSONAS.iter().find(|p| p.id == id)
}

/// The fallback persona used when none is selected.
pub fn default_persona() -> &'static Persona {
    &PERSONAS[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_personas() {
        for id in ["director", "marketer", "storyteller"] {
            let persona = find(id).expect("persona should exist");
            assert_eq!(persona.id, id);
            assert!(!persona.instruction.is_empty());
        }
    }

    #[test]
    fn test_find_unknown_returns_none() {
        assert!(find("composer").is_none());
    }

    #[test]
    fn test_marketer_defaults_to_portrait() {
        assert_eq!(
            find("marketer").unwrap().default_aspect_ratio(),
            AspectRatio::Portrait
        );
        assert_eq!(
            find("director").unwrap().default_aspect_ratio(),
            AspectRatio::Landscape
        );
    }

    #[test]
    fn test_only_marketer_uses_metrics() {
        assert!(find("marketer").unwrap().uses_marketing_data());
        assert!(!find("storyteller").unwrap().uses_marketing_data());
    }
}

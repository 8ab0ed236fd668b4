use regex::Regex;

/// What a cache key asks the reconciler to do, decided from its name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// `rbincident[:<domain>]:incident:<uuid>`, or the legacy
    /// `rbincident_<domain>_incident_<uuid>` where the domain is required.
    CreateIncident {
        incident_uuid: String,
        domain_uuid: Option<String>,
    },
    /// `rbincident:relation:<parent uuid>`. The value holds the child uuid.
    LinkIncident { parent_uuid: String },
    Unmatched,
}

/// Maps key names to a [`KeyKind`]. Patterns are compiled once.
pub struct Classifier {
    create: Regex,
    create_legacy: Regex,
    link: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        // The patterns are constants, a failure here is a programming error
        let compile = |pattern: &str| Regex::new(pattern).expect("valid key pattern");

        Classifier {
            create: compile(r"^rbincident(?::([a-fA-F0-9-]+))?:incident:([a-fA-F0-9-]+)$"),
            create_legacy: compile(r"^rbincident_([a-fA-F0-9-]+)_incident_([a-fA-F0-9-]+)$"),
            link: compile(r"^rbincident:relation:([a-fA-F0-9-]+)$"),
        }
    }

    pub fn classify(&self, key: &str) -> KeyKind {
        if let Some(caps) = self
            .create
            .captures(key)
            .or_else(|| self.create_legacy.captures(key))
        {
            return KeyKind::CreateIncident {
                incident_uuid: caps[2].to_string(),
                domain_uuid: caps.get(1).map(|m| m.as_str().to_string()),
            };
        }

        if let Some(caps) = self.link.captures(key) {
            return KeyKind::LinkIncident {
                parent_uuid: caps[1].to_string(),
            };
        }

        KeyKind::Unmatched
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new()
    }
}

use serde::{Deserialize, Serialize};

/// Default backend for the fast profile
pub const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash";
/// Default backend for the deep-reasoning profile
pub const DEFAULT_DEEP_MODEL: &str = "gemini-2.5-pro";

/// Which backend variant a request runs on.
///
/// Choosing a profile is the caller's job; the client only maps it to a
/// concrete model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    /// Quick answers, no extended reasoning
    Fast,
    /// Extended reasoning, used for the repair loop
    Deep,
}

impl ModelProfile {
    pub fn name(&self) -> &'static str {
        match self {
            ModelProfile::Fast => "fast",
            ModelProfile::Deep => "deep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" | "flash" => Some(ModelProfile::Fast),
            "deep" | "pro" => Some(ModelProfile::Deep),
            _ => None,
        }
    }
}

/// Concrete model identifiers for each profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMap {
    pub fast: String,
    pub deep: String,
}

impl ModelMap {
    pub fn id(&self, profile: ModelProfile) -> &str {
        match profile {
            ModelProfile::Fast => &self.fast,
            ModelProfile::Deep => &self.deep,
        }
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_MODEL.to_string(),
            deep: DEFAULT_DEEP_MODEL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        let map = ModelMap::default();
        assert!(map.id(ModelProfile::Fast).contains("flash"));
        assert!(map.id(ModelProfile::Deep).contains("pro"));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(ModelProfile::parse("FAST"), Some(ModelProfile::Fast));
        assert_eq!(ModelProfile::parse("pro"), Some(ModelProfile::Deep));
        assert_eq!(ModelProfile::parse("smart"), None);
    }
}

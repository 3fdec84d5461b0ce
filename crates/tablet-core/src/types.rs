use serde::{Deserialize, Serialize};

/// Debounced presence of a person in front of the tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    /// Payload published on the `state/presence` topic.
    pub fn as_payload(self) -> &'static str {
        match self {
            Presence::Present => "detected",
            Presence::Absent => "not_detected",
        }
    }

    pub fn is_present(self) -> bool {
        self == Presence::Present
    }
}

/// Which of the two configured web apps the kiosk is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppSelection {
    HomeAssistant,
    Cookbook,
}

impl AppSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            AppSelection::HomeAssistant => "home_assistant",
            AppSelection::Cookbook => "cookbook",
        }
    }

    /// Parse the wire name (`home_assistant` / `cookbook`), case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "home_assistant" => Some(AppSelection::HomeAssistant),
            "cookbook" => Some(AppSelection::Cookbook),
            _ => None,
        }
    }

    /// The other app.
    pub fn toggled(self) -> Self {
        match self {
            AppSelection::HomeAssistant => AppSelection::Cookbook,
            AppSelection::Cookbook => AppSelection::HomeAssistant,
        }
    }
}

/// Brightness (percent) and power of the display as last applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub brightness: u8,
    pub powered: bool,
}

/// Outcome of one detection tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSignal {
    /// A face at or above the confidence threshold was found in the frame.
    pub seen: bool,
    /// Best face confidence in the frame (0.0 when nothing was found or the read failed).
    pub confidence: f32,
}

impl FaceSignal {
    pub fn from_confidence(confidence: f32, threshold: f32) -> Self {
        Self {
            seen: confidence >= threshold,
            confidence,
        }
    }

    /// A tick where the camera read or the inference failed.
    pub fn missed() -> Self {
        Self {
            seen: false,
            confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_payloads() {
        assert_eq!(Presence::Present.as_payload(), "detected");
        assert_eq!(Presence::Absent.as_payload(), "not_detected");
    }

    #[test]
    fn test_app_selection_parse() {
        assert_eq!(AppSelection::parse("cookbook"), Some(AppSelection::Cookbook));
        assert_eq!(
            AppSelection::parse(" Home_Assistant\n"),
            Some(AppSelection::HomeAssistant)
        );
        assert_eq!(AppSelection::parse("toggle"), None);
        assert_eq!(AppSelection::parse(""), None);
    }

    #[test]
    fn test_app_selection_toggle_roundtrip() {
        let app = AppSelection::HomeAssistant;
        assert_eq!(app.toggled(), AppSelection::Cookbook);
        assert_eq!(app.toggled().toggled(), app);
    }

    #[test]
    fn test_face_signal_threshold_is_inclusive() {
        assert!(FaceSignal::from_confidence(0.5, 0.5).seen);
        assert!(!FaceSignal::from_confidence(0.49, 0.5).seen);
        assert!(!FaceSignal::missed().seen);
    }
}

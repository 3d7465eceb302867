//! # Interview Parameters
//!
//! Types describing what kind of interview a session runs. They are parsed from the
//! WebSocket query string at connection time and stay fixed for the whole session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interview category selected by the client (`?type=` query parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewCategory {
    #[default]
    Technical,
    Hr,
    Managerial,
    SystemDesign,
    DsaPractice,
}

impl InterviewCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewCategory::Technical => "technical",
            InterviewCategory::Hr => "hr",
            InterviewCategory::Managerial => "managerial",
            InterviewCategory::SystemDesign => "system_design",
            InterviewCategory::DsaPractice => "dsa_practice",
        }
    }
}

impl FromStr for InterviewCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "technical" => Ok(InterviewCategory::Technical),
            "hr" => Ok(InterviewCategory::Hr),
            "managerial" => Ok(InterviewCategory::Managerial),
            "system_design" => Ok(InterviewCategory::SystemDesign),
            "dsa_practice" => Ok(InterviewCategory::DsaPractice),
            other => Err(format!("Unknown interview type: {}", other)),
        }
    }
}

impl fmt::Display for InterviewCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interview difficulty (`?difficulty=` query parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the client fixes when it opens a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionParams {
    /// Opaque identifier taken from the URL path
    pub session_id: String,
    pub category: InterviewCategory,
    pub difficulty: Difficulty,
    /// Optional focus area, e.g. "python_dsa"
    pub topic: Option<String>,
}

impl SessionParams {
    /// Build parameters from raw query values.
    ///
    /// Missing values fall back to the defaults (`technical`, `medium`); unknown
    /// values are an error so the upgrade can be refused. A blank topic counts as
    /// no topic.
    pub fn from_query(
        session_id: impl Into<String>,
        category: Option<&str>,
        difficulty: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Self, String> {
        let category = match category {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => InterviewCategory::default(),
        };
        let difficulty = match difficulty {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Difficulty::default(),
        };
        let topic = topic
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self {
            session_id: session_id.into(),
            category,
            difficulty,
            topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_query_is_empty() {
        let params = SessionParams::from_query("abc", None, Some(""), None).unwrap();
        assert_eq!(params.category, InterviewCategory::Technical);
        assert_eq!(params.difficulty, Difficulty::Medium);
        assert_eq!(params.topic, None);
    }

    #[test]
    fn test_parses_known_values() {
        let params =
            SessionParams::from_query("abc", Some("System_Design"), Some("HARD"), Some(" sql "))
                .unwrap();
        assert_eq!(params.category, InterviewCategory::SystemDesign);
        assert_eq!(params.difficulty, Difficulty::Hard);
        assert_eq!(params.topic.as_deref(), Some("sql"));
    }

    #[test]
    fn test_rejects_unknown_values() {
        assert!(SessionParams::from_query("abc", Some("poetry"), None, None).is_err());
        assert!(SessionParams::from_query("abc", None, Some("extreme"), None).is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&InterviewCategory::DsaPractice).unwrap();
        assert_eq!(json, "\"dsa_practice\"");
    }
}

// Database models - Debate session
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize};

use super::{now_millis, StudentLevel};

/// Supported debate formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebateFormat {
    Wsdc,
    ModifiedWsdc,
    Bp,
    Ap,
    Australs,
}

/// How speakers are split into benches for a format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TeamStructure {
    PropOpp,
    BritishParliamentary,
    AsianParliamentary,
}

impl DebateFormat {
    pub const ALL: [DebateFormat; 5] = [
        DebateFormat::Wsdc,
        DebateFormat::ModifiedWsdc,
        DebateFormat::Bp,
        DebateFormat::Ap,
        DebateFormat::Australs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DebateFormat::Wsdc => "wsdc",
            DebateFormat::ModifiedWsdc => "modified_wsdc",
            DebateFormat::Bp => "bp",
            DebateFormat::Ap => "ap",
            DebateFormat::Australs => "australs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DebateFormat::Wsdc => "WSDC",
            DebateFormat::ModifiedWsdc => "Modified WSDC",
            DebateFormat::Bp => "BP",
            DebateFormat::Ap => "AP",
            DebateFormat::Australs => "Australs",
        }
    }

    /// Lenient parse matching either the display name or the stored key,
    /// ignoring case. Falls back to WSDC.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim) else {
            return DebateFormat::Wsdc;
        };
        Self::ALL
            .into_iter()
            .find(|f| f.display_name().eq_ignore_ascii_case(raw) || f.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or(DebateFormat::Wsdc)
    }

    pub fn default_speech_time_seconds(&self) -> u32 {
        match self {
            DebateFormat::Wsdc => 480,
            DebateFormat::ModifiedWsdc => 240,
            DebateFormat::Bp => 420,
            DebateFormat::Ap => 360,
            DebateFormat::Australs => 480,
        }
    }

    pub fn has_reply_speeches(&self) -> bool {
        !matches!(self, DebateFormat::Bp | DebateFormat::Ap)
    }

    pub fn default_reply_time_seconds(&self) -> Option<u32> {
        match self {
            DebateFormat::Wsdc => Some(240),
            DebateFormat::ModifiedWsdc => Some(120),
            DebateFormat::Australs => Some(180),
            DebateFormat::Bp | DebateFormat::Ap => None,
        }
    }

    pub fn team_structure(&self) -> TeamStructure {
        match self {
            DebateFormat::Wsdc | DebateFormat::ModifiedWsdc | DebateFormat::Australs => {
                TeamStructure::PropOpp
            }
            DebateFormat::Bp => TeamStructure::BritishParliamentary,
            DebateFormat::Ap => TeamStructure::AsianParliamentary,
        }
    }
}

sql_text_enum!(DebateFormat);

/// A speaking slot derived from a team composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerSlot {
    pub student_id: String,
    pub position: String,
}

/// Student ids per bench. Which benches are used depends on the format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamComposition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opp: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oo: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cg: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<Vec<String>>,
}

impl TeamComposition {
    /// Speaking order for the format
    pub fn speaker_order(&self, format: DebateFormat) -> Vec<SpeakerSlot> {
        match format.team_structure() {
            TeamStructure::PropOpp => interleave(&self.prop, "Prop", &self.opp, "Opp"),
            TeamStructure::AsianParliamentary => interleave(&self.prop, "Gov", &self.opp, "Opp"),
            TeamStructure::BritishParliamentary => [
                (&self.og, "OG"),
                (&self.oo, "OO"),
                (&self.cg, "CG"),
                (&self.co, "CO"),
            ]
            .into_iter()
            .flat_map(|(bench, label)| slots(bench, label))
            .collect(),
        }
    }
}

fn slots(bench: &Option<Vec<String>>, label: &str) -> Vec<SpeakerSlot> {
    bench
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, id)| SpeakerSlot {
            student_id: id.clone(),
            position: format!("{} {}", label, index + 1),
        })
        .collect()
}

fn interleave(
    first: &Option<Vec<String>>,
    first_label: &str,
    second: &Option<Vec<String>>,
    second_label: &str,
) -> Vec<SpeakerSlot> {
    let mut first = slots(first, first_label).into_iter();
    let mut second = slots(second, second_label).into_iter();
    let mut order = Vec::new();
    loop {
        match (first.next(), second.next()) {
            (None, None) => break,
            (a, b) => order.extend(a.into_iter().chain(b)),
        }
    }
    order
}

impl FromSql for TeamComposition {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A configured debate. Owns its roster and its speech recordings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateSession {
    pub id: String,
    pub motion: String,
    pub format: DebateFormat,
    pub student_level: StudentLevel,
    pub speech_time_seconds: u32,
    pub reply_time_seconds: Option<u32>,
    /// Persisted at millisecond precision. Finer digits are truncated on write.
    pub created_at: DateTime<Utc>,
    pub is_guest_mode: bool,
    pub teacher_id: Option<String>,
    pub class_id: Option<String>,
    pub schedule_id: Option<String>,
    /// Set once remote sync has created the debate on the backend
    pub backend_debate_id: Option<String>,
    pub team_composition: Option<TeamComposition>,
}

impl DebateSession {
    /// A session with the format's default timings
    pub fn new(motion: &str, format: DebateFormat, student_level: StudentLevel) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            motion: motion.to_string(),
            format,
            student_level,
            speech_time_seconds: format.default_speech_time_seconds(),
            reply_time_seconds: format.default_reply_time_seconds(),
            created_at: now_millis(),
            is_guest_mode: false,
            teacher_id: None,
            class_id: None,
            schedule_id: None,
            backend_debate_id: None,
            team_composition: None,
        }
    }

    pub fn speaker_order(&self) -> Vec<SpeakerSlot> {
        self.team_composition
            .as_ref()
            .map(|c| c.speaker_order(self.format))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Option<Vec<String>> {
        Some(names.iter().map(|n| n.to_string()).collect())
    }

    fn positions(order: &[SpeakerSlot]) -> Vec<String> {
        order.iter().map(|s| format!("{}:{}", s.position, s.student_id)).collect()
    }

    #[test]
    fn test_wsdc_order_alternates_benches() {
        let composition = TeamComposition {
            prop: ids(&["a", "b", "c"]),
            opp: ids(&["x", "y"]),
            ..Default::default()
        };
        let order = composition.speaker_order(DebateFormat::Wsdc);
        assert_eq!(
            positions(&order),
            vec!["Prop 1:a", "Opp 1:x", "Prop 2:b", "Opp 2:y", "Prop 3:c"]
        );
    }

    #[test]
    fn test_ap_uses_government_labels() {
        let composition = TeamComposition {
            prop: ids(&["a"]),
            opp: ids(&["x"]),
            ..Default::default()
        };
        let order = composition.speaker_order(DebateFormat::Ap);
        assert_eq!(positions(&order), vec!["Gov 1:a", "Opp 1:x"]);
    }

    #[test]
    fn test_bp_order_is_bench_by_bench() {
        let composition = TeamComposition {
            og: ids(&["a", "b"]),
            oo: ids(&["c"]),
            co: ids(&["d"]),
            ..Default::default()
        };
        let order = composition.speaker_order(DebateFormat::Bp);
        assert_eq!(positions(&order), vec!["OG 1:a", "OG 2:b", "OO 1:c", "CO 1:d"]);
    }

    #[test]
    fn test_format_defaults() {
        assert_eq!(DebateFormat::Bp.default_speech_time_seconds(), 420);
        assert!(!DebateFormat::Bp.has_reply_speeches());
        assert_eq!(DebateFormat::Australs.default_reply_time_seconds(), Some(180));
        assert_eq!(DebateFormat::from_raw(Some("modified wsdc")), DebateFormat::ModifiedWsdc);
        assert_eq!(DebateFormat::from_raw(Some("bp")), DebateFormat::Bp);
        assert_eq!(DebateFormat::from_raw(Some("lincoln-douglas")), DebateFormat::Wsdc);

        let session = DebateSession::new("This house would", DebateFormat::ModifiedWsdc, StudentLevel::Primary);
        assert_eq!(session.speech_time_seconds, 240);
        assert_eq!(session.reply_time_seconds, Some(120));
        assert!(session.speaker_order().is_empty());
    }
}

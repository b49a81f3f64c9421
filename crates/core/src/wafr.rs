use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::Pillar;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Choice {
    /// The "None of these" option every question carries.
    pub fn is_none_of_these(&self) -> bool {
        self.id.ends_with("_no") || self.title.eq_ignore_ascii_case("none of these")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPractice {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl From<&Choice> for BestPractice {
    fn from(c: &Choice) -> Self {
        BestPractice { id: c.id.clone(), title: c.title.clone(), description: c.description.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WafrQuestion {
    pub id: String,
    pub pillar: Pillar,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub best_practices: Vec<BestPractice>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl WafrQuestion {
    pub fn choice(&self, id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub choice_id: String,
    pub explanation: String,
    #[serde(default)]
    pub resources: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionEvaluation {
    pub question: WafrQuestion,
    #[serde(default)]
    pub selected_choices: Vec<Choice>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub confidence: f64,
    #[serde(default)]
    pub notes: String,
}

impl QuestionEvaluation {
    pub fn selected_choice_ids(&self) -> Vec<String> {
        self.selected_choices.iter().map(|c| c.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    None,
    Medium,
    High,
}

impl RiskLevel {
    pub fn priority_base(&self) -> i32 {
        match self {
            RiskLevel::High => 100,
            RiskLevel::Medium => 50,
            RiskLevel::None => 10,
        }
    }

    /// Base priority plus ten per missing best practice.
    pub fn priority(&self, missing: usize) -> i32 {
        self.priority_base().saturating_add(10i32.saturating_mul(missing.min(i32::MAX as usize) as i32))
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::None => "NONE",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    pub question: WafrQuestion,
    pub pillar: Pillar,
    pub severity: RiskLevel,
    pub description: String,
    #[serde(default)]
    pub affected_resources: Vec<String>,
    #[serde(default)]
    pub missing_best_practices: Vec<BestPractice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effort {
    #[default]
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn estimate(missing: usize, affected: usize) -> Self {
        if missing >= 3 && affected >= 4 {
            Effort::High
        } else if missing >= 2 && affected >= 2 {
            Effort::Medium
        } else {
            Effort::Low
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Effort::Low => "LOW",
            Effort::Medium => "MEDIUM",
            Effort::High => "HIGH",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementPlanItem {
    pub id: String,
    pub risk: Risk,
    pub description: String,
    #[serde(default)]
    pub best_practices: Vec<BestPractice>,
    #[serde(default)]
    pub affected_resources: Vec<String>,
    pub priority: i32,
    pub estimated_effort: Effort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementPlan {
    pub items: Vec<ImprovementPlanItem>,
    pub generated_at: DateTime<Utc>,
}

impl ImprovementPlan {
    pub fn empty() -> Self {
        Self { items: Vec::new(), generated_at: Utc::now() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest priority first; ties keep their original order.
    pub fn sort_by_priority(&mut self) {
        self.items.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}

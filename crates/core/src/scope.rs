use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, Sentinel};

/// The six Well-Architected pillars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pillar {
    OperationalExcellence,
    Security,
    Reliability,
    Performance,
    CostOptimization,
    Sustainability,
}

impl Pillar {
    pub const ALL: [Pillar; 6] = [
        Pillar::OperationalExcellence,
        Pillar::Security,
        Pillar::Reliability,
        Pillar::Performance,
        Pillar::CostOptimization,
        Pillar::Sustainability,
    ];

    /// Pillar id used by the Well-Architected Tool.
    pub fn external_id(&self) -> &'static str {
        match self {
            Pillar::OperationalExcellence => "operationalExcellence",
            Pillar::Security => "security",
            Pillar::Reliability => "reliability",
            Pillar::Performance => "performance",
            Pillar::CostOptimization => "costOptimization",
            Pillar::Sustainability => "sustainability",
        }
    }

    pub fn from_external_id(id: &str) -> Option<Pillar> {
        Pillar::ALL.into_iter().find(|p| p.external_id() == id)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Pillar::OperationalExcellence => "Operational Excellence",
            Pillar::Security => "Security",
            Pillar::Reliability => "Reliability",
            Pillar::Performance => "Performance Efficiency",
            Pillar::CostOptimization => "Cost Optimization",
            Pillar::Sustainability => "Sustainability",
        }
    }

    /// Question-id prefix the default lens uses for this pillar.
    pub fn question_prefix(&self) -> &'static str {
        match self {
            Pillar::OperationalExcellence => "ops",
            Pillar::Security => "sec",
            Pillar::Reliability => "rel",
            Pillar::Performance => "perf",
            Pillar::CostOptimization => "cost",
            Pillar::Sustainability => "sus",
        }
    }

    /// Infers the pillar from ids such as `sec_securely_operate`.
    pub fn for_question_id(question_id: &str) -> Option<Pillar> {
        let prefix = question_id.split(['_', '-']).next()?.to_ascii_lowercase();
        Pillar::ALL.into_iter().find(|p| p.question_prefix() == prefix)
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_id())
    }
}

impl FromStr for Pillar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(p) = Pillar::from_external_id(s) {
            return Ok(p);
        }
        let norm: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase();
        let pillar = match norm.as_str() {
            "operationalexcellence" | "operational" | "ops" => Pillar::OperationalExcellence,
            "security" | "sec" => Pillar::Security,
            "reliability" | "rel" => Pillar::Reliability,
            "performance" | "performanceefficiency" | "perf" => Pillar::Performance,
            "costoptimization" | "cost" => Pillar::CostOptimization,
            "sustainability" | "sus" => Pillar::Sustainability,
            _ => return Err(Error::validation("pillar", s, "unknown pillar")),
        };
        Ok(pillar)
    }
}

/// What part of the framework a review covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "target", rename_all = "snake_case")]
pub enum ReviewScope {
    Workload,
    Pillar(Pillar),
    Question(String),
}

impl ReviewScope {
    /// Builds a scope from loosely-typed input, e.g. CLI flags.
    pub fn from_parts(level: &str, pillar: Option<&str>, question_id: Option<&str>) -> Result<Self> {
        let scope = match level.trim().to_ascii_lowercase().as_str() {
            "" | "workload" => ReviewScope::Workload,
            "pillar" => {
                let raw = pillar.map(str::trim).filter(|p| !p.is_empty()).ok_or(Sentinel::PillarRequired)?;
                ReviewScope::Pillar(raw.parse()?)
            }
            "question" => {
                let qid = question_id.map(str::trim).filter(|q| !q.is_empty()).ok_or(Sentinel::QuestionIdRequired)?;
                ReviewScope::Question(qid.to_string())
            }
            other => return Err(Error::validation("scope", other, "scope must be one of workload, pillar, question")),
        };
        scope.validate()?;
        Ok(scope)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ReviewScope::Question(qid) if qid.trim().is_empty() => Err(Sentinel::QuestionIdRequired.into()),
            _ => Ok(()),
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            ReviewScope::Workload => "workload",
            ReviewScope::Pillar(_) => "pillar",
            ReviewScope::Question(_) => "question",
        }
    }

    /// Pillars that must be listed to serve this scope.
    pub fn pillars(&self) -> Vec<Pillar> {
        match self {
            ReviewScope::Workload => Pillar::ALL.to_vec(),
            ReviewScope::Pillar(p) => vec![*p],
            ReviewScope::Question(qid) => match Pillar::for_question_id(qid) {
                Some(p) => vec![p],
                None => Pillar::ALL.to_vec(),
            },
        }
    }
}

impl fmt::Display for ReviewScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewScope::Workload => f.write_str("workload"),
            ReviewScope::Pillar(p) => write!(f, "pillar:{p}"),
            ReviewScope::Question(q) => write!(f, "question:{q}"),
        }
    }
}

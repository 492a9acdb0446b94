use serde::{Deserialize, Serialize};

use crate::models::extract::Requirement;

/// An employee matched to one RFP role: the employee's background merged
/// with the role's requirement lists. Produced by matching, consumed by
/// résumé assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub employee_name: String,
    pub matched_role: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_competencies: Vec<String>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub security_clearances: Vec<String>,
    #[serde(default)]
    pub experience: Vec<String>,
    #[serde(default)]
    pub work_history: Vec<String>,
    #[serde(default)]
    pub role_requirements: Vec<Requirement>,
    #[serde(default)]
    pub resume_requirements: Vec<Requirement>,
}

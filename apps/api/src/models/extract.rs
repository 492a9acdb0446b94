use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DOC_TYPE_RFP_STAFFING_EXTRACT: &str = "rfp_staffing_extract";
pub const DOC_TYPE_EMPLOYEE_DATA: &str = "employee_data";

/// Initial status, set when the record is created by an ingestion run.
pub const STATUS_RFP_EXTRACTED: &str = "rfp_extracted";
/// Set once résumés have been generated from the record.
pub const STATUS_RESUME_CREATED: &str = "resume_created";

/// Field the document store partitions records on.
pub const PARTITION_KEY_FIELD: &str = "rfp_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub requirement: String,
}

/// One staffed role an RFP asks for, as extracted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirement {
    pub required_role: String,
    #[serde(default)]
    pub role_requirements: Vec<Requirement>,
    #[serde(default)]
    pub resume_requirements: Vec<Requirement>,
}

/// Persisted once per source document of an ingestion run.
/// `status` stays a plain string: the generic field update may write anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffingExtractRecord {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub doc_type: String,
    pub extract_date: DateTime<Utc>,
    pub status: String,
    pub blob_name: String,
    #[serde(default)]
    pub rfp_staffing_requirements: Vec<RoleRequirement>,
}

impl StaffingExtractRecord {
    /// A fresh record for `blob_name` in run `rfp_id`, with a new unique id.
    pub fn new(rfp_id: Uuid, blob_name: &str, requirements: Vec<RoleRequirement>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfp_id,
            doc_type: DOC_TYPE_RFP_STAFFING_EXTRACT.to_string(),
            extract_date: Utc::now(),
            status: STATUS_RFP_EXTRACTED.to_string(),
            blob_name: blob_name.to_string(),
            rfp_staffing_requirements: requirements,
        }
    }
}

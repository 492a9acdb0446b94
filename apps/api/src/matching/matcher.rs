use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::structured::{
    complete_structured, ExtractionRequest, OneOrMany, StructuredError, StructuredPrompt,
};
use crate::llm_client::CompletionApi;
use crate::matching::prompts::{MATCHING_RESPONSE_SHAPE, MATCHING_SYSTEM, MATCHING_USER};
use crate::models::candidate::CandidateMatch;
use crate::models::extract::RoleRequirement;

pub fn matching_prompt(
    rfp_id: Uuid,
    employees: &[Value],
    roles: &[RoleRequirement],
) -> Result<StructuredPrompt, AppError> {
    let roles_json = serde_json::to_string_pretty(roles)
        .map_err(|e| AppError::Internal(e.into()))?;
    let employees_json = serde_json::to_string_pretty(employees)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(
        StructuredPrompt::new("candidate matching", MATCHING_RESPONSE_SHAPE)
            .message(ExtractionRequest::system(MATCHING_SYSTEM))
            .message(
                ExtractionRequest::user(MATCHING_USER)
                    .bind("rfp_id", rfp_id.to_string())
                    .bind("roles", roles_json)
                    .bind("employees", employees_json),
            ),
    )
}

/// Matches employees to a run's roles with one structured completion.
///
/// Matches naming a role the run does not have are dropped. The role's
/// requirement lists are copied from the run, not taken from the model.
/// An unparseable reply yields no matches.
pub async fn match_candidates(
    llm: &dyn CompletionApi,
    employees: &[Value],
    rfp_id: Uuid,
    roles: &[RoleRequirement],
) -> Result<Vec<CandidateMatch>, AppError> {
    if employees.is_empty() || roles.is_empty() {
        info!(
            "Run {rfp_id}: nothing to match ({} employees, {} roles)",
            employees.len(),
            roles.len()
        );
        return Ok(Vec::new());
    }

    let prompt = matching_prompt(rfp_id, employees, roles)?;
    let matches = match complete_structured::<OneOrMany<CandidateMatch>>(llm, &prompt).await {
        Ok(matches) => matches.into_vec(),
        Err(e @ StructuredError::ExtractionFailed { .. }) => {
            warn!("Run {rfp_id}: no candidate matches: {e}");
            return Ok(Vec::new());
        }
        Err(StructuredError::Completion(e)) => {
            return Err(AppError::Llm(format!(
                "Candidate matching for run {rfp_id} failed: {e}"
            )))
        }
    };

    let matched: Vec<CandidateMatch> = matches
        .into_iter()
        .filter_map(|mut candidate| {
            match roles
                .iter()
                .find(|role| role.required_role == candidate.matched_role)
            {
                Some(role) => {
                    candidate.role_requirements = role.role_requirements.clone();
                    candidate.resume_requirements = role.resume_requirements.clone();
                    Some(candidate)
                }
                None => {
                    warn!(
                        "Run {rfp_id}: dropping match of '{}' to unknown role '{}'",
                        candidate.employee_name, candidate.matched_role
                    );
                    None
                }
            }
        })
        .collect();

    info!("Run {rfp_id}: {} candidate matches", matched.len());
    Ok(matched)
}

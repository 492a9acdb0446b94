// Candidate matching prompts.

pub const MATCHING_SYSTEM: &str = "\
You are a proposal staffing expert. You are given the staffing requirements extracted from a \
Request for Proposal and a list of employee records. Match employees to the required roles.
Only match an employee to a role when their record supports the role requirements. \
You must only use facts that exist in the employee records, do not make anything up.
Use the role title exactly as it appears in required_role for matched_role.
Write a short professional summary for each match that highlights how the employee meets the role requirements.
If no employee fits any role, return an empty list.";

/// Bind `{rfp_id}`, `{roles}` and `{employees}`.
pub const MATCHING_USER: &str = "\
Staffing requirements for RFP {rfp_id}:
{roles}

Employee records:
{employees}";

pub const MATCHING_RESPONSE_SHAPE: &str = r#"[
  {
    "employee_name": "Dana Smith",
    "matched_role": "Program Manager (Key Personnel)",
    "summary": "Program manager with 12 years leading METOC software programs for the Navy.",
    "key_competencies": ["Program management", "Earned value management"],
    "education": ["M.S. Meteorology, Naval Postgraduate School"],
    "certifications": ["PMP"],
    "security_clearances": ["Secret"],
    "experience": ["12 years managing scientific software teams"],
    "work_history": ["Acme Corp, Program Manager, 2015-present"]
  }
]"#;

// All extraction prompts live here.
// Placeholders are bound through ExtractionRequest::bind, never by string replace.

/// System prompt for staffing-requirement extraction.
/// The JSON format instruction is appended by the structured-completion layer.
pub const REQUIREMENTS_SYSTEM: &str = "\
You are a Request for Proposal Requirements Extractor expert. Your job is to take in as input a Request for Proposal \
and extract the Staffing Requirements. You must only extract data that exists in the RFP, do not make anything up.
Always check the parent child relationship of the roles so that the full role title is specified. You must always combine these two. \
For example:
1. Engineer
1.1 Senior
This example would result in a role titled: Senior Engineer. You must never return just Engineer.
Always check if the role is labeled as Key Personnel and add that to the title in parentheses.
If the text holds no staffing requirements, return an empty list.";

/// User prompt. Bind `{document_text}`.
pub const REQUIREMENTS_USER: &str = "\
Analyze the following job requirements and list key skills, qualifications, and experiences:

{document_text}";

/// Example of the reply shape, embedded in the prompt.
pub const REQUIREMENTS_RESPONSE_SHAPE: &str = r#"[
  {
    "required_role": "Program Manager (Key Personnel)",
    "role_requirements": [
      {"requirement": "Must have at a minimum 5 years of demonstrated experience managing scientific personnel"},
      {"requirement": "Must have current knowledge of Navy METOC operations and operational systems"}
    ],
    "resume_requirements": [
      {"requirement": "Must have 14pt font"}
    ]
  },
  {
    "required_role": "Research Scientist",
    "role_requirements": [
      {"requirement": "Must act as the primary point-of-contact for the development of operational global NWP systems"}
    ],
    "resume_requirements": []
  }
]"#;

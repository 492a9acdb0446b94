//! Résumé assembly: fills the résumé template for each candidate match.
//!
//! The template is a .docx whose top-level tables carry a label in the
//! leftmost cell of a row ("Key Competencies", "Education", ...). The
//! matching candidate field is written to the rightmost cell of that row.
//! `{{NAME}}` and `{{SUMMARY}}` are replaced inside top-level paragraphs.
//! Labels or tokens the template lacks are skipped silently.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::docx::{DocxDocument, TemplateError};
use crate::errors::AppError;
use crate::extraction::dedup::collapse_roles;
use crate::llm_client::CompletionApi;
use crate::matching::matcher::match_candidates;
use crate::models::candidate::CandidateMatch;
use crate::models::extract::{STATUS_RESUME_CREATED, STATUS_RFP_EXTRACTED};
use crate::storage::blobs::BlobStore;
use crate::storage::repository::StaffingRepository;

pub const NAME_TOKEN: &str = "{{NAME}}";
pub const SUMMARY_TOKEN: &str = "{{SUMMARY}}";
const LIST_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    KeyCompetencies,
    Education,
    Certifications,
    SecurityClearances,
    Experience,
    WorkHistory,
}

/// Row labels, matched as substrings of the leftmost cell. First hit wins.
const SECTIONS: &[(&str, Section)] = &[
    ("Key Competencies", Section::KeyCompetencies),
    ("Education", Section::Education),
    ("Training & Certifications", Section::Certifications),
    ("Security Clearances", Section::SecurityClearances),
    ("Experience", Section::Experience),
    ("History", Section::WorkHistory),
];

impl Section {
    fn for_label(label: &str) -> Option<Self> {
        SECTIONS
            .iter()
            .find(|(needle, _)| label.contains(needle))
            .map(|(_, section)| *section)
    }

    fn entries<'a>(&self, candidate: &'a CandidateMatch) -> &'a [String] {
        match self {
            Section::KeyCompetencies => &candidate.key_competencies,
            Section::Education => &candidate.education,
            Section::Certifications => &candidate.certifications,
            Section::SecurityClearances => &candidate.security_clearances,
            Section::Experience => &candidate.experience,
            Section::WorkHistory => &candidate.work_history,
        }
    }
}

/// Renders one résumé from the template bytes.
pub fn render_resume(template: &[u8], candidate: &CandidateMatch) -> Result<Vec<u8>, TemplateError> {
    let mut doc = DocxDocument::load(template)?;

    for (row, cells) in doc.table_rows()?.iter().enumerate() {
        if cells.len() < 2 {
            continue;
        }
        let Some(section) = Section::for_label(&cells[0]) else {
            continue;
        };
        let text = section.entries(candidate).join(LIST_SEPARATOR);
        doc.set_cell_text(row, cells.len() - 1, &text)?;
    }

    for (index, text) in doc.paragraphs()?.iter().enumerate() {
        if !text.contains(NAME_TOKEN) && !text.contains(SUMMARY_TOKEN) {
            continue;
        }
        let filled = text
            .replace(NAME_TOKEN, &candidate.employee_name)
            .replace(SUMMARY_TOKEN, &candidate.summary);
        doc.set_paragraph_text(index, &filled)?;
    }

    doc.to_bytes()
}

/// `<Candidate_Name>_resume.docx`, reduced to filesystem-safe characters.
pub fn resume_file_name(employee_name: &str) -> String {
    let stem: String = employee_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "candidate_resume.docx".to_string()
    } else {
        format!("{stem}_resume.docx")
    }
}

/// Writes `content` to `output_dir/file_name` through a temp file and rename,
/// overwriting any earlier file of the same name.
pub async fn write_resume(
    output_dir: &Path,
    file_name: &str,
    content: Bytes,
) -> Result<PathBuf, AppError> {
    let output_dir = output_dir.to_path_buf();
    let target = output_dir.join(file_name);

    tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&output_dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&output_dir)?;
        file.write_all(&content)?;
        file.persist(&target).map_err(|e| e.error)?;
        Ok(target)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?
    .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("Failed to write résumé")))
}

/// Where one run's résumés land: `<output>/<rfp_id>` locally and in the blob store.
pub struct RunOutput<'a> {
    pub dir: PathBuf,
    pub blob_prefix: String,
    pub blobs: &'a dyn BlobStore,
}

impl<'a> RunOutput<'a> {
    pub fn new(output_folder: &Path, blob_folder: &str, rfp_id: Uuid, blobs: &'a dyn BlobStore) -> Self {
        Self {
            dir: output_folder.join(rfp_id.to_string()),
            blob_prefix: format!("{}/{}", blob_folder.trim_end_matches('/'), rfp_id),
            blobs,
        }
    }
}

/// Renders one file per candidate match, writes it locally and uploads a copy.
pub async fn assemble_resumes(
    template: &[u8],
    matches: &[CandidateMatch],
    output: &RunOutput<'_>,
) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::with_capacity(matches.len());
    for candidate in matches {
        let content = Bytes::from(render_resume(template, candidate)?);
        let file_name = resume_file_name(&candidate.employee_name);
        let path = write_resume(&output.dir, &file_name, content.clone()).await?;
        let blob_name = format!("{}/{}", output.blob_prefix, file_name);
        output.blobs.upload(&blob_name, content).await?;
        info!(
            "Saved résumé for {} ({}) to {} and {}",
            candidate.employee_name,
            candidate.matched_role,
            path.display(),
            blob_name
        );
        written.push(path);
    }
    Ok(written)
}

/// Collaborators of one résumé run.
pub struct ResumeContext<'a> {
    pub llm: &'a dyn CompletionApi,
    pub blobs: &'a dyn BlobStore,
    pub repository: &'a StaffingRepository,
    pub template_blob: &'a str,
    pub output_dir: &'a Path,
    /// Blob folder receiving a copy of every résumé.
    pub output_blob_folder: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RunResumes {
    pub rfp_id: Uuid,
    pub roles: usize,
    pub matches: usize,
    pub files: Vec<String>,
    /// Records moved to `resume_created`.
    pub records_updated: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ResumeReport {
    pub runs: Vec<RunResumes>,
}

/// Matches and renders résumés for every run still in `rfp_extracted`.
/// A run with at least one résumé written has all its records moved to
/// `resume_created`; a run without matches stays where it is.
pub async fn run_resume_generation(ctx: &ResumeContext<'_>) -> Result<ResumeReport, AppError> {
    let grouped = ctx.repository.grouped_by_status(STATUS_RFP_EXTRACTED).await?;
    let mut report = ResumeReport::default();
    if grouped.is_empty() {
        info!("No runs waiting for résumés");
        return Ok(report);
    }

    let employees = ctx.repository.list_employees().await?;
    let template: Bytes = ctx.blobs.download(ctx.template_blob).await?;
    info!(
        "Generating résumés for {} runs from {} employee records",
        grouped.len(),
        employees.len()
    );

    for (rfp_id, records) in grouped {
        let roles = collapse_roles(&records);
        let matches = match_candidates(ctx.llm, &employees, rfp_id, &roles).await?;
        let output = RunOutput::new(ctx.output_dir, ctx.output_blob_folder, rfp_id, ctx.blobs);
        let files = assemble_resumes(&template, &matches, &output).await?;

        let mut records_updated = 0;
        if files.is_empty() {
            warn!("Run {rfp_id}: no résumés written, records stay '{STATUS_RFP_EXTRACTED}'");
        } else {
            for record in &records {
                ctx.repository
                    .update_status(rfp_id, record.id, STATUS_RESUME_CREATED)
                    .await?;
                records_updated += 1;
            }
            debug!("Run {rfp_id}: {records_updated} records marked '{STATUS_RESUME_CREATED}'");
        }

        report.runs.push(RunResumes {
            rfp_id,
            roles: roles.len(),
            matches: matches.len(),
            files: files.iter().map(|p| p.display().to_string()).collect(),
            records_updated,
        });
    }
    Ok(report)
}

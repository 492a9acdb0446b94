//! Minimal `.docx` engine with just enough WordprocessingML to read a document's
//! text and fill a résumé template.
//!
//! `word/document.xml` is held as a flat list of owned quick-xml events. Only
//! top-level structure is addressable: paragraphs directly under the body and
//! rows of top-level tables. Nested tables are carried through untouched.
//! Every other archive part is written back byte for byte.

use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Not a valid .docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive has no '{0}' part")]
    MissingPart(&'static str),

    #[error("Malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No paragraph at index {0}")]
    ParagraphOutOfRange(usize),

    #[error("No cell at row {row}, column {cell}")]
    CellOutOfRange { row: usize, cell: usize },
}

/// Inclusive event range of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Default)]
struct Layout {
    paragraphs: Vec<Span>,
    rows: Vec<Vec<Span>>,
}

pub struct DocxDocument {
    parts: Vec<(String, Vec<u8>)>,
    body: Vec<Event<'static>>,
    layout: Layout,
}

impl DocxDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        let mut body = None;

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            if name == DOCUMENT_PART {
                body = Some(parse_events(&content)?);
            }
            parts.push((name, content));
        }

        let body = body.ok_or(TemplateError::MissingPart(DOCUMENT_PART))?;
        let layout = scan(&body);
        Ok(Self {
            parts,
            body,
            layout,
        })
    }

    /// Text of every top-level paragraph, in document order.
    pub fn paragraphs(&self) -> Result<Vec<String>, TemplateError> {
        self.layout
            .paragraphs
            .iter()
            .map(|span| span_text(&self.body, *span))
            .collect()
    }

    /// Cell texts of every top-level table row, in document order.
    pub fn table_rows(&self) -> Result<Vec<Vec<String>>, TemplateError> {
        self.layout
            .rows
            .iter()
            .map(|cells| {
                cells
                    .iter()
                    .map(|span| span_text(&self.body, *span))
                    .collect()
            })
            .collect()
    }

    /// Replaces a paragraph's runs with one run holding `text`, keeping the
    /// paragraph properties and the first run's formatting. Newlines become
    /// line breaks.
    pub fn set_paragraph_text(&mut self, index: usize, text: &str) -> Result<(), TemplateError> {
        let span = *self
            .layout
            .paragraphs
            .get(index)
            .ok_or(TemplateError::ParagraphOutOfRange(index))?;
        let existing = &self.body[span.start..=span.end];
        let replacement = paragraph(
            subtree(existing, b"w:pPr").as_deref(),
            first_run_properties(existing).as_deref(),
            text,
        );
        self.splice(span, replacement);
        Ok(())
    }

    /// Replaces a cell's paragraphs with one paragraph per line of `text`,
    /// keeping cell properties and the formatting of its first paragraph.
    pub fn set_cell_text(&mut self, row: usize, cell: usize, text: &str) -> Result<(), TemplateError> {
        let span = *self
            .layout
            .rows
            .get(row)
            .and_then(|cells| cells.get(cell))
            .ok_or(TemplateError::CellOutOfRange { row, cell })?;
        let existing = &self.body[span.start..=span.end];
        let paragraph_props = subtree(existing, b"w:pPr");
        let run_props = first_run_properties(existing);

        let mut replacement = vec![existing[0].clone()];
        if let Some(cell_props) = subtree(existing, b"w:tcPr") {
            replacement.extend(cell_props);
        }
        for line in text.split('\n') {
            replacement.extend(paragraph(
                paragraph_props.as_deref(),
                run_props.as_deref(),
                line,
            ));
        }
        replacement.push(existing[existing.len() - 1].clone());

        self.splice(span, replacement);
        Ok(())
    }

    /// All text of the body, tables included, one line per paragraph.
    pub fn plain_text(&self) -> Result<String, TemplateError> {
        if self.body.is_empty() {
            return Ok(String::new());
        }
        span_text(
            &self.body,
            Span {
                start: 0,
                end: self.body.len() - 1,
            },
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.body {
            writer.write_event(event)?;
        }
        let document_xml = writer.into_inner();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            if name == DOCUMENT_PART {
                zip.write_all(&document_xml)?;
            } else {
                zip.write_all(content)?;
            }
        }
        Ok(zip.finish()?.into_inner())
    }

    fn splice(&mut self, span: Span, replacement: Vec<Event<'static>>) {
        self.body.splice(span.start..=span.end, replacement);
        self.layout = scan(&self.body);
    }
}

fn parse_events(xml: &[u8]) -> Result<Vec<Event<'static>>, TemplateError> {
    let mut reader = Reader::from_reader(xml);
    let mut events = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            event => events.push(event.into_owned()),
        }
    }
    Ok(events)
}

fn scan(events: &[Event<'static>]) -> Layout {
    let mut layout = Layout::default();
    let mut table_depth = 0usize;
    let mut paragraph_start = None;
    let mut row: Option<Vec<Span>> = None;
    let mut cell_start = None;

    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:tr" if table_depth == 1 => row = Some(Vec::new()),
                b"w:tc" if table_depth == 1 => cell_start = Some(index),
                b"w:p" if table_depth == 0 => paragraph_start = Some(index),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:tr" if table_depth == 1 => {
                    if let Some(cells) = row.take() {
                        layout.rows.push(cells);
                    }
                }
                b"w:tc" if table_depth == 1 => {
                    if let (Some(start), Some(cells)) = (cell_start.take(), row.as_mut()) {
                        cells.push(Span { start, end: index });
                    }
                }
                b"w:p" if table_depth == 0 => {
                    if let Some(start) = paragraph_start.take() {
                        layout.paragraphs.push(Span { start, end: index });
                    }
                }
                _ => {}
            },
            Event::Empty(e) if table_depth == 0 && e.name().as_ref() == b"w:p" => {
                layout.paragraphs.push(Span {
                    start: index,
                    end: index,
                });
            }
            _ => {}
        }
    }
    layout
}

fn span_text(events: &[Event<'static>], span: Span) -> Result<String, TemplateError> {
    let mut text = String::new();
    let mut in_run = false;
    let mut in_text = false;

    for event in &events[span.start..=span.end] {
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => text.push('\n'),
                b"w:tab" if in_run => text.push('\t'),
                b"w:br" if in_run => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => text.push_str(&t.unescape()?),
            _ => {}
        }
    }

    let trimmed = text.trim_end_matches('\n').len();
    text.truncate(trimmed);
    Ok(text)
}

/// The first element called `name` (with its children) within `events`.
fn subtree(events: &[Event<'static>], name: &[u8]) -> Option<Vec<Event<'static>>> {
    let start = events.iter().position(|event| {
        matches!(event, Event::Start(e) | Event::Empty(e) if e.name().as_ref() == name)
    })?;
    if matches!(events[start], Event::Empty(_)) {
        return Some(vec![events[start].clone()]);
    }

    let mut depth = 0usize;
    for (offset, event) in events[start..].iter().enumerate() {
        match event {
            Event::Start(e) if e.name().as_ref() == name => depth += 1,
            Event::End(e) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    return Some(events[start..=start + offset].to_vec());
                }
            }
            _ => {}
        }
    }
    None
}

/// Run properties of the first run, skipping the paragraph-mark `w:rPr`
/// that lives inside `w:pPr`.
fn first_run_properties(events: &[Event<'static>]) -> Option<Vec<Event<'static>>> {
    let run = events
        .iter()
        .position(|event| matches!(event, Event::Start(e) if e.name().as_ref() == b"w:r"))?;
    subtree(&events[run..], b"w:rPr")
}

fn paragraph(
    paragraph_props: Option<&[Event<'static>]>,
    run_props: Option<&[Event<'static>]>,
    text: &str,
) -> Vec<Event<'static>> {
    let mut out = vec![Event::Start(BytesStart::new("w:p"))];
    if let Some(props) = paragraph_props {
        out.extend_from_slice(props);
    }
    if !text.is_empty() {
        out.push(Event::Start(BytesStart::new("w:r")));
        if let Some(props) = run_props {
            out.extend_from_slice(props);
        }
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                out.push(Event::Empty(BytesStart::new("w:br")));
            }
            out.push(Event::Start(
                BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
            ));
            out.push(Event::Text(BytesText::new(line).into_owned()));
            out.push(Event::End(BytesEnd::new("w:t")));
        }
        out.push(Event::End(BytesEnd::new("w:r")));
    }
    out.push(Event::End(BytesEnd::new("w:p")));
    out
}

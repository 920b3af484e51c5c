mod docx;
mod pdf;
mod xlsx;

use crate::report::ReportModel;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("exam session not found: {0}")]
    MissingSession(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" | "excel" | "spreadsheet" => Some(Self::Xlsx),
            "pdf" => Some(Self::Pdf),
            "docx" | "word" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// A rendered report ready to be written out under `file_name`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

pub trait Renderer {
    fn format(&self) -> ExportFormat;
    fn render(&self, model: &ReportModel) -> Result<Vec<u8>, RenderError>;
}

pub fn renderer_for(format: ExportFormat) -> Box<dyn Renderer> {
    match format {
        ExportFormat::Xlsx => Box::new(xlsx::XlsxRenderer),
        ExportFormat::Pdf => Box::new(pdf::PdfRenderer),
        ExportFormat::Docx => Box::new(docx::DocxRenderer),
    }
}

/// Renders `model` for `exam_id`. A missing model is a render failure, while a
/// model with no students renders normally.
pub fn render_report(
    format: ExportFormat,
    model: Option<&ReportModel>,
    exam_id: &str,
) -> Result<Artifact, RenderError> {
    let Some(model) = model else {
        return Err(RenderError::MissingSession(exam_id.to_string()));
    };
    let renderer = renderer_for(format);
    let bytes = renderer.render(model)?;
    Ok(Artifact {
        file_name: model.file_name(format.extension()),
        format: renderer.format(),
        bytes,
    })
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

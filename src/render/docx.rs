use super::{escape_xml, ExportFormat, RenderError, Renderer};
use crate::report::{ReportModel, Table};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct DocxRenderer;

// Half-points, as Word stores them.
const TITLE_SIZE: u32 = 32;
const HEADING_SIZE: u32 = 28;

const PAGE_SECTION: &str = r#"<w:sectPr><w:type w:val="nextPage"/><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr>"#;

impl Renderer for DocxRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Docx
    }

    fn render(&self, model: &ReportModel) -> Result<Vec<u8>, RenderError> {
        let document = document_xml(model);
        write_package(&document, &model.title)
    }
}

fn run(text: &str, bold: bool, size: Option<u32>) -> String {
    let mut props = String::new();
    if bold {
        props.push_str("<w:b/>");
    }
    if let Some(sz) = size {
        props.push_str(&format!(r#"<w:sz w:val="{sz}"/><w:szCs w:val="{sz}"/>"#));
    }
    let rpr = if props.is_empty() {
        String::new()
    } else {
        format!("<w:rPr>{}</w:rPr>", props)
    };
    format!(
        r#"<w:r>{}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        rpr,
        escape_xml(text)
    )
}

fn paragraph(text: &str, bold: bool, size: Option<u32>) -> String {
    format!("<w:p>{}</w:p>", run(text, bold, size))
}

fn empty_paragraph() -> String {
    "<w:p/>".to_string()
}

/// Closes the current section; the next one starts on a new page.
fn section_break() -> String {
    format!("<w:p><w:pPr>{}</w:pPr></w:p>", PAGE_SECTION)
}

fn table_xml(table: &Table) -> String {
    let cols = table.headers.len().max(1);
    // Text width of an A4 page with one-inch margins, in twentieths of a point.
    let width = 9026 / cols;
    let mut out = String::from(
        r#"<w:tbl><w:tblPr><w:tblW w:w="5000" w:type="pct"/><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:left w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:right w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/></w:tblBorders></w:tblPr><w:tblGrid>"#,
    );
    for _ in 0..cols {
        out.push_str(&format!(r#"<w:gridCol w:w="{}"/>"#, width));
    }
    out.push_str("</w:tblGrid>");
    out.push_str(&table_row(&table.headers, width, true));
    for row in &table.rows {
        out.push_str(&table_row(row, width, false));
    }
    out.push_str("</w:tbl>");
    out
}

fn table_row(cells: &[String], width: usize, header: bool) -> String {
    let mut out = String::from("<w:tr>");
    if header {
        out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
    }
    for cell in cells {
        out.push_str(&format!(
            r#"<w:tc><w:tcPr><w:tcW w:w="{}" w:type="dxa"/></w:tcPr>{}</w:tc>"#,
            width,
            paragraph(cell, header, None)
        ));
    }
    out.push_str("</w:tr>");
    out
}

fn document_xml(model: &ReportModel) -> String {
    let mut body = String::new();

    body.push_str(&paragraph(&model.title, true, Some(TITLE_SIZE)));
    body.push_str(&empty_paragraph());
    for (label, value) in model.header.lines() {
        body.push_str(&paragraph(&format!("{} {}", label, value), false, None));
    }
    body.push_str(&empty_paragraph());
    body.push_str(&paragraph("Department Summary", true, Some(HEADING_SIZE)));
    body.push_str(&empty_paragraph());
    let mut summary = model.summary_table();
    summary.rows.push(model.total_row());
    body.push_str(&table_xml(&summary));
    body.push_str(&section_break());

    for group in &model.departments {
        body.push_str(&paragraph(
            &format!("{} Department", group.name),
            true,
            Some(HEADING_SIZE),
        ));
        body.push_str(&empty_paragraph());
        body.push_str(&table_xml(&ReportModel::department_table(group)));
        body.push_str(&section_break());
    }

    body.push_str(&empty_paragraph());
    body.push_str(&empty_paragraph());
    body.push_str(&paragraph(&model.signature_line, false, None));
    body.push_str(PAGE_SECTION);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>
"#,
        body
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>
"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>
"#;

fn core_xml(title: &str) -> String {
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>{}</dc:title>
  <dc:creator>examattd</dc:creator>
  <dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>
</cp:coreProperties>
"#,
        escape_xml(title),
        created
    )
}

fn write_package(document: &str, title: &str) -> Result<Vec<u8>, RenderError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;

    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("word/document.xml", opts)?;
    zip.write_all(document.as_bytes())?;

    zip.start_file("docProps/core.xml", opts)?;
    zip.write_all(core_xml(title).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

use super::{escape_xml, ExportFormat, RenderError, Renderer};
use crate::report::ReportModel;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct XlsxRenderer;

const SHEET_NAME_MAX: usize = 31;
/// Excel keeps this name for its own change-tracking sheet.
const RESERVED_SHEET_NAME: &str = "history";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Normal = 0,
    Bold = 1,
}

#[derive(Debug, Default)]
struct Sheet {
    name: String,
    rows: Vec<Vec<(String, Style)>>,
}

impl Sheet {
    fn push(&mut self, cells: &[String], style: Style) {
        self.rows
            .push(cells.iter().map(|c| (c.clone(), style)).collect());
    }

    fn blank(&mut self) {
        self.rows.push(Vec::new());
    }
}

impl Renderer for XlsxRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Xlsx
    }

    fn render(&self, model: &ReportModel) -> Result<Vec<u8>, RenderError> {
        let sheets = build_sheets(model);
        write_workbook(&sheets)
    }
}

fn build_sheets(model: &ReportModel) -> Vec<Sheet> {
    let mut summary = Sheet {
        name: "Summary".to_string(),
        rows: Vec::new(),
    };
    summary.push(&[model.title.clone()], Style::Bold);
    summary.blank();
    for (label, value) in model.header.lines() {
        summary.rows.push(vec![
            (label.to_string(), Style::Bold),
            (value.to_string(), Style::Normal),
        ]);
    }
    summary.blank();
    let table = model.summary_table();
    summary.push(&table.headers, Style::Bold);
    for row in &table.rows {
        summary.push(row, Style::Normal);
    }
    summary.blank();
    summary.push(&model.total_row(), Style::Bold);

    let mut sheets = vec![summary];
    for group in &model.departments {
        let name = unique_sheet_name(&group.name, &sheets);
        let mut sheet = Sheet {
            name,
            rows: Vec::new(),
        };
        sheet.push(
            &[format!("{} Department - Attendance List", group.name)],
            Style::Bold,
        );
        sheet.blank();
        let table = ReportModel::department_table(group);
        sheet.push(&table.headers, Style::Bold);
        for row in &table.rows {
            sheet.push(row, Style::Normal);
        }
        sheets.push(sheet);
    }
    sheets
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, not `History`,
/// unique ignoring case.
fn unique_sheet_name(raw: &str, existing: &[Sheet]) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(SHEET_NAME_MAX).collect()
    };
    let taken = |name: &str| {
        let lower = name.to_lowercase();
        lower == RESERVED_SHEET_NAME || existing.iter().any(|s| s.name.to_lowercase() == lower)
    };
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let suffix = format!(" ({})", n);
        let keep = SHEET_NAME_MAX - suffix.chars().count();
        let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn column_letter(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.iter().rev().collect()
}

fn write_workbook(sheets: &[Sheet]) -> Result<Vec<u8>, RenderError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(content_types_xml(sheets.len()).as_bytes())?;

    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("xl/workbook.xml", opts)?;
    zip.write_all(workbook_xml(sheets).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", opts)?;
    zip.write_all(workbook_rels_xml(sheets.len()).as_bytes())?;

    zip.start_file("xl/styles.xml", opts)?;
    zip.write_all(STYLES.as_bytes())?;

    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)?;
        zip.write_all(worksheet_xml(sheet).as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>
"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>
"#;

fn content_types_xml(sheet_count: usize) -> String {
    let mut overrides = String::new();
    for i in 1..=sheet_count {
        overrides.push_str(&format!(
            r#"  <Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
{overrides}</Types>
"#
    )
}

fn workbook_xml(sheets: &[Sheet]) -> String {
    let mut entries = String::new();
    for (i, sheet) in sheets.iter().enumerate() {
        entries.push_str(&format!(
            r#"    <sheet name="{}" sheetId="{}" r:id="rId{}"/>
"#,
            escape_xml(&sheet.name),
            i + 1,
            i + 1
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
{entries}  </sheets>
</workbook>
"#
    )
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut rels = String::new();
    for i in 1..=sheet_count {
        rels.push_str(&format!(
            r#"  <Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>
"#
        ));
    }
    let styles_id = sheet_count + 1;
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
{rels}  <Relationship Id="rId{styles_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>
"#
    )
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let widest = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    out.push('\n');
    if widest > 0 {
        out.push_str("  <cols>");
        for col in 1..=widest {
            out.push_str(&format!(
                r#"<col min="{col}" max="{col}" width="20" customWidth="1"/>"#
            ));
        }
        out.push_str("</cols>\n");
    }
    out.push_str("  <sheetData>\n");
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_num = r + 1;
        if row.is_empty() {
            out.push_str(&format!("    <row r=\"{}\"/>\n", row_num));
            continue;
        }
        out.push_str(&format!("    <row r=\"{}\">", row_num));
        for (c, (text, style)) in row.iter().enumerate() {
            let style_attr = match style {
                Style::Normal => String::new(),
                Style::Bold => format!(r#" s="{}""#, Style::Bold as u8),
            };
            out.push_str(&format!(
                r#"<c r="{}{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_letter(c),
                row_num,
                style_attr,
                escape_xml(text)
            ));
        }
        out.push_str("</row>\n");
    }
    out.push_str("  </sheetData>\n");
    out.push_str("</worksheet>\n");
    out
}

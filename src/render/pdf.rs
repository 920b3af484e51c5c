use super::{ExportFormat, RenderError, Renderer};
use crate::report::{ReportModel, Table};
use std::io::Write;

pub struct PdfRenderer;

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN_X: f32 = 40.0;
const TOP: f32 = PAGE_HEIGHT - 40.0;
const BOTTOM: f32 = 80.0;
const SIGNATURE_Y: f32 = 57.0;
const ROW_HEIGHT: f32 = 18.0;
const CELL_FONT_SIZE: f32 = 9.0;
const HEADER_FILL: (u8, u8, u8) = (41, 128, 185);

impl Renderer for PdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, model: &ReportModel) -> Result<Vec<u8>, RenderError> {
        let pages = layout(model);
        write_document(&model.title, &pages)
    }
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

/// Content streams, one per page, built top to bottom.
struct PageWriter {
    pages: Vec<String>,
    current: String,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            y: TOP,
        }
    }

    fn new_page(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.pages.push(done);
        self.y = TOP;
    }

    /// Starts a new page unless `height` still fits above the bottom margin.
    fn ensure(&mut self, height: f32) -> bool {
        if self.y - height < BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn text(&mut self, x: f32, y: f32, size: f32, font: Font, s: &str) {
        self.current.push_str(&format!(
            "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET\n",
            font.resource(),
            size,
            x,
            y,
            pdf_text(s)
        ));
    }

    fn line(&mut self, size: f32, font: Font, s: &str) {
        self.y -= size + 4.0;
        let y = self.y;
        self.text(MARGIN_X, y, size, font, s);
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, rgb: (u8, u8, u8)) {
        self.current.push_str(&format!(
            "{:.3} {:.3} {:.3} rg {:.2} {:.2} {:.2} {:.2} re f 0 0 0 rg\n",
            rgb.0 as f32 / 255.0,
            rgb.1 as f32 / 255.0,
            rgb.2 as f32 / 255.0,
            x,
            y,
            w,
            h
        ));
    }

    fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.current.push_str(&format!(
            "0.5 w 0.75 G {:.2} {:.2} {:.2} {:.2} re S 0 G\n",
            x, y, w, h
        ));
    }

    fn row(&mut self, cells: &[String], header: bool) {
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let col = width / cells.len().max(1) as f32;
        let top = self.y;
        let bottom = top - ROW_HEIGHT;
        if header {
            self.fill_rect(MARGIN_X, bottom, width, ROW_HEIGHT, HEADER_FILL);
            self.current.push_str("1 1 1 rg\n");
        }
        let font = if header { Font::Bold } else { Font::Regular };
        for (i, cell) in cells.iter().enumerate() {
            let x = MARGIN_X + i as f32 * col;
            self.stroke_rect(x, bottom, col, ROW_HEIGHT);
            let fitted = fit_to_width(cell, col - 8.0, CELL_FONT_SIZE);
            self.text(x + 4.0, bottom + 5.5, CELL_FONT_SIZE, font, &fitted);
        }
        if header {
            self.current.push_str("0 0 0 rg\n");
        }
        self.y = bottom;
    }

    /// Draws `table`, repeating its header row after every page break.
    fn table(&mut self, table: &Table) {
        self.ensure(ROW_HEIGHT * 2.0);
        self.row(&table.headers, true);
        for cells in &table.rows {
            if self.ensure(ROW_HEIGHT) {
                self.row(&table.headers, true);
            }
            self.row(cells, false);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.pages.push(self.current);
        self.pages
    }
}

/// Lays the report out into one content stream per page.
fn layout(model: &ReportModel) -> Vec<String> {
    let mut pw = PageWriter::new();

    pw.line(16.0, Font::Bold, &model.title);
    pw.gap(6.0);
    for (label, value) in model.header.lines() {
        pw.line(11.0, Font::Regular, &format!("{} {}", label, value));
    }
    pw.gap(10.0);
    pw.line(14.0, Font::Bold, "Department Summary");
    pw.gap(6.0);
    let mut summary = model.summary_table();
    summary.rows.push(model.total_row());
    pw.table(&summary);

    for group in &model.departments {
        pw.gap(16.0);
        pw.ensure(14.0 + 4.0 + 6.0 + ROW_HEIGHT * 2.0);
        pw.line(14.0, Font::Bold, &format!("{} Department", group.name));
        pw.gap(6.0);
        pw.table(&ReportModel::department_table(group));
    }

    pw.text(MARGIN_X, SIGNATURE_Y, 11.0, Font::Regular, &model.signature_line);
    pw.finish()
}

/// Helvetica averages about half an em per glyph.
fn fit_to_width(s: &str, width: f32, size: f32) -> String {
    let max = (width / (size * 0.5)).floor().max(1.0) as usize;
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(2);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("..");
    out
}

/// Encodes `s` for a literal string under WinAnsiEncoding.
fn pdf_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => out.push('?'),
        }
    }
    out
}

fn write_document(title: &str, pages: &[String]) -> Result<Vec<u8>, RenderError> {
    let mut buf: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();

    // 1 catalog, 2 pages, 3-4 fonts, 5 info, then a page and its content per page.
    let first_page = 6;
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| first_page + i * 2).collect();
    let object_count = first_page - 1 + pages.len() * 2;

    buf.write_all(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;

    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(object_count);
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        )
        .into_bytes(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    let created = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ");
    objects.push(
        format!(
            "<< /Title ({}) /Producer (examattd) /CreationDate ({}) >>",
            pdf_text(title),
            created
        )
        .into_bytes(),
    );
    for (i, content) in pages.iter().enumerate() {
        let content_id = page_ids[i] + 1;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, content_id
            )
            .into_bytes(),
        );
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    for (i, body) in objects.iter().enumerate() {
        offsets.push(buf.len());
        writeln!(buf, "{} 0 obj", i + 1)?;
        buf.write_all(body)?;
        buf.write_all(b"\nendobj\n")?;
    }

    let xref_at = buf.len();
    write!(buf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1)?;
    for off in &offsets {
        writeln!(buf, "{:010} 00000 n ", off)?;
    }
    write!(
        buf,
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    )?;
    Ok(buf)
}

//! Printable installer checklist.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use super::Checklist;

const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 20.0;
const LINE: f32 = 7.0;
const WRAP_COLUMNS: usize = 90;

#[derive(Debug, thiserror::Error)]
pub enum ChecklistPdfError {
    #[error("PDF render failed: {0}")]
    Render(#[from] printpdf::Error),
}

impl From<ChecklistPdfError> for crate::core::shared::AppError {
    fn from(e: ChecklistPdfError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Label and answer for every inspection item, in print order.
pub fn inspection_items(checklist: &Checklist) -> [(&'static str, bool); 7] {
    [
        ("Material is correct", checklist.material_correct),
        ("Seams are satisfactory", checklist.seams_satisfaction),
        ("Appliances fit properly", checklist.appliances_fit),
        ("Backsplashes are correct", checklist.backsplashes_correct),
        ("Edges are correct", checklist.edges_correct),
        ("Holes drilled as requested", checklist.holes_drilled),
        ("Clean-up completed", checklist.cleanup_completed),
    ]
}

/// Greedy word wrap on character count.
pub fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > columns {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

struct Cursor {
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor {
    fn text(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
        self.y -= LINE;
    }

    fn gap(&mut self) {
        self.y -= LINE / 2.0;
    }
}

pub fn render_checklist(checklist: &Checklist, installer_name: &str) -> Result<Vec<u8>, ChecklistPdfError> {
    let (doc, page, layer) = PdfDocument::new(
        "Installation Checklist",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Checklist",
    );
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut cursor = Cursor {
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT - MARGIN,
    };

    cursor.text("Post-Installation Check List", 18.0, &bold);
    cursor.gap();
    cursor.text(&format!("Customer: {}", checklist.customer_name), 11.0, &regular);
    cursor.text(
        &format!("Installation address: {}", checklist.installation_address),
        11.0,
        &regular,
    );
    cursor.text(&format!("Installer: {}", installer_name), 11.0, &regular);
    cursor.text(
        &format!("Date: {}", checklist.created_at.format("%Y-%m-%d")),
        11.0,
        &regular,
    );
    cursor.gap();

    for (label, passed) in inspection_items(checklist) {
        let mark = if passed { "[x]" } else { "[ ]" };
        cursor.text(&format!("{mark}  {label}"), 11.0, &regular);
    }

    if let Some(comments) = checklist.comments.as_deref().filter(|c| !c.trim().is_empty()) {
        cursor.gap();
        cursor.text("Comments", 12.0, &bold);
        for line in wrap(comments, WRAP_COLUMNS) {
            cursor.text(&line, 10.0, &regular);
        }
    }

    cursor.gap();
    cursor.text(
        "I confirm the installation was completed to my satisfaction.",
        10.0,
        &regular,
    );
    cursor.text(&format!("Signature: {}", checklist.signature), 12.0, &bold);

    Ok(doc.save_to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn checklist() -> Checklist {
        Checklist {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            customer_id: None,
            installer_id: Uuid::nil(),
            customer_name: "Dana Ortiz".to_string(),
            installation_address: "12 Quarry Rd".to_string(),
            material_correct: true,
            seams_satisfaction: true,
            appliances_fit: false,
            backsplashes_correct: true,
            edges_correct: true,
            holes_drilled: true,
            cleanup_completed: true,
            comments: Some("Range gap is tight; customer ok with it.".to_string()),
            signature: "Dana Ortiz".to_string(),
            pdf_key: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_produces_pdf() {
        let bytes = render_checklist(&checklist(), "Sam Installer").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_inspection_items_follow_record() {
        let items = inspection_items(&checklist());
        assert_eq!(items.len(), 7);
        assert_eq!(items[2], ("Appliances fit properly", false));
        assert!(items.iter().filter(|(_, ok)| *ok).count() == 6);
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap("averyveryverylongword", 5), vec!["averyveryverylongword"]);
    }
}

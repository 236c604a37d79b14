use printpdf::*;
use std::io::BufWriter;

use crate::{error::PipelineError, models::SavedDesign};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const BOTTOM: f32 = 20.0;
const WRAP_CHARS: usize = 92;

/// Text-only jeweler spec sheet. Renders are listed by URL, not embedded.
pub fn spec_sheet_pdf(design: &SavedDesign) -> Result<Vec<u8>, PipelineError> {
    let title = format!("Spec sheet: {}", truncate(&design.concept.name, 48));
    let (doc, page, layer) = PdfDocument::new(&title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PipelineError::Internal(format!("pdf font: {e:?}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PipelineError::Internal(format!("pdf font: {e:?}")))?;

    let mut layer_ref = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_H - MARGIN - 5.0;
    let mut pages = 1;

    let mut lines: Vec<(String, f32, bool)> = vec![
        (ascii(&design.concept.name), 20.0, true),
        (
            format!(
                "{} design | status: {} | created {}",
                ascii(design.flow_type.label()),
                design.status.as_str(),
                design.created_at.format("%Y-%m-%d")
            ),
            9.0,
            false,
        ),
        (String::new(), 6.0, false),
    ];
    for line in wrap(&design.concept.overview, WRAP_CHARS) {
        lines.push((line, 11.0, false));
    }
    lines.push((String::new(), 6.0, false));

    lines.push(("Specification".into(), 14.0, true));
    for (label, value) in design.concept.spec_rows() {
        lines.push((ascii(label), 10.0, true));
        for line in wrap(&value, WRAP_CHARS) {
            lines.push((format!("    {line}"), 10.0, false));
        }
    }

    let preferences = design.form_inputs.preferences();
    if !preferences.is_empty() {
        lines.push((String::new(), 6.0, false));
        lines.push(("Customer preferences".into(), 14.0, true));
        for (label, value) in preferences {
            for line in wrap(&format!("{label}: {value}"), WRAP_CHARS) {
                lines.push((line, 10.0, false));
            }
        }
    }

    let urls = design.images().urls();
    if !urls.is_empty() {
        lines.push((String::new(), 6.0, false));
        lines.push(("Renders".into(), 14.0, true));
        for url in urls.iter().filter(|u| !u.starts_with("data:")) {
            lines.push((truncate(url, 110), 8.0, false));
        }
    }

    for (text, size, is_bold) in lines {
        let step = size * 0.5 + 1.5;
        if y - step < BOTTOM {
            pages += 1;
            let (next_page, next_layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {pages}"));
            layer_ref = doc.get_page(next_page).get_layer(next_layer);
            y = PAGE_H - MARGIN - 5.0;
        }
        y -= step;
        if !text.is_empty() {
            layer_ref.use_text(text, size, Mm(MARGIN), Mm(y), if is_bold { &bold } else { &font });
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer)
            .map_err(|e| PipelineError::Internal(format!("pdf write: {e:?}")))?;
    }
    Ok(buf)
}

/// Built-in fonts only cover a Latin-1 subset reliably.
fn ascii(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            c if c.is_ascii() => c,
            'à' | 'á' | 'â' | 'ä' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'É' => 'E',
            '–' | '—' => '-',
            '’' | '‘' => '\'',
            '“' | '”' => '"',
            '×' => 'x',
            _ => '?',
        })
        .collect()
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in ascii(text).split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DesignStatus;
    use crate::testing::saved_design;
    use uuid::Uuid;

    #[test]
    fn renders_a_pdf_document() {
        let design = saved_design(Uuid::new_v4(), DesignStatus::Saved);
        let bytes = spec_sheet_pdf(&design).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn long_notes_spill_onto_more_pages() {
        let mut design = saved_design(Uuid::new_v4(), DesignStatus::Draft);
        design.concept.manufacturing_notes = "Hand-finish every claw. ".repeat(600);
        let short = spec_sheet_pdf(&saved_design(Uuid::new_v4(), DesignStatus::Draft)).unwrap();
        let long = spec_sheet_pdf(&design).unwrap();
        assert!(long.len() > short.len());
    }

    #[test]
    fn wrapping_respects_width_and_folds_accents() {
        let lines = wrap("Pavé set melee along a knife-edge band with tapered shoulders", 20);
        assert!(lines.iter().all(|l| l.len() <= 20));
        assert_eq!(lines[0], "Pave set melee along");
        assert_eq!(ascii("9.0 × 7.0"), "9.0 x 7.0");
    }
}

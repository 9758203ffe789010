use shared::domain::{
    AttemptSummary, CertificateSummary, HseUser, Language, Question, TestVersion,
};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// One-based.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slices out page `page` (one-based, clamped into range). An empty input
/// still reports one page.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_pages = items.len().div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) * page_size).min(items.len());
    let end = (start + page_size).min(items.len());
    Page {
        items: &items[start..end],
        page,
        total_pages,
        total_items: items.len(),
    }
}

pub trait TableRow {
    fn headers() -> &'static [&'static str];
    fn cells(&self, language: Language) -> Vec<String>;
}

impl TableRow for TestVersion {
    fn headers() -> &'static [&'static str] {
        &["id", "version", "name", "questions", "active"]
    }

    fn cells(&self, _language: Language) -> Vec<String> {
        let questions = self
            .questions_count
            .or(self.total_questions)
            .map_or_else(|| "-".to_string(), |count| count.to_string());
        vec![
            self.id.to_string(),
            self.version.to_string(),
            self.display_name(),
            questions,
            if self.is_active { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl TableRow for Question {
    fn headers() -> &'static [&'static str] {
        &["id", "code", "statement", "answer", "mandatory"]
    }

    fn cells(&self, language: Language) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.question_code.clone().unwrap_or_default(),
            truncate(self.text(language), 60),
            if self.expected_answer { "yes" } else { "no" }.to_string(),
            if self.is_mandatory() { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl TableRow for CertificateSummary {
    fn headers() -> &'static [&'static str] {
        &["id", "number", "holder", "version", "score", "issued"]
    }

    fn cells(&self, _language: Language) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.certificate_number.clone(),
            self.user_full_name.clone(),
            self.test_version
                .map_or_else(|| "-".to_string(), |version| version.to_string()),
            self.score
                .map_or_else(|| "-".to_string(), |score| score.to_string()),
            self.issued_date
                .map_or_else(|| "-".to_string(), |date| date.format("%Y-%m-%d").to_string()),
        ]
    }
}

impl TableRow for HseUser {
    fn headers() -> &'static [&'static str] {
        &["id", "cin", "name", "entity", "company", "present", "passed", "score"]
    }

    fn cells(&self, _language: Language) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.cin.clone(),
            truncate(&self.display_name(), 30),
            self.entity.clone(),
            self.company.clone(),
            yes_no(self.present),
            yes_no(self.passed),
            percent(self.score),
        ]
    }
}

impl TableRow for AttemptSummary {
    fn headers() -> &'static [&'static str] {
        &["id", "version", "status", "score", "passed", "started", "duration"]
    }

    fn cells(&self, _language: Language) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.test_version
                .map_or_else(|| "-".to_string(), |version| version.to_string()),
            self.status.clone(),
            percent(self.overall_score_percentage),
            self.passed
                .map_or_else(|| "-".to_string(), yes_no),
            self.started_at
                .map_or_else(|| "-".to_string(), |date| date.format("%Y-%m-%d %H:%M").to_string()),
            self.time_taken_seconds
                .map_or_else(|| "-".to_string(), crate::timer::format_clock),
        ]
    }
}

pub fn render_table<T: TableRow>(page: &Page<'_, T>, language: Language) -> String {
    let headers = T::headers();
    let rows: Vec<Vec<String>> = page.items.iter().map(|row| row.cells(language)).collect();
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers.iter().map(|header| header.to_string()), &widths);
    for row in rows {
        push_row(&mut out, row.into_iter(), &widths);
    }
    out.push_str(&format!(
        "page {}/{} ({} items)\n",
        page.page, page.total_pages, page.total_items
    ));
    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.1}%"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
#[path = "tests/listing_tests.rs"]
mod tests;

//! Page counting for uploaded documents.

use regex::bytes::Regex;
use std::sync::LazyLock;

/// Rough size of one page when a document's structure can't be read.
pub const BYTES_PER_ESTIMATED_PAGE: u64 = 40_000;

// `/Type /Page` objects, not the `/Type /Pages` tree nodes.
static PDF_PAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/Page\b").expect("static regex"));

static PDF_PAGE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Count\s+(\d+)").expect("static regex"));

/// Counts the pages of a document so the job summary can report totals.
pub trait PageCounter: Send + Sync {
    /// Number of pages in `data`. Always at least 1 for non-empty input.
    fn count_pages(&self, filename: &str, data: &[u8]) -> u32;
}

/// Reads page objects from PDFs and estimates from file size otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct EstimatingPageCounter;

impl EstimatingPageCounter {
    fn pdf_pages(data: &[u8]) -> Option<u32> {
        let objects = PDF_PAGE_OBJECT.find_iter(data).count() as u32;
        if objects > 0 {
            return Some(objects);
        }
        // Compressed object streams hide the page objects; the page tree
        // root's /Count is the next best source.
        PDF_PAGE_COUNT
            .captures_iter(data)
            .filter_map(|c| std::str::from_utf8(&c[1]).ok()?.parse::<u32>().ok())
            .max()
            .filter(|n| *n > 0)
    }

    fn estimate(data: &[u8]) -> u32 {
        let pages = (data.len() as u64).div_ceil(BYTES_PER_ESTIMATED_PAGE);
        pages.clamp(1, u32::MAX as u64) as u32
    }
}

impl PageCounter for EstimatingPageCounter {
    fn count_pages(&self, _filename: &str, data: &[u8]) -> u32 {
        if data.starts_with(b"%PDF") {
            if let Some(pages) = Self::pdf_pages(data) {
                return pages;
            }
            tracing::debug!("No page objects found in PDF, estimating from size");
        }
        Self::estimate(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_pdf_page_objects() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Type /Pages /Kids [2 0 R 3 0 R] /Count 2 >>\n\
                    2 0 obj << /Type /Page >>\n3 0 obj << /Type/Page >>\n";
        assert_eq!(EstimatingPageCounter.count_pages("a.pdf", pdf), 2);
    }

    #[test]
    fn test_falls_back_to_page_tree_count() {
        let pdf = b"%PDF-1.7\n<< /Type /Pages /Count 12 >> stream...";
        assert_eq!(EstimatingPageCounter.count_pages("a.pdf", pdf), 12);
    }

    #[test]
    fn test_estimates_other_formats_from_size() {
        let docx = vec![0u8; 90_000];
        assert_eq!(EstimatingPageCounter.count_pages("a.docx", &docx), 3);
        assert_eq!(EstimatingPageCounter.count_pages("a.docx", b"PK"), 1);
    }
}

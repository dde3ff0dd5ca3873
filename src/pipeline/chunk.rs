//! Sliding-window chunker: pages in, overlapping page-window chunks out.
//!
//! Chunks overlap by a configurable number of pages so that arguments
//! straddling a window boundary stay visible to both chunk summaries. The
//! stride is `chunk_size - overlap`; geometry where that stride would be
//! zero or negative is rejected up front, before any API quota is spent.

use crate::error::StudytexError;
use crate::pipeline::extract::PageText;

/// One window of pages ready for the map phase.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Contiguous from 0 in processing order.
    pub id: usize,
    pub start_page: u32,
    pub end_page: u32,
    /// Derived display title, e.g. `Section 2 (pp. 14-28)`.
    pub title: String,
    /// Member pages joined with `[Page N]` markers.
    pub text: String,
    pub char_count: usize,
}

/// Split the page sequence into overlapping chunks.
///
/// Every page lands in at least one chunk. The final window is clipped to
/// the remaining pages, and iteration stops once a window reaches the end
/// of the sequence. An empty page sequence yields an empty chunk list.
pub fn create_chunks(
    pages: &[PageText],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, StudytexError> {
    if chunk_size == 0 {
        return Err(StudytexError::InvalidConfig(
            "chunk_size must be ≥ 1 page".into(),
        ));
    }
    if overlap >= chunk_size {
        return Err(StudytexError::InvalidConfig(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(pages.len());
        let window = &pages[start..end];
        let start_page = window[0].page_number;
        let end_page = window[window.len() - 1].page_number;
        let text = window
            .iter()
            .map(|p| format!("[Page {}]\n{}", p.page_number, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let id = chunks.len();
        chunks.push(Chunk {
            id,
            start_page,
            end_page,
            title: format!("Section {} (pp. {}-{})", id + 1, start_page, end_page),
            char_count: text.chars().count(),
            text,
        });

        if end == pages.len() {
            break;
        }
        start += stride;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pages(n: u32) -> Vec<PageText> {
        (1..=n)
            .map(|i| PageText {
                page_number: i,
                text: format!("content of page {i}"),
            })
            .collect()
    }

    #[test]
    fn thirty_two_pages_with_overlap_two() {
        let chunks = create_chunks(&make_pages(32), 15, 2).unwrap();
        let spans: Vec<(u32, u32)> = chunks.iter().map(|c| (c.start_page, c.end_page)).collect();
        assert_eq!(spans, vec![(1, 15), (14, 28), (27, 32)]);
    }

    #[test]
    fn every_page_lands_in_a_chunk() {
        for (pages, size, overlap) in [(10u32, 3, 1), (32, 15, 2), (5, 15, 2), (7, 3, 0), (1, 1, 0)] {
            let chunks = create_chunks(&make_pages(pages), size, overlap).unwrap();
            for page in 1..=pages {
                assert!(
                    chunks.iter().any(|c| c.start_page <= page && page <= c.end_page),
                    "page {page} uncovered for geometry ({pages}, {size}, {overlap})"
                );
            }
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.id, i);
            }
        }
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let pages = make_pages(10);
        assert!(matches!(
            create_chunks(&pages, 5, 5),
            Err(StudytexError::InvalidConfig(_))
        ));
        assert!(matches!(
            create_chunks(&pages, 5, 8),
            Err(StudytexError::InvalidConfig(_))
        ));
        assert!(matches!(
            create_chunks(&pages, 0, 0),
            Err(StudytexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_page_sequence_yields_no_chunks() {
        let chunks = create_chunks(&[], 15, 2).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn document_smaller_than_window_is_one_chunk() {
        let chunks = create_chunks(&make_pages(5), 15, 2).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_page, chunks[0].end_page), (1, 5));
    }

    #[test]
    fn exact_fit_produces_no_duplicate_tail() {
        let chunks = create_chunks(&make_pages(15), 15, 2).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn text_carries_page_markers_and_title_names_span() {
        let chunks = create_chunks(&make_pages(4), 3, 1).unwrap();
        assert!(chunks[0].text.contains("[Page 1]\ncontent of page 1"));
        assert!(chunks[0].text.contains("[Page 3]"));
        assert_eq!(chunks[0].title, "Section 1 (pp. 1-3)");
        assert_eq!(chunks[1].title, "Section 2 (pp. 3-4)");
        assert!(chunks[0].char_count > 0);
    }

    #[test]
    fn surviving_page_numbers_are_preserved() {
        // Pages 2 and 5 were empty and dropped at extraction.
        let pages: Vec<PageText> = [1u32, 3, 4, 6]
            .iter()
            .map(|&i| PageText {
                page_number: i,
                text: format!("p{i}"),
            })
            .collect();
        let chunks = create_chunks(&pages, 3, 1).unwrap();
        assert_eq!((chunks[0].start_page, chunks[0].end_page), (1, 4));
        assert_eq!((chunks[1].start_page, chunks[1].end_page), (4, 6));
    }
}

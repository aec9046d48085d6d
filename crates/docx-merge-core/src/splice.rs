//! Run splicing: replace text that may span several runs of a paragraph.
//!
//! Runs are located by their offsets in the paragraph's concatenated run
//! text. A run with text touches the match when its span meets
//! `[start, end]`, ends included; runs without text (field characters,
//! drawings, bookmarks wrapped in runs) never do. The first touching run keeps
//! the text before the match and takes the replacement, so the new text
//! carries that run's formatting. The last touching run keeps the text after
//! the match; the first and last stay even when left empty. Runs in between
//! lose their text: plain text runs are removed, runs with other content keep
//! it, runs without text are left alone.

use crate::document::{run_has_content, run_text, set_run_text};
use crate::xml::XmlElement;

/// Replace the first occurrence of `old` in the paragraph. Returns false when
/// `old` is empty or absent.
pub fn replace(paragraph: &mut XmlElement, old: &str, new: &str) -> bool {
    replace_from(paragraph, old, new, 0).is_some()
}

/// Replace every occurrence of `old`, never rescanning inserted text.
/// Returns the number of replacements.
pub fn replace_all(paragraph: &mut XmlElement, old: &str, new: &str) -> usize {
    let mut count = 0;
    let mut from = 0;
    while let Some(next) = replace_from(paragraph, old, new, from) {
        count += 1;
        from = next;
    }
    count
}

/// Replace the first occurrence of `old` at or after byte offset `from` of the
/// concatenated run text. Returns the offset just past the inserted text.
pub fn replace_from(paragraph: &mut XmlElement, old: &str, new: &str, from: usize) -> Option<usize> {
    if old.is_empty() {
        return None;
    }

    // (index into paragraph.children, run_start, run text)
    let mut runs: Vec<(usize, usize, String)> = Vec::new();
    let mut full = String::new();
    for idx in paragraph.w_child_indices("r") {
        let text = paragraph.children[idx]
            .as_element()
            .map(run_text)
            .unwrap_or_default();
        runs.push((idx, full.len(), text.clone()));
        full.push_str(&text);
    }

    let start = from + full.get(from..)?.find(old)?;
    let end = start + old.len();

    let touching: Vec<usize> = runs
        .iter()
        .enumerate()
        .filter(|(_, (_, run_start, text))| {
            !text.is_empty() && *run_start <= end && run_start + text.len() >= start
        })
        .map(|(pos, _)| pos)
        .collect();
    let (&first, &last) = (touching.first()?, touching.last()?);

    let (first_idx, first_start, first_text) = &runs[first];
    let mut head = String::with_capacity(first_text.len() + new.len());
    head.push_str(&first_text[..start - first_start]);
    head.push_str(new);
    if first == last {
        let tail_from = (end - first_start).min(first_text.len());
        head.push_str(&first_text[tail_from..]);
    }
    rewrite_run(paragraph, *first_idx, first_text, &head);

    if first != last {
        let (last_idx, last_start, last_text) = &runs[last];
        let tail_from = (end - last_start).min(last_text.len());
        rewrite_run(paragraph, *last_idx, last_text, &last_text[tail_from..]);

        // Highest index first so the lower indices stay valid.
        for (idx, _, text) in runs[first + 1..last].iter().rev() {
            if text.is_empty() {
                continue;
            }
            let keep = paragraph.children[*idx]
                .as_element()
                .is_some_and(run_has_content);
            if keep {
                rewrite_run(paragraph, *idx, text, "");
            } else {
                paragraph.children.remove(*idx);
            }
        }
    }

    Some(start + new.len())
}

fn rewrite_run(paragraph: &mut XmlElement, idx: usize, old_text: &str, new_text: &str) {
    if old_text == new_text {
        return;
    }
    if let Some(run) = paragraph.children[idx].as_element_mut() {
        set_run_text(run, new_text);
    }
}

//! Line-level match fragments with surrounding context.

use crate::types::Fragment;

/// Default number of fragments attached to a search result.
pub const DEFAULT_MAX_FRAGMENTS: usize = 3;

/// Finds lines containing any of `terms` (case-insensitive substring match)
/// and returns context windows around them, merging windows that touch or
/// overlap. Line numbers in the output are 1-based.
pub fn extract_fragments<S: AsRef<str>>(
    content: &str,
    terms: &[S],
    context_lines: usize,
    max_fragments: usize,
) -> Vec<Fragment> {
    if content.is_empty() || terms.is_empty() || max_fragments == 0 {
        return Vec::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    let terms: Vec<String> = terms.iter().map(|t| t.as_ref().to_lowercase()).filter(|t| !t.is_empty()).collect();
    if lines.is_empty() || terms.is_empty() {
        return Vec::new();
    }

    let matched: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let lower = line.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .map(|(idx, _)| idx)
        .collect();

    let last = lines.len() - 1;
    let mut fragments = Vec::new();
    // (start, end, matches), 0-based inclusive
    let mut current: Option<(usize, usize, Vec<usize>)> = None;

    for idx in matched {
        let start = idx.saturating_sub(context_lines);
        let end = idx.saturating_add(context_lines).min(last);
        match current.as_mut() {
            Some((_, cur_end, hits)) if start <= *cur_end + 1 => {
                *cur_end = (*cur_end).max(end);
                hits.push(idx);
            }
            Some(_) => {
                if let Some(done) = current.take() {
                    fragments.push(to_fragment(&lines, done));
                }
                if fragments.len() >= max_fragments {
                    return fragments;
                }
                current = Some((start, end, vec![idx]));
            }
            None => current = Some((start, end, vec![idx])),
        }
    }

    if let Some(open) = current {
        if fragments.len() < max_fragments {
            fragments.push(to_fragment(&lines, open));
        }
    }
    fragments
}

fn to_fragment(lines: &[&str], (start, end, hits): (usize, usize, Vec<usize>)) -> Fragment {
    Fragment {
        line_start: start + 1,
        line_end: end + 1,
        lines: lines[start..=end].iter().map(|l| (*l).to_string()).collect(),
        matched_line_numbers: hits.into_iter().map(|i| i + 1).collect(),
    }
}

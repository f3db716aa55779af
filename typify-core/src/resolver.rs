use crate::lyrics::LyricLine;

/// Resolve which line is current at `elapsed_ms`.
///
/// Scans forward from `previous` only: the result is never lower than
/// `previous`, so a line the player has already typed past is not revisited.
/// Among lines sharing a start time the last one wins. Returns `None` until
/// the first line starts.
#[must_use]
pub fn resolve_current_line(
    elapsed_ms: u64,
    lines: &[LyricLine],
    previous: Option<usize>,
) -> Option<usize> {
    let from = previous.map_or(0, |index| index.saturating_add(1));

    let advanced = lines
        .get(from..)
        .unwrap_or_default()
        .iter()
        .take_while(|line| line.start_time_ms <= elapsed_ms)
        .count();

    if advanced == 0 {
        previous
    } else {
        Some(from + advanced - 1)
    }
}

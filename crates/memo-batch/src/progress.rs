use std::fmt;
use std::time::Duration;

use tracing::info;

/// Default upper bound on progress lines emitted for one batch call.
pub const DEFAULT_PROGRESS_LINES: usize = 50;

/// Periodic progress reporting over a fixed list of run indices.
///
/// Lines are emitted every `ceil(n / max_lines)` runs, so a call never emits
/// more than `max_lines` of them whatever the batch size.
#[derive(Debug, Clone)]
pub struct Progress {
    total: usize,
    stride: usize,
    label: String,
    enabled: bool,
}

impl Progress {
    pub fn new(indices: &[usize], max_lines: usize, enabled: bool) -> Self {
        let total = indices.len();
        let stride = total.div_ceil(max_lines.max(1)).max(1);
        Self {
            total,
            stride,
            label: compact_list(indices),
            enabled,
        }
    }

    /// Progress line for the `position`-th scheduled run, if one is due.
    pub fn line(
        &self,
        position: usize,
        index: usize,
        elapsed: Duration,
    ) -> Option<ProgressLine<'_>> {
        if position % self.stride != 0 {
            return None;
        }
        let eta = (position > 0)
            .then(|| elapsed.mul_f64((self.total - position) as f64 / position as f64));
        Some(ProgressLine {
            index,
            position,
            total: self.total,
            label: &self.label,
            elapsed,
            eta,
        })
    }

    /// Logs the progress line for this position when one is due.
    pub fn report(&self, position: usize, index: usize, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        if let Some(line) = self.line(position, index, elapsed) {
            info!(
                run = index,
                position = position + 1,
                total = self.total,
                "{line}"
            );
        }
    }
}

/// One rendered progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine<'a> {
    pub index: usize,
    pub position: usize,
    pub total: usize,
    pub label: &'a str,
    pub elapsed: Duration,
    /// Estimated time remaining; unknown before the first run finishes.
    pub eta: Option<Duration>,
}

impl fmt::Display for ProgressLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} in {} ({}/{})  runtime: {}  eta: ",
            self.index,
            self.label,
            self.position + 1,
            self.total,
            minutes(self.elapsed)
        )?;
        match self.eta {
            Some(eta) => write!(f, "{}", minutes(eta)),
            None => write!(f, "/"),
        }
    }
}

pub(crate) fn minutes(duration: Duration) -> String {
    format!("{:.1} min", duration.as_secs_f64() / 60.0)
}

/// Renders a list of run indices, eliding the middle of long lists.
pub fn compact_list(indices: &[usize]) -> String {
    if indices.len() > 5 {
        let n = indices.len();
        format!(
            "[{},{},...,{},{}]",
            indices[0],
            indices[1],
            indices[n - 2],
            indices[n - 1]
        )
    } else {
        let parts: Vec<String> = indices.iter().map(ToString::to_string).collect();
        format!("[{}]", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_count_is_bounded() {
        for total in [0usize, 1, 7, 49, 50, 51, 99, 100, 101, 1000, 12345] {
            let indices: Vec<usize> = (0..total).collect();
            let progress = Progress::new(&indices, DEFAULT_PROGRESS_LINES, true);
            let lines = (0..total)
                .filter(|&pos| progress.line(pos, pos, Duration::ZERO).is_some())
                .count();
            assert!(lines <= DEFAULT_PROGRESS_LINES, "{total} runs gave {lines} lines");
            if total > 0 {
                assert!(lines >= 1);
            }
        }
    }

    #[test]
    fn eta_scales_with_remaining_runs() {
        let indices: Vec<usize> = (0..4).collect();
        let progress = Progress::new(&indices, DEFAULT_PROGRESS_LINES, true);
        let first = progress.line(0, 0, Duration::ZERO).expect("line");
        assert_eq!(first.eta, None);
        assert!(first.to_string().ends_with("eta: /"));
        let third = progress.line(2, 2, Duration::from_secs(120)).expect("line");
        assert_eq!(third.eta, Some(Duration::from_secs(120)));
        assert_eq!(
            third.to_string(),
            "run 2 in [0,1,2,3] (3/4)  runtime: 2.0 min  eta: 2.0 min"
        );
    }

    #[test]
    fn long_lists_are_elided() {
        assert_eq!(compact_list(&[3, 5, 8]), "[3,5,8]");
        assert_eq!(compact_list(&[0, 1, 2, 3, 4, 5, 6]), "[0,1,...,5,6]");
        assert_eq!(compact_list(&[]), "[]");
    }
}

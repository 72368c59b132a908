//! Window planning

use stixpoll_core::timestamp;
use stixpoll_net::TimeWindow;

/// Where a run starts: the watermark, or `initial_lookback` before `now`
/// for a source that never synced
pub fn run_begin(watermark: Option<i64>, now: i64, initial_lookback: i64) -> i64 {
    watermark.unwrap_or_else(|| now.saturating_sub(initial_lookback))
}

/// Tile `[begin, end)` with consecutive windows of at most `max_window`
/// milliseconds; the last one may be shorter
///
/// An empty or inverted range yields no windows. A non-positive
/// `max_window` yields a single window over the whole range.
pub fn plan_windows(begin: i64, end: i64, max_window: i64) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    let mut start = begin;
    while start < end {
        let stop = if max_window > 0 {
            start.saturating_add(max_window).min(end)
        } else {
            end
        };
        match TimeWindow::new(start, stop) {
            Some(window) => windows.push(window),
            None => break,
        }
        start = stop;
    }
    windows
}

/// Plan a run, optionally truncating both bounds to whole minutes
pub fn plan_run(begin: i64, now: i64, max_window: i64, lower_precision: bool) -> Vec<TimeWindow> {
    if lower_precision {
        plan_windows(
            timestamp::floor_minutes(begin),
            timestamp::floor_minutes(now),
            max_window,
        )
    } else {
        plan_windows(begin, now, max_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400_000;

    #[test]
    fn test_tiling_is_contiguous() {
        let windows = plan_windows(0, 2 * DAY + 5, DAY);
        let bounds: Vec<(i64, i64)> = windows.iter().map(|w| (w.begin(), w.end())).collect();
        assert_eq!(bounds, vec![(0, DAY), (DAY, 2 * DAY), (2 * DAY, 2 * DAY + 5)]);
    }

    #[test]
    fn test_tiling_covers_range_exactly() {
        for (begin, end, max) in [(7, 1000, 13), (0, 10, 10), (5, 6, 100), (-50, 50, 7)] {
            let windows = plan_windows(begin, end, max);
            assert_eq!(windows.first().unwrap().begin(), begin);
            assert_eq!(windows.last().unwrap().end(), end);
            for pair in windows.windows(2) {
                assert_eq!(pair[0].end(), pair[1].begin());
            }
            assert!(windows.iter().all(|w| w.end() - w.begin() <= max));
        }
    }

    #[test]
    fn test_empty_range() {
        assert!(plan_windows(10, 10, 5).is_empty());
        assert!(plan_windows(10, 5, 5).is_empty());
    }

    #[test]
    fn test_non_positive_window() {
        assert_eq!(plan_windows(0, 100, 0).len(), 1);
    }

    #[test]
    fn test_run_begin() {
        assert_eq!(run_begin(Some(42), 10 * DAY, DAY), 42);
        assert_eq!(run_begin(None, 10 * DAY, DAY), 9 * DAY);
    }

    #[test]
    fn test_lower_precision_floors_bounds() {
        let windows = plan_run(61_500, 185_000, DAY, true);
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].begin(), windows[0].end()), (60_000, 180_000));

        assert!(plan_run(61_000, 62_000, DAY, true).is_empty());
    }
}

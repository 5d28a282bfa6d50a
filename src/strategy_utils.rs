use crate::models::{ExitRuns, Side};

/// Longest leading run of `sorted` whose entries all pass `test`.
pub fn leading_run<F>(sorted: &[f64], mut test: F) -> Vec<f64>
where
    F: FnMut(f64) -> bool,
{
    sorted
        .iter()
        .copied()
        .take_while(|&entry| test(entry))
        .collect()
}

/// Longest trailing run of `sorted` whose entries all pass `test`, listed from
/// the highest entry down.
pub fn trailing_run<F>(sorted: &[f64], mut test: F) -> Vec<f64>
where
    F: FnMut(f64) -> bool,
{
    sorted
        .iter()
        .rev()
        .copied()
        .take_while(|&entry| test(entry))
        .collect()
}

/// Barbell exits for one side of the book.
///
/// Long: profit-take the cheapest lots while `price / entry > sell_high`, stop
/// out the dearest lots while `price / entry < sell_low`.
/// Short: stop out the cheapest lots while `entry / price < sell_low`,
/// profit-take the dearest lots while `entry / price > sell_high`.
pub fn barbell_exit_runs(
    current_price: f64,
    sorted_lots: &[f64],
    side: Side,
    sell_high: f64,
    sell_low: f64,
) -> ExitRuns {
    match side {
        Side::Long => ExitRuns {
            front: leading_run(sorted_lots, |entry| current_price / entry > sell_high),
            back: trailing_run(sorted_lots, |entry| current_price / entry < sell_low),
        },
        Side::Short => ExitRuns {
            front: leading_run(sorted_lots, |entry| entry / current_price < sell_low),
            back: trailing_run(sorted_lots, |entry| entry / current_price > sell_high),
        },
    }
}

/// Arithmetic mean of the last `window` prices, if that many exist.
pub fn trailing_mean(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let tail = &prices[prices.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_run_stops_at_first_failure() {
        let run = leading_run(&[1.0, 2.0, 5.0, 3.0], |entry| entry < 4.0);
        assert_eq!(run, vec![1.0, 2.0]);
    }

    #[test]
    fn test_trailing_run_scans_from_the_top() {
        let run = trailing_run(&[1.0, 6.0, 2.0, 7.0, 8.0], |entry| entry > 5.0);
        assert_eq!(run, vec![8.0, 7.0]);
    }

    #[test]
    fn test_long_barbell_runs() {
        // price 100: lots at 20,30 have ratio > 2.5; lots at 150,200 have ratio < 0.9
        let lots = [20.0, 30.0, 50.0, 100.0, 150.0, 200.0];
        let runs = barbell_exit_runs(100.0, &lots, Side::Long, 2.5, 0.9);
        assert_eq!(runs.front, vec![20.0, 30.0]);
        assert_eq!(runs.back, vec![200.0, 150.0]);
    }

    #[test]
    fn test_short_barbell_runs() {
        // price 100: lots at 50,80 have ratio < 0.9; lots at 300 has ratio > 2.5
        let lots = [50.0, 80.0, 95.0, 300.0];
        let runs = barbell_exit_runs(100.0, &lots, Side::Short, 2.5, 0.9);
        assert_eq!(runs.front, vec![50.0, 80.0]);
        assert_eq!(runs.back, vec![300.0]);
    }

    #[test]
    fn test_front_run_is_not_a_filter() {
        // 10 passes, 60 fails, 12 would pass but sits after the failure
        let runs = barbell_exit_runs(100.0, &[10.0, 60.0, 12.0], Side::Long, 2.5, 0.0);
        assert_eq!(runs.front, vec![10.0]);
    }

    #[test]
    fn test_trailing_mean() {
        assert_eq!(trailing_mean(&[1.0, 2.0], 3), None);
        assert_eq!(trailing_mean(&[1.0, 2.0], 0), None);
        assert!((trailing_mean(&[1.0, 2.0, 3.0, 6.0], 3).unwrap() - 11.0 / 3.0).abs() < 1e-9);
    }
}

use std::time::Duration;

/// Wall-clock minutes rounded to one decimal place, as printed in progress
/// and summary lines.
pub fn elapsed_minutes(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() / 60.0 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(elapsed_minutes(Duration::ZERO), 0.0);
        assert_eq!(elapsed_minutes(Duration::from_secs(2)), 0.0);
        assert_eq!(elapsed_minutes(Duration::from_secs(4)), 0.1);
        assert_eq!(elapsed_minutes(Duration::from_secs(90)), 1.5);
        assert_eq!(elapsed_minutes(Duration::from_secs(125)), 2.1);
        assert_eq!(elapsed_minutes(Duration::from_secs(3600)), 60.0);
    }
}

//! Conversions between annual rates and daily probabilities under the
//! exponential-decay assumption. These are the unit primitives the whole
//! rate algebra is written in: artifact inputs are annual rates, the
//! compartmental inversion happens on daily probabilities, and the
//! resulting transition rates are annualized again for the host.

pub const YEAR_DURATION: f64 = 365.25;

/// `1 - exp(-rate / 365.25)`. Defined for `rate >= 0`; the result is in
/// `[0, 1)`.
#[must_use]
pub fn annual_rate_to_daily_probability(rate: f64) -> f64 {
    1.0 - (-rate / YEAR_DURATION).exp()
}

/// `-ln(1 - p) * 365.25`. Defined for `p` in `[0, 1)`; a probability of
/// exactly 1 yields infinity, which callers must guard against.
#[must_use]
pub fn daily_probability_to_annual_rate(probability: f64) -> f64 {
    -(1.0 - probability).ln() * YEAR_DURATION
}

/// The probability of at least one event in a window of `days`, given an
/// annual `rate`.
#[must_use]
pub fn rate_to_probability(rate: f64, days: f64) -> f64 {
    1.0 - (-rate * days / YEAR_DURATION).exp()
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn round_trip_recovers_rate() {
        for rate in [0.0, 1e-6, 0.01, 0.3, 1.0, 2.5, 10.0, 100.0] {
            let recovered = daily_probability_to_annual_rate(annual_rate_to_daily_probability(rate));
            assert_approx_eq!(recovered, rate, 1e-9 * rate.max(1.0));
        }
    }

    #[test]
    fn zero_rate_zero_probability() {
        assert_eq!(annual_rate_to_daily_probability(0.0), 0.0);
        assert_eq!(daily_probability_to_annual_rate(0.0), 0.0);
    }

    #[test]
    fn probability_stays_below_one() {
        let p = annual_rate_to_daily_probability(1e6);
        assert!(p < 1.0 && p > 0.999);
    }

    #[test]
    fn certain_probability_is_unbounded() {
        // p = 1 has no finite rate; callers must guard before converting.
        assert!(daily_probability_to_annual_rate(1.0).is_infinite());
    }

    #[test]
    fn one_day_window_matches_daily_probability() {
        for rate in [0.05, 0.4, 3.0] {
            assert_approx_eq!(
                rate_to_probability(rate, 1.0),
                annual_rate_to_daily_probability(rate),
                1e-12
            );
        }
    }
}

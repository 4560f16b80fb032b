use std::f64::consts::PI;

/// Map a bounded periodic integer onto the unit circle.
///
/// A raw integer encoding would make month 12 and month 1 maximally distant;
/// the (sin, cos) pair keeps values near the period boundary numerically
/// close. Pure and total over `value` in `[0, period]`.
pub fn encode_cyclical(value: u32, period: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(value) / f64::from(period);
    (angle.sin(), angle.cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_month_lands_on_the_unit_circle() {
        for month in 1..=12 {
            let (sin, cos) = encode_cyclical(month, 12);
            assert!((sin * sin + cos * cos - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn encoding_closes_at_the_period_boundary() {
        let (sin_zero, cos_zero) = encode_cyclical(0, 12);
        let (sin_full, cos_full) = encode_cyclical(12, 12);
        assert!((sin_zero - sin_full).abs() < 1e-9);
        assert!((cos_zero - cos_full).abs() < 1e-9);
    }

    #[test]
    fn december_and_january_stay_close() {
        let (dec_sin, dec_cos) = encode_cyclical(12, 12);
        let (jan_sin, jan_cos) = encode_cyclical(1, 12);
        let (jun_sin, jun_cos) = encode_cyclical(6, 12);

        let boundary_gap = ((dec_sin - jan_sin).powi(2) + (dec_cos - jan_cos).powi(2)).sqrt();
        let far_gap = ((dec_sin - jun_sin).powi(2) + (dec_cos - jun_cos).powi(2)).sqrt();
        assert!(boundary_gap < far_gap);
    }
}

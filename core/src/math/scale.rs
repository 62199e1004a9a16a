pub struct ScaleHelper;

impl ScaleHelper {
    /// `(value / reference) * multiplier`, clamped to `[min, max]`. Never
    /// panics: with `min > max` the upper bound wins, and NaN bounds are
    /// ignored.
    pub fn scaled_clamp(value: f32, reference: f32, multiplier: f32, min: f32, max: f32) -> f32 {
        if reference <= 0.0 {
            return min;
        }
        ((value / reference) * multiplier).max(min).min(max)
    }

    pub fn approx_eq(lhs: f32, rhs: f32, tolerance: f32) -> bool {
        (lhs - rhs).abs() <= tolerance
    }
}

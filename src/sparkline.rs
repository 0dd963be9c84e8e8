//! Compact glyph rendering for short value series.

/// Glyph ramp, lowest to highest.
pub const SPARK_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `values` as one glyph per value, scaled between the series min and max.
///
/// Non-finite values render as the lowest glyph. A flat series (or one
/// without finite values) renders entirely as the lowest glyph.
#[must_use]
pub fn render_sparkline(values: &[f64]) -> String {
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = hi - lo;
    let top = (SPARK_GLYPHS.len() - 1) as f64;

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() || span.is_nan() || span <= 0.0 {
                return SPARK_GLYPHS[0];
            }
            let idx = (((v - lo) / span) * top).round() as usize;
            SPARK_GLYPHS[idx.min(SPARK_GLYPHS.len() - 1)]
        })
        .collect()
}

//! Statistical summaries: mean, standard deviation, median, quantiles.


/// Arithmetic mean, `None` for an empty input.
#[inline]
pub fn mean(values: impl IntoIterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
    (count > 0).then(|| (sum / count as f64) as f32)
}

/// Mean and population standard deviation in one pass (Welford).
pub fn mean_and_std(values: impl IntoIterator<Item = f32>) -> Option<(f32, f32)> {
    let mut count = 0usize;
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;
    for v in values {
        count += 1;
        let delta = v as f64 - mean;
        mean += delta / count as f64;
        m2 += delta * (v as f64 - mean);
    }
    if count == 0 {
        return None;
    }
    Some((mean as f32, (m2 / count as f64).sqrt() as f32))
}

/// Calculate the median of f32 values in-place.
///
/// Mutates the input buffer (partial sort via quickselect).
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, upper, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if len & 1 == 1 {
        upper
    } else {
        let lower = left_part.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (lower + upper) * 0.5
    }
}

/// Quantile `q ∈ [0, 1]` with linear interpolation between order statistics.
///
/// Mutates the input buffer.
pub fn quantile_f32_mut(data: &mut [f32], q: f32) -> f32 {
    debug_assert!(!data.is_empty());

    let pos = q.clamp(0.0, 1.0) * (data.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f32;

    let (_, lo_value, upper) = data.select_nth_unstable_by(lo, f32::total_cmp);
    let lo_value = *lo_value;
    if frac == 0.0 || upper.is_empty() {
        return lo_value;
    }
    let hi_value = upper.iter().copied().fold(f32::INFINITY, f32::min);
    lo_value + (hi_value - lo_value) * frac
}

/// Largest value, `None` for an empty input.
#[inline]
pub fn max(values: impl IntoIterator<Item = f32>) -> Option<f32> {
    values.into_iter().reduce(f32::max)
}

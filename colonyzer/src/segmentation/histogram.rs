//! Intensity histograms and the two-component model fitted to them.

use serde::Serialize;

/// Bins of every fitted histogram.
pub const BINS: usize = 256;
const MAX_EM_ITERATIONS: usize = 200;
const EM_TOLERANCE: f64 = 1e-7;
/// Components lighter than this are treated as a failed fit.
const MIN_COMPONENT_WEIGHT: f64 = 1e-3;

/// Fixed-width histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// `None` for an empty input.
    pub fn from_values(values: &[f32], bins: usize) -> Option<Self> {
        let (min, max) = values
            .iter()
            .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;

        let mut counts = vec![0u64; bins];
        let scale = if max > min { bins as f32 / (max - min) } else { 0.0 };
        for &v in values {
            let bin = (((v - min) * scale) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Some(Self { min, max, counts })
    }

    #[inline]
    pub fn bin_width(&self) -> f32 {
        (self.max - self.min) / self.counts.len() as f32
    }

    #[inline]
    pub fn bin_center(&self, bin: usize) -> f32 {
        self.min + (bin as f32 + 0.5) * self.bin_width()
    }

    /// Lower edge of a bin.
    #[inline]
    pub fn bin_edge(&self, bin: usize) -> f32 {
        self.min + bin as f32 * self.bin_width()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn centers(&self) -> Vec<f32> {
        (0..self.counts.len()).map(|b| self.bin_center(b)).collect()
    }
}

/// Otsu's split: the bin edge maximising between-class variance.
///
/// Bins below the returned index are the dark class.
pub fn otsu_split(hist: &Histogram) -> usize {
    let total = hist.total() as f64;
    let weighted_total: f64 = hist
        .counts
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut best = (1usize, f64::NEG_INFINITY);
    let mut dark_count = 0.0f64;
    let mut dark_sum = 0.0f64;
    for split in 1..hist.counts.len() {
        let c = hist.counts[split - 1] as f64;
        dark_count += c;
        dark_sum += (split - 1) as f64 * c;
        let light_count = total - dark_count;
        if dark_count == 0.0 || light_count == 0.0 {
            continue;
        }
        let dark_mean = dark_sum / dark_count;
        let light_mean = (weighted_total - dark_sum) / light_count;
        let between = dark_count * light_count * (dark_mean - light_mean).powi(2);
        if between > best.1 {
            best = (split, between);
        }
    }
    best.0
}

/// One Gaussian of the mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Component {
    pub weight: f64,
    pub mean: f64,
    pub sd: f64,
}

impl Component {
    fn weighted_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sd;
        self.weight * (-0.5 * z * z).exp() / (self.sd * (2.0 * std::f64::consts::PI).sqrt())
    }

    fn log_weighted_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sd;
        self.weight.ln() - self.sd.ln() - 0.5 * z * z
    }
}

/// Two-component Gaussian mixture: agar and colonies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixtureFit {
    pub background: Component,
    pub signal: Component,
    pub iterations: usize,
}

impl MixtureFit {
    /// Intensity between the two means where the weighted densities meet.
    pub fn crossover(&self) -> Option<f64> {
        let (lo, hi) = (self.background.mean, self.signal.mean);
        let f = |x: f64| {
            self.background.log_weighted_density(x) - self.signal.log_weighted_density(x)
        };
        let (mut a, mut b) = (lo, hi);
        if !(f(a) > 0.0 && f(b) < 0.0) {
            return None;
        }
        for _ in 0..64 {
            let mid = 0.5 * (a + b);
            if f(mid) > 0.0 {
                a = mid;
            } else {
                b = mid;
            }
        }
        Some(0.5 * (a + b))
    }
}

/// Fit the mixture by EM on histogram bins, starting from a split at bin
/// `split`. `None` when the fit degenerates.
pub fn fit_mixture(hist: &Histogram, split: usize) -> Option<MixtureFit> {
    let xs: Vec<f64> = hist.centers().into_iter().map(f64::from).collect();
    let ns: Vec<f64> = hist.counts.iter().map(|&c| c as f64).collect();
    let total: f64 = ns.iter().sum();
    let min_sd = (hist.bin_width() as f64 * 0.5).max(f64::EPSILON);

    let moments = |range: std::ops::Range<usize>| -> Option<Component> {
        let n: f64 = ns[range.clone()].iter().sum();
        if n <= 0.0 {
            return None;
        }
        let mean = range.clone().map(|i| xs[i] * ns[i]).sum::<f64>() / n;
        let var = range.map(|i| ns[i] * (xs[i] - mean).powi(2)).sum::<f64>() / n;
        Some(Component {
            weight: n / total,
            mean,
            sd: var.sqrt().max(min_sd),
        })
    };

    let mut background = moments(0..split)?;
    let mut signal = moments(split..xs.len())?;
    let mut previous = f64::NEG_INFINITY;
    let mut iterations = 0;

    while iterations < MAX_EM_ITERATIONS {
        iterations += 1;

        let mut acc = [[0.0f64; 3]; 2];
        let mut log_likelihood = 0.0;
        for (&x, &n) in xs.iter().zip(&ns) {
            if n == 0.0 {
                continue;
            }
            let pb = background.weighted_density(x);
            let ps = signal.weighted_density(x);
            let sum = pb + ps;
            if sum <= 0.0 {
                continue;
            }
            log_likelihood += n * sum.ln();
            for (k, p) in [pb, ps].into_iter().enumerate() {
                let r = n * p / sum;
                acc[k][0] += r;
                acc[k][1] += r * x;
                acc[k][2] += r * x * x;
            }
        }

        let update = |a: [f64; 3]| -> Option<Component> {
            if a[0] <= 0.0 {
                return None;
            }
            let mean = a[1] / a[0];
            let var = (a[2] / a[0] - mean * mean).max(0.0);
            Some(Component {
                weight: a[0] / total,
                mean,
                sd: var.sqrt().max(min_sd),
            })
        };
        background = update(acc[0])?;
        signal = update(acc[1])?;

        if (log_likelihood - previous).abs() <= EM_TOLERANCE * log_likelihood.abs() {
            break;
        }
        previous = log_likelihood;
    }

    if background.mean > signal.mean {
        std::mem::swap(&mut background, &mut signal);
    }
    let sane = [background, signal].iter().all(|c| {
        c.weight >= MIN_COMPONENT_WEIGHT && c.mean.is_finite() && c.sd.is_finite()
    });
    sane.then_some(MixtureFit {
        background,
        signal,
        iterations,
    })
}

/// Least-squares trend of a series, normalized to percent of its mean level
/// per bar so that slopes compare across price magnitudes.
#[derive(Debug, Clone, Copy)]
pub struct TrendSlope {
    pub period: usize,
}

impl TrendSlope {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Fit the last `period` entries of `series`, skipping `None`s.
    ///
    /// Returns 0 when the series is shorter than `period`, when fewer than
    /// two defined points remain, or when their mean is 0.
    pub fn compute(&self, series: &[Option<f64>]) -> f64 {
        if series.len() < self.period {
            return 0.0;
        }
        let ys: Vec<f64> = series[series.len() - self.period..]
            .iter()
            .flatten()
            .copied()
            .collect();
        if ys.len() < 2 {
            return 0.0;
        }

        let n = ys.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = ys.iter().sum::<f64>() / n;
        if y_mean == 0.0 {
            return 0.0;
        }

        let (num, den) = ys
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(num, den), (x, &y)| {
                let dx = x as f64 - x_mean;
                (num + dx * (y - y_mean), den + dx * dx)
            });

        num / den / y_mean * 100.0
    }
}

/// The low-to-high move inside a lookback window of closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swing {
    /// Index of the earliest minimum close within the window.
    pub low_index: usize,
    /// Index of the earliest maximum close at or after the low.
    pub high_index: usize,
    pub low: f64,
    pub high: f64,
}

impl Swing {
    /// Locate the swing in `closes`. `None` when fewer than two closes
    /// exist from the low onward.
    pub fn find(closes: &[f64]) -> Option<Swing> {
        let (low_index, low) = closes
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, c)| match best {
                Some((_, b)) if c >= b => best,
                _ => Some((i, c)),
            })?;

        if closes.len() - low_index < 2 {
            return None;
        }

        let (offset, high) = closes[low_index..]
            .iter()
            .copied()
            .enumerate()
            .fold((0, low), |(bi, b), (i, c)| if c > b { (i, c) } else { (bi, b) });

        Some(Swing {
            low_index,
            high_index: low_index + offset,
            low,
            high,
        })
    }

    /// `(high - low) / low * 100`, 0 for a zero low.
    pub fn move_pct(&self) -> f64 {
        if self.low == 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.low * 100.0
    }
}

/// Percentage move from the swing low to the subsequent swing high over the
/// trailing `lookback` closes (or all of them when fewer exist).
pub fn prior_move_pct(closes: &[f64], lookback: usize) -> f64 {
    let window = &closes[closes.len().saturating_sub(lookback)..];
    Swing::find(window).map(|s| s.move_pct()).unwrap_or(0.0)
}

//! Least-squares regression and correlation primitives.
//!
//! These back the momentum score and the residual diversification filter.
//! Degenerate inputs (too few points, zero variance in x) yield `None`; a
//! constant y series fits with slope 0 and r² 0.

/// Ordinary least-squares fit of y against x.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }
    if ss_xx == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };
    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Fit of y against its bar index (x = 0, 1, .., n-1).
pub fn linear_fit_indexed(y: &[f64]) -> Option<LinearFit> {
    if y.len() < 2 {
        return None;
    }
    let n = y.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = yi - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }
    if ss_xx == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };
    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Pearson correlation coefficient. `None` when either series is constant,
/// mirroring an undefined correlation; callers treat that as a failed
/// diversification check.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }
    if ss_xx == 0.0 || ss_yy == 0.0 {
        return None;
    }
    Some(ss_xy / (ss_xx * ss_yy).sqrt())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

//! One-Euro Filter: adaptive first-order low-pass used to smooth the
//! cursor classifier's pointer target.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy)]
pub struct OneEuroParams {
    pub min_cutoff: f64,
    pub beta: f64,
    pub derivative_cutoff: f64,
}

impl Default for OneEuroParams {
    fn default() -> Self {
        OneEuroParams {
            min_cutoff: 1.0,
            beta: 0.0,
            derivative_cutoff: 1.0,
        }
    }
}

fn alpha(cutoff: f64, freq: f64) -> f64 {
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau * freq)
}

fn low_pass(prev: Option<f64>, x: f64, a: f64) -> f64 {
    match prev {
        Some(p) => a * x + (1.0 - a) * p,
        None => x,
    }
}

/// One-dimensional One-Euro filter. `reset()` clears all internal state.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    params: OneEuroParams,
    nominal_freq: f64,
    x_prev: Option<f64>,
    dx_prev: Option<f64>,
    t_prev: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(params: OneEuroParams, nominal_freq: f64) -> Self {
        OneEuroFilter {
            params,
            nominal_freq,
            x_prev: None,
            dx_prev: None,
            t_prev: None,
        }
    }

    /// Filter a new sample at time `t` (seconds).
    pub fn filter(&mut self, x: f64, t: f64) -> f64 {
        let freq = match self.t_prev {
            Some(t_prev) if t > t_prev => 1.0 / (t - t_prev),
            _ => self.nominal_freq,
        };

        let dx = match self.x_prev {
            Some(x_prev) => (x - x_prev) * freq,
            None => 0.0,
        };
        let a_d = alpha(self.params.derivative_cutoff, freq);
        let dx_hat = low_pass(self.dx_prev, dx, a_d);

        let cutoff = self.params.min_cutoff + self.params.beta * dx_hat.abs();
        let a = alpha(cutoff, freq);
        let x_hat = low_pass(self.x_prev, x, a);

        self.x_prev = Some(x_hat);
        self.dx_prev = Some(dx_hat);
        self.t_prev = Some(t);

        x_hat
    }

    pub fn reset(&mut self) {
        self.x_prev = None;
        self.dx_prev = None;
        self.t_prev = None;
    }
}

/// 2-D variant: two independent 1-D filters sharing the same timestamp
/// per sample.
#[derive(Debug, Clone)]
pub struct OneEuroFilter2D {
    x: OneEuroFilter,
    y: OneEuroFilter,
}

impl OneEuroFilter2D {
    pub fn new(params: OneEuroParams, nominal_freq: f64) -> Self {
        OneEuroFilter2D {
            x: OneEuroFilter::new(params, nominal_freq),
            y: OneEuroFilter::new(params, nominal_freq),
        }
    }

    pub fn filter(&mut self, point: (f64, f64), t: f64) -> (f64, f64) {
        (self.x.filter(point.0, t), self.y.filter(point.1, t))
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}

//! The two stateful primitives: Euler stocks and first-order smoothers.
//!
//! Each owns one scalar state cell. A step first *stages* the flow computed from
//! the current step's values, and only once every node has been observed does the
//! clock call `advance`, so consumers always see the state carried into the step.

/// Common contract of the stateful primitives.
pub trait Stateful {
    /// Output for the current step: the state before advancing.
    fn value(&self) -> f64;
    /// Commits the staged flow: `state <- state + step_size * flow`.
    fn advance(&mut self, step_size: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stock {
    state: f64,
    flow: f64,
}

impl Stock {
    pub fn new(initial: f64) -> Self {
        Self { state: initial, flow: 0.0 }
    }

    /// Records the net rate for the step being observed.
    pub fn stage(&mut self, rate: f64) {
        self.flow = rate;
    }
}

impl Stateful for Stock {
    #[inline(always)]
    fn value(&self) -> f64 { self.state }

    fn advance(&mut self, step_size: f64) {
        self.state += step_size * self.flow;
        self.flow = 0.0;
    }
}

/// Exponential lag toward a target, integrated as a stock with rate `(target - state) / tau`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    stock: Stock,
}

impl Smoother {
    pub fn new(initial: f64) -> Self {
        Self { stock: Stock::new(initial) }
    }

    /// The adjustment rate toward `target`. `None` when `tau` is not a positive finite number.
    pub fn rate(&self, target: f64, tau: f64) -> Option<f64> {
        (tau.is_finite() && tau > 0.0).then(|| (target - self.stock.value()) / tau)
    }

    pub fn stage(&mut self, rate: f64) {
        self.stock.stage(rate);
    }
}

impl Stateful for Smoother {
    #[inline(always)]
    fn value(&self) -> f64 { self.stock.value() }

    fn advance(&mut self, step_size: f64) {
        self.stock.advance(step_size);
    }
}

/// Storage enum so the clock can keep both primitives in one dense column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Stock(Stock),
    Smoother(Smoother),
}

impl Primitive {
    pub fn stage(&mut self, rate: f64) {
        match self {
            Primitive::Stock(s) => s.stage(rate),
            Primitive::Smoother(s) => s.stage(rate),
        }
    }
}

impl Stateful for Primitive {
    #[inline(always)]
    fn value(&self) -> f64 {
        match self {
            Primitive::Stock(s) => s.value(),
            Primitive::Smoother(s) => s.value(),
        }
    }

    fn advance(&mut self, step_size: f64) {
        match self {
            Primitive::Stock(s) => s.advance(step_size),
            Primitive::Smoother(s) => s.advance(step_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_value_is_pre_advance_state() {
        let mut stock = Stock::new(10.0);
        stock.stage(2.0);
        assert_eq!(stock.value(), 10.0);
        stock.advance(0.5);
        assert_eq!(stock.value(), 11.0);
    }

    #[test]
    fn test_unstaged_advance_holds_value() {
        let mut stock = Stock::new(3.0);
        stock.stage(1.0);
        stock.advance(1.0);
        stock.advance(1.0);
        assert_eq!(stock.value(), 4.0);
    }

    #[test]
    fn test_smoother_rejects_non_positive_tau() {
        let s = Smoother::new(0.0);
        assert_eq!(s.rate(1.0, 0.0), None);
        assert_eq!(s.rate(1.0, -3.0), None);
        assert_eq!(s.rate(1.0, f64::NAN), None);
        assert_eq!(s.rate(1.0, 4.0), Some(0.25));
    }

    proptest! {
        #[test]
        fn stock_constant_rate_is_exact(
            v0 in -1.0e3f64..1.0e3,
            r in -50i32..50,
            n in 0usize..200,
            dt_exp in 0u32..4,
        ) {
            // Binary-exact step sizes keep the comparison free of rounding noise.
            let dt = 1.0 / f64::from(1u32 << dt_exp);
            let rate = f64::from(r);
            let v0 = v0.round();
            let mut stock = Stock::new(v0);
            for _ in 0..n {
                stock.stage(rate);
                stock.advance(dt);
            }
            prop_assert_eq!(stock.value(), v0 + n as f64 * dt * rate);
        }

        #[test]
        fn smoother_converges_without_overshoot(
            target in -100.0f64..100.0,
            start in -100.0f64..100.0,
            tau in 0.5f64..20.0,
            ratio in 0.01f64..1.0,
        ) {
            let dt = tau * ratio;
            let mut s = Smoother::new(start);
            let mut gap = (target - s.value()).abs();
            for _ in 0..2000 {
                let rate = s.rate(target, tau).unwrap();
                s.stage(rate);
                s.advance(dt);
                let next_gap = (target - s.value()).abs();
                prop_assert!(next_gap <= gap + 1e-9);
                // Never crosses the target.
                prop_assert!((s.value() - target) * (start - target) >= -1e-9);
                gap = next_gap;
            }
            prop_assert!(gap < 1e-3 * (1.0 + (target - start).abs()));
        }
    }
}

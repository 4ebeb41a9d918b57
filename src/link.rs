use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A monotonic map between the optimizer's unconstrained scale and a latent
/// variable's natural (reporting) scale.
///
/// Optimizers and samplers always work over the whole real line; boundedness
/// of the natural-scale value (positivity, unit interval, ...) is enforced by
/// the link, not by box constraints.
#[enum_dispatch]
pub trait LinkFunction: Clone + Debug {
    /// Map an unconstrained value to the natural scale.
    fn apply(&self, x: f64) -> f64;

    /// Map a natural-scale value back to the unconstrained scale.
    fn invert(&self, y: f64) -> f64;
}

/// Closed set of link functions used by latent-variable priors.
#[enum_dispatch(LinkFunction)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Link {
    Identity(IdentityLink),
    Exp(ExpLink),
    Logit(LogitLink),
    Tanh(TanhLink),
}

impl Link {
    pub fn identity() -> Self {
        IdentityLink {}.into()
    }

    pub fn exp() -> Self {
        ExpLink {}.into()
    }

    pub fn logit() -> Self {
        LogitLink {}.into()
    }

    pub fn tanh() -> Self {
        TanhLink {}.into()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct IdentityLink {}

impl LinkFunction for IdentityLink {
    fn apply(&self, x: f64) -> f64 {
        x
    }

    fn invert(&self, y: f64) -> f64 {
        y
    }
}

/// Exponential link: enforces positivity of the natural-scale value.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct ExpLink {}

impl LinkFunction for ExpLink {
    fn apply(&self, x: f64) -> f64 {
        x.exp()
    }

    fn invert(&self, y: f64) -> f64 {
        y.ln()
    }
}

/// Logistic link: maps onto the open unit interval.
///
/// The f64 logistic saturates to exactly 0 or 1 for |x| beyond roughly 37;
/// outputs are clipped back into the open interval so `invert` stays finite
/// for every value `apply` can produce.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct LogitLink {}

impl LinkFunction for LogitLink {
    fn apply(&self, x: f64) -> f64 {
        ((-x).exp() + 1.0)
            .recip()
            .clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
    }

    fn invert(&self, y: f64) -> f64 {
        let y = y.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        (y / (1.0 - y)).ln()
    }
}

/// Hyperbolic-tangent link: maps onto the open interval (-1, 1), clipped away
/// from the saturated endpoints like [`LogitLink`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct TanhLink {}

impl LinkFunction for TanhLink {
    fn apply(&self, x: f64) -> f64 {
        x.tanh()
            .clamp(-1.0 + f64::EPSILON, 1.0 - f64::EPSILON)
    }

    fn invert(&self, y: f64) -> f64 {
        let y = y.clamp(-1.0 + f64::EPSILON, 1.0 - f64::EPSILON);
        0.5 * ((1.0 + y) / (1.0 - y)).ln()
    }
}

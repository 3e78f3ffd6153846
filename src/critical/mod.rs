//! Susceptibility signal, spectrum, critical point and power-law exponents.

pub mod exponent;
pub mod spectrum;
pub mod susceptibility;

pub use exponent::*;
pub use spectrum::*;
pub use susceptibility::*;

pub mod denominator;
pub mod metrics;
pub mod wow;

pub use denominator::{build_denominator, usdc_supply_usd};
pub use metrics::{compute, supply_metrics};

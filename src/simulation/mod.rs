// Seeded price paths for dry runs without a broker connection
pub mod synthetic;

pub use synthetic::{MarketScenario, PriceWalk, SyntheticTickStream};

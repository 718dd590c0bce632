pub mod defillama;
pub mod dune;
pub mod http;

use std::future::Future;

use crate::error::Result;
use crate::schedule::ReportWindow;
pub(crate) use crate::types::number_of;
use crate::types::{SupplySnapshot, VolumeRow};

pub use defillama::DefiLlamaSource;
pub use dune::DuneSource;
pub use http::HttpClient;

/// Stablecoin supply per asset plus the market-wide total. Fetch or fail.
pub trait SupplySource {
    fn fetch_supply(&self) -> impl Future<Output = Result<SupplySnapshot>>;
}

/// 7-day transfer volume per symbol for a report window. Fetch or fail.
/// Column aliasing is resolved inside the implementation.
pub trait VolumeSource {
    fn fetch_volumes(&self, window: &ReportWindow) -> impl Future<Output = Result<Vec<VolumeRow>>>;
}

pub mod fetch;
pub mod probe;
pub mod robots;

pub use fetch::{FetchOptions, FetchedResponse, Fetcher};
pub use probe::{can_access_https, AsnInfo, HttpsProbe, NetworkProbe};
pub use robots::RobotsCache;

//! Data sources: offline geocoding, the postcode resolver, the address
//! directory and synthetic samples.

pub mod addresses;
pub mod geo;
pub mod postcodes;
pub mod sample;

pub use addresses::{AddressDirectory, AddressEntry, CsvAddressDirectory};
pub use postcodes::{CoordinateResolver, PostcodesIoClient, ResolvedLocation};
pub use sample::{SampleConfig, SampleData, SampleListing, generate_sample};

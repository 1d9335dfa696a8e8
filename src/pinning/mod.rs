//! Pinning-Service Abstraction and Regional Service: a narrow pin/verify/
//! unpin contract over several content-addressed storage backends, and a
//! region-scoped fan-out enforcing CID equality across replicas.

pub mod service;
pub mod regional;

pub use service::{
    PinOptions, PinOutcome, PinningBackend, PinningError, PinningService, PinningServiceFactory,
};
pub use regional::{RegionPinOutcome, RegionalService};

pub mod audit;
pub mod entanglements;
pub mod in_flight;
pub mod projector;

pub use audit::{find_duplicate_pairs, DuplicatePair};
pub use entanglements::{ActionOutcome, DeclinePolicy, Entanglements, Rejection};
pub use in_flight::{InFlight, InFlightTicket};
pub use projector::{classify, project, ConnectionIndex};

mod record;
mod stage;

pub use record::{CleaningPayload, DeliveryPayload, Payload, Record, StatusTransition};
pub use stage::{EntityKind, StageGraph, default_stages};

pub mod enums;
pub mod frequency;
pub mod log_entry;
pub mod patient;
pub mod protocol;

pub use enums::*;
pub use frequency::Frequency;
pub use log_entry::{LogPayload, ProtocolLogEntry, DRIP_SEQUENCE_LEN};
pub use patient::Patient;
pub use protocol::{DripCandidate, Protocol, ProtocolUpdate};

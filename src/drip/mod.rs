//! Weight-loss onboarding email sequence.

pub mod background;
pub mod catalog;
pub mod error;
pub mod sender;
pub mod sequencer;
pub mod types;

pub use background::{start_drip_ticker, DripTickHandle};
pub use catalog::{due_step, DripTemplate, DueStep, CATALOG};
pub use error::{DripError, StartError};
pub use sender::{CommunicationSender, HttpEmailSender, OutboundEmail, SendError, SendFuture, SendReceipt};
pub use sequencer::DripSequencer;
pub use types::*;

//! Message bus used by the fulfillment services to talk to each other.
//!
//! Producers append JSON payloads to named topics; each consumer group reads
//! every partition of its topics in order and commits an offset after each
//! message. The commit happens whether or not the handler succeeded, so a
//! failing handler drops the message instead of retrying it.

pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod producer;

pub use error::{BusError, Result};
pub use handler::MessageHandler;
pub use memory::{ConsumerHandle, InMemoryBus};
pub use message::Message;
pub use producer::{Producer, ProducerExt};

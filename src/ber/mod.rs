pub mod dispatch;
pub mod engine;
pub mod length;
pub mod tag;
pub mod writer;

pub use dispatch::{DispatchTree, Segment};
pub use engine::{BerEngine, BerVisitor, EngineLimits, Progress, Visit};
pub use length::BerLength;
pub use tag::{TagClass, TagId};
pub use writer::BerWriter;

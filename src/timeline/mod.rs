//! Append-only, time-indexed datagram store.

pub mod datagram;
pub mod index;
pub mod reader;
pub mod writer;

pub use datagram::{Datagram, rescale_duration};
pub use index::{IndexEntry, TimeIndex};
pub use reader::TimelineReader;
pub use writer::{TimelineSummary, TimelineWriter};

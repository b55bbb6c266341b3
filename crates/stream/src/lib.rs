pub mod buffer;
pub mod job;
pub mod reader;
pub mod ticker;

pub use buffer::LineBuffer;
pub use job::{JobLines, StreamJob};
pub use reader::{spawn_reader, LineConsumer, NullConsumer, ReaderHandle, StreamOutcome};
pub use ticker::{TickControl, Ticker};

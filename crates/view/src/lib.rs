pub mod command;
pub mod registry;
pub mod sink;
pub mod view;

pub use command::{
    git_diff_plain_spec, git_diff_spec, git_log_plain_spec, git_log_spec, CommandSpec,
};
pub use registry::{PanelRegistry, PanelView};
pub use sink::{MemorySink, Sink, SinkCall, StdoutSink};
pub use view::{render_row, RawCommandView, SinkFactory, TreeCommandView};

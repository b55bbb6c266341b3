pub mod error;
pub mod flatten;
pub mod locate;
pub mod model;
pub mod record;
pub mod tree;

pub use error::{ModelError, Result};
pub use flatten::{RowKind, RowMeta, Splice};
pub use locate::Located;
pub use model::{CommitGroup, TreeModel, SENTINEL_PARENT};
pub use record::{ChangeStatus, FileRecord, GitLine};
pub use tree::{FoldState, NodeId, Tree};

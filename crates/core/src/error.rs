#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("row {0} out of bounds")]
    RowOutOfBounds(usize),

    #[error("group {0} out of bounds")]
    GroupOutOfBounds(usize),

    #[error("row {0} is not a directory")]
    NotADirectory(usize),

    #[error("path not tracked: {0}")]
    NotTracked(String),

    #[error("structure invariant violated: {0}")]
    StructureInvariant(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

//! Path lookup inside the flat projection, opening closed ancestors on the
//! way down.

use std::cmp::Ordering;

use crate::error::{ModelError, Result};
use crate::flatten::{RowMeta, Splice};
use crate::model::CommitGroup;
use crate::tree::FoldState;

/// A successful lookup: the row index, plus every splice performed while
/// auto-expanding closed ancestors (the view mirrors them onto its sink).
#[derive(Debug)]
pub struct Located {
    pub index: usize,
    pub splices: Vec<Splice>,
}

/// Three-way comparison of a row against a target file path. An ancestor
/// directory orders before everything it contains, so the projection's
/// path ordering stays consistent with the search.
fn cmp_row(row: &RowMeta, target: &str) -> Ordering {
    if row.path == target {
        return Ordering::Equal;
    }
    if row.is_dir() && target.starts_with(&row.path) {
        return Ordering::Less;
    }
    row.path.as_str().cmp(target)
}

impl CommitGroup {
    /// Find the row showing `path`, expanding closed ancestor directories
    /// non-recursively until it becomes visible.
    ///
    /// A path that was never streamed into this group fails with
    /// [`ModelError::NotTracked`]; a tracked path that cannot be reached
    /// indicates corrupted bookkeeping and fails with
    /// [`ModelError::StructureInvariant`] without further mutation.
    pub fn locate(&mut self, path: &str) -> Result<Located> {
        if !self.is_tracked(path) {
            return Err(ModelError::NotTracked(path.to_string()));
        }

        let mut splices = Vec::new();
        let mut lo = 0usize;
        let mut hi = self.rows().len();

        loop {
            match self.rows()[lo..hi].binary_search_by(|row| cmp_row(row, path)) {
                Ok(offset) => {
                    return Ok(Located {
                        index: lo + offset,
                        splices,
                    });
                }
                Err(offset) => {
                    let insertion = lo + offset;
                    if insertion == 0 {
                        return Err(ModelError::StructureInvariant(format!(
                            "no ancestor row precedes {path}"
                        )));
                    }
                    let prev = insertion - 1;
                    let row = &self.rows()[prev];
                    let closed_ancestor = row
                        .dir_node()
                        .filter(|_| path.starts_with(&row.path))
                        .map(|node| self.tree().node(node).fold == FoldState::Closed)
                        .unwrap_or(false);
                    if !closed_ancestor {
                        return Err(ModelError::StructureInvariant(format!(
                            "tracked path {path} unreachable from row {prev}"
                        )));
                    }
                    // One fold level at a time; re-search only the rows the
                    // expansion just revealed.
                    let splice = self.expand(prev, false)?;
                    lo = splice.at;
                    hi = splice.at + splice.inserted;
                    splices.push(splice);
                }
            }
        }
    }

    /// Whether `path` names a file record streamed into this group.
    pub fn is_tracked(&self, path: &str) -> bool {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some(leaf) = components.pop() else {
            return false;
        };
        let Some(node) = self.tree().walk_dirs(&components) else {
            return false;
        };
        self.tree().node(node).find_file(leaf).is_some()
    }
}

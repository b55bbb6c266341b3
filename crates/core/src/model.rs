//! Incremental tree model: one [`CommitGroup`] per parent-commit key, each
//! owning its tree and the flat row projection the view renders.
//!
//! Record insertion is append-only for git's path-sorted output: every new
//! row lands at the end of the projection. The one exception is a chain
//! split (a merged singleton chain gaining a second entry mid-stream);
//! that is handled as an in-place splice and announced through the group's
//! trim watermark so the flush side can rewind its sink once.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::flatten::{dir_extent, subtree_rows, RowKind, RowMeta, Splice};
use crate::record::{classify, FileRecord, GitLine, ParentRecord};
use crate::tree::{FoldState, NodeId, Tree};

/// Parent key used for root commits and markerless diff streams.
pub const SENTINEL_PARENT: &str = "0000000";

pub struct CommitGroup {
    parent_key: String,
    tree: Tree,
    rows: Vec<RowMeta>,
    short_stat: Option<String>,
    num_stat: HashMap<String, String>,
    pending_trim: Option<usize>,
}

impl CommitGroup {
    fn new(parent_key: &str) -> Self {
        Self {
            parent_key: parent_key.to_string(),
            tree: Tree::new(),
            rows: Vec::new(),
            short_stat: None,
            num_stat: HashMap::new(),
            pending_trim: None,
        }
    }

    pub fn parent_key(&self) -> &str {
        &self.parent_key
    }

    pub fn rows(&self) -> &[RowMeta] {
        &self.rows
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn short_stat(&self) -> Option<&str> {
        self.short_stat.as_deref()
    }

    /// Numstat text for a (rename-resolved) path.
    pub fn stat_for(&self, path: &str) -> Option<&str> {
        self.num_stat.get(path).map(String::as_str)
    }

    /// Lowest row index whose already-flushed content was invalidated since
    /// the last flush, if any. Clears the watermark.
    pub fn take_trim(&mut self) -> Option<usize> {
        self.pending_trim.take()
    }

    pub fn is_row_open(&self, index: usize) -> Option<bool> {
        let node = self.rows.get(index)?.dir_node()?;
        Some(self.tree.node(node).fold == FoldState::Open)
    }

    // ── Incremental build ───────────────────────────────────────────────

    pub(crate) fn insert(&mut self, record: FileRecord, preopen_threshold: usize) {
        let path = record.display_path().to_string();
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.pop().is_none() {
            warn!(%path, "record with empty path skipped");
            return;
        }

        let mut node = self.tree.root();
        // Display level for children of `node`, and whether they render.
        let mut level = 0usize;
        let mut visible = true;
        let mut prefix = String::new();
        let mut i = 0usize;

        while i < components.len() {
            let Some(child) = self.tree.node(node).find_dir(components[i]) else {
                break;
            };
            // Step one display row: follow the merged chain from `child`
            // for as long as the incoming path agrees with it.
            let mut current = child;
            prefix.push_str(components[i]);
            prefix.push('/');
            i += 1;
            while let Some((only_name, only_node)) = self.tree.node(current).only_dir() {
                if i < components.len() && components[i] == only_name {
                    prefix.push_str(components[i]);
                    prefix.push('/');
                    current = only_node;
                    i += 1;
                } else {
                    break;
                }
            }
            visible = visible && self.tree.node(current).fold == FoldState::Open;
            node = current;
            level += 1;
        }

        if i < components.len() {
            let dirs: Vec<&str> = components[i..].to_vec();
            self.create_branch(node, &dirs, record, visible, level, &prefix, preopen_threshold);
        } else {
            self.insert_leaf(node, record, visible, level, &prefix);
        }
    }

    /// Grow a brand-new directory chain (plus its file) under `node`.
    #[allow(clippy::too_many_arguments)]
    fn create_branch(
        &mut self,
        node: NodeId,
        dirs: &[&str],
        record: FileRecord,
        visible: bool,
        level: usize,
        prefix: &str,
        preopen_threshold: usize,
    ) {
        if node != self.tree.root() && self.tree.node(node).is_chain_interior() {
            self.split_display(node, prefix);
        }

        let mut current = node;
        for (j, name) in dirs.iter().enumerate() {
            let terminal = j == dirs.len() - 1;
            // Only the chain terminal takes the preopen decision; interior
            // segments stay Open so a later split keeps what was visible.
            let fold = if terminal && self.rows.len() >= preopen_threshold {
                FoldState::Closed
            } else {
                FoldState::Open
            };
            current = self.tree.add_dir(current, name, fold);
        }

        let file_visible = visible && self.tree.node(current).fold == FoldState::Open;
        self.tree.add_file(current, record.clone());

        if visible {
            let name = dirs.join("/");
            let dir_path = format!("{prefix}{name}/");
            self.insert_row(RowMeta {
                level,
                name,
                path: dir_path.clone(),
                kind: RowKind::Dir(current),
            });
            if file_visible {
                let leaf = record.file_name().to_string();
                let file_path = format!("{dir_path}{leaf}");
                self.insert_row(RowMeta {
                    level: level + 1,
                    name: leaf,
                    path: file_path,
                    kind: RowKind::File(record),
                });
            }
        }
    }

    /// Insert the record's file entry directly under `node`.
    fn insert_leaf(
        &mut self,
        node: NodeId,
        record: FileRecord,
        visible: bool,
        level: usize,
        prefix: &str,
    ) {
        if node != self.tree.root() && self.tree.node(node).is_chain_interior() {
            self.split_display(node, prefix);
        }

        let leaf = record.file_name().to_string();
        let path = format!("{prefix}{leaf}");

        if self.tree.node(node).find_file(&leaf).is_some() {
            // Same path twice in one group: keep the latest record.
            self.tree.replace_file(node, record.clone());
            if visible {
                if let Ok(index) = self
                    .rows
                    .binary_search_by(|row| row.path.as_str().cmp(&path))
                {
                    self.rows[index].kind = RowKind::File(record);
                    self.invalidate_from(index);
                }
            }
            return;
        }

        self.tree.add_file(node, record.clone());
        if visible {
            self.insert_row(RowMeta {
                level,
                name: leaf,
                path,
                kind: RowKind::File(record),
            });
        }
    }

    /// Insert keeping the path ordering. Sorted input appends at the end;
    /// an out-of-order line degrades to a mid-list insert plus a trim.
    fn insert_row(&mut self, row: RowMeta) {
        let at = self
            .rows
            .partition_point(|r| r.path.as_str() < row.path.as_str());
        if at < self.rows.len() {
            self.invalidate_from(at);
        }
        self.rows.insert(at, row);
    }

    /// A chain-interior node is about to gain a second entry: cut the
    /// merged row that displays through it at the node, re-rooting the
    /// remainder of the chain one level deeper.
    fn split_display(&mut self, node: NodeId, node_path: &str) {
        let at = self.rows.partition_point(|r| r.path.as_str() < node_path);
        if at >= self.rows.len() || !self.rows[at].path.starts_with(node_path) {
            // Hidden behind a closed ancestor; nothing is rendered here.
            return;
        }
        let old = self.rows[at].clone();
        let tail_rel = &old.path[node_path.len()..];
        let tail_segments = tail_rel.split('/').filter(|s| !s.is_empty()).count();
        let segments: Vec<&str> = old.name.split('/').collect();
        if !old.is_dir() || tail_segments == 0 || tail_segments >= segments.len() {
            warn!(path = %old.path, "chain split bookkeeping out of sync");
            return;
        }
        let head_name = segments[..segments.len() - tail_segments].join("/");
        let tail_name = segments[segments.len() - tail_segments..].join("/");

        // Everything under the old merged row shifts one level deeper.
        let extent = dir_extent(&self.rows, at);
        for row in &mut self.rows[at + 1..at + 1 + extent] {
            row.level += 1;
        }

        let head_row = RowMeta {
            level: old.level,
            name: head_name,
            path: node_path.to_string(),
            kind: RowKind::Dir(node),
        };
        let tail_row = RowMeta {
            level: old.level + 1,
            name: tail_name,
            path: old.path.clone(),
            kind: old.kind.clone(),
        };
        self.rows.splice(at..at + 1, [head_row, tail_row]);
        self.invalidate_from(at);
    }

    fn invalidate_from(&mut self, index: usize) {
        self.pending_trim = Some(self.pending_trim.map_or(index, |t| t.min(index)));
    }

    // ── Fold operations ─────────────────────────────────────────────────

    /// Open the directory row at `index`, splicing its subtree in right
    /// after it. With `recursive` every descendant directory is forced
    /// open (an already-open row is regenerated).
    pub fn expand(&mut self, index: usize, recursive: bool) -> Result<Splice> {
        let row = self
            .rows
            .get(index)
            .ok_or(ModelError::RowOutOfBounds(index))?;
        let Some(terminal) = row.dir_node() else {
            return Err(ModelError::NotADirectory(index));
        };
        let (level, path) = (row.level, row.path.clone());

        let open = self.tree.node(terminal).fold == FoldState::Open;
        if open && !recursive {
            return Ok(Splice::none(index + 1));
        }
        let removed = if open {
            let extent = dir_extent(&self.rows, index);
            self.rows.drain(index + 1..index + 1 + extent);
            extent
        } else {
            0
        };

        self.tree.node_mut(terminal).fold = FoldState::Open;
        let sub = subtree_rows(&mut self.tree, terminal, &path, level + 1, recursive);
        let inserted = sub.len();
        self.rows.splice(index + 1..index + 1, sub);
        Ok(Splice {
            at: index + 1,
            removed,
            inserted,
        })
    }

    /// Close the directory row at `index`, removing its contiguous
    /// descendant range.
    pub fn collapse(&mut self, index: usize) -> Result<Splice> {
        let row = self
            .rows
            .get(index)
            .ok_or(ModelError::RowOutOfBounds(index))?;
        let Some(terminal) = row.dir_node() else {
            return Err(ModelError::NotADirectory(index));
        };
        if self.tree.node(terminal).fold == FoldState::Closed {
            return Ok(Splice::none(index + 1));
        }
        let removed = dir_extent(&self.rows, index);
        self.rows.drain(index + 1..index + 1 + removed);
        self.tree.node_mut(terminal).fold = FoldState::Closed;
        Ok(Splice {
            at: index + 1,
            removed,
            inserted: 0,
        })
    }

    /// Toggle the fold state of the directory row at `index`.
    pub fn expand_or_collapse(&mut self, index: usize) -> Result<Splice> {
        match self.is_row_open(index) {
            Some(true) => self.collapse(index),
            Some(false) => self.expand(index, false),
            None if index >= self.rows.len() => Err(ModelError::RowOutOfBounds(index)),
            None => Err(ModelError::NotADirectory(index)),
        }
    }
}

pub struct TreeModel {
    preopen_threshold: usize,
    groups: Vec<CommitGroup>,
    index_by_key: HashMap<String, usize>,
    /// Group indices the current marker's records fan out to, in order.
    current_parents: Vec<usize>,
}

impl TreeModel {
    pub fn new(preopen_threshold: usize) -> Self {
        Self {
            preopen_threshold,
            groups: Vec::new(),
            index_by_key: HashMap::new(),
            current_parents: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[CommitGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&CommitGroup> {
        self.groups.get(index)
    }

    pub fn group_mut(&mut self, index: usize) -> Option<&mut CommitGroup> {
        self.groups.get_mut(index)
    }

    pub fn groups_mut(&mut self) -> &mut [CommitGroup] {
        &mut self.groups
    }

    /// Consume one raw stream line, updating whichever groups it touches.
    pub fn feed_line(&mut self, line: &str) {
        match classify(line) {
            Some(GitLine::Marker { commit, parents }) => self.begin_commit(&commit, parents),
            Some(GitLine::Records(records)) => {
                for parent_record in records {
                    self.insert_record(parent_record);
                }
            }
            Some(GitLine::NumStat {
                added,
                deleted,
                path,
            }) => {
                self.ensure_current();
                let text = if added == "-" {
                    "binary".to_string()
                } else {
                    format!("+{added} -{deleted}")
                };
                let targets = self.current_parents.clone();
                for index in targets {
                    self.groups[index].num_stat.insert(path.clone(), text.clone());
                }
            }
            Some(GitLine::ShortStat(text)) => {
                self.ensure_current();
                let targets = self.current_parents.clone();
                for index in targets {
                    self.groups[index].short_stat = Some(text.clone());
                }
            }
            Some(GitLine::Blank) => {}
            None => warn!(line, "skipping unrecognized stream line"),
        }
    }

    fn begin_commit(&mut self, commit: &str, parents: Vec<String>) {
        debug!(commit, parent_count = parents.len(), "commit marker");
        let keys = if parents.is_empty() {
            vec![SENTINEL_PARENT.to_string()]
        } else {
            parents
        };
        self.current_parents = keys.iter().map(|key| self.ensure_group(key)).collect();
    }

    fn insert_record(&mut self, parent_record: ParentRecord) {
        self.ensure_current();
        let slot = if parent_record.parent_index < self.current_parents.len() {
            parent_record.parent_index
        } else {
            warn!(
                parent = parent_record.parent_index,
                known = self.current_parents.len(),
                "record names more parents than the marker; using the first"
            );
            0
        };
        let group = self.current_parents[slot];
        self.groups[group].insert(parent_record.record, self.preopen_threshold);
    }

    fn ensure_current(&mut self) {
        if self.current_parents.is_empty() {
            let index = self.ensure_group(SENTINEL_PARENT);
            self.current_parents.push(index);
        }
    }

    fn ensure_group(&mut self, key: &str) -> usize {
        if let Some(&index) = self.index_by_key.get(key) {
            return index;
        }
        let index = self.groups.len();
        self.groups.push(CommitGroup::new(key));
        self.index_by_key.insert(key.to_string(), index);
        index
    }
}

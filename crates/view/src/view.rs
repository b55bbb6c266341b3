//! The two concrete view kinds over a streaming command: a raw line view
//! that mirrors the stream as-is, and the collapsible tree view.
//!
//! Both implement the same produced surface: a buffer identity, a source,
//! a `write_buffer_tick` driven by the ticker, and `cleanup`. Everything a
//! view shares with the background reader sits behind one lock per view;
//! tick and fold/locate handlers take that lock, the raw flush path needs
//! none (the line buffer is append-only with an atomic length).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use livediff_core::{ModelError, RowKind, RowMeta, Splice, TreeModel};
use livediff_stream::{
    spawn_reader, LineBuffer, LineConsumer, NullConsumer, ReaderHandle, StreamJob, TickControl,
    Ticker,
};
use tracing::{debug, error};

use crate::command::CommandSpec;
use crate::registry::{PanelRegistry, PanelView};
use crate::sink::Sink;

/// Makes one sink per commit group, keyed by the group's parent key.
pub type SinkFactory = Box<dyn FnMut(&str) -> Box<dyn Sink> + Send>;

/// Render one row the same way whether it arrived by streaming or by a
/// later expand; flushed text must never depend on how the row appeared.
pub fn render_row(row: &RowMeta) -> String {
    let indent = "  ".repeat(row.level);
    match &row.kind {
        RowKind::Dir(_) => format!("{indent}{}/", row.name),
        RowKind::File(record) => {
            format!("{indent}{}  {}", record.status.letter(), row.name)
        }
    }
}

// ── Raw streaming view ──────────────────────────────────────────────────

pub struct RawCommandView {
    identity: String,
    source: Option<String>,
    job: StreamJob,
    buffer: Arc<LineBuffer>,
    sink: Box<dyn Sink>,
    /// Buffer index up to which lines were already pushed to the sink.
    cursor: usize,
    done: bool,
    reader: Option<ReaderHandle>,
    ticker: Option<Ticker>,
}

impl RawCommandView {
    /// Wire the full pipeline: spawn the process, start the background
    /// reader, start the flush ticker, register with the panel registry.
    /// A view already registered under the same identity is torn down and
    /// replaced, matching what re-running the command should do.
    pub fn open(
        spec: &CommandSpec,
        sink: Box<dyn Sink>,
        tick_interval: Duration,
        registry: &Arc<PanelRegistry>,
    ) -> Arc<Mutex<RawCommandView>> {
        let (job, lines) = StreamJob::start(&spec.program, &spec.args);
        let buffer = Arc::new(LineBuffer::new());

        let view = Arc::new(Mutex::new(Self {
            identity: spec.buffer_identity(),
            source: spec.source.clone(),
            job,
            buffer: Arc::clone(&buffer),
            sink,
            cursor: 0,
            done: false,
            reader: None,
            ticker: None,
        }));

        // On natural completion the full content goes into the registry
        // cache so a later view over the same source can skip the rerun.
        let reader = {
            let registry = Arc::clone(registry);
            let buffer = Arc::clone(&buffer);
            let source = spec.source.clone();
            spawn_reader(lines, Arc::clone(&buffer), NullConsumer, move || {
                if let Some(source) = source {
                    registry.store_cached(&source, buffer.contents());
                }
            })
        };

        let ticker = {
            let view = Arc::clone(&view);
            Ticker::spawn(tick_interval, move || {
                view.lock().expect("raw view poisoned").write_buffer_tick()
            })
        };

        {
            let mut guard = view.lock().expect("raw view poisoned");
            guard.reader = Some(reader);
            guard.ticker = Some(ticker);
        }

        if let Some(displaced) = registry.register(PanelView::Raw(Arc::clone(&view))) {
            tokio::spawn(async move { displaced.cleanup().await });
        }
        view
    }

    pub fn buffer_identity(&self) -> &str {
        &self.identity
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn stream_failed(&self) -> bool {
        self.buffer.is_failed()
    }

    pub fn stream_error(&self) -> Option<String> {
        self.buffer.error()
    }

    /// Whether the completion bookkeeping has run (the ticker stopped).
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// One flush tick: push the unflushed buffer tail `[cursor, len)` to
    /// the sink, and run the completion bookkeeping exactly once when the
    /// reader is done and everything has been flushed.
    pub fn write_buffer_tick(&mut self) -> TickControl {
        if self.done {
            return TickControl::Stop;
        }
        if !self.sink.is_valid() {
            return TickControl::Stop;
        }
        let len = self.buffer.len();
        if len > self.cursor {
            self.sink.append_lines(self.buffer.range(self.cursor, len));
            self.cursor = len;
        }
        if self.buffer.is_finished() && self.cursor == self.buffer.len() {
            self.done = true;
            if let Some(stream_error) = self.buffer.error() {
                error!(identity = %self.identity, %stream_error, "stream ended with failure; partial content kept");
            } else {
                debug!(identity = %self.identity, lines = self.cursor, "stream complete");
            }
            return TickControl::Stop;
        }
        TickControl::Continue
    }

    pub(crate) fn teardown_parts(
        &mut self,
    ) -> (Option<Ticker>, Option<ReaderHandle>, StreamJob) {
        (self.ticker.take(), self.reader.take(), self.job.clone())
    }
}

// ── Tree view ───────────────────────────────────────────────────────────

struct GroupPane {
    sink: Box<dyn Sink>,
    /// Rows already pushed to this pane's sink.
    flushed: usize,
    footer_done: bool,
}

/// Feeds each streamed line into the shared tree model under its lock.
struct ModelFeed(Arc<Mutex<TreeModel>>);

impl LineConsumer for ModelFeed {
    fn on_line(&mut self, line: &str) {
        self.0.lock().expect("tree model poisoned").feed_line(line);
    }
}

pub struct TreeCommandView {
    identity: String,
    source: Option<String>,
    job: StreamJob,
    buffer: Arc<LineBuffer>,
    model: Arc<Mutex<TreeModel>>,
    panes: Vec<GroupPane>,
    sink_factory: SinkFactory,
    done: bool,
    reader: Option<ReaderHandle>,
    ticker: Option<Ticker>,
}

impl TreeCommandView {
    /// Like [`RawCommandView::open`], but the reader additionally parses
    /// every line into the tree model, and each commit group gets its own
    /// sink from `sink_factory`.
    pub fn open(
        spec: &CommandSpec,
        sink_factory: SinkFactory,
        preopen_threshold: usize,
        tick_interval: Duration,
        registry: &Arc<PanelRegistry>,
    ) -> Arc<Mutex<TreeCommandView>> {
        let (job, lines) = StreamJob::start(&spec.program, &spec.args);
        let buffer = Arc::new(LineBuffer::new());
        let model = Arc::new(Mutex::new(TreeModel::new(preopen_threshold)));

        let view = Arc::new(Mutex::new(Self {
            identity: spec.buffer_identity(),
            source: spec.source.clone(),
            job,
            buffer: Arc::clone(&buffer),
            model: Arc::clone(&model),
            panes: Vec::new(),
            sink_factory,
            done: false,
            reader: None,
            ticker: None,
        }));

        let reader = {
            let identity = spec.buffer_identity();
            spawn_reader(
                lines,
                Arc::clone(&buffer),
                ModelFeed(Arc::clone(&model)),
                move || debug!(%identity, "tree stream drained"),
            )
        };

        let ticker = {
            let view = Arc::clone(&view);
            Ticker::spawn(tick_interval, move || {
                view.lock().expect("tree view poisoned").write_buffer_tick()
            })
        };

        {
            let mut guard = view.lock().expect("tree view poisoned");
            guard.reader = Some(reader);
            guard.ticker = Some(ticker);
        }

        if let Some(displaced) = registry.register(PanelView::Tree(Arc::clone(&view))) {
            tokio::spawn(async move { displaced.cleanup().await });
        }
        view
    }

    pub fn buffer_identity(&self) -> &str {
        &self.identity
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn stream_failed(&self) -> bool {
        self.buffer.is_failed()
    }

    pub fn stream_error(&self) -> Option<String> {
        self.buffer.error()
    }

    /// Whether the completion bookkeeping has run (the ticker stopped).
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn model(&self) -> Arc<Mutex<TreeModel>> {
        Arc::clone(&self.model)
    }

    /// One flush tick over every group pane: honor pending trims from
    /// chain splits, then append the unflushed row tail.
    pub fn write_buffer_tick(&mut self) -> TickControl {
        if self.done {
            return TickControl::Stop;
        }
        let model = Arc::clone(&self.model);
        let mut model = model.lock().expect("tree model poisoned");
        self.ensure_panes(&model);

        if !self.panes.is_empty() && self.panes.iter().all(|pane| !pane.sink.is_valid()) {
            return TickControl::Stop;
        }

        for (index, pane) in self.panes.iter_mut().enumerate() {
            let Some(group) = model.group_mut(index) else {
                continue;
            };
            if !pane.sink.is_valid() {
                continue;
            }
            if let Some(trim) = group.take_trim() {
                if trim < pane.flushed {
                    pane.sink.delete_range(trim, pane.flushed - trim);
                    pane.flushed = trim;
                }
            }
            let rows = group.rows();
            if rows.len() > pane.flushed {
                let rendered: Vec<String> =
                    rows[pane.flushed..].iter().map(render_row).collect();
                pane.sink.append_lines(rendered);
                pane.flushed = rows.len();
            }
        }

        if self.buffer.is_finished() {
            self.finish(&model);
            return TickControl::Stop;
        }
        TickControl::Continue
    }

    /// Toggle the fold of the directory row at `row` in group
    /// `group_index`, mirroring the row splice onto the pane's sink and
    /// shifting its flush cursor by the same delta.
    pub fn expand_or_collapse_at(
        &mut self,
        group_index: usize,
        row: usize,
    ) -> Result<Splice, ModelError> {
        self.fold_op(group_index, |group| group.expand_or_collapse(row))
    }

    /// Force the directory row and all its descendants open.
    pub fn expand_recursive(
        &mut self,
        group_index: usize,
        row: usize,
    ) -> Result<Splice, ModelError> {
        self.fold_op(group_index, |group| group.expand(row, true))
    }

    fn fold_op(
        &mut self,
        group_index: usize,
        op: impl FnOnce(&mut livediff_core::CommitGroup) -> Result<Splice, ModelError>,
    ) -> Result<Splice, ModelError> {
        let model = Arc::clone(&self.model);
        let mut model = model.lock().expect("tree model poisoned");
        self.ensure_panes(&model);
        let group = model
            .group_mut(group_index)
            .ok_or(ModelError::GroupOutOfBounds(group_index))?;
        let splice = op(group)?;
        let rendered: Vec<String> = group.rows()[splice.at..splice.at + splice.inserted]
            .iter()
            .map(render_row)
            .collect();
        mirror_splice(&mut self.panes[group_index], splice, rendered);
        Ok(splice)
    }

    /// Find the row showing `path`, opening closed ancestors as needed.
    /// Distinguishes "hidden but present" (expanded and found) from "never
    /// streamed" ([`ModelError::NotTracked`]).
    pub fn locate(&mut self, group_index: usize, path: &str) -> Result<usize, ModelError> {
        let model = Arc::clone(&self.model);
        let mut model = model.lock().expect("tree model poisoned");
        self.ensure_panes(&model);
        let group = model
            .group_mut(group_index)
            .ok_or(ModelError::GroupOutOfBounds(group_index))?;
        let located = group.locate(path)?;

        // Auto-expansion may have spliced several nested ranges; rewind the
        // sink to the outermost one and re-emit everything from there.
        if let Some(first) = located.splices.first().map(|splice| splice.at) {
            let pane = &mut self.panes[group_index];
            if first < pane.flushed {
                pane.sink.delete_range(first, pane.flushed - first);
                pane.flushed = first;
            }
            let rendered: Vec<String> = group.rows()[pane.flushed..]
                .iter()
                .map(render_row)
                .collect();
            pane.sink.insert_lines(pane.flushed, rendered);
            pane.flushed = group.rows().len();
        }
        Ok(located.index)
    }

    fn ensure_panes(&mut self, model: &TreeModel) {
        for index in self.panes.len()..model.groups().len() {
            let key = model.groups()[index].parent_key().to_string();
            self.panes.push(GroupPane {
                sink: (self.sink_factory)(&key),
                flushed: 0,
                footer_done: false,
            });
        }
    }

    fn finish(&mut self, model: &TreeModel) {
        self.done = true;
        if let Some(stream_error) = self.buffer.error() {
            error!(identity = %self.identity, %stream_error, "stream ended with failure; partial tree kept");
            return;
        }
        for (index, pane) in self.panes.iter_mut().enumerate() {
            if pane.footer_done || !pane.sink.is_valid() {
                continue;
            }
            if let Some(stat) = model.group(index).and_then(|group| group.short_stat()) {
                pane.sink.append_lines(vec![stat.to_string()]);
            }
            pane.footer_done = true;
        }
        debug!(identity = %self.identity, "tree stream complete");
    }

    pub(crate) fn teardown_parts(
        &mut self,
    ) -> (Option<Ticker>, Option<ReaderHandle>, StreamJob) {
        (self.ticker.take(), self.reader.take(), self.job.clone())
    }
}

/// Apply a fold splice to the pane: delete the removed range, insert the
/// replacement lines, and move the flush cursor by the same delta so the
/// next tick neither re-flushes nor skips rows.
fn mirror_splice(pane: &mut GroupPane, splice: Splice, rendered: Vec<String>) {
    if !pane.sink.is_valid() {
        return;
    }
    if splice.removed > 0 && splice.at < pane.flushed {
        let overlap = (pane.flushed - splice.at).min(splice.removed);
        pane.sink.delete_range(splice.at, overlap);
        pane.flushed -= overlap;
    }
    if splice.inserted > 0 && splice.at <= pane.flushed {
        pane.sink.insert_lines(splice.at, rendered);
        pane.flushed += splice.inserted;
    }
}

//! Registry of live views, keyed by buffer identity, with a completed
//! content cache keyed by logical source. Constructed once at the entry
//! point and passed down; there is no global instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::view::{RawCommandView, TreeCommandView};

/// A registered view of either kind.
#[derive(Clone)]
pub enum PanelView {
    Raw(Arc<Mutex<RawCommandView>>),
    Tree(Arc<Mutex<TreeCommandView>>),
}

impl PanelView {
    pub fn buffer_identity(&self) -> String {
        match self {
            PanelView::Raw(view) => view
                .lock()
                .expect("raw view poisoned")
                .buffer_identity()
                .to_string(),
            PanelView::Tree(view) => view
                .lock()
                .expect("tree view poisoned")
                .buffer_identity()
                .to_string(),
        }
    }

    pub fn source(&self) -> Option<String> {
        match self {
            PanelView::Raw(view) => view
                .lock()
                .expect("raw view poisoned")
                .source()
                .map(String::from),
            PanelView::Tree(view) => view
                .lock()
                .expect("tree view poisoned")
                .source()
                .map(String::from),
        }
    }

    /// Stop the ticker, signal the reader, kill the process, then give the
    /// reader a bounded window to wind down. Safe to call more than once.
    pub async fn cleanup(&self) {
        let (ticker, reader, job) = match self {
            PanelView::Raw(view) => view.lock().expect("raw view poisoned").teardown_parts(),
            PanelView::Tree(view) => view.lock().expect("tree view poisoned").teardown_parts(),
        };
        if let Some(ticker) = ticker {
            ticker.cancel();
        }
        if let Some(reader) = &reader {
            reader.stop();
        }
        job.kill().await;
        if let Some(reader) = reader {
            reader.join(Duration::from_secs(2)).await;
        }
    }
}

#[derive(Default)]
pub struct PanelRegistry {
    views: Mutex<HashMap<String, PanelView>>,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under its buffer identity. Returns the view it
    /// displaced, which the caller is expected to clean up.
    pub fn register(&self, view: PanelView) -> Option<PanelView> {
        let identity = view.buffer_identity();
        debug!(%identity, "registering view");
        self.views
            .lock()
            .expect("registry poisoned")
            .insert(identity, view)
    }

    pub fn deregister(&self, identity: &str) -> Option<PanelView> {
        self.views
            .lock()
            .expect("registry poisoned")
            .remove(identity)
    }

    pub fn get(&self, identity: &str) -> Option<PanelView> {
        self.views
            .lock()
            .expect("registry poisoned")
            .get(identity)
            .cloned()
    }

    pub fn view_count(&self) -> usize {
        self.views.lock().expect("registry poisoned").len()
    }

    /// Completed content for a source, if some finished view published it.
    pub fn cached(&self, source: &str) -> Option<Vec<String>> {
        self.cache
            .lock()
            .expect("registry poisoned")
            .get(source)
            .cloned()
    }

    pub fn store_cached(&self, source: &str, content: Vec<String>) {
        debug!(%source, lines = content.len(), "caching completed content");
        self.cache
            .lock()
            .expect("registry poisoned")
            .insert(source.to_string(), content);
    }

    /// Tear down every registered view.
    pub async fn cleanup_all(&self) {
        let views: Vec<PanelView> = {
            let mut map = self.views.lock().expect("registry poisoned");
            map.drain().map(|(_, view)| view).collect()
        };
        for view in views {
            view.cleanup().await;
        }
    }
}

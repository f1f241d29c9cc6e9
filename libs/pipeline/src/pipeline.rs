use crate::error::PipelineError;
use crate::guard::GuardResult;
use crate::strand::StrandHandle;
use crate::transform::{StartTransform, Transform};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PipelineNode<T> {
    pub transform: Arc<dyn Transform<T>>,
    pub next: RwLock<Vec<Arc<PipelineNode<T>>>>,
}

impl<T> PipelineNode<T> {
    fn leaf(transform: Arc<dyn Transform<T>>) -> Arc<Self> {
        Arc::new(PipelineNode {
            transform,
            next: RwLock::new(Vec::new()),
        })
    }
}

/// Record of a graph mutation, kept so the pipeline can rebuild identically
/// when a new device model arrives. Replay is idempotent: applying the same
/// recorded op again with `reapplied = true` is a no-op if the target is
/// already in the recorded shape.
enum RecordedOp<T> {
    SpliceBefore(String, Arc<dyn Transform<T>>),
    SpliceAfter(String, Arc<dyn Transform<T>>),
    FirstAfter(String, Arc<dyn Transform<T>>),
    LastAfter(String, Arc<dyn Transform<T>>),
    Replace(String, Arc<dyn Transform<T>>),
    Remove(String),
    Clear,
}

/// Builder + runtime for a rooted transform graph (C4/C5).
pub struct Pipeline<T> {
    start: Arc<PipelineNode<T>>,
    recorded: RwLock<Vec<RecordedOp<T>>>,
}

impl<T: Send + Sync + 'static> Pipeline<T> {
    pub fn new() -> Self {
        Pipeline {
            start: PipelineNode::leaf(Arc::new(StartTransform)),
            recorded: RwLock::new(Vec::new()),
        }
    }

    /// Entry point: runs the graph against one entity arriving at the head.
    pub fn process(&self, entity: T) -> Result<Option<T>, PipelineError>
    where
        T: Named,
    {
        forward(&self.start.next.read(), entity)
    }

    /// Re-enters the graph at the first node matching `name`, running its
    /// transform and forwarding the result to its children. Used by a
    /// transform that releases part of its output outside the value it
    /// returns from `apply` (a timer-deferred observation, say) so the
    /// released value still passes through the same downstream chain the
    /// synchronous path does, rather than skipping straight to delivery.
    pub fn run_at(&self, name: &str, entity: T) -> Result<Option<T>, PipelineError>
    where
        T: Named,
    {
        match self.find(name).into_iter().next() {
            Some((parent, idx)) => {
                let node = parent.next.read()[idx].clone();
                run(&node, entity)
            }
            None => Err(PipelineError::UnmatchedTransform {
                entity_name: entity.type_name().to_string(),
            }),
        }
    }

    pub fn find(&self, name: &str) -> Vec<(Arc<PipelineNode<T>>, usize)> {
        let mut out = Vec::new();
        find_rec(&self.start, name, &mut out);
        out
    }

    fn find_one(&self, name: &str) -> Option<(Arc<PipelineNode<T>>, usize)> {
        self.find(name).into_iter().next()
    }

    pub fn splice_before(&self, name: &str, transform: Arc<dyn Transform<T>>) {
        for (parent, idx) in self.find(name) {
            let target = parent.next.read()[idx].clone();
            let new_node = Arc::new(PipelineNode {
                transform: transform.clone(),
                next: RwLock::new(vec![target]),
            });
            parent.next.write()[idx] = new_node;
            debug!(transform = transform.name(), parent = ?name, "splice_before");
        }
        self.recorded
            .write()
            .push(RecordedOp::SpliceBefore(name.to_string(), transform));
    }

    pub fn splice_after(&self, name: &str, transform: Arc<dyn Transform<T>>) {
        for (parent, idx) in self.find(name) {
            let target = parent.next.read()[idx].clone();
            let old_next = std::mem::take(&mut *target.next.write());
            let new_node = Arc::new(PipelineNode {
                transform: transform.clone(),
                next: RwLock::new(old_next),
            });
            *target.next.write() = vec![new_node];
            debug!(transform = transform.name(), "splice_after");
        }
        self.recorded
            .write()
            .push(RecordedOp::SpliceAfter(name.to_string(), transform));
    }

    pub fn first_after(&self, name: &str, transform: Arc<dyn Transform<T>>) {
        for (parent, idx) in self.find(name) {
            let target = parent.next.read()[idx].clone();
            let new_node = PipelineNode::leaf(transform.clone());
            target.next.write().insert(0, new_node);
            debug!(transform = transform.name(), "first_after");
        }
        self.recorded
            .write()
            .push(RecordedOp::FirstAfter(name.to_string(), transform));
    }

    pub fn last_after(&self, name: &str, transform: Arc<dyn Transform<T>>) {
        for (parent, idx) in self.find(name) {
            let target = parent.next.read()[idx].clone();
            let new_node = PipelineNode::leaf(transform.clone());
            target.next.write().push(new_node);
            debug!(transform = transform.name(), "last_after");
        }
        self.recorded
            .write()
            .push(RecordedOp::LastAfter(name.to_string(), transform));
    }

    pub fn replace(&self, name: &str, transform: Arc<dyn Transform<T>>) {
        while let Some((parent, idx)) = self.find_one(name) {
            let old = parent.next.read()[idx].clone();
            let merged = old.next.read().clone();
            let new_node = Arc::new(PipelineNode {
                transform: transform.clone(),
                next: RwLock::new(merged),
            });
            parent.next.write()[idx] = new_node;
            debug!(transform = transform.name(), "replace");
        }
        self.recorded
            .write()
            .push(RecordedOp::Replace(name.to_string(), transform));
    }

    pub fn remove(&self, name: &str) {
        while let Some((parent, idx)) = self.find_one(name) {
            let old = parent.next.write().remove(idx);
            let merged = old.next.read().clone();
            parent.next.write().extend(merged);
            debug!(name, "remove");
        }
        self.recorded.write().push(RecordedOp::Remove(name.to_string()));
    }

    /// Unlinks every transform from the start. Depth-first so each
    /// transform's `next` is empty before it is dropped.
    pub fn clear(&self) {
        let mut count = 0;
        clear_rec(&self.start, &mut count);
        info!(count, "pipeline cleared");
        self.recorded.write().push(RecordedOp::Clear);
    }

    pub fn start_transforms(&self, strand: &StrandHandle) {
        start_rec(&self.start, strand);
    }

    pub fn stop_transforms(&self) {
        stop_rec(&self.start);
    }
}

impl<T: Send + Sync + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal trait so `UnmatchedTransform` errors can name the offending
/// entity; concrete frame types implement this with their discriminator.
pub trait Named {
    fn type_name(&self) -> &'static str;
}

fn forward<T>(
    children: &[Arc<PipelineNode<T>>],
    entity: T,
) -> Result<Option<T>, PipelineError>
where
    T: Named,
{
    for child in children {
        match child.transform.guard().test(&entity) {
            GuardResult::Run => return run(child, entity),
            GuardResult::Skip => return forward(&child.next.read(), entity),
            GuardResult::Continue => continue,
        }
    }
    Err(PipelineError::UnmatchedTransform {
        entity_name: entity.type_name().to_string(),
    })
}

fn run<T>(node: &Arc<PipelineNode<T>>, entity: T) -> Result<Option<T>, PipelineError>
where
    T: Named,
{
    match node.transform.apply(entity) {
        None => Ok(None),
        Some(out) => forward(&node.next.read(), out),
    }
}

fn find_rec<T>(node: &Arc<PipelineNode<T>>, name: &str, out: &mut Vec<(Arc<PipelineNode<T>>, usize)>) {
    let children = node.next.read();
    for (idx, child) in children.iter().enumerate() {
        if child.transform.name() == name {
            out.push((node.clone(), idx));
        }
        find_rec(child, name, out);
    }
}

fn clear_rec<T>(node: &Arc<PipelineNode<T>>, count: &mut usize) {
    let children: Vec<_> = std::mem::take(&mut *node.next.write());
    for child in &children {
        clear_rec(child, count);
        *count += 1;
    }
}

fn start_rec<T>(node: &Arc<PipelineNode<T>>, strand: &StrandHandle) {
    node.transform.start(strand);
    for child in node.next.read().iter() {
        start_rec(child, strand);
    }
}

fn stop_rec<T>(node: &Arc<PipelineNode<T>>) {
    node.transform.stop();
    for child in node.next.read().iter() {
        stop_rec(child);
    }
}

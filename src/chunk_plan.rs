use crate::{config::Config, dataset::ProjectIndex};
use serde::{Deserialize, Serialize};

/// Number of chunks a group of `len` records splits into at `size` per chunk.
pub fn chunk_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}

/// Consecutive, non-overlapping slices of `size` items in the group's order.
///
/// Holds no state beyond a cursor, so a fresh iterator at any offset
/// reproduces the same partition.
#[derive(Debug, Clone)]
pub struct Chunks<'a, T> {
    items: &'a [T],
    size: usize,
    next_index: usize,
}

pub fn chunks<T>(items: &[T], size: usize) -> Chunks<'_, T> {
    Chunks::starting_at(items, size, 0)
}

impl<'a, T> Chunks<'a, T> {
    pub fn starting_at(items: &'a [T], size: usize, chunk_offset: usize) -> Self {
        Self {
            items,
            size: size.max(1),
            next_index: chunk_offset,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total(&self) -> usize {
        chunk_count(self.items.len(), self.size)
    }

    /// Index of the chunk the next call to `next` yields.
    pub fn position(&self) -> usize {
        self.next_index
    }
}

impl<'a, T> Iterator for Chunks<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_index.checked_mul(self.size)?;
        if start >= self.items.len() {
            return None;
        }
        let end = (start + self.size).min(self.items.len());
        self.next_index += 1;
        Some(&self.items[start..end])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total().saturating_sub(self.next_index);
        (left, Some(left))
    }
}

impl<T> ExactSizeIterator for Chunks<'_, T> {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub chunk_mode: String,
    pub total_tasks: usize,
    pub total_model_calls: usize,
    pub groups: Vec<GroupPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPlan {
    pub project: String,
    pub component: Option<String>,
    pub records: usize,
    pub chunk_size: usize,
    pub chunk_sizes: Vec<usize>,
}

impl ChunkPlan {
    /// Preview of every summarization task the pipeline would run.
    pub fn from_index(cfg: &Config, index: &ProjectIndex<'_>) -> ChunkPlan {
        let mut groups = Vec::new();
        for project in &index.projects {
            groups.push(GroupPlan::new(cfg, &project.name, None, project.group.len()));
            for comp in &project.components {
                groups.push(GroupPlan::new(
                    cfg,
                    &project.name,
                    Some(&comp.name),
                    comp.group.len(),
                ));
            }
        }

        ChunkPlan {
            chunk_mode: cfg.chunking.mode.clone(),
            total_tasks: groups.len(),
            total_model_calls: groups.iter().map(|g| g.chunk_sizes.len()).sum(),
            groups,
        }
    }
}

impl GroupPlan {
    fn new(cfg: &Config, project: &str, component: Option<&str>, records: usize) -> Self {
        let size = cfg.chunking.effective_size(records);
        let mut chunk_sizes = Vec::with_capacity(chunk_count(records, size));
        let mut left = records;
        while left > 0 {
            let n = left.min(size);
            chunk_sizes.push(n);
            left -= n;
        }
        GroupPlan {
            project: project.to_string(),
            component: component.map(str::to_string),
            records,
            chunk_size: size,
            chunk_sizes,
        }
    }
}

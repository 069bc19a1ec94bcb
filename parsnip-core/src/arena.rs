//! Slot arena holding the vertices of the tree under construction.
//!
//! Vertices reference each other by slot index, never by pointer, so the
//! graph can be rewired freely while the borrow checker sees only the arena.
//! Removed slots become tombstones and are recycled on insertion. Process
//! identity is separate from storage: every vertex carries a [`VertexId`]
//! drawn from an injectable allocator, which is what the distance matrix and
//! the memoised counters key on.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, SearchError};
use crate::mutation::MutationSet;
use crate::seq::Sequence;

/// Process-unique vertex identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u32);

impl VertexId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Underlying numeric identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Monotone id source shared by everything that creates vertices.
///
/// Wraps to zero at `u32::MAX` like a plain counter; a single dataset never
/// holds enough live vertices for the wrap to collide.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator starting at the given id.
    #[must_use]
    pub const fn new(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// Hands out the next identifier.
    pub fn allocate(&self) -> VertexId {
        let id = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(if v == u32::MAX { 0 } else { v + 1 })
            })
            .unwrap_or(0);
        VertexId(id)
    }
}

/// Inference status of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Inferred sequence not observed in the input.
    Inferred,
    /// Observed input sequence.
    Observed,
    /// Inferred sequence identical to an observed one.
    InferredDuplicate,
}

/// A tree vertex. Links are slot indices managed through [`Arena`].
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Display name; inferred vertices get generated names.
    pub name: String,
    /// Process-unique identifier.
    pub id: VertexId,
    /// Working sequence.
    pub seq: Sequence,
    /// Original sequence stashed while the working one is masked.
    pub sec: Option<Sequence>,
    /// Inference status.
    pub status: Status,
    /// Whether the vertex carries an input taxon.
    pub original: bool,
    /// Sampling round the vertex was created in.
    pub time: u32,
    parent: Option<usize>,
    children: Vec<usize>,
    mutations: Option<MutationSet>,
}

impl Vertex {
    /// Creates an observed vertex for an input taxon.
    #[must_use]
    pub fn observed(name: String, id: VertexId, seq: Sequence) -> Self {
        Self {
            name,
            id,
            seq,
            sec: None,
            status: Status::Observed,
            original: true,
            time: 0,
            parent: None,
            children: Vec::new(),
            mutations: None,
        }
    }

    /// Creates an inferred intermediate vertex.
    #[must_use]
    pub fn inferred(id: VertexId, seq: Sequence, time: u32) -> Self {
        Self {
            name: format!("i{}", id.get()),
            id,
            seq,
            sec: None,
            status: Status::Inferred,
            original: false,
            time,
            parent: None,
            children: Vec::new(),
            mutations: None,
        }
    }

    /// Parent slot, if linked.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Child slots in insertion order.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Total number of incident edges.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.children.len() + usize::from(self.parent.is_some())
    }

    /// Mutation set on the incoming edge.
    #[must_use]
    pub fn mutations(&self) -> Option<&MutationSet> {
        self.mutations.as_ref()
    }

    /// Sequence to compare for duplicate detection: the stashed original
    /// when present, otherwise the working sequence.
    #[must_use]
    pub fn comparison_seq(&self) -> &Sequence {
        self.sec.as_ref().unwrap_or(&self.seq)
    }
}

/// Tombstoned vertex storage.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    slots: Vec<Option<Vertex>>,
    vacant: Vec<usize>,
}

impl Arena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    /// True when no vertices are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a vertex, recycling a tombstone when one exists.
    pub fn insert(&mut self, vertex: Vertex) -> usize {
        if let Some(slot) = self.vacant.pop() {
            if let Some(cell) = self.slots.get_mut(slot) {
                *cell = Some(vertex);
                return slot;
            }
        }
        self.slots.push(Some(vertex));
        self.slots.len() - 1
    }

    /// Immutable access to a live vertex.
    ///
    /// # Errors
    /// Returns [`SearchError::VacantSlot`] for tombstones and out-of-range
    /// slots.
    pub fn get(&self, slot: usize) -> Result<&Vertex> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or(SearchError::VacantSlot { slot })
    }

    /// Mutable access to a live vertex.
    ///
    /// # Errors
    /// Returns [`SearchError::VacantSlot`] for tombstones and out-of-range
    /// slots.
    pub fn get_mut(&mut self, slot: usize) -> Result<&mut Vertex> {
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(SearchError::VacantSlot { slot })
    }

    /// Removes a vertex, leaving a recyclable tombstone. Links must already
    /// have been dissolved by the caller.
    ///
    /// # Errors
    /// Returns [`SearchError::VacantSlot`] when the slot is not live.
    pub fn remove(&mut self, slot: usize) -> Result<Vertex> {
        let cell = self
            .slots
            .get_mut(slot)
            .ok_or(SearchError::VacantSlot { slot })?;
        let vertex = cell.take().ok_or(SearchError::VacantSlot { slot })?;
        self.vacant.push(slot);
        Ok(vertex)
    }

    /// Live slots with their vertices, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Vertex)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|vertex| (i, vertex)))
    }

    /// Live slot indices in slot order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|_| i))
    }

    /// Links `child` under `parent` with the mutation set of the edge.
    ///
    /// # Errors
    /// Returns [`SearchError::IncomingEdgeTaken`] when the child already has
    /// a parent, and [`SearchError::VacantSlot`] for dead slots.
    pub fn attach(&mut self, parent: usize, child: usize, mutations: MutationSet) -> Result<()> {
        let v = self.get(child)?;
        if v.parent.is_some() {
            return Err(SearchError::IncomingEdgeTaken { id: v.id.get() });
        }
        self.get_mut(parent)?.children.push(child);
        let v = self.get_mut(child)?;
        v.parent = Some(parent);
        v.mutations = Some(mutations);
        Ok(())
    }

    /// Dissolves the `parent` → `child` link.
    ///
    /// # Errors
    /// Returns [`SearchError::MissingChildLink`] when no such link exists,
    /// and [`SearchError::VacantSlot`] for dead slots.
    pub fn detach(&mut self, parent: usize, child: usize) -> Result<()> {
        let (parent_id, child_id) = (self.get(parent)?.id, self.get(child)?.id);
        let children = &mut self.get_mut(parent)?.children;
        let Some(pos) = children.iter().position(|&c| c == child) else {
            return Err(SearchError::MissingChildLink {
                parent: parent_id.get(),
                child: child_id.get(),
            });
        };
        children.swap_remove(pos);
        let v = self.get_mut(child)?;
        v.parent = None;
        v.mutations = None;
        Ok(())
    }

    /// Clears one vertex's links and edge data.
    ///
    /// # Errors
    /// Returns [`SearchError::VacantSlot`] when the slot is not live.
    pub fn deforest(&mut self, slot: usize) -> Result<()> {
        let v = self.get_mut(slot)?;
        v.parent = None;
        v.children.clear();
        v.mutations = None;
        Ok(())
    }

    /// Clears every live vertex's links, keeping the vertices.
    pub fn deforest_all(&mut self) {
        for cell in self.slots.iter_mut().flatten() {
            cell.parent = None;
            cell.children.clear();
            cell.mutations = None;
        }
    }
}

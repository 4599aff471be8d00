use std::io::Write;

use crate::alloc::Allocations;
use crate::clock::{Now, now};
use crate::config::ReportConfig;
use crate::demangle::display_name;
use crate::error::{Error, Result};
use crate::reduce::Collective;
use crate::report;
use crate::space::{NSPACES, Space};
use crate::tree::{CallTree, FrameKind, NodeId};

/// Process-wide profiling state: the call tree, the currently-open frame,
/// and the per-space allocation trackers.
///
/// The embedding callback layer owns exactly one `State` per process,
/// created in its `init` hook and consumed by [`State::finalize`] in its
/// `finalize` hook. Mutation is not synchronized internally; a
/// multi-threaded host must either serialize access or drive one `State`
/// per thread.
pub struct State {
    tree: CallTree,
    open: NodeId,
    current: [Allocations; NSPACES],
    high_water: [Allocations; NSPACES],
}

impl State {
    pub fn new() -> State {
        let mut tree = CallTree::new();
        tree.begin(NodeId::ROOT, now());
        State {
            tree,
            open: NodeId::ROOT,
            current: std::array::from_fn(|_| Allocations::default()),
            high_water: std::array::from_fn(|_| Allocations::default()),
        }
    }

    /// Open a kernel frame under the current one. The returned id is the
    /// handle the host must present back to [`State::end_kernel`].
    pub fn begin_kernel(&mut self, name: &str, kind: FrameKind) -> NodeId {
        let display = display_name(name);
        self.begin_frame(&display, kind)
    }

    /// Close the open kernel frame. `handle` must be the id `begin_kernel`
    /// returned for it; anything else means the host's begin/end pairing
    /// broke and the tree can no longer be trusted.
    pub fn end_kernel(&mut self, handle: NodeId) -> Result<()> {
        let at = now();
        if handle != self.open {
            return Err(Error::FrameMismatch {
                expected: self.tree.full_name(self.open),
                actual: self.tree.full_name(handle),
            });
        }
        self.end_frame(at)
    }

    /// Open a named region. Regions carry no handle; the host pairs
    /// push/pop positionally.
    pub fn push_region(&mut self, name: &str) {
        self.begin_frame(name, FrameKind::Region);
    }

    pub fn pop_region(&mut self) -> Result<()> {
        self.end_frame(now())
    }

    /// Open a copy frame for a deep copy between memory spaces. The frame
    /// name embeds both endpoints and the transfer size, so distinct
    /// transfers aggregate separately.
    pub fn begin_deep_copy(
        &mut self,
        dst_space: Space,
        dst_name: &str,
        src_space: Space,
        src_name: &str,
        size: u64,
    ) {
        let frame_name =
            format!("\"{dst_name}\"({dst_space})=\"{src_name}\"({src_space}) [{size} bytes]");
        self.begin_frame(&frame_name, FrameKind::Copy);
    }

    pub fn end_deep_copy(&mut self) -> Result<()> {
        self.end_frame(now())
    }

    fn begin_frame(&mut self, name: &str, kind: FrameKind) -> NodeId {
        self.open = self.tree.get_child(self.open, name, kind);
        self.tree.begin(self.open, now());
        self.open
    }

    fn end_frame(&mut self, at: Now) -> Result<()> {
        let Some(parent) = self.tree.node(self.open).parent else {
            return Err(Error::StackUnderflow);
        };
        self.tree.end(self.open, at);
        self.open = parent;
        Ok(())
    }

    /// Record an allocation against the open frame and refresh the space's
    /// high-water snapshot if this pushed the live total past it.
    pub fn allocate(&mut self, space: Space, name: &str, ptr: u64, size: u64) -> Result<()> {
        let index = space.index();
        self.current[index].allocate(name, ptr, size, self.open)?;
        if self.current[index].total_size() > self.high_water[index].total_size() {
            self.high_water[index] = self.current[index].clone();
        }
        Ok(())
    }

    pub fn deallocate(&mut self, space: Space, name: &str, ptr: u64, size: u64) {
        let path = self.tree.full_name(self.open);
        self.current[space.index()].deallocate(name, ptr, size, &path);
    }

    /// The currently-open frame.
    pub fn open_frame(&self) -> NodeId {
        self.open
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn live_allocations(&self, space: Space) -> &Allocations {
        &self.current[space.index()]
    }

    pub fn high_water(&self, space: Space) -> &Allocations {
        &self.high_water[space.index()]
    }

    /// Close out the run and write the report to `out`.
    ///
    /// Fails if any frame other than the root is still open: the host broke
    /// its nesting contract and neither view can be trusted. On success the
    /// call tree is adopted, reduced across `comm`, inverted for the
    /// bottom-up view, and printed (or emitted as the JSON document when
    /// the configuration selects it).
    pub fn finalize<W: Write>(
        mut self,
        comm: &dyn Collective,
        config: &ReportConfig,
        out: &mut W,
    ) -> Result<()> {
        let at = now();
        if self.open != NodeId::ROOT {
            return Err(Error::UnterminatedFrame(self.tree.full_name(self.open)));
        }
        self.tree.end(NodeId::ROOT, at);
        self.tree.adopt();
        self.tree.reduce(comm);

        if config.json {
            return report::print_json(&self.tree, comm, config, out);
        }

        let mut inverted = self.tree.invert();
        inverted.reduce(comm);
        report::print_text(&self.tree, &inverted, &self.high_water, comm, config, out)
    }
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}

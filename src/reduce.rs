use std::collections::{BTreeSet, VecDeque};

use crate::tree::{CallTree, FrameId, NodeId};

/// Collective operations the cross-process reduction needs.
///
/// The actual communication library is the embedding tool's business; this
/// crate only states what it must be able to do. Every operation is a
/// rendezvous: all ranks call it, in the same order, with their local
/// contribution. Ranks are assumed dense `0..size()`.
pub trait Collective {
    fn rank(&self) -> u32;
    fn size(&self) -> u32;

    /// All-reduce: sum of `x` across ranks, identical on every rank.
    fn sum_f64(&self, x: f64) -> f64;
    fn max_f64(&self, x: f64) -> f64;
    fn min_f64(&self, x: f64) -> f64;
    fn max_u64(&self, x: u64) -> u64;
    fn min_u32(&self, x: u32) -> u32;

    /// Broadcast `root`'s frame list. Every rank passes its own copy (empty
    /// on non-roots) and receives `root`'s.
    fn broadcast_frames(&self, root: u32, frames: Vec<FrameId>) -> Vec<FrameId>;

    /// Route a payload from `sender` to rank 0. Returns the payload on rank
    /// 0 and `None` everywhere else.
    fn to_root(&self, sender: u32, payload: Option<String>) -> Option<String>;
}

/// The single-process collective: every operation is the identity.
pub struct NullCollective;

impl Collective for NullCollective {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn sum_f64(&self, x: f64) -> f64 {
        x
    }

    fn max_f64(&self, x: f64) -> f64 {
        x
    }

    fn min_f64(&self, x: f64) -> f64 {
        x
    }

    fn max_u64(&self, x: u64) -> u64 {
        x
    }

    fn min_u32(&self, x: u32) -> u32 {
        x
    }

    fn broadcast_frames(&self, _root: u32, frames: Vec<FrameId>) -> Vec<FrameId> {
        frames
    }

    fn to_root(&self, _sender: u32, payload: Option<String>) -> Option<String> {
        payload
    }
}

/// True when a distributed launcher started this process as part of a
/// parallel job. Callback-only tools cannot see the communicator itself;
/// the launcher environment is the next best signal.
pub fn distributed_env_active() -> bool {
    ["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

impl CallTree {
    /// Normalize statistics across ranks.
    ///
    /// Afterwards every rank holds a structurally identical tree in which
    /// `total_runtime` and `total_kernel_runtime` are sums across ranks and
    /// `max_runtime`/`avg_runtime` are filled in. Tree shapes may differ
    /// between ranks (a rank may never have reached some region), so at
    /// each node the child sets are reconciled: the lowest rank that still
    /// has unprocessed children broadcasts its (kind, name) pairs, every
    /// rank materializes a child for each pair (zero-valued where it never
    /// ran), and the election repeats until no rank has leftovers. Child
    /// sets are ordered and ranks are elected in ascending order, so all
    /// ranks walk the same queue.
    pub fn reduce(&mut self, comm: &dyn Collective) {
        let rank = comm.rank();
        let size = comm.size();
        let mut queue = VecDeque::new();
        queue.push_back(NodeId::ROOT);
        while let Some(id) = queue.pop_front() {
            let local_total = self.node(id).total_runtime;
            let local_kernel = self.node(id).total_kernel_runtime;
            let total = comm.sum_f64(local_total);
            let max = comm.max_f64(local_total);
            let avg = comm.sum_f64(local_total) / f64::from(size);
            let kernel = comm.sum_f64(local_kernel);
            {
                let node = self.node_mut(id);
                node.total_runtime = total;
                node.max_runtime = max;
                node.avg_runtime = avg;
                node.total_kernel_runtime = kernel;
            }

            let mut pending: BTreeSet<FrameId> =
                self.node(id).children.keys().cloned().collect();
            let mut bcast_rank = 0u32;
            loop {
                let payload: Vec<FrameId> = if rank == bcast_rank {
                    pending.iter().cloned().collect()
                } else {
                    Vec::new()
                };
                for frame in comm.broadcast_frames(bcast_rank, payload) {
                    let child = self.get_child(id, &frame.name, frame.kind);
                    queue.push_back(child);
                    pending.remove(&frame);
                }
                let proposal = if pending.is_empty() { size } else { rank };
                bcast_rank = comm.min_u32(proposal);
                if bcast_rank >= size {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::now;
    use crate::tree::FrameKind;

    #[test]
    fn single_process_reduce_is_the_identity() {
        let mut tree = CallTree::new();
        let region = tree.get_child(NodeId::ROOT, "app", FrameKind::Region);
        let kernel = tree.get_child(region, "axpy", FrameKind::For);
        for id in [NodeId::ROOT, region, kernel] {
            tree.begin(id, now());
            tree.end(id, now());
        }
        tree.adopt();

        let totals: Vec<f64> = [NodeId::ROOT, region, kernel]
            .iter()
            .map(|&id| tree.node(id).total_runtime)
            .collect();

        tree.reduce(&NullCollective);

        for (&id, &before) in [NodeId::ROOT, region, kernel].iter().zip(&totals) {
            let node = tree.node(id);
            assert_eq!(node.total_runtime, before);
            assert_eq!(node.max_runtime, before);
            assert_eq!(node.avg_runtime, before);
        }
        // No nodes appear or vanish.
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn launcher_detection_reads_the_environment() {
        // Not set in the test environment by default; the helper must not
        // panic either way.
        let _ = distributed_env_active();
    }
}

use std::io::Write;

use comfy_table::{Cell, CellAlignment, Table, presets};
use nix::sys::resource::{UsageWho, getrusage};

use crate::alloc::Allocations;
use crate::config::ReportConfig;
use crate::error::Result;
use crate::reduce::Collective;
use crate::space::{NSPACES, Space};
use crate::tree::{CallTree, FrameKind, NodeId};

const TOP_DOWN_LEGEND: &str = "<average time> <percent of total time> \
<percent time in Kokkos> <percent MPI imbalance> <remainder> \
<kernels per second> <number of calls> <name> [type]";

const BOTTOM_UP_LEGEND: &str = "<average time> <percent of total time> \
<percent time in Kokkos> <percent MPI imbalance> <number of calls> <name> [type]";

/// Write the full human-readable report. Every rank participates in the
/// collective operations; only rank 0 writes.
pub fn print_text<W: Write>(
    tree: &CallTree,
    inverted: &CallTree,
    high_water: &[Allocations; NSPACES],
    comm: &dyn Collective,
    config: &ReportConfig,
    out: &mut W,
) -> Result<()> {
    let root = comm.rank() == 0;
    if root {
        writeln!(out)?;
        writeln!(out, "BEGIN KOKKOS PROFILING REPORT:")?;
        writeln!(
            out,
            "TOTAL TIME: {} seconds",
            tree.node(NodeId::ROOT).max_runtime
        )?;
        writeln!(out, "TOP-DOWN TIME TREE:")?;
        writeln!(out, "{TOP_DOWN_LEGEND}")?;
        writeln!(out, "=================== ")?;
        print_tree(tree, config.threshold, out)?;
        writeln!(out, "BOTTOM-UP TIME TREE:")?;
        writeln!(out, "{BOTTOM_UP_LEGEND}")?;
        writeln!(out, "=================== ")?;
        print_tree(inverted, config.threshold, out)?;
    }
    for space in Space::ALL {
        if root {
            writeln!(out, "KOKKOS {} SPACE:", space.name())?;
            writeln!(out, "=================== ")?;
        }
        print_space_high_water(&high_water[space.index()], tree, comm, out)?;
    }
    print_process_high_water(comm, out)?;
    if root {
        writeln!(out, "END KOKKOS PROFILING REPORT.")?;
    }
    Ok(())
}

fn print_tree<W: Write>(tree: &CallTree, threshold: f64, out: &mut W) -> Result<()> {
    let tree_time = tree.node(NodeId::ROOT).total_runtime;
    print_node(tree, NodeId::ROOT, "", "", tree_time, threshold, out)?;
    writeln!(out)?;
    Ok(())
}

fn print_node<W: Write>(
    tree: &CallTree,
    id: NodeId,
    my_indent: &str,
    child_indent: &str,
    tree_time: f64,
    threshold: f64,
    out: &mut W,
) -> Result<()> {
    let node = tree.node(id);
    let percent = node.total_runtime / tree_time * 100.0;
    if percent < threshold {
        return Ok(());
    }
    if !node.name.is_empty() {
        let avg = node.avg_runtime;
        let imbalance = (node.max_runtime / node.avg_runtime - 1.0) * 100.0;
        let percent_kernel = node.total_kernel_runtime / node.total_runtime * 100.0;
        let calls = node.calls;
        let name = &node.name;
        let tag = node.kind.tag();
        if node.kind == FrameKind::Region {
            // Time under a region that no child accounts for.
            let child_runtime = tree.child_runtime_sum(id);
            let remainder = (1.0 - child_runtime / node.total_runtime) * 100.0;
            let kps = node.kernel_calls as f64 / node.avg_runtime;
            writeln!(
                out,
                "{my_indent}{avg:.2e} sec {percent:.1}% {percent_kernel:.1}% \
                 {imbalance:.1}% {remainder:.1}% {kps:.2e} {calls} {name} [{tag}]"
            )?;
        } else {
            writeln!(
                out,
                "{my_indent}{avg:.2e} sec {percent:.1}% {percent_kernel:.1}% \
                 {imbalance:.1}% ------ {calls} {name} [{tag}]"
            )?;
        }
    }
    let ordered = tree.children_by_time(id);
    let last = ordered.len().saturating_sub(1);
    for (i, &child) in ordered.iter().enumerate() {
        let grandchild_indent = if i == last {
            format!("{child_indent}    ")
        } else {
            format!("{child_indent}|   ")
        };
        print_node(
            tree,
            child,
            &format!("{child_indent}|-> "),
            &grandchild_indent,
            tree_time,
            threshold,
            out,
        )?;
    }
    Ok(())
}

/// One space's high-water section. The rank holding the largest per-space
/// total owns the snapshot worth printing; ties go to the lowest rank, and
/// the rendered text is routed to rank 0.
fn print_space_high_water<W: Write>(
    allocs: &Allocations,
    tree: &CallTree,
    comm: &dyn Collective,
    out: &mut W,
) -> Result<()> {
    let local_total = allocs.total_size();
    let max_total = comm.max_u64(local_total);
    let winner = comm.min_u32(if local_total == max_total {
        comm.rank()
    } else {
        comm.size()
    });
    let payload = if comm.rank() == winner {
        Some(render_high_water(allocs, tree, comm.size() > 1, winner))
    } else {
        None
    };
    if let Some(text) = comm.to_root(winner, payload) {
        write!(out, "{text}")?;
    }
    Ok(())
}

fn render_high_water(allocs: &Allocations, tree: &CallTree, distributed: bool, rank: u32) -> String {
    let total = allocs.total_size();
    let mut text = format!("MAX MEMORY ALLOCATED: {:.1} kB\n", total as f64 / 1024.0);
    if distributed {
        text.push_str(&format!("RANK WITH MAX MEMORY: {rank}\n"));
    }
    text.push_str("ALLOCATIONS AT TIME OF HIGH WATER MARK:\n");
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    let mut rows = 0;
    for entry in allocs.sorted_by_size() {
        if total == 0 {
            break;
        }
        let percent = entry.size as f64 / total as f64 * 100.0;
        if percent < 0.1 {
            continue;
        }
        let frame_path = tree.full_name(entry.frame);
        let path = if frame_path.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", frame_path, entry.name)
        };
        table.add_row(vec![
            Cell::new(format!("{percent:.1}%")).set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(entry.size)).set_alignment(CellAlignment::Right),
            Cell::new(path),
        ]);
        rows += 1;
    }
    if rows > 0 {
        text.push_str(&table.to_string());
        text.push('\n');
    }
    text.push('\n');
    text
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// The OS-reported resident high water mark for this process, with
/// max/min/average across ranks when more than one participates.
fn print_process_high_water<W: Write>(comm: &dyn Collective, out: &mut W) -> Result<()> {
    let usage = getrusage(UsageWho::RUSAGE_SELF)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
    let local = usage.max_rss() as f64;
    let max = comm.max_f64(local);
    let min = comm.min_f64(local);
    let avg = comm.sum_f64(local) / f64::from(comm.size());
    if comm.rank() == 0 {
        writeln!(
            out,
            "Host process high water mark memory consumption: {max:.0} kB"
        )?;
        if comm.size() > 1 {
            writeln!(out, "  Max: {max:.0}, Min: {min:.0}, Ave: {avg:.0} kB")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Streaming JSON frame writer: whether a sibling has already been emitted
/// is carried here, threaded through the recursion, so commas land between
/// objects and never after the last one.
struct JsonWriter<'a, W: Write> {
    out: &'a mut W,
    first: bool,
}

impl<W: Write> JsonWriter<'_, W> {
    fn frame(&mut self, tree: &CallTree, id: NodeId, tree_time: f64) -> std::io::Result<()> {
        let node = tree.node(id);
        if !self.first {
            writeln!(self.out, ",")?;
        }
        self.first = false;
        let percent = node.total_runtime / tree_time * 100.0;
        let percent_kernel = node.total_kernel_runtime / node.total_runtime * 100.0;
        let imbalance = (node.max_runtime / node.avg_runtime - 1.0) * 100.0;
        writeln!(self.out, "{{")?;
        writeln!(self.out, "\"average-time\" : {:.2e},", node.avg_runtime)?;
        writeln!(self.out, "\"percent\" : {percent:.1},")?;
        writeln!(self.out, "\"percent-kokkos\" : {percent_kernel:.1},")?;
        writeln!(self.out, "\"imbalance\" : {imbalance:.1},")?;
        if node.kind == FrameKind::Region {
            let child_runtime = tree.child_runtime_sum(id);
            let remainder = (1.0 - child_runtime / node.total_runtime) * 100.0;
            let kps = node.kernel_calls as f64 / node.avg_runtime;
            writeln!(self.out, "\"remainder\" : {remainder:.1},")?;
            writeln!(self.out, "\"kernels-per-second\" : {kps:.2e},")?;
        } else {
            writeln!(self.out, "\"remainder\" : \"N/A\",")?;
            writeln!(self.out, "\"kernels-per-second\" : \"N/A\",")?;
        }
        writeln!(self.out, "\"number-of-calls\" : {},", node.calls)?;
        let escaped = node.name.replace('"', "\\\"");
        writeln!(self.out, "\"name\" : \"{escaped}\",")?;
        let parent_id = node.parent.map_or(0, NodeId::index);
        writeln!(self.out, "\"parent-id\" : {parent_id},")?;
        writeln!(self.out, "\"id\" : {},", id.index())?;
        write!(self.out, "\"kernel-type\" : \"{}\"", node.kind.tag())?;
        writeln!(self.out)?;
        write!(self.out, "}}")?;
        Ok(())
    }
}

/// Write the JSON document for the top-down tree. Rank 0 only; the other
/// ranks have an identical tree after reduction and nothing to add.
pub fn print_json<W: Write>(
    tree: &CallTree,
    comm: &dyn Collective,
    config: &ReportConfig,
    out: &mut W,
) -> Result<()> {
    if comm.rank() != 0 {
        return Ok(());
    }
    writeln!(out, "{{")?;
    writeln!(out, "\"space-time-stack-data\" : [")?;
    let tree_time = tree.node(NodeId::ROOT).total_runtime;
    let mut writer = JsonWriter {
        out: &mut *out,
        first: true,
    };
    json_node(tree, NodeId::ROOT, tree_time, config.threshold, &mut writer)?;
    writeln!(out)?;
    writeln!(out, "]")?;
    writeln!(out, "}}")?;
    Ok(())
}

fn json_node<W: Write>(
    tree: &CallTree,
    id: NodeId,
    tree_time: f64,
    threshold: f64,
    writer: &mut JsonWriter<'_, W>,
) -> Result<()> {
    let node = tree.node(id);
    let percent = node.total_runtime / tree_time * 100.0;
    if percent < threshold {
        return Ok(());
    }
    if !node.name.is_empty() {
        writer.frame(tree, id, tree_time)?;
    }
    for child in tree.children_by_time(id) {
        json_node(tree, child, tree_time, threshold, writer)?;
    }
    Ok(())
}

//! Layer 8: indented-text import and export.
//!
//! One value per line, two spaces of indentation per depth (tabs accepted on
//! import). Export walks the Query API in display order; import replays
//! plain `Insert` ops, so ranks renumber while values, nesting, and relative
//! order survive a round trip.
//!
//! Values containing newlines are not escaped; the format targets short
//! outline thoughts.

use std::collections::BTreeSet;

use tracing::debug;

use super::apply::{ApplyError, GraphOp, apply_op};
use super::identity::{LocationKey, location_key};
use super::state::ThoughtGraph;
use super::timestamp::Clock;

/// Serialize the whole outline to indented text.
pub fn export_text(graph: &ThoughtGraph) -> String {
    let mut out = String::new();
    let mut context = Vec::new();
    let mut on_stack = BTreeSet::new();
    write_level(graph, &mut context, &mut on_stack, &mut out);
    out
}

fn write_level(
    graph: &ThoughtGraph,
    context: &mut Vec<String>,
    on_stack: &mut BTreeSet<LocationKey>,
    out: &mut String,
) {
    let key = location_key(context);
    // A value can contain one of its own ancestors; don't loop on it.
    if !on_stack.insert(key) {
        return;
    }
    let values: Vec<String> = graph
        .children(context)
        .iter()
        .map(|c| c.value.clone())
        .collect();
    for value in values {
        for _ in 0..context.len() {
            out.push_str("  ");
        }
        out.push_str(&value);
        out.push('\n');
        context.push(value);
        write_level(graph, context, on_stack, out);
        context.pop();
    }
    on_stack.remove(&key);
}

/// Replay an indented outline into the graph as appends. Returns the number
/// of lines inserted.
pub fn import_text(
    graph: &mut ThoughtGraph,
    text: &str,
    clock: &impl Clock,
) -> Result<usize, ApplyError> {
    let mut stack: Vec<String> = Vec::new();
    let mut count = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let depth = indent_depth(line);
        let value = line.trim_start_matches([' ', '\t']).trim_end_matches('\r');
        stack.truncate(depth.min(stack.len()));

        apply_op(
            graph,
            &GraphOp::Insert {
                context: stack.clone(),
                value: value.to_string(),
                rank: None,
            },
            clock,
        )?;
        stack.push(value.to_string());
        count += 1;
    }

    debug!(count, "imported outline text");
    Ok(count)
}

fn indent_depth(line: &str) -> usize {
    let mut spaces = 0usize;
    let mut tabs = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => spaces += 1,
            '\t' => tabs += 1,
            _ => break,
        }
    }
    tabs + spaces / 2
}

//! Cycle detection over concept-set membership.
//!
//! The visited set is scoped to the current path: the same concept may appear in two disjoint
//! branches, only an ancestor showing up again below itself is a cycle.

use crate::{RestError, RestResult};
use std::collections::HashSet;

/// Walks the graph depth-first from `root`, failing on the first node that repeats along the
/// current path.
///
/// `children` returns the member ids of a node; an unknown node has no members.
///
/// Returns the number of nodes visited.
///
/// # Errors
///
/// Returns [`RestError::CyclicStructure`] naming the repeated id, or whatever `children` fails
/// with.
pub fn assert_no_cycles<F>(root: &str, mut children: F) -> RestResult<usize>
where
    F: FnMut(&str) -> RestResult<Vec<String>>,
{
    let mut path = HashSet::new();
    let mut visited = 0;
    visit(root, &mut children, &mut path, &mut visited)?;
    Ok(visited)
}

fn visit<F>(
    node: &str,
    children: &mut F,
    path: &mut HashSet<String>,
    visited: &mut usize,
) -> RestResult<()>
where
    F: FnMut(&str) -> RestResult<Vec<String>>,
{
    if !path.insert(node.to_owned()) {
        return Err(RestError::CyclicStructure {
            uuid: node.to_owned(),
        });
    }
    *visited += 1;

    for child in children(node)? {
        visit(&child, children, path, visited)?;
    }

    path.remove(node);
    Ok(())
}

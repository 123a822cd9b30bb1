//! Merge range resolution
//!
//! Works out which commands of the source branch a new merge record should pull.

use crate::branch::BranchInfo;
use crate::error::StoreError;
use crate::types::{IdRange, Sequence};

/// Direction of a merge relative to the branch tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// The target pulls from its parent (a refresh).
    FromParent,
    /// The target pulls from one of its children.
    FromChild,
}

/// Resolve the `[min, max]` range of `source` that `target` should merge.
///
/// Merging into a parent resumes where the previous merge from that child left
/// off. Merging into a child resumes at the child's refresh high-water mark.
pub fn resolve_merge_range(
    target: &BranchInfo,
    source: &BranchInfo,
) -> Result<(MergeDirection, IdRange), StoreError> {
    let direction = if target.parent_id == Some(source.id) {
        MergeDirection::FromParent
    } else if source.parent_id == Some(target.id) {
        MergeDirection::FromChild
    } else {
        return Err(StoreError::NotAdjacent {
            from: source.name.clone(),
            into: target.name.clone(),
        });
    };

    let min: Sequence = match direction {
        MergeDirection::FromChild => target
            .last_merge
            .get(&source.id)
            .map(|m| m.child_count)
            .unwrap_or(0),
        MergeDirection::FromParent => target.refresh_count,
    };

    let max = match source.command_count.checked_sub(1) {
        Some(max) if min <= max => max,
        _ => {
            return Err(StoreError::NothingToMerge(format!(
                "{} has no commands after {}",
                source.name, min
            )))
        }
    };

    Ok((direction, IdRange::new(source.id, min, max)))
}

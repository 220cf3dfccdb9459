//! Parent/child ordering for instruction pages.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::Instruction;

#[derive(Debug, Clone, Serialize)]
pub struct InstructionNode {
    #[serde(flatten)]
    pub instruction: Instruction,
    pub children: Vec<InstructionNode>,
}

/// Nests rows under their parents, siblings ordered by position. Rows whose
/// parent is missing from `rows` are promoted to the top level.
pub fn build_tree(rows: Vec<Instruction>) -> Vec<InstructionNode> {
    let known: HashSet<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut by_parent: HashMap<Option<Uuid>, Vec<Instruction>> = HashMap::new();
    for row in rows {
        let parent = row.parent_id.filter(|p| known.contains(p));
        by_parent.entry(parent).or_default().push(row);
    }
    attach(None, &mut by_parent)
}

fn attach(
    parent: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<Instruction>>,
) -> Vec<InstructionNode> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    level
        .into_iter()
        .map(|instruction| {
            let children = attach(Some(instruction.id), by_parent);
            InstructionNode {
                instruction,
                children,
            }
        })
        .collect()
}

/// `id` and everything below it, given `(id, parent_id)` pairs. Each id is
/// visited once, so corrupted parent links cannot loop forever.
pub fn subtree(pairs: &[(Uuid, Option<Uuid>)], id: Uuid) -> Vec<Uuid> {
    let mut seen = HashSet::from([id]);
    let mut out = vec![id];
    let mut i = 0;
    while i < out.len() {
        let current = out[i];
        for (child, _) in pairs.iter().filter(|(_, parent)| *parent == Some(current)) {
            if seen.insert(*child) {
                out.push(*child);
            }
        }
        i += 1;
    }
    out
}

/// True when placing `id` under `new_parent` would make it its own ancestor.
pub fn creates_cycle(pairs: &[(Uuid, Option<Uuid>)], id: Uuid, new_parent: Option<Uuid>) -> bool {
    match new_parent {
        None => false,
        Some(parent) => subtree(pairs, id).contains(&parent),
    }
}

/// Inserts `id` into `siblings` at `position`, clamped to the end.
pub fn place(mut siblings: Vec<Uuid>, id: Uuid, position: usize) -> Vec<Uuid> {
    siblings.retain(|s| *s != id);
    let at = position.min(siblings.len());
    siblings.insert(at, id);
    siblings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn row(id: Uuid, parent: Option<Uuid>, position: i32) -> Instruction {
        let now = Utc::now();
        Instruction {
            id,
            company_id: Uuid::nil(),
            title: format!("page {position}"),
            parent_id: parent,
            position,
            rich_text: String::new(),
            is_deleted: false,
            created_at: now + Duration::seconds(position as i64),
            updated_at: now,
        }
    }

    #[test]
    fn test_build_tree_nests_and_orders() {
        let root_a = Uuid::new_v4();
        let root_b = Uuid::new_v4();
        let child_1 = Uuid::new_v4();
        let child_0 = Uuid::new_v4();
        let grandchild = Uuid::new_v4();
        let orphan = Uuid::new_v4();

        let tree = build_tree(vec![
            row(child_1, Some(root_a), 1),
            row(root_b, None, 1),
            row(grandchild, Some(child_0), 0),
            row(root_a, None, 0),
            row(child_0, Some(root_a), 0),
            row(orphan, Some(Uuid::new_v4()), 5),
        ]);

        let roots: Vec<Uuid> = tree.iter().map(|n| n.instruction.id).collect();
        assert_eq!(roots, vec![root_a, root_b, orphan]);
        let children: Vec<Uuid> = tree[0].children.iter().map(|n| n.instruction.id).collect();
        assert_eq!(children, vec![child_0, child_1]);
        assert_eq!(tree[0].children[0].children[0].instruction.id, grandchild);
    }

    #[test]
    fn test_cycle_detection() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let other = Uuid::new_v4();
        let pairs = vec![(a, None), (b, Some(a)), (c, Some(b)), (other, None)];

        assert!(creates_cycle(&pairs, a, Some(a)));
        assert!(creates_cycle(&pairs, a, Some(c)));
        assert!(!creates_cycle(&pairs, c, Some(a)));
        assert!(!creates_cycle(&pairs, a, Some(other)));
        assert!(!creates_cycle(&pairs, b, None));
        assert_eq!(subtree(&pairs, b), vec![b, c]);
    }

    #[test]
    fn test_subtree_terminates_on_cyclic_links() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let pairs = vec![(a, Some(b)), (b, Some(a)), (c, Some(b))];

        let mut found = subtree(&pairs, a);
        found.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(found, expected);

        assert!(creates_cycle(&pairs, a, Some(c)));
        assert!(!creates_cycle(&pairs, c, Some(Uuid::new_v4())));
    }

    #[test]
    fn test_place_clamps() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let moved = place(ids.clone(), ids[0], 99);
        assert_eq!(moved, vec![ids[1], ids[2], ids[0]]);
        let fresh = Uuid::new_v4();
        let moved = place(ids.clone(), fresh, 1);
        assert_eq!(moved, vec![ids[0], fresh, ids[1], ids[2]]);
    }
}

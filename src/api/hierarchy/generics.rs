use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct BasicTreeNode<T> {
    pub id: String,
    pub data: T,
    pub children: Vec<BasicTreeNode<T>>,
}

/// Builds a forest from `(id, data)` items and `(child_id, parent_id)` edges.
///
/// Items whose parent is not among `items` become roots. Every item appears
/// exactly once; members of a parent cycle are attached under whichever of
/// them is reached first.
pub fn build_generic_tree<T>(
    items: &[(String, T)],
    hierarchies: &[(String, String)], // (child_id, parent_id)
) -> Vec<BasicTreeNode<T>>
where
    T: Clone,
{
    let items_map: HashMap<&str, &T> = items
        .iter()
        .map(|(item_id, data)| (item_id.as_str(), data))
        .collect();

    // Map of parent_id to children, ignoring edges to unknown parents
    let mut parent_to_children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut child_items: HashSet<&str> = HashSet::new();
    for (child_id, parent_id) in hierarchies {
        if !items_map.contains_key(parent_id.as_str()) || !items_map.contains_key(child_id.as_str())
        {
            continue;
        }
        parent_to_children
            .entry(parent_id.as_str())
            .or_default()
            .push(child_id.as_str());
        child_items.insert(child_id.as_str());
    }

    fn build_subtree<'a, T: Clone>(
        item_id: &'a str,
        items_map: &HashMap<&'a str, &'a T>,
        parent_to_children: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
    ) -> Option<BasicTreeNode<T>> {
        if !visited.insert(item_id) {
            return None;
        }
        let data = (*items_map.get(item_id)?).clone();
        let children = parent_to_children
            .get(item_id)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child_id| {
                        build_subtree(*child_id, items_map, parent_to_children, visited)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(BasicTreeNode {
            id: item_id.to_string(),
            data,
            children,
        })
    }

    let mut visited = HashSet::new();
    let mut tree: Vec<BasicTreeNode<T>> = items
        .iter()
        .filter(|(item_id, _)| !child_items.contains(item_id.as_str()))
        .filter_map(|(item_id, _)| {
            build_subtree(item_id, &items_map, &parent_to_children, &mut visited)
        })
        .collect();

    // Whatever is left hangs off a cycle with no way up to a root
    for (item_id, _) in items {
        if let Some(node) = build_subtree(item_id, &items_map, &parent_to_children, &mut visited) {
            tree.push(node);
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<T>(nodes: &[BasicTreeNode<T>]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_build_forest() {
        let items: Vec<(String, u8)> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), i as u8))
            .collect();
        let edges = vec![
            ("b".to_string(), "a".to_string()),
            ("c".to_string(), "b".to_string()),
            ("d".to_string(), "gone".to_string()),
        ];

        let tree = build_generic_tree(&items, &edges);
        assert_eq!(ids(&tree), vec!["a", "d"]);
        assert_eq!(ids(&tree[0].children), vec!["b"]);
        assert_eq!(ids(&tree[0].children[0].children), vec!["c"]);
    }

    #[test]
    fn test_cycles_do_not_lose_items() {
        let items: Vec<(String, ())> = vec![("x".into(), ()), ("y".into(), ())];
        let edges = vec![
            ("x".to_string(), "y".to_string()),
            ("y".to_string(), "x".to_string()),
        ];

        let tree = build_generic_tree(&items, &edges);
        assert_eq!(ids(&tree), vec!["x"]);
        assert_eq!(ids(&tree[0].children), vec!["y"]);
        assert!(tree[0].children[0].children.is_empty());
    }
}

//! Cycle-safe, depth-bounded traversal over a provider's container graph (§4.2, B1, B2).
//!
//! Concrete providers plug in a `children_of` closure; this module owns the bookkeeping
//! that every provider would otherwise have to reimplement: a visited-set to survive
//! cyclic graphs, and a depth counter so `depth = 0` means "just this container" and
//! `depth = -1` means unbounded.

use std::collections::HashSet;

use super::{ContainerSpec, ProviderError};

/// Walks the container graph rooted at each entry in `roots`, calling `children_of` to
/// expand a container into its child container ids. Each distinct container id is visited
/// at most once across the whole call, so a cycle (`A -> B -> A`) terminates instead of
/// looping forever.
pub fn scan<F>(roots: &[ContainerSpec<'_>], mut children_of: F) -> Result<Vec<String>, ProviderError>
where
    F: FnMut(&str) -> Result<Vec<String>, ProviderError>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    let mut frontier: Vec<(String, i32)> =
        roots.iter().map(|c| (c.id.to_owned(), c.depth)).collect();

    while let Some((id, remaining_depth)) = frontier.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        out.push(id.clone());

        if remaining_depth == 0 {
            continue;
        }
        let next_depth = if remaining_depth < 0 { -1 } else { remaining_depth - 1 };
        for child in children_of(&id)? {
            if !visited.contains(&child) {
                frontier.push((child, next_depth));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_visits_only_the_root() {
        let roots = [ContainerSpec { id: "root", depth: 0 }];
        let visited = scan(&roots, |_| Ok(vec!["child".into()])).unwrap();
        assert_eq!(visited, vec!["root".to_owned()]);
    }

    #[test]
    fn unbounded_depth_terminates_on_a_cycle() {
        let roots = [ContainerSpec { id: "a", depth: -1 }];
        let visited = scan(&roots, |id| {
            Ok(match id {
                "a" => vec!["b".into()],
                "b" => vec!["a".into()],
                _ => vec![],
            })
        })
        .unwrap();
        let mut sorted = visited.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn bounded_depth_stops_descending() {
        let roots = [ContainerSpec { id: "a", depth: 1 }];
        let visited = scan(&roots, |id| {
            Ok(match id {
                "a" => vec!["b".into()],
                "b" => vec!["c".into()],
                _ => vec![],
            })
        })
        .unwrap();
        let mut sorted = visited.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a".to_owned(), "b".to_owned()]);
    }
}

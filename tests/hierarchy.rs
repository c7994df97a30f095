//! Property tests for type hierarchy resolution over generated class trees.

use classmend::{
    hierarchy::{HierarchyIndex, TypeResolver, ROOT},
    prelude::*,
};
use proptest::{prelude::*, sample::Index};

/// Parent of every generated class: `None` for the root type, `Some(k)` for `gen/C{k}`.
fn parents(picks: &[Index]) -> Vec<Option<usize>> {
    picks
        .iter()
        .enumerate()
        .map(|(i, pick)| pick.index(i + 1).checked_sub(1))
        .collect()
}

fn class_name(index: usize) -> String {
    format!("gen/C{index}")
}

fn chain(parents: &[Option<usize>], mut index: usize) -> Vec<String> {
    let mut chain = vec![class_name(index)];
    while let Some(parent) = parents[index] {
        chain.push(class_name(parent));
        index = parent;
    }
    chain.push(ROOT.to_string());
    chain
}

fn tree_loader(parents: &[Option<usize>]) -> Result<MemoryLoader> {
    let mut loader = MemoryLoader::new("gen");
    for (index, parent) in parents.iter().enumerate() {
        let mut builder = ClassBuilder::new(&class_name(index));
        if let Some(parent) = parent {
            builder = builder.super_name(&class_name(*parent));
        }
        loader.add(builder.build()?)?;
    }
    loader.add(ClassBuilder::new("gen/Marker").interface_type().build()?)?;
    Ok(loader)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every type is its own ancestor and has the root type among its ancestors.
    #[test]
    fn test_ancestors_contain_self_and_root(picks in prop::collection::vec(any::<Index>(), 1..12)) {
        let parents = parents(&picks);
        let loader = tree_loader(&parents).unwrap();
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        for i in 0..parents.len() {
            let ancestors = resolver.ancestors_of(&class_name(i)).unwrap();
            prop_assert!(ancestors.contains(&class_name(i)));
            prop_assert!(ancestors.contains(ROOT));
            for expected in chain(&parents, i) {
                prop_assert!(ancestors.contains(&expected));
            }
            prop_assert_eq!(ancestors.len(), chain(&parents, i).len());
        }
    }

    /// An ancestor is the common ancestor of itself and any of its descendants, in either order.
    #[test]
    fn test_ancestor_is_common_ancestor(
        picks in prop::collection::vec(any::<Index>(), 1..12),
        pick in any::<Index>(),
    ) {
        let parents = parents(&picks);
        let loader = tree_loader(&parents).unwrap();
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        let descendant = class_name(pick.index(parents.len()));
        for ancestor in resolver.ancestors_of(&descendant).unwrap().iter() {
            prop_assert_eq!(&resolver.common_ancestor(&descendant, ancestor).unwrap(), ancestor);
            prop_assert_eq!(&resolver.common_ancestor(ancestor, &descendant).unwrap(), ancestor);
        }
    }

    /// The common ancestor of two classes is the deepest class on both superclass chains.
    #[test]
    fn test_common_ancestor_is_deepest_shared(
        picks in prop::collection::vec(any::<Index>(), 1..12),
        a in any::<Index>(),
        b in any::<Index>(),
    ) {
        let parents = parents(&picks);
        let loader = tree_loader(&parents).unwrap();
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        let (a, b) = (a.index(parents.len()), b.index(parents.len()));
        let chain_b = chain(&parents, b);
        let expected = chain(&parents, a)
            .into_iter()
            .find(|name| chain_b.contains(name))
            .unwrap();

        let forward = resolver.common_ancestor(&class_name(a), &class_name(b)).unwrap();
        let backward = resolver.common_ancestor(&class_name(b), &class_name(a)).unwrap();
        prop_assert_eq!(&forward, &expected);
        prop_assert_eq!(&backward, &expected);
    }

    /// An interface and a class that does not implement it only share the root type.
    #[test]
    fn test_unrelated_interface_meets_at_root(
        picks in prop::collection::vec(any::<Index>(), 1..12),
        pick in any::<Index>(),
    ) {
        let parents = parents(&picks);
        let loader = tree_loader(&parents).unwrap();
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        let class = class_name(pick.index(parents.len()));
        prop_assert_eq!(resolver.common_ancestor(&class, "gen/Marker").unwrap(), ROOT);
        prop_assert_eq!(resolver.common_ancestor("gen/Marker", &class).unwrap(), ROOT);
    }
}

/// Types resolved through one resolver are visible to every later resolver over the same index.
#[test]
fn test_index_is_shared() -> Result<()> {
    let loader = tree_loader(&[None, Some(0), Some(1)])?;
    let index = HierarchyIndex::new();

    TypeResolver::new(&index, Some(&loader), &BuiltinLoader).ancestors_of("gen/C2")?;
    assert!(index.contains("gen/C0") && index.contains("gen/C1") && index.contains("gen/C2"));

    // the loader is gone, the answers are not
    let detached = TypeResolver::new(&index, None, &BuiltinLoader);
    assert_eq!(detached.common_ancestor("gen/C2", "gen/C1")?, "gen/C1");
    assert_eq!(detached.parent_of("gen/C2")?.as_deref(), Some("gen/C1"));
    Ok(())
}

/// Unknown types are a resolution error, and a cycle does not hang the resolver.
#[test]
fn test_unresolvable_hierarchies() -> Result<()> {
    let index = HierarchyIndex::new();
    let empty = MemoryLoader::new("empty");
    let resolver = TypeResolver::new(&index, Some(&empty), &BuiltinLoader);
    assert!(matches!(
        resolver.ancestors_of("gen/Missing"),
        Err(Error::Resolution(_))
    ));

    let mut cyclic = MemoryLoader::new("cyclic");
    cyclic
        .add(ClassBuilder::new("gen/Ping").super_name("gen/Pong").build()?)?
        .add(ClassBuilder::new("gen/Pong").super_name("gen/Ping").build()?)?;
    let resolver = TypeResolver::new(&index, Some(&cyclic), &BuiltinLoader);
    assert!(matches!(
        resolver.ancestors_of("gen/Ping"),
        Err(Error::RecursionLimit(_))
    ));
    Ok(())
}

//! Generic search and update over recursive login nodes.
//!
//! The stash tree and the in-memory login tree share the same recursive
//! shape. The walkers here are the only code that traverses either one;
//! callers select nodes with predicates over unique identifiers (`appId`
//! or `loginId`).

/// A node with children of its own type.
pub trait TreeNode: Sized {
    /// The node's direct children.
    fn node_children(&self) -> &[Self];

    /// Rebuild this node with a substituted child list, copying every
    /// other field.
    fn with_children(&self, children: Vec<Self>) -> Self;
}

/// Find the first node matching `predicate`, in pre-order.
pub fn search_tree<'a, N, P>(node: &'a N, predicate: &P) -> Option<&'a N>
where
    N: TreeNode,
    P: Fn(&N) -> bool,
{
    if predicate(node) {
        return Some(node);
    }
    node.node_children()
        .iter()
        .find_map(|child| search_tree(child, predicate))
}

/// Rebuild a tree, replacing the first pre-order node matching `predicate`
/// (and its whole subtree) with `transform(node)`, and every other node
/// with `clone(node, new_children)`.
///
/// The output node type is independent of the input, so the same walker
/// serves stash-to-stash rewrites and stash-to-login projections. If no
/// node matches, the transform is never applied and the result is the
/// `clone`-rebuilt tree. A transform error aborts the walk; the input is
/// never mutated.
pub fn update_tree<S, T, E, P, F, C>(
    node: &S,
    predicate: P,
    transform: F,
    clone: C,
) -> Result<T, E>
where
    S: TreeNode,
    P: Fn(&S) -> bool,
    F: FnOnce(&S) -> Result<T, E>,
    C: Fn(&S, Vec<T>) -> T,
{
    fn walk<S, T, E, P, F, C>(
        node: &S,
        predicate: &P,
        transform: &mut Option<F>,
        clone: &C,
    ) -> Result<T, E>
    where
        S: TreeNode,
        P: Fn(&S) -> bool,
        F: FnOnce(&S) -> Result<T, E>,
        C: Fn(&S, Vec<T>) -> T,
    {
        if predicate(node) {
            if let Some(transform) = transform.take() {
                return transform(node);
            }
        }
        let children = node
            .node_children()
            .iter()
            .map(|child| walk(child, predicate, transform, clone))
            .collect::<Result<Vec<T>, E>>()?;
        Ok(clone(node, children))
    }

    walk(node, &predicate, &mut Some(transform), &clone)
}

/// The default clone: shallow copy plus the substituted child list.
pub fn default_clone<N: TreeNode>(node: &N, children: Vec<N>) -> N {
    node.with_children(children)
}

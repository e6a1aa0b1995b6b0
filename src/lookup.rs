//!
//! Queries over already parsed children.  None of these touch the source, so every iterator can be restarted by
//! calling the method again.
//!

use std::slice;

use ebml_tags_specification::EbmlSpecification;

use crate::element::NodeId;
use crate::tree::ElementTree;

///
/// Iterator over the direct children of an element that have a given id.
///
pub struct ChildrenWithId<'a, TSpec> {
    tree: &'a ElementTree<TSpec>,
    inner: slice::Iter<'a, NodeId>,
    id: Option<u64>,
}

impl<'a, TSpec: EbmlSpecification> Iterator for ChildrenWithId<'a, TSpec> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.id?;
        let tree = self.tree;
        self.inner.find(|child| tree.id(**child) == id).copied()
    }
}

///
/// Preorder iterator over a subtree, the starting element included.
///
pub struct Descendants<'a, TSpec> {
    tree: &'a ElementTree<TSpec>,
    stack: Vec<NodeId>,
}

impl<'a, TSpec: EbmlSpecification> Iterator for Descendants<'a, TSpec> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack.extend(self.tree.children(node).iter().rev());
        Some(node)
    }
}

impl<TSpec: EbmlSpecification> ElementTree<TSpec> {
    pub fn children_with_id(&self, node: NodeId, id: u64) -> ChildrenWithId<'_, TSpec> {
        ChildrenWithId {
            tree: self,
            inner: self.children(node).iter(),
            id: Some(id),
        }
    }

    ///
    /// Direct children of `node` whose schema name is `name`, e.g. `"SimpleTag"`.
    ///
    /// An unknown name yields an empty iterator.
    ///
    pub fn children_named(&self, node: NodeId, name: &str) -> ChildrenWithId<'_, TSpec> {
        ChildrenWithId {
            tree: self,
            inner: self.children(node).iter(),
            id: TSpec::get_element_by_name(name).map(|element| element.id),
        }
    }

    pub fn child_with_id(&self, node: NodeId, id: u64) -> Option<NodeId> {
        self.children_with_id(node, id).next()
    }

    pub fn child_named(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(node, name).next()
    }

    pub fn descendants(&self, node: NodeId) -> Descendants<'_, TSpec> {
        Descendants {
            tree: self,
            stack: vec![node],
        }
    }

    ///
    /// First element named `name` in preorder below `node` (excluding `node` itself).  Stops at the first hit.
    ///
    pub fn first_named(&self, node: NodeId, name: &str) -> Option<NodeId> {
        let id = TSpec::get_element_by_name(name)?.id;
        self.descendants(node).skip(1).find(|candidate| self.id(*candidate) == id)
    }

    pub fn root_named(&self, name: &str) -> Option<NodeId> {
        let id = TSpec::get_element_by_name(name)?.id;
        self.roots().iter().copied().find(|root| self.id(*root) == id)
    }
}

#[cfg(test)]
mod tests {
    use ebml_tags_specification::matroska::Matroska;

    use crate::tree::MatroskaTree;

    #[test]
    fn direct_and_scoped_queries() {
        let mut tree = MatroskaTree::new();
        let tags = tree.create_master(Matroska::Tags.id()).unwrap();
        tree.add_root(tags);
        let first = tree.create_master(Matroska::Tag.id()).unwrap();
        let second = tree.create_master(Matroska::Tag.id()).unwrap();
        tree.append_child(tags, first).unwrap();
        tree.append_child(tags, second).unwrap();
        let simple = tree.create_master(Matroska::SimpleTag.id()).unwrap();
        tree.append_child(second, simple).unwrap();

        let tag_nodes: Vec<_> = tree.children_named(tags, "Tag").collect();
        assert_eq!(vec![first, second], tag_nodes);
        // restartable
        assert_eq!(2, tree.children_named(tags, "Tag").count());

        assert_eq!(None, tree.child_named(tags, "SimpleTag"));
        assert_eq!(Some(simple), tree.first_named(tags, "SimpleTag"));
        assert_eq!(None, tree.first_named(tags, "NoSuchElement"));
        assert_eq!(0, tree.children_named(tags, "NoSuchElement").count());

        let order: Vec<_> = tree.descendants(tags).collect();
        assert_eq!(vec![tags, first, second, simple], order);
        assert_eq!(Some(tags), tree.root_named("Tags"));
    }
}

//! Namespace tree built from the server manifest.

use std::collections::BTreeMap;

use crate::error::{DceError, DceResult};
use crate::protocol::ActionDescriptor;

/// A node of the dispatch tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchNode {
    /// Interior node keyed by path segment
    Namespace(BTreeMap<String, DispatchNode>),
    /// Callable leaf
    Action(ActionDescriptor),
}

/// Maps dotted action names to their descriptors.
///
/// Built once from a manifest and never mutated afterwards. Every leaf's
/// descriptor name equals the dotted path that reaches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTree {
    root: BTreeMap<String, DispatchNode>,
    len: usize,
}

impl DispatchTree {
    /// Build a tree from manifest descriptors, in manifest order.
    ///
    /// Name clashes are resolved the way later declarations would shadow
    /// earlier ones on a namespace object:
    /// - a leaf declared where a namespace exists replaces the namespace;
    /// - a descriptor nested under an existing leaf is dropped, since
    ///   resolution stops at the first leaf and could never reach it.
    pub fn build<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a ActionDescriptor>,
    {
        let mut tree = Self::default();
        for descriptor in descriptors {
            tree.install(descriptor.clone());
        }
        let len = tree.actions().len();
        tree.len = len;
        tree
    }

    fn install(&mut self, descriptor: ActionDescriptor) {
        let mut segments: Vec<String> = descriptor.name.split('.').map(str::to_owned).collect();
        let Some(leaf) = segments.pop() else {
            return;
        };

        let mut children = &mut self.root;
        for segment in segments {
            let node = children
                .entry(segment)
                .or_insert_with(|| DispatchNode::Namespace(BTreeMap::new()));
            match node {
                DispatchNode::Namespace(next) => children = next,
                DispatchNode::Action(existing) => {
                    log::warn!(
                        target: "dce::dispatch",
                        "Action {} is shadowed by action {}, skipping",
                        descriptor.name,
                        existing.name
                    );
                    return;
                }
            }
        }

        let name = descriptor.name.clone();
        if let Some(DispatchNode::Namespace(_)) =
            children.insert(leaf, DispatchNode::Action(descriptor))
        {
            log::warn!(
                target: "dce::dispatch",
                "Action {} replaces a namespace of the same name",
                name
            );
        }
    }

    /// Resolve a path to its descriptor.
    ///
    /// Segments are consumed one at a time; the first leaf reached is
    /// returned regardless of any remaining segments. A missing segment, or
    /// a path that ends on a namespace, is `DceError::ActionNotImplemented`.
    pub fn resolve(&self, segments: &[&str]) -> DceResult<&ActionDescriptor> {
        let mut children = &self.root;
        for segment in segments {
            match children.get(*segment) {
                Some(DispatchNode::Action(descriptor)) => return Ok(descriptor),
                Some(DispatchNode::Namespace(next)) => children = next,
                None => break,
            }
        }
        Err(DceError::action_not_implemented(segments.join(".")))
    }

    /// Resolve a dotted path such as `billing.invoice.create`.
    pub fn resolve_path(&self, path: &str) -> DceResult<&ActionDescriptor> {
        let segments: Vec<&str> = path.split('.').collect();
        self.resolve(&segments)
    }

    /// All installed leaves, depth-first in segment order.
    pub fn actions(&self) -> Vec<&ActionDescriptor> {
        fn collect<'a>(
            children: &'a BTreeMap<String, DispatchNode>,
            out: &mut Vec<&'a ActionDescriptor>,
        ) {
            for node in children.values() {
                match node {
                    DispatchNode::Action(descriptor) => out.push(descriptor),
                    DispatchNode::Namespace(next) => collect(next, out),
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    /// Number of reachable actions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

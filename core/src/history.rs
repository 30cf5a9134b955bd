// Copyright 2020 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The branching-history engine: component B. A rooted tree of commits
//! where every non-root node carries only the patch from its parent; the
//! root alone carries a full content snapshot.
//!
//! Per Design Note 9, nodes are **not** linked through `Rc`/back-pointers.
//! The tree is an arena (`Vec<Slot>`) that owns every node; parent/child
//! edges and the public [`NodeId`] are resolved through an id -> slot-index
//! lookup table kept alongside it.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::patch;
use crate::patch::Patch;
use crate::patch::PatchError;

/// A node's globally unique identifier — 128 bits, randomly generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Error)]
#[error("invalid node id {0:?}")]
pub struct InvalidNodeId(pub String);

impl std::str::FromStr for NodeId {
    type Err = InvalidNodeId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Uuid>().map(Self).map_err(|_| InvalidNodeId(s.to_owned()))
    }
}

/// Millisecond-precision commit time, accepted by [`HistoryTree::new`] and
/// [`HistoryTree::add_commit`] for event logging only: it is never stored on
/// a [`HistoryNode`] and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub millis_since_epoch: i64,
    pub tz_offset: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        let millis_since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            millis_since_epoch,
            tz_offset: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("content for node {node} does not match its recorded checksum (corruption)")]
    ChecksumMismatch { node: NodeId },
    #[error("node {0} is not part of this history tree")]
    UnknownNode(NodeId),
    #[error("malformed history JSON: {0}")]
    Decode(String),
    #[error("history JSON has no root node (every node lists a parent)")]
    MissingRoot,
    #[error("history JSON has {0} root nodes; expected exactly one")]
    MultipleRoots(usize),
    #[error("node id {0:?} referenced as a child but not present in the node list")]
    DanglingReference(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

struct Slot {
    id: NodeId,
    parent: Option<usize>,
    patches: Vec<Patch>,
    checksum: Checksum,
    children: Vec<usize>,
    /// Full text content. `Some` only for the root slot.
    content: Option<String>,
}

/// A branching tree of commits for a single tracked file.
pub struct HistoryTree {
    nodes: Vec<Slot>,
    index: HashMap<NodeId, usize>,
}

impl HistoryTree {
    /// Creates a fresh tree with a single root node holding `content`.
    /// Returns the tree and the id of its root.
    pub fn new(content: String, timestamp: Timestamp) -> (Self, NodeId) {
        let id = NodeId::new();
        let checksum = Checksum::of(&content);
        let root = Slot {
            id,
            parent: None,
            patches: Vec::new(),
            checksum,
            children: Vec::new(),
            content: Some(content),
        };
        tracing::info!(
            node = %id,
            timestamp = timestamp.millis_since_epoch,
            "history: created root"
        );
        (
            Self {
                nodes: vec![root],
                index: HashMap::from([(id, 0)]),
            },
            id,
        )
    }

    pub fn root_id(&self) -> NodeId {
        self.nodes[0].id
    }

    /// The root's full-text content, as persisted in the sibling `content`
    /// file. Unlike [`Self::content`], this is a direct read with no
    /// checksum verification — callers that need the verified form should
    /// go through `content(self.root_id())` instead.
    pub fn root_content(&self) -> &str {
        self.nodes[0].content.as_deref().expect("root slot always carries content")
    }

    fn require_index(&self, id: NodeId) -> Result<usize, HistoryError> {
        self.index.get(&id).copied().ok_or(HistoryError::UnknownNode(id))
    }

    /// Reconstructs the content of `id` by applying the path of patches
    /// from root, then verifies the result against the node's recorded
    /// checksum. A mismatch means on-disk or in-memory corruption and is
    /// fatal — callers should not attempt to recover from it.
    #[tracing::instrument(skip(self))]
    pub fn content(&self, id: NodeId) -> Result<String, HistoryError> {
        let idx = self.require_index(id)?;

        let mut path = Vec::new();
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            path.push(i);
            cursor = self.nodes[i].parent;
        }
        path.reverse(); // root first

        let root_idx = path[0];
        let root_content = self.nodes[root_idx]
            .content
            .as_deref()
            .expect("root slot always carries content");

        let patches: Vec<Patch> = path[1..]
            .iter()
            .flat_map(|&i| self.nodes[i].patches.iter().cloned())
            .collect();
        let reconstructed = patch::apply(&patches, root_content);

        if Checksum::of(&reconstructed) != self.nodes[idx].checksum {
            return Err(HistoryError::ChecksumMismatch { node: id });
        }
        Ok(reconstructed)
    }

    /// Commits `contents` as a child of `at`, the currently-selected node.
    /// Returns `None` (and does nothing) if `contents` hashes the same as
    /// `at`'s recorded checksum.
    pub fn add_commit(
        &mut self,
        at: NodeId,
        contents: &str,
        timestamp: Timestamp,
    ) -> Result<Option<NodeId>, HistoryError> {
        let idx = self.require_index(at)?;
        let new_checksum = Checksum::of(contents);
        if new_checksum == self.nodes[idx].checksum {
            tracing::debug!(node = %at, "history: add_commit is a no-op, content unchanged");
            return Ok(None);
        }

        let parent_content = self.content(at)?;
        let patch = patch::diff(&parent_content, contents);

        let new_id = NodeId::new();
        let new_idx = self.nodes.len();
        self.nodes.push(Slot {
            id: new_id,
            parent: Some(idx),
            patches: vec![patch],
            checksum: new_checksum,
            children: Vec::new(),
            content: None,
        });
        self.nodes[idx].children.push(new_idx);
        self.index.insert(new_id, new_idx);

        tracing::info!(
            parent = %at,
            child = %new_id,
            timestamp = timestamp.millis_since_epoch,
            "history: committed"
        );
        Ok(Some(new_id))
    }

    /// Depth-first search for `target` within the sub-tree rooted at `from`
    /// (inclusive).
    pub fn node_with_id(&self, from: NodeId, target: NodeId) -> Option<NodeId> {
        let start = *self.index.get(&from)?;
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if self.nodes[idx].id == target {
                return Some(target);
            }
            stack.extend(self.nodes[idx].children.iter().rev().copied());
        }
        None
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Serializes the tree to its node-array JSON form. The root's
    /// full-text content is *not* included — it is persisted separately as
    /// the per-file `content` file.
    pub fn to_json(&self) -> Result<String, HistoryError> {
        let wire: Vec<WireNode> = self
            .nodes
            .iter()
            .map(|slot| WireNode {
                parent: slot
                    .parent
                    .map(|p| self.nodes[p].id.to_string())
                    .unwrap_or_default(),
                patches: patch::to_text(&slot.patches),
                checksum: slot.checksum.hex(),
                children: slot.children.iter().map(|&c| self.nodes[c].id.to_string()).collect(),
                uuid: slot.id.to_string(),
            })
            .collect();
        serde_json::to_string_pretty(&wire).map_err(|err| HistoryError::Decode(err.to_string()))
    }

    /// Rebuilds a tree from the node-array JSON form written by
    /// [`Self::to_json`], given the root's full-text content (read from the
    /// sibling `content` file).
    pub fn from_json(text: &str, root_content: String) -> Result<Self, HistoryError> {
        let wire: Vec<WireNode> =
            serde_json::from_str(text).map_err(|err| HistoryError::Decode(err.to_string()))?;

        let roots: Vec<&WireNode> = wire.iter().filter(|n| n.parent.is_empty()).collect();
        let root_wire = match roots.as_slice() {
            [] => return Err(HistoryError::MissingRoot),
            [single] => *single,
            many => return Err(HistoryError::MultipleRoots(many.len())),
        };

        let by_id: HashMap<&str, &WireNode> = wire.iter().map(|n| (n.uuid.as_str(), n)).collect();

        let root_id = parse_node_id(&root_wire.uuid)?;
        let root_checksum = parse_checksum(&root_wire.checksum, &root_wire.uuid)?;

        let mut nodes = Vec::with_capacity(wire.len());
        let mut index = HashMap::with_capacity(wire.len());
        nodes.push(Slot {
            id: root_id,
            parent: None,
            patches: Vec::new(),
            checksum: root_checksum,
            children: Vec::new(),
            content: Some(root_content),
        });
        index.insert(root_id, 0);

        let mut queue: VecDeque<(usize, &WireNode)> = VecDeque::new();
        queue.push_back((0, root_wire));
        while let Some((parent_idx, parent_wire)) = queue.pop_front() {
            for child_uuid in &parent_wire.children {
                let child_wire = by_id
                    .get(child_uuid.as_str())
                    .ok_or_else(|| HistoryError::DanglingReference(child_uuid.clone()))?;
                let child_id = parse_node_id(&child_wire.uuid)?;
                let patches = patch::from_text(&child_wire.patches)?;
                let checksum = parse_checksum(&child_wire.checksum, &child_wire.uuid)?;

                let idx = nodes.len();
                nodes.push(Slot {
                    id: child_id,
                    parent: Some(parent_idx),
                    patches,
                    checksum,
                    children: Vec::new(),
                    content: None,
                });
                index.insert(child_id, idx);
                nodes[parent_idx].children.push(idx);
                queue.push_back((idx, child_wire));
            }
        }

        Ok(Self { nodes, index })
    }
}

fn parse_node_id(uuid: &str) -> Result<NodeId, HistoryError> {
    uuid.parse::<Uuid>()
        .map(NodeId)
        .map_err(|err| HistoryError::Decode(format!("invalid node id {uuid:?}: {err}")))
}

fn parse_checksum(hex: &str, node: &str) -> Result<Checksum, HistoryError> {
    hex.parse()
        .map_err(|_| HistoryError::Decode(format!("invalid checksum for node {node:?}: {hex:?}")))
}

#[derive(Serialize, Deserialize)]
struct WireNode {
    #[serde(rename = "Parent")]
    parent: String,
    #[serde(rename = "Patches")]
    patches: String,
    #[serde(rename = "Checksum")]
    checksum: String,
    #[serde(rename = "Children")]
    children: Vec<String>,
    #[serde(rename = "Uuid")]
    uuid: String,
}

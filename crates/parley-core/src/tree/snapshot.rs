use std::{collections::HashMap, fmt::Write};

use serde::{Deserialize, Serialize};

use crate::tree::node::NodeStatus;

const STATE_LINE_CHARS: usize = 50;
const STATE_LINES: usize = 5;
const ACTION_LABEL_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub schema_version: u32,
    pub tree_id: String,
    pub root_node_id: String,
    pub node_count: usize,
    pub max_depth: u32,
    pub nodes: Vec<NodeSnapshot>,
}

/// Wire view of one node. `value` is the cumulative backpropagated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub parent_id: Option<String>,
    pub state: String,
    pub visits: u64,
    pub value: f64,
    pub action_taken: Option<String>,
    pub depth: u32,
    pub children_ids: Vec<String>,
    pub status: NodeStatus,
    pub evaluation_score: Option<f64>,
}

impl TreeSnapshot {
    /// Render the tree as a Graphviz digraph.
    ///
    /// Nodes deeper than `max_depth` are left out and at most `max_width`
    /// children (most visited first) are drawn per node.
    pub fn to_dot(&self, max_depth: u32, max_width: usize) -> String {
        let by_id: HashMap<&str, &NodeSnapshot> = self
            .nodes
            .iter()
            .map(|node| (node.node_id.as_str(), node))
            .collect();

        let mut out = String::from("digraph mcts {\n  rankdir=TB;\n");
        let mut stack: Vec<&NodeSnapshot> =
            by_id.get(self.root_node_id.as_str()).copied().into_iter().collect();

        while let Some(node) = stack.pop() {
            if node.depth >= max_depth {
                continue;
            }

            let _ = writeln!(
                out,
                "  \"{}\" [shape=box, style=rounded, label=\"{}\\nVisits: {}\\nValue: {:.2}\"];",
                node.node_id,
                escape(&format_state(&node.state)),
                node.visits,
                node.value
            );

            if let Some(parent) = &node.parent_id {
                let action = node.action_taken.as_deref().unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [label=\"{}\"];",
                    parent,
                    node.node_id,
                    escape(&truncate(action, ACTION_LABEL_CHARS))
                );
            }

            let mut children: Vec<&NodeSnapshot> = node
                .children_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect();
            children.sort_by(|a, b| b.visits.cmp(&a.visits));
            children.truncate(max_width);
            // reversed so the most visited child is drawn first
            stack.extend(children.into_iter().rev());
        }

        out.push_str("}\n");
        out
    }
}

fn format_state(state: &str) -> String {
    state
        .lines()
        .take(STATE_LINES)
        .map(|line| truncate(line, STATE_LINE_CHARS))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

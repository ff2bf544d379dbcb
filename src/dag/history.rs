// src/dag/history.rs
//! Flattens an ordered run of DAG nodes into the role/content pairs an
//! adapter sends upstream.

use serde::Serialize;

use crate::store::Message;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Maps topologically-ordered nodes to role/content pairs, dropping
/// empty-content nodes (a cancelled partial turn left behind with no content
/// contributes nothing to history). The `reasoning` field never carries
/// over: only `role`/`content` matter to the model replaying history.
pub fn format_history(nodes: &[Message]) -> Vec<HistoryMessage> {
    nodes
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| HistoryMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use chrono::Utc;

    fn msg(role: &str, content: &str) -> Message {
        Message {
            id: "id".to_string(),
            conversation_id: "c1".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            reasoning: None,
            model: None,
            parent_ids: BTreeSet::new(),
            children: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn maps_role_and_content_in_order() {
        let nodes = vec![msg("user", "hi"), msg("assistant", "hello")];
        let history = format_history(&nodes);
        assert_eq!(
            history,
            vec![
                HistoryMessage { role: "user".into(), content: "hi".into() },
                HistoryMessage { role: "assistant".into(), content: "hello".into() },
            ]
        );
    }

    #[test]
    fn drops_empty_content_nodes() {
        let nodes = vec![msg("user", "hi"), msg("assistant", "")];
        let history = format_history(&nodes);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "user");
    }
}

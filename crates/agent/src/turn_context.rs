//! Transient per-turn state, owned by the orchestrator for one turn.

use std::collections::HashSet;

use threadloom_core::message::{Message, MessageToolCall};
use threadloom_core::thread::StoredMessage;
use threadloom_core::tool::ToolCallRequest;

use crate::model_adapter::new_call_id;

pub struct TurnContext {
    /// System prompt first, then the thread's history and this turn's steps
    transcript: Vec<Message>,
    budget_remaining: u32,
    tool_calls_made: u32,
    call_ids: HashSet<String>,
}

impl TurnContext {
    pub fn new(system_prompt: &str, history: Vec<StoredMessage>, tool_budget: u32) -> Self {
        let mut transcript = Vec::with_capacity(history.len() + 1);
        if !system_prompt.trim().is_empty() {
            transcript.push(Message::system(system_prompt));
        }
        transcript.extend(history.into_iter().map(|m| m.message));
        drop_unanswered_calls(&mut transcript);

        Self {
            transcript,
            budget_remaining: tool_budget,
            tool_calls_made: 0,
            call_ids: HashSet::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn has_budget(&self) -> bool {
        self.budget_remaining > 0
    }

    /// Spend one tool iteration.
    pub fn consume_budget(&mut self) {
        self.budget_remaining = self.budget_remaining.saturating_sub(1);
    }

    pub fn budget_remaining(&self) -> u32 {
        self.budget_remaining
    }

    /// Reserve the call's id for this turn.
    ///
    /// A model that reuses an id gets a fresh one assigned, so every id
    /// correlates to exactly one execution.
    pub fn claim_call_id(&mut self, call: &mut ToolCallRequest) {
        if !self.call_ids.insert(call.id.clone()) {
            call.id = new_call_id();
            self.call_ids.insert(call.id.clone());
        }
        self.tool_calls_made += 1;
    }

    pub fn tool_calls_made(&self) -> u32 {
        self.tool_calls_made
    }

    /// Requested tool calls that have no result in the transcript yet.
    pub fn open_calls(&self) -> Vec<MessageToolCall> {
        let answered = answered_ids(&self.transcript);
        self.transcript
            .iter()
            .flat_map(|m| &m.tool_calls)
            .filter(|c| !answered.contains(&c.id))
            .cloned()
            .collect()
    }
}

fn answered_ids(messages: &[Message]) -> HashSet<String> {
    messages
        .iter()
        .filter_map(|m| m.tool_call_id.clone())
        .collect()
}

/// Remove tool calls an earlier, interrupted turn never answered.
///
/// Chat-completions APIs reject a transcript where an assistant tool call is
/// not followed by its result. An assistant message left with no calls and
/// no text is dropped entirely.
fn drop_unanswered_calls(transcript: &mut Vec<Message>) {
    let answered = answered_ids(transcript);
    transcript.retain_mut(|m| {
        if m.tool_calls.is_empty() {
            return true;
        }
        m.tool_calls.retain(|c| answered.contains(&c.id));
        !m.tool_calls.is_empty() || !m.content.trim().is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadloom_core::message::Role;
    use threadloom_core::thread::Thread;

    fn wire_call(id: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "web_search".into(),
            arguments: "{}".into(),
        }
    }

    fn context(budget: u32) -> TurnContext {
        let thread = Thread::new("alice");
        let history = vec![
            StoredMessage::new(&thread, 1, Message::user("earlier question")),
            StoredMessage::new(&thread, 2, Message::assistant("earlier answer")),
        ];
        TurnContext::new("Be helpful.", history, budget)
    }

    #[test]
    fn transcript_starts_with_system_prompt_then_history() {
        let ctx = context(3);
        let roles: Vec<Role> = ctx.transcript().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn blank_system_prompt_is_skipped() {
        let ctx = TurnContext::new("  ", vec![], 1);
        assert!(ctx.transcript().is_empty());
    }

    #[test]
    fn budget_counts_down_and_saturates() {
        let mut ctx = context(1);
        assert!(ctx.has_budget());
        ctx.consume_budget();
        assert!(!ctx.has_budget());
        ctx.consume_budget();
        assert_eq!(ctx.budget_remaining(), 0);
    }

    #[test]
    fn reused_call_ids_are_replaced() {
        let mut ctx = context(3);
        let mut first = ToolCallRequest {
            id: "call_0".into(),
            name: "web_search".into(),
            arguments: serde_json::json!({}),
        };
        let mut second = first.clone();

        ctx.claim_call_id(&mut first);
        ctx.claim_call_id(&mut second);
        assert_eq!(first.id, "call_0");
        assert_ne!(second.id, "call_0");
        assert_eq!(ctx.tool_calls_made(), 2);
    }

    #[test]
    fn unanswered_calls_from_history_are_dropped() {
        let thread = Thread::new("alice");
        let history = vec![
            StoredMessage::new(&thread, 1, Message::user("first")),
            StoredMessage::new(
                &thread,
                2,
                Message::assistant_tool_calls("", vec![wire_call("call_a"), wire_call("call_b")]),
            ),
            StoredMessage::new(&thread, 3, Message::tool_result("call_a", "web_search", "hits")),
            StoredMessage::new(&thread, 4, Message::user("second")),
            StoredMessage::new(&thread, 5, Message::assistant_tool_calls("", vec![wire_call("call_c")])),
            StoredMessage::new(&thread, 6, Message::user("third")),
        ];

        let ctx = TurnContext::new("", history, 3);
        let roles: Vec<Role> = ctx.transcript().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::User, Role::User]
        );
        let kept: Vec<&str> = ctx.transcript()[1].tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(kept, vec!["call_a"]);
        assert!(ctx.open_calls().is_empty());
    }

    #[test]
    fn open_calls_tracks_this_turns_requests() {
        let mut ctx = context(3);
        ctx.push(Message::assistant_tool_calls(
            "looking",
            vec![wire_call("call_1"), wire_call("call_2")],
        ));
        ctx.push(Message::tool_result("call_1", "web_search", "hits"));

        let open: Vec<String> = ctx.open_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(open, vec!["call_2".to_string()]);
    }
}

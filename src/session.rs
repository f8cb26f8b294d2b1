use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Explicit per-session context replacing framework session state. Durable
/// fields (user, selected plan) survive navigation; the chat history is
/// transient and evicted oldest-first once it hits the cap.
#[derive(Debug)]
pub struct SessionContext {
    user_id: String,
    plan_id: Option<i32>,
    history: VecDeque<ChatTurn>,
    history_cap: usize,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_history_cap(user_id, DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(user_id: impl Into<String>, history_cap: usize) -> Self {
        Self {
            user_id: user_id.into(),
            plan_id: None,
            history: VecDeque::new(),
            history_cap,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn plan_id(&self) -> Option<i32> {
        self.plan_id
    }

    pub fn select_plan(&mut self, plan_id: i32) {
        self.plan_id = Some(plan_id);
    }

    pub fn push_turn(&mut self, role: ChatRole, content: impl Into<String>) {
        if self.history_cap == 0 {
            return;
        }
        while self.history.len() >= self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(ChatTurn {
            role,
            content: content.into(),
        });
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatTurn> {
        self.history.iter()
    }

    /// Navigation boundary: transient state goes, durable selections stay.
    pub fn clear_transient(&mut self) {
        self.history.clear();
    }
}

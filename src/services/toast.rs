//! Toast notifications
//!
//! Toasts are queued on the visitor's session and rendered once, on the next
//! page view. The template hides each one after `auto_hide_ms`.

use serde::{Deserialize, Serialize};

/// Severity of a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToastKind {
    Success,
    Info,
    Danger,
    Warning,
}

impl ToastKind {
    /// CSS classes for the alert element
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "alert alert-success",
            Self::Info => "alert alert-info",
            Self::Danger => "alert alert-error",
            Self::Warning => "alert alert-warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub id: u64,
    pub body: String,
    pub kind: ToastKind,
    pub class_name: String,
    /// 0 keeps the toast until dismissed
    pub auto_hide_ms: u64,
}

/// Pending toasts of one visitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastQueue {
    next_id: u64,
    toasts: Vec<Toast>,
}

impl ToastQueue {
    /// Queue a toast and return its id
    pub fn show(&mut self, body: impl Into<String>, kind: ToastKind, auto_hide_ms: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.toasts.push(Toast {
            id,
            body: body.into(),
            kind,
            class_name: kind.css_class().to_string(),
            auto_hide_ms,
        });
        id
    }

    pub fn remove(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    /// Take every pending toast, oldest first
    pub fn drain(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }
}

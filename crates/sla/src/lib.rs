//! Gryork SLA Tracker & Escalation Engine
//!
//! Enforces per-stage time budgets without human input.
//!
//! ```text
//!   created ──► ACTIVE ──day3──► REMINDER_1_SENT ──day7──► REMINDER_2_SENT
//!                                                              │ day10
//!                                                              ▼
//!   COMPLETED ◄── day14 completed / stage closed ──────── ESCALATED
//!                                                              │ day14
//!   CANCELLED ◄── case reached a terminal status               ▼
//!                                                           DORMANT
//! ```
//!
//! The tick is idempotent: every step checks the current status before
//! acting, writes through the store's version guard, and only notifies
//! after its write has committed.

pub mod class;
pub mod engine;
pub mod escalation;
pub mod notifier;

pub use class::{SlaClass, SlaConfig};
pub use engine::{SlaDashboard, SlaEngine, TickFailure, TickReport};
pub use escalation::{advance, complete_milestone, Advance};
pub use notifier::{ChannelNotifier, LogNotifier, NotifyError, SlaEvent, SlaNotification, SlaNotifier};

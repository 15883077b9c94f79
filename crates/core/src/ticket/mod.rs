//! Helpdesk ticket model and category rules.

mod types;

pub use types::{CategorizedTicket, CategoryWindows, Interaction, Ticket, TicketCategory, Urgency};

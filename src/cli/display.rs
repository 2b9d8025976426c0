use console::{Style, style};

use crate::ledger::{HistoryEntry, Infringement, Page};
use crate::session::{Session, SessionStatus};

pub struct Display;

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_session(&self, session: &Session) {
        println!(
            "{}  {}  started {}",
            style(&session.name).bold(),
            self.status_style(session.status)
                .apply_to(session.status.to_string()),
            style(session.started_at.format("%Y-%m-%d %H:%M:%S UTC")).dim()
        );
    }

    pub fn print_sessions(&self, sessions: &[Session]) {
        if sessions.is_empty() {
            self.print_info("No sessions yet");
            return;
        }
        self.print_header("Sessions");
        for session in sessions {
            self.print_session(session);
        }
    }

    pub fn print_infringement(&self, inf: &Infringement) {
        let penalty = match (&inf.penalty_description, inf.penalty_due) {
            (Some(desc), true) => style(format!("{} (due)", desc)).red().bold(),
            (Some(desc), false) => style(desc.clone()).yellow(),
            (None, _) => style("-".to_string()).dim(),
        };

        println!(
            "#{:<5} kart {:<4} {}  warnings {}  {}",
            inf.id,
            inf.kart_number,
            style(&inf.description).white(),
            inf.warning_count,
            penalty
        );

        let mut detail = vec![format!("at {}", inf.created_at.format("%H:%M:%S"))];
        if let Some(turn) = &inf.turn_number {
            detail.push(format!("turn {}", turn));
        }
        if let Some(observer) = &inf.observer {
            detail.push(format!("observer {}", observer));
        }
        if let Some(taken) = inf.penalty_taken_at {
            detail.push(format!("served {}", taken.format("%H:%M:%S")));
        }
        println!("       {}", style(detail.join(", ")).dim());
    }

    pub fn print_infringements(&self, title: &str, items: &[Infringement]) {
        self.print_header(title);
        if items.is_empty() {
            self.print_info("Nothing recorded");
            return;
        }
        for inf in items {
            self.print_infringement(inf);
        }
    }

    pub fn print_page(&self, page: &Page<Infringement>) {
        self.print_infringements(
            &format!(
                "Infringements (page {}/{}, {} total)",
                page.page,
                page.total_pages.max(1),
                page.total
            ),
            &page.items,
        );
    }

    pub fn print_history(&self, kart: i64, entries: &[HistoryEntry]) {
        self.print_header(&format!("History for kart {}", kart));
        for entry in entries {
            println!(
                "{}  {:<16} #{:<5} {}  {}",
                style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
                style(entry.action.as_str()).cyan(),
                entry.infringement_id,
                style(&entry.performed_by).bold(),
                entry.details
            );
        }
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    fn status_style(&self, status: SessionStatus) -> Style {
        match status {
            SessionStatus::Active => Style::new().green().bold(),
            SessionStatus::Closed => Style::new().dim(),
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

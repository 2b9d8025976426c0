use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kart_steward::Steward;
use kart_steward::cli::{
    Cli, Commands, ConfigAction, Display, OutputFormat, PenaltyAction, SessionAction,
};
use kart_steward::config::StewardConfig;
use kart_steward::error::Result;
use kart_steward::output::OutputWriter;

/// Context for command output handling.
struct OutputContext<'a> {
    display: &'a Display,
    writer: &'a OutputWriter,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.public_message());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kart_steward=debug")
    } else {
        EnvFilter::new("kart_steward=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let display = Display::new();
    let writer = OutputWriter::new(cli.output);
    let out = OutputContext {
        display: &display,
        writer: &writer,
    };

    let config = StewardConfig::load(&cli.data_dir).await?;
    let steward = Steward::open(config).await?;

    match cli.command {
        Commands::Session { action } => cmd_session(&out, &steward, action).await,
        Commands::Record(args) => {
            let inf = steward.record(args.into()).await?;
            out.writer.emit(&inf, |inf| {
                out.display.print_success("Infringement recorded");
                out.display.print_infringement(inf);
            });
            Ok(())
        }
        Commands::Amend { id, args } => {
            let inf = steward.amend(id, args.into()).await?;
            out.writer.emit(&inf, |inf| {
                out.display.print_success("Infringement amended");
                out.display.print_infringement(inf);
            });
            Ok(())
        }
        Commands::Remove { id, by } => {
            let removed = steward.remove(id, &by).await?;
            out.writer.emit(&removed, |inf| {
                out.display
                    .print_success(&format!("Infringement #{} removed", inf.id));
            });
            Ok(())
        }
        Commands::Penalty { action } => cmd_penalty(&out, &steward, action).await,
        Commands::List { page, page_size } => {
            match page {
                Some(page) => {
                    let result = steward.list_paginated(page, page_size).await?;
                    out.writer.emit(&result, |p| out.display.print_page(p));
                }
                None => {
                    let all = steward.list_all().await?;
                    out.writer
                        .emit(&all, |all| out.display.print_infringements("Infringements", all));
                }
            }
            Ok(())
        }
        Commands::History { kart } => {
            let entries = steward.history_for_kart(kart).await?;
            out.writer
                .emit(&entries, |entries| out.display.print_history(kart, entries));
            Ok(())
        }
        Commands::Config { action } => cmd_config(&out, &steward, action).await,
    }
}

async fn cmd_session(
    out: &OutputContext<'_>,
    steward: &Steward,
    action: SessionAction,
) -> Result<()> {
    match action {
        SessionAction::Start { name } => {
            let session = steward.start_session(&name).await?;
            out.writer.emit(&session, |s| {
                out.display
                    .print_success(&format!("Session '{}' started", s.name));
            });
        }
        SessionAction::Load { name } => {
            let session = steward.load_session(&name).await?;
            out.writer.emit(&session, |s| {
                out.display
                    .print_success(&format!("Session '{}' loaded", s.name));
            });
        }
        SessionAction::Close { name } => {
            let session = steward.close_session(&name).await?;
            out.writer.emit(&session, |s| {
                out.display
                    .print_success(&format!("Session '{}' closed", s.name));
            });
        }
        SessionAction::Delete { name } => {
            steward.delete_session(&name).await?;
            out.writer
                .emit_message(&format!("Session '{}' deleted", name));
        }
        SessionAction::List => {
            let sessions = steward.list_sessions().await?;
            out.writer
                .emit(&sessions, |sessions| out.display.print_sessions(sessions));
        }
        SessionAction::Active => {
            let active = steward.active_session().await?;
            out.writer.emit(&active, |active| match active {
                Some(session) => out.display.print_session(session),
                None => out.display.print_warning("No active session"),
            });
        }
        SessionAction::Export { name } => {
            let path = steward.export_session_to_file(&name).await?;
            out.writer
                .emit_message(&format!("Exported to {}", path.display()));
        }
        SessionAction::Import { path, name } => {
            let summary = steward.import_session_file(&path, name.as_deref()).await?;
            out.writer.emit(&summary, |s| {
                out.display.print_success(&format!(
                    "Imported '{}': {} infringements, {} history entries",
                    s.session.name, s.infringements, s.history
                ));
            });
        }
    }
    Ok(())
}

async fn cmd_penalty(
    out: &OutputContext<'_>,
    steward: &Steward,
    action: PenaltyAction,
) -> Result<()> {
    match action {
        PenaltyAction::Apply { id, by } => {
            let applied = steward.apply_penalty(id, &by).await?;
            out.writer.emit(&applied, |inf| {
                out.display.print_success("Penalty applied");
                out.display.print_infringement(inf);
            });
        }
        PenaltyAction::ApplyAll { kart, by } => {
            let outcome = steward.apply_all_pending(kart, &by).await?;
            out.writer.emit(&outcome, |o| {
                out.display.print_success(&format!(
                    "Applied {} penalties for kart {}",
                    o.applied.len(),
                    o.kart_number
                ));
            });
        }
        PenaltyAction::Pending => {
            let pending = steward.list_pending().await?;
            out.writer.emit(&pending, |pending| {
                out.display.print_infringements("Pending penalties", pending)
            });
        }
    }
    Ok(())
}

async fn cmd_config(
    out: &OutputContext<'_>,
    steward: &Steward,
    action: ConfigAction,
) -> Result<()> {
    let minutes = match action {
        ConfigAction::GetExpiry => steward.warning_expiry_minutes().await?,
        ConfigAction::SetExpiry { minutes } => steward.set_warning_expiry_minutes(minutes).await?,
    };

    if out.writer.format() == OutputFormat::Json {
        out.writer
            .emit(&serde_json::json!({ "warning_expiry_minutes": minutes }), |_| {});
    } else {
        out.display
            .print_info(&format!("Warning expiry: {} minutes", minutes));
    }
    Ok(())
}

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    build_command, CommandRunner, DisplayLine, DisplaySink, FormState, HttpStateQuery, SessionOutcome, WsConnector,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "runner", about = "Run testbed commands through the orchestration server")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Deployment the command acts on.
    #[arg(long, short)]
    target: Option<String>,
    /// Print lines as HTML instead of plain text.
    #[arg(long)]
    html: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Up {
        #[arg(long)]
        provision: bool,
        #[arg(long)]
        rerun_scripts: bool,
    },
    Down,
    GenerateArtefacts,
    ClearArtefacts,
    CloudImages,
    TestbedSnapshot {
        #[arg(long)]
        snapshot_guests: bool,
    },
    #[command(subcommand)]
    Snapshot(SnapshotAction),
    Exec {
        guest: String,
        #[command(subcommand)]
        kind: ExecKind,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    Create(SnapshotArgs),
    Delete(SnapshotArgs),
    Info {
        #[arg(long, short)]
        name: String,
    },
    List {
        #[arg(long, short)]
        name: Option<String>,
        #[arg(long, short)]
        all: bool,
    },
    Restore(SnapshotArgs),
}

#[derive(ClapArgs, Debug)]
struct SnapshotArgs {
    #[arg(long, short)]
    name: Option<String>,
    #[arg(long, short)]
    snapshot: Option<String>,
    #[arg(long, short)]
    all: bool,
}

#[derive(Subcommand, Debug)]
enum ExecKind {
    Shell {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    Script {
        #[arg(long)]
        run_on_master: bool,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        script: Vec<String>,
    },
    /// One of a_d_b, frida_setup, test_permissions, test_privacy, t_l_s_intercept.
    Tool {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        arguments: Vec<String>,
    },
}

struct StdoutSink {
    html: bool,
}

impl DisplaySink for StdoutSink {
    fn append(&self, line: DisplayLine) {
        if self.html {
            println!("{}<br>", line.render_html());
        } else {
            println!("{}", line.render_text());
        }
    }
}

/// Mirrors what the operator would fill into the command form.
fn form_for(command: &Command, target_name: &str) -> FormState {
    match command {
        Command::Up {
            provision,
            rerun_scripts,
        } => FormState::new(target_name, "up")
            .with_flag("provision", *provision)
            .with_flag("rerun_scripts", *rerun_scripts),
        Command::Down => FormState::new(target_name, "down"),
        Command::GenerateArtefacts => FormState::new(target_name, "generate_artefacts"),
        Command::ClearArtefacts => FormState::new(target_name, "clear_artefacts"),
        Command::CloudImages => FormState::new(target_name, "cloud_images"),
        Command::TestbedSnapshot { snapshot_guests } => {
            FormState::new(target_name, "testbed_snapshot").with_flag("snapshot_guests", *snapshot_guests)
        }
        Command::Snapshot(action) => snapshot_form(action, target_name),
        Command::Exec { guest, kind } => {
            let mut form = match kind {
                ExecKind::Shell { command } => {
                    let mut form = FormState::new(target_name, "exec").with_text("command", command.join(" "));
                    form.exec_option = Some("shell_command".into());
                    form
                }
                ExecKind::Script { run_on_master, script } => {
                    let mut form = FormState::new(target_name, "exec")
                        .with_text("script", script.join(" "))
                        .with_flag("run_on_master", *run_on_master);
                    form.exec_option = Some("user_script".into());
                    form
                }
                ExecKind::Tool { name, arguments } => {
                    let mut form = FormState::new(target_name, "exec").with_text("command", quote_arguments(arguments));
                    form.exec_option = Some("tool".into());
                    form.tool_option = Some(name.clone());
                    form
                }
            };
            form.guest_name = Some(guest.clone());
            form
        }
    }
}

fn snapshot_form(action: &SnapshotAction, target_name: &str) -> FormState {
    let (option, name, snapshot, all) = match action {
        SnapshotAction::Create(args) => ("create", args.name.clone(), args.snapshot.clone(), args.all),
        SnapshotAction::Delete(args) => ("delete", args.name.clone(), args.snapshot.clone(), args.all),
        SnapshotAction::Restore(args) => ("restore", args.name.clone(), args.snapshot.clone(), args.all),
        SnapshotAction::Info { name } => ("info", Some(name.clone()), None, false),
        SnapshotAction::List { name, all } => ("list", name.clone(), None, *all),
    };
    let mut form = FormState::new(target_name, "snapshot").with_flag("all", all);
    if let Some(name) = name {
        form = form.with_text("name", name);
    }
    if let Some(snapshot) = snapshot {
        form = form.with_text("snapshot", snapshot);
    }
    form.snapshot_option = Some(option.into());
    form
}

/// Arguments already split by the shell keep their boundaries through the tool
/// tokenizer.
fn quote_arguments(arguments: &[String]) -> String {
    arguments
        .iter()
        .map(|arg| {
            if arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url.clone() {
        settings.server_url = server_url;
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let target_name = args
        .target
        .clone()
        .or_else(|| settings.target_name.clone())
        .context("no target deployment given, pass --target or set APP__TARGET_NAME")?;
    let request = build_command(&form_for(&args.command, &target_name));
    if request.sub_command.is_none() {
        bail!("the selected command is incomplete or unknown");
    }

    let connector = WsConnector::new(&settings.server_url)
        .context("invalid server url")?
        .with_paths(settings.generation_path.clone(), settings.execution_path.clone());
    let state_query = HttpStateQuery::new(settings.server_url.clone()).with_path(settings.state_path.clone());
    let sink = Arc::new(StdoutSink { html: args.html });
    let runner = CommandRunner::new_with_state_query(Arc::new(connector), Arc::new(state_query), sink);

    let mut session = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.submit(request).await })
    };
    let report = loop {
        tokio::select! {
            joined = &mut session => break joined.context("command session task failed")??,
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("interrupt received, requesting cancellation");
                if let Err(err) = runner.cancel().await {
                    warn!(%err, "cancellation was not forwarded");
                }
            }
        }
    };

    info!(session_id = %report.session_id, outcome = ?report.outcome, "session finished");
    if report.outcome != SessionOutcome::Done {
        bail!("command ended with {:?}", report.outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::command_builder::tokenize_arguments;
    use shared::command::{SnapshotSubCommand, SubCommand};

    #[test]
    fn tool_arguments_survive_the_form_round_trip() {
        let arguments = vec!["shell".to_string(), "echo hello".to_string()];
        assert_eq!(tokenize_arguments(&quote_arguments(&arguments)), arguments);
    }

    #[test]
    fn cli_commands_map_to_requests() {
        let args = Args::parse_from(["runner", "--target", "lab1", "snapshot", "list", "--all"]);
        let request = build_command(&form_for(&args.command, "lab1"));
        let Some(SubCommand::Snapshot(snapshot)) = request.sub_command else {
            panic!("expected snapshot command");
        };
        assert!(matches!(snapshot.sub_command, SnapshotSubCommand::List(list) if list.all && list.name.is_none()));

        let args = Args::parse_from(["runner", "exec", "vm1", "shell", "ls", "-la"]);
        let request = build_command(&form_for(&args.command, "lab1"));
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value["sub_command"]["Exec"]["command_type"]["shell_command"]["command"],
            serde_json::json!(["ls -la"])
        );
    }
}

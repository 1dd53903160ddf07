//! Turns the operator's form selection into a [`CommandRequest`].

use std::collections::BTreeMap;

use shared::command::{
    CommandRequest, ExecCmd, ExecCmdType, GuestSnapshot, ShellCommand, SnapshotCmd, SnapshotInfo,
    SnapshotSubCommand, SubCommand, TestbedSnapshotCmd, TestbedTool, ToolArguments, ToolCommand, UpCmd,
    UserScript,
};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

/// Current state of the command form. Field ids follow the server's field names,
/// e.g. `provision`, `snapshot`, `command`, `run_on_master`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub target_name: String,
    pub entry: String,
    pub snapshot_option: Option<String>,
    pub exec_option: Option<String>,
    pub tool_option: Option<String>,
    pub guest_name: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl FormState {
    pub fn new(target_name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            entry: entry.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, id: &str, value: impl Into<String>) -> Self {
        self.fields.insert(id.to_string(), FieldValue::Text(value.into()));
        self
    }

    pub fn with_flag(mut self, id: &str, value: bool) -> Self {
        self.fields.insert(id.to_string(), FieldValue::Flag(value));
        self
    }

    /// Trimmed text value; blank and missing fields are `None`.
    fn text(&self, id: &str) -> Option<String> {
        match self.fields.get(id) {
            Some(FieldValue::Text(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => None,
        }
    }

    fn flag(&self, id: &str) -> bool {
        matches!(self.fields.get(id), Some(FieldValue::Flag(true)))
    }
}

/// Builds the request for the selected catalog entry. Unknown or incomplete
/// selections produce a request without a sub-command; callers decide whether to
/// submit it.
pub fn build_command(form: &FormState) -> CommandRequest {
    let sub_command = sub_command(form);
    if sub_command.is_none() {
        warn!(
            entry = %form.entry,
            target_name = %form.target_name,
            "command selection did not map to a known command"
        );
    }
    CommandRequest::new(form.target_name.clone(), sub_command)
}

fn sub_command(form: &FormState) -> Option<SubCommand> {
    match form.entry.as_str() {
        "up" => Some(SubCommand::Up(UpCmd {
            provision: form.flag("provision"),
            rerun_scripts: form.flag("rerun_scripts"),
        })),
        "down" => Some(SubCommand::Down),
        "generate_artefacts" => Some(SubCommand::GenerateArtefacts),
        "clear_artefacts" => Some(SubCommand::ClearArtefacts),
        "cloud_images" => Some(SubCommand::CloudImages),
        "testbed_snapshot" => Some(SubCommand::TestbedSnapshot(TestbedSnapshotCmd {
            snapshot_guests: form.flag("snapshot_guests"),
        })),
        "snapshot" => snapshot_sub_command(form).map(|sub_command| SubCommand::Snapshot(SnapshotCmd { sub_command })),
        "exec" => exec_command(form).map(SubCommand::Exec),
        _ => None,
    }
}

fn snapshot_sub_command(form: &FormState) -> Option<SnapshotSubCommand> {
    let info = || SnapshotInfo {
        name: form.text("name"),
        snapshot: form.text("snapshot"),
        all: form.flag("all"),
    };
    match form.snapshot_option.as_deref()? {
        "create" => Some(SnapshotSubCommand::Create(info())),
        "delete" => Some(SnapshotSubCommand::Delete(info())),
        "restore" => Some(SnapshotSubCommand::Restore(info())),
        "info" => form.text("name").map(|name| SnapshotSubCommand::Info { name }),
        "list" => Some(SnapshotSubCommand::List(GuestSnapshot {
            name: form.text("name"),
            all: form.flag("all"),
        })),
        _ => None,
    }
}

fn exec_command(form: &FormState) -> Option<ExecCmd> {
    let guest_name = form.guest_name.as_deref().map(str::trim).filter(|name| !name.is_empty())?;
    let command_type = match form.exec_option.as_deref()? {
        "shell_command" => ExecCmdType::ShellCommand(ShellCommand {
            command: vec![normalize_whitespace(&form.text("command").unwrap_or_default())],
        }),
        "user_script" => ExecCmdType::UserScript(UserScript {
            run_on_master: form.flag("run_on_master"),
            script: vec![normalize_whitespace(&form.text("script").unwrap_or_default())],
        }),
        "tool" => ExecCmdType::Tool(ToolCommand { tool: tool(form)? }),
        _ => return None,
    };
    Some(ExecCmd {
        guest_name: guest_name.to_string(),
        command_type,
    })
}

fn tool(form: &FormState) -> Option<TestbedTool> {
    let arguments = || ToolArguments {
        command: tokenize_arguments(&normalize_whitespace(&form.text("command").unwrap_or_default())),
    };
    match form.tool_option.as_deref()? {
        "a_d_b" => Some(TestbedTool::Adb(arguments())),
        "frida_setup" => Some(TestbedTool::FridaSetup),
        "test_permissions" => Some(TestbedTool::TestPermissions(arguments())),
        "test_privacy" => Some(TestbedTool::TestPrivacy(arguments())),
        "t_l_s_intercept" => Some(TestbedTool::TlsIntercept(arguments())),
        _ => None,
    }
}

/// Trims and collapses every whitespace run to a single space.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits on whitespace, keeping double-quoted runs inside one token. The outer
/// quotes of a token are dropped; an unmatched quote never joins a token.
pub fn tokenize_arguments(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let mut token = String::new();
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                break;
            }
            if c == '"' {
                let Some(offset) = chars[i + 1..].iter().position(|&next| next == '"') else {
                    break;
                };
                let end = i + 1 + offset;
                token.extend(&chars[i..=end]);
                i = end + 1;
                continue;
            }
            token.push(c);
            i += 1;
        }
        if token.is_empty() {
            i += 1;
            continue;
        }
        tokens.push(strip_outer_quotes(&token));
    }
    tokens
}

fn strip_outer_quotes(token: &str) -> String {
    let token = token.strip_prefix('"').unwrap_or(token);
    token.strip_suffix('"').unwrap_or(token).to_string()
}

#[cfg(test)]
#[path = "tests/command_builder_tests.rs"]
mod tests;

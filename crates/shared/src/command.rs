use serde::{Deserialize, Serialize};

/// High-level command submitted on the generation channel. `target_name` is the
/// deployment the command acts on; the server knows it as `project_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "project_name")]
    pub target_name: String,
    pub sub_command: Option<SubCommand>,
}

impl CommandRequest {
    pub fn new(target_name: impl Into<String>, sub_command: Option<SubCommand>) -> Self {
        Self {
            target_name: target_name.into(),
            sub_command,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubCommand {
    Up(UpCmd),
    Down,
    Snapshot(SnapshotCmd),
    GenerateArtefacts,
    ClearArtefacts,
    TestbedSnapshot(TestbedSnapshotCmd),
    CloudImages,
    Exec(ExecCmd),
}

impl SubCommand {
    pub fn name(&self) -> String {
        match self {
            SubCommand::Up(_) => "up".into(),
            SubCommand::Down => "down".into(),
            SubCommand::Snapshot(cmd) => format!("snapshot {}", cmd.sub_command.name()),
            SubCommand::GenerateArtefacts => "generate artefacts".into(),
            SubCommand::ClearArtefacts => "clear artefacts".into(),
            SubCommand::TestbedSnapshot(_) => "testbed snapshot".into(),
            SubCommand::CloudImages => "cloud images".into(),
            SubCommand::Exec(cmd) => format!("exec {} on {}", cmd.command_type.name(), cmd.guest_name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpCmd {
    pub provision: bool,
    pub rerun_scripts: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestbedSnapshotCmd {
    pub snapshot_guests: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCmd {
    pub sub_command: SnapshotSubCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSubCommand {
    Create(SnapshotInfo),
    Delete(SnapshotInfo),
    Info { name: String },
    List(GuestSnapshot),
    Restore(SnapshotInfo),
}

impl SnapshotSubCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SnapshotSubCommand::Create(_) => "create",
            SnapshotSubCommand::Delete(_) => "delete",
            SnapshotSubCommand::Info { .. } => "info",
            SnapshotSubCommand::List(_) => "list",
            SnapshotSubCommand::Restore(_) => "restore",
        }
    }
}

/// Guest and snapshot selection shared by create, delete and restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: Option<String>,
    pub snapshot: Option<String>,
    pub all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSnapshot {
    pub name: Option<String>,
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCmd {
    pub guest_name: String,
    pub command_type: ExecCmdType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecCmdType {
    ShellCommand(ShellCommand),
    Tool(ToolCommand),
    UserScript(UserScript),
}

impl ExecCmdType {
    pub fn name(&self) -> &'static str {
        match self {
            ExecCmdType::ShellCommand(_) => "shell command",
            ExecCmdType::Tool(_) => "tool",
            ExecCmdType::UserScript(_) => "user script",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScript {
    pub run_on_master: bool,
    pub script: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub tool: TestbedTool,
}

/// Tools bundled with the testbed. The server spells the acronyms letter by letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestbedTool {
    #[serde(rename = "a_d_b")]
    Adb(ToolArguments),
    #[serde(rename = "frida_setup")]
    FridaSetup,
    #[serde(rename = "test_permissions")]
    TestPermissions(ToolArguments),
    #[serde(rename = "test_privacy")]
    TestPrivacy(ToolArguments),
    #[serde(rename = "t_l_s_intercept")]
    TlsIntercept(ToolArguments),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolArguments {
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_variant_serializes_as_bare_string() {
        let request = CommandRequest::new("lab1", Some(SubCommand::Down));
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, json!({"project_name": "lab1", "sub_command": "Down"}));
    }

    #[test]
    fn missing_sub_command_serializes_as_null() {
        let request = CommandRequest::new("lab1", None);
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, json!({"project_name": "lab1", "sub_command": null}));
    }

    #[test]
    fn snapshot_sub_command_uses_snake_case_tag() {
        let request = CommandRequest::new(
            "lab1",
            Some(SubCommand::Snapshot(SnapshotCmd {
                sub_command: SnapshotSubCommand::Create(SnapshotInfo {
                    name: Some("vm1".into()),
                    snapshot: Some("s1".into()),
                    all: false,
                }),
            })),
        );
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value["sub_command"],
            json!({"Snapshot": {"sub_command": {"create": {"name": "vm1", "snapshot": "s1", "all": false}}}})
        );
    }

    #[test]
    fn exec_tool_uses_server_spelling() {
        let sub = SubCommand::Exec(ExecCmd {
            guest_name: "phone".into(),
            command_type: ExecCmdType::Tool(ToolCommand {
                tool: TestbedTool::Adb(ToolArguments {
                    command: vec!["shell".into(), "ls".into()],
                }),
            }),
        });
        let value = serde_json::to_value(&sub).expect("serialize");
        assert_eq!(
            value,
            json!({"Exec": {"guest_name": "phone", "command_type": {"tool": {"tool": {"a_d_b": {"command": ["shell", "ls"]}}}}}})
        );

        let frida = serde_json::to_value(TestbedTool::FridaSetup).expect("serialize");
        assert_eq!(frida, json!("frida_setup"));
    }
}

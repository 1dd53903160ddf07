use super::*;
use serde_json::json;

#[test]
fn down_request_has_bare_sub_command() {
    let request = build_command(&FormState::new("lab1", "down"));
    assert_eq!(request.target_name, "lab1");
    assert_eq!(request.sub_command, Some(SubCommand::Down));
}

#[test]
fn up_flags_come_from_checkboxes() {
    let form = FormState::new("lab1", "up").with_flag("provision", true);
    let request = build_command(&form);
    assert_eq!(
        request.sub_command,
        Some(SubCommand::Up(UpCmd {
            provision: true,
            rerun_scripts: false,
        }))
    );
}

#[test]
fn unknown_entries_yield_no_sub_command() {
    assert_eq!(build_command(&FormState::new("lab1", "analysis_tools")).sub_command, None);
    assert_eq!(build_command(&FormState::new("lab1", "snapshot")).sub_command, None);

    let mut exec = FormState::new("lab1", "exec");
    exec.exec_option = Some("shell_command".into());
    assert_eq!(build_command(&exec).sub_command, None, "guest name is required");
}

#[test]
fn snapshot_blank_text_fields_are_absent() {
    let mut form = FormState::new("lab1", "snapshot")
        .with_text("name", "vm1")
        .with_text("snapshot", "   ")
        .with_flag("all", false);
    form.snapshot_option = Some("create".into());
    let value = serde_json::to_value(build_command(&form)).expect("serialize");
    assert_eq!(
        value,
        json!({
            "project_name": "lab1",
            "sub_command": {"Snapshot": {"sub_command": {"create": {"name": "vm1", "snapshot": null, "all": false}}}}
        })
    );
}

#[test]
fn snapshot_info_needs_a_guest_name() {
    let mut form = FormState::new("lab1", "snapshot");
    form.snapshot_option = Some("info".into());
    assert_eq!(build_command(&form).sub_command, None);

    let form = form.with_text("name", "vm1");
    assert_eq!(
        build_command(&form).sub_command,
        Some(SubCommand::Snapshot(SnapshotCmd {
            sub_command: SnapshotSubCommand::Info { name: "vm1".into() },
        }))
    );
}

#[test]
fn shell_command_is_normalized_into_one_element() {
    let mut form = FormState::new("lab1", "exec").with_text("command", "  ls   -la \t /tmp ");
    form.exec_option = Some("shell_command".into());
    form.guest_name = Some("vm1".into());
    let request = build_command(&form);
    assert_eq!(
        request.sub_command,
        Some(SubCommand::Exec(ExecCmd {
            guest_name: "vm1".into(),
            command_type: ExecCmdType::ShellCommand(ShellCommand {
                command: vec!["ls -la /tmp".into()],
            }),
        }))
    );
}

#[test]
fn user_script_keeps_run_on_master_flag() {
    let mut form = FormState::new("lab1", "exec")
        .with_text("script", "setup.sh  --fast")
        .with_flag("run_on_master", true);
    form.exec_option = Some("user_script".into());
    form.guest_name = Some("vm1".into());
    let Some(SubCommand::Exec(exec)) = build_command(&form).sub_command else {
        panic!("expected exec");
    };
    assert_eq!(
        exec.command_type,
        ExecCmdType::UserScript(UserScript {
            run_on_master: true,
            script: vec!["setup.sh --fast".into()],
        })
    );
}

#[test]
fn tool_arguments_are_tokenized() {
    let mut form = FormState::new("lab1", "exec").with_text("command", r#"shell  "echo hello world"  ls"#);
    form.exec_option = Some("tool".into());
    form.tool_option = Some("a_d_b".into());
    form.guest_name = Some("phone".into());
    let Some(SubCommand::Exec(exec)) = build_command(&form).sub_command else {
        panic!("expected exec");
    };
    assert_eq!(
        exec.command_type,
        ExecCmdType::Tool(ToolCommand {
            tool: TestbedTool::Adb(ToolArguments {
                command: vec!["shell".into(), "echo hello world".into(), "ls".into()],
            }),
        })
    );
}

#[test]
fn frida_setup_takes_no_arguments() {
    let mut form = FormState::new("lab1", "exec");
    form.exec_option = Some("tool".into());
    form.tool_option = Some("frida_setup".into());
    form.guest_name = Some("phone".into());
    let value = serde_json::to_value(build_command(&form)).expect("serialize");
    assert_eq!(value["sub_command"]["Exec"]["command_type"], json!({"tool": {"tool": "frida_setup"}}));
}

#[test]
fn tokenizer_handles_quotes() {
    assert_eq!(tokenize_arguments(r#"a "b c" d"#), vec!["a", "b c", "d"]);
    assert_eq!(tokenize_arguments(r#"--flag="x y""#), vec![r#"--flag="x y"#]);
    assert_eq!(tokenize_arguments(r#"abc"def"#), vec!["abc", "def"]);
    assert_eq!(tokenize_arguments(r#"say """#), vec!["say", ""]);
    assert!(tokenize_arguments("   ").is_empty());
}

#[test]
fn normalize_collapses_whitespace() {
    assert_eq!(normalize_whitespace("\t a \n  b  "), "a b");
    assert_eq!(normalize_whitespace(""), "");
}

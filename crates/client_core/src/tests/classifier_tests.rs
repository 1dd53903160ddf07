use super::*;
use crate::display::Tone;
use serde_json::json;

#[test]
fn receipt_acknowledgment_is_counted_but_hidden() {
    let classified = classify(INSTRUCTION_RECEIVED);
    assert_eq!(classified, Classification::Received);
    assert!(!classified.is_log());
    assert!(classified.render(Some("Deploy")).is_empty());
}

#[test]
fn log_replies_are_toned_by_level() {
    let info = classify(r#"{"Log":{"message":"pulling image","level":"Info"}}"#);
    assert!(info.is_log());
    let lines = info.render(None);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].tone, Tone::Success);
    assert_eq!(lines[0].text, "pulling image");

    let error = classify(r#"{"Log":{"message":"disk full","level":"Error"}}"#);
    assert_eq!(error.render(None)[0].tone, Tone::Failure);
}

#[test]
fn generic_and_single_replies_render_one_line() {
    let generic = classify(r#"{"Generic":{"is_success":true,"message":"Testbeds are up"}}"#);
    let lines = generic.render(Some("TestbedHostCheck"));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].tone, Tone::Success);
    assert!(lines[0].timestamp.is_some());

    let single = classify(r#"{"Single":{"is_success":false,"message":"vm1 failed to boot"}}"#);
    let lines = single.render(Some("Deploy"));
    assert_eq!(lines[0].tone, Tone::Failure);
    assert_eq!(lines[0].text, "vm1 failed to boot");
}

#[test]
fn list_replies_partition_by_outcome() {
    let payload = json!({"List": [
        {"is_success": true, "message": "vm1"},
        {"is_success": false, "message": "vm2"},
        {"is_success": true, "message": "vm3"}
    ]})
    .to_string();
    let lines = classify(&payload).render(Some("Deploy"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].tone, Tone::Success);
    assert_eq!(lines[0].text, "Deploy Ok: [ vm1, vm3 ]");
    assert_eq!(lines[1].tone, Tone::Failure);
    assert_eq!(lines[1].text, "Fail: vm2");
}

#[test]
fn list_with_only_successes_has_no_failure_line() {
    let payload = json!({"List": [{"is_success": true, "message": "vm1"}]}).to_string();
    let lines = classify(&payload).render(Some("Destroy"));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "Destroy Ok: vm1");
}

#[test]
fn unknown_text_is_shown_verbatim() {
    let classified = classify("server restarting");
    assert_eq!(classified, Classification::Raw("server restarting".into()));
    assert!(!classified.is_log());
    let lines = classified.render(None);
    assert_eq!(lines[0].tone, Tone::Plain);
    assert_eq!(lines[0].text, "server restarting");
}

#[test]
fn request_line_names_instruction_and_resources() {
    let destroy = GeneratedInstruction::from_value(json!({"instruction": {"Destroy": [
        {"Guest": {"name": "nginx"}},
        {"Guest": {"name": "db"}}
    ]}}));
    assert_eq!(request_line(&destroy).text, "making request: Destroy [ nginx, db ]");

    let check = GeneratedInstruction::from_value(json!({"instruction": "TestbedHostCheck"}));
    assert_eq!(request_line(&check).text, "making request: TestbedHostCheck");
}

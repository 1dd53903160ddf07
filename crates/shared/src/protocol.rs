use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Binary frame asking the execution channel to stop the running command.
pub const CANCEL_FRAME: &str = r#"{"instruction":"Cancel"}"#;
/// Text the execution channel answers with once a cancellation has taken effect.
pub const CANCEL_ACKNOWLEDGMENT: &str = r#"{"Generic":{"is_success":false,"message":"Cancel request"}}"#;
/// Plain-text acknowledgment for a received instruction. Counts as a reply.
pub const INSTRUCTION_RECEIVED: &str = "Receiving instruction OK";

const CANCEL_ACKNOWLEDGMENT_MESSAGE: &str = "Cancel request";

/// Status line sent by the generation channel. `init_msg` marks the initiation
/// acknowledgment; later status lines are progress or failure diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub init_msg: bool,
    pub message: String,
    pub was_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMessage {
    Status(GenerationStatus),
    Instruction(GeneratedInstruction),
}

impl GenerationMessage {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let Some(object) = value.as_object() else {
            return Err(DecodeError::NotAnObject);
        };
        if object.contains_key("init_msg") {
            let status = serde_json::from_value::<GenerationStatus>(value)?;
            return Ok(Self::Status(status));
        }
        Ok(Self::Instruction(GeneratedInstruction {
            raw: text.to_string(),
            value,
        }))
    }
}

/// One low-level instruction as emitted by the generation channel. The raw text is
/// forwarded to the execution channel untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedInstruction {
    raw: String,
    value: Value,
}

impl GeneratedInstruction {
    pub fn from_value(value: Value) -> Self {
        Self {
            raw: value.to_string(),
            value,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn to_frame_bytes(&self) -> Vec<u8> {
        self.raw.as_bytes().to_vec()
    }

    pub fn view(&self) -> InstructionView {
        InstructionView::from_value(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub is_success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Error,
}

/// Replies on the execution channel. Every well-formed reply carries exactly one
/// of these variants as its single outer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestrationResponse {
    Generic { is_success: bool, message: String },
    Single(ResultMessage),
    List(Vec<ResultMessage>),
    Log { level: LogLevel, message: String },
}

impl OrchestrationResponse {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    pub fn is_cancel_acknowledgment(&self) -> bool {
        matches!(
            self,
            Self::Generic { is_success: false, message } if message == CANCEL_ACKNOWLEDGMENT_MESSAGE
        )
    }
}

/// Matches the execution channel's cancellation acknowledgment, either verbatim or
/// as an equivalent JSON document.
pub fn is_cancel_acknowledgment(text: &str) -> bool {
    text.contains(CANCEL_ACKNOWLEDGMENT)
        || OrchestrationResponse::parse(text).is_some_and(|r| r.is_cancel_acknowledgment())
}

/// Instruction tags whose payload is a list of resources.
const RESOURCE_LIST_TAGS: &[&str] = &[
    "Deploy",
    "Destroy",
    "Edit",
    "SetupImage",
    "PushArtefacts",
    "PushBackingImages",
    "RebaseRemoteBackingImages",
    "RunSetupScripts",
];

/// Display-oriented view of a generated instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionView {
    /// Payload-less instruction such as `"TestbedHostCheck"`.
    Unit(String),
    Resources {
        tag: String,
        resources: Vec<ResourceShape>,
    },
    /// Instruction with a payload that carries no resources worth naming.
    Tagged(String),
    Unrecognized,
}

impl InstructionView {
    pub fn from_value(value: &Value) -> Self {
        match value.get("instruction") {
            Some(Value::String(tag)) => Self::Unit(tag.clone()),
            Some(Value::Object(map)) if map.len() == 1 => {
                let Some((tag, payload)) = map.iter().next() else {
                    return Self::Unrecognized;
                };
                if !RESOURCE_LIST_TAGS.contains(&tag.as_str()) {
                    return Self::Tagged(tag.clone());
                }
                let resources = match payload {
                    Value::Array(items) => items.iter().map(ResourceShape::from_value).collect(),
                    single => vec![ResourceShape::from_value(single)],
                };
                Self::Resources {
                    tag: tag.clone(),
                    resources,
                }
            }
            _ => Self::Unrecognized,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Unit(tag) | Self::Tagged(tag) | Self::Resources { tag, .. } => Some(tag),
            Self::Unrecognized => None,
        }
    }

    /// Resource names for the request line, empty when nothing is recognized.
    pub fn context(&self) -> String {
        let Self::Resources { resources, .. } = self else {
            return String::new();
        };
        if resources.is_empty() {
            return "[]".to_string();
        }
        let names: Vec<String> = resources.iter().filter_map(ResourceShape::label).collect();
        match names.len() {
            0 => String::new(),
            1 if resources.len() == 1 => names[0].clone(),
            _ => format!("[ {} ]", names.join(", ")),
        }
    }
}

/// Resource carried by a resource-list instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceShape {
    Guest(String),
    Ovn(OvnResource),
    Unrecognized,
}

impl ResourceShape {
    pub fn from_value(value: &Value) -> Self {
        if let Some(guest) = value.get("Guest") {
            let name = guest
                .get("name")
                .or_else(|| guest.pointer("/guest_type/name"))
                .and_then(Value::as_str);
            return match name {
                Some(name) => Self::Guest(name.to_string()),
                None => Self::Unrecognized,
            };
        }
        if let Some(ovn) = value.pointer("/Network/Ovn") {
            return match serde_json::from_value::<OvnResource>(ovn.clone()) {
                Ok(resource) => Self::Ovn(resource),
                Err(_) => Self::Unrecognized,
            };
        }
        Self::Unrecognized
    }

    pub fn label(&self) -> Option<String> {
        match self {
            Self::Guest(name) => Some(name.clone()),
            Self::Ovn(resource) => Some(format!("Ovn {resource}")),
            Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum OvnResource {
    Switch(NamedResource),
    SwitchPort(NamedResource),
    Router(NamedResource),
    RouterPort(NamedResource),
    OvsPort(OvsPortResource),
    Route(RouteResource),
    Nat(NatResource),
    DhcpOption(DhcpOptionResource),
    ExternalGateway(ExternalGatewayResource),
    #[serde(rename = "ACL")]
    Acl(AclResource),
}

impl fmt::Display for OvnResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch(r) => write!(f, "Switch {}", r.name),
            Self::SwitchPort(r) => write!(f, "Switch Port {}", r.name),
            Self::Router(r) => write!(f, "Router {}", r.name),
            Self::RouterPort(r) => write!(f, "Router Port {}", r.name),
            Self::OvsPort(r) => write!(f, "Bridge {} Ovs Port {}", r.integration_bridge_name, r.name),
            Self::Route(r) => write!(
                f,
                "Static Route (Subnet: {}, Gateway: {}) on LR {}",
                r.prefix, r.next_hop, r.router_name
            ),
            Self::Nat(r) => write!(
                f,
                "Nat Rule (Ip: {}, Subnet: {}, {}) on LR {}",
                r.external_ip,
                r.logical_ip,
                plain(&r.nat_type),
                r.logical_router_name
            ),
            Self::DhcpOption(r) => write!(f, "DHCP Option rule (cidr: {}, router: {})", r.cidr, r.router),
            Self::ExternalGateway(r) => write!(
                f,
                "External Gateway ({}, {}) on LRP {}",
                r.router_port_name, r.chassis_name, r.router_port_name
            ),
            Self::Acl(r) => write!(
                f,
                "ACL (type: {}, action: {}, match: {}, priority: {}) on {}",
                plain(&r.direction),
                plain(&r.action),
                r.match_expr,
                r.priority,
                r.entity_name
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OvsPortResource {
    pub name: String,
    pub integration_bridge_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteResource {
    pub router_name: String,
    pub prefix: OvnAddress,
    pub next_hop: OvnAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NatResource {
    pub logical_router_name: String,
    pub external_ip: OvnAddress,
    pub logical_ip: OvnAddress,
    pub nat_type: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DhcpOptionResource {
    pub cidr: OvnAddress,
    pub router: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalGatewayResource {
    pub router_port_name: String,
    pub chassis_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AclResource {
    pub entity_name: String,
    pub direction: Value,
    pub priority: i64,
    #[serde(rename = "match")]
    pub match_expr: String,
    pub action: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum OvnAddress {
    Ip(String),
    Dynamic,
    Subnet { ip: String, mask: u16 },
}

impl fmt::Display for OvnAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => f.write_str(ip),
            Self::Dynamic => f.write_str("dynamic"),
            Self::Subnet { ip, mask } => write!(f, "{ip}/{mask}"),
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

use shared::protocol::{
    GeneratedInstruction, LogLevel, OrchestrationResponse, ResultMessage, INSTRUCTION_RECEIVED,
};

use crate::display::DisplayLine;

/// What an execution-channel reply turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Response(OrchestrationResponse),
    /// Plain receipt acknowledgment. Counted, never shown.
    Received,
    /// Text that matches no known shape. Shown verbatim.
    Raw(String),
}

pub fn classify(payload: &str) -> Classification {
    if payload == INSTRUCTION_RECEIVED {
        return Classification::Received;
    }
    match OrchestrationResponse::parse(payload) {
        Some(response) => Classification::Response(response),
        None => Classification::Raw(payload.to_string()),
    }
}

impl Classification {
    /// Log lines are progress output and do not count toward the reply quota.
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Response(response) if response.is_log())
    }

    pub fn render(&self, instruction: Option<&str>) -> Vec<DisplayLine> {
        match self {
            Self::Received => Vec::new(),
            Self::Raw(text) => vec![DisplayLine::plain(text.clone())],
            Self::Response(OrchestrationResponse::Generic { is_success, message }) => {
                vec![DisplayLine::toned(*is_success, message.clone())]
            }
            Self::Response(OrchestrationResponse::Single(result)) => {
                vec![DisplayLine::toned(result.is_success, result.message.clone())]
            }
            Self::Response(OrchestrationResponse::Log { level, message }) => {
                vec![DisplayLine::toned(*level == LogLevel::Info, message.clone())]
            }
            Self::Response(OrchestrationResponse::List(results)) => render_list(results, instruction),
        }
    }
}

fn render_list(results: &[ResultMessage], instruction: Option<&str>) -> Vec<DisplayLine> {
    let (succeeded, failed): (Vec<&ResultMessage>, Vec<&ResultMessage>) =
        results.iter().partition(|result| result.is_success);
    let mut lines = Vec::with_capacity(2);
    if !succeeded.is_empty() {
        let prefix = match instruction {
            Some(name) => format!("{name} Ok: "),
            None => "Ok: ".to_string(),
        };
        lines.push(DisplayLine::success(format!("{prefix}{}", bracketed(&succeeded))));
    }
    if !failed.is_empty() {
        lines.push(DisplayLine::failure(format!("Fail: {}", bracketed(&failed))));
    }
    lines
}

fn bracketed(results: &[&ResultMessage]) -> String {
    match results {
        [single] => single.message.clone(),
        many => {
            let messages: Vec<&str> = many.iter().map(|result| result.message.as_str()).collect();
            format!("[ {} ]", messages.join(", "))
        }
    }
}

/// Line shown just before an instruction goes out on the execution channel.
pub fn request_line(instruction: &GeneratedInstruction) -> DisplayLine {
    let view = instruction.view();
    let tag = view.tag().unwrap_or("unrecognized instruction");
    let context = view.context();
    if context.is_empty() {
        DisplayLine::plain(format!("making request: {tag}"))
    } else {
        DisplayLine::plain(format!("making request: {tag} {context}"))
    }
}

#[cfg(test)]
#[path = "tests/classifier_tests.rs"]
mod tests;

//! Turning input lines into requests and responses into output.

use colored::Colorize;
use recordnet_protocol::{ArgumentKind, CommandDescriptor, Credentials, Request, Response};
use serde_json::Value;
use thiserror::Error;

/// Problems with an input line, reported before anything is sent.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("empty command")]
    Empty,

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument { command: String, argument: String },

    #[error("{command}: <{argument}> must be an integer, got '{value}'")]
    NotAnInteger {
        command: String,
        argument: String,
        value: String,
    },

    #[error("{command}: invalid record: {reason}")]
    InvalidRecord { command: String, reason: String },

    #[error("{command}: unexpected argument '{value}'")]
    UnexpectedArgument { command: String, value: String },
}

/// Builds a request from an input line.
///
/// Commands found in `catalog` are checked against their argument list:
/// `record` arguments take the rest of the line as JSON (or `@file.json`),
/// `integer` arguments must parse. Commands the catalog does not know are
/// sent word by word and left for the server to reject.
pub fn parse_line(line: &str, catalog: &[CommandDescriptor]) -> Result<Request, LineError> {
    let (name, mut rest) = next_word(line).ok_or(LineError::Empty)?;
    let Some(descriptor) = catalog.iter().find(|c| c.name == name) else {
        return Ok(Request::new(line.split_whitespace()));
    };

    let mut body = vec![name.to_string()];
    let mut payload = None;
    for argument in &descriptor.arguments {
        if argument.kind == ArgumentKind::Record {
            let text = rest.trim();
            rest = "";
            if text.is_empty() {
                if argument.optional {
                    continue;
                }
                return Err(missing(name, &argument.name));
            }
            payload = Some(parse_record(name, text)?);
            continue;
        }

        let Some((word, tail)) = next_word(rest) else {
            if argument.optional {
                continue;
            }
            return Err(missing(name, &argument.name));
        };
        if argument.kind == ArgumentKind::Integer && word.parse::<i64>().is_err() {
            return Err(LineError::NotAnInteger {
                command: name.to_string(),
                argument: argument.name.clone(),
                value: word.to_string(),
            });
        }
        body.push(word.to_string());
        rest = tail;
    }

    if let Some((extra, _)) = next_word(rest) {
        return Err(LineError::UnexpectedArgument {
            command: name.to_string(),
            value: extra.to_string(),
        });
    }

    let mut request = Request::new(body);
    if let Some(payload) = payload {
        request = request.with_payload(payload);
    }
    Ok(request)
}

/// Attaches credentials when a username was given.
pub fn authenticate(request: Request, user: Option<&str>, password: Option<&str>) -> Request {
    match user {
        Some(user) => request.with_auth(Credentials::new(user, password.unwrap_or_default())),
        None => request,
    }
}

/// Formats a response for the terminal.
pub fn format_response(response: &Response) -> String {
    if response.text.starts_with("error:") {
        response.text.red().to_string()
    } else {
        response.text.clone()
    }
}

/// Formats a response payload as pretty JSON, one value per block.
pub fn format_payload(response: &Response) -> Option<String> {
    let payload = response.payload.as_ref().filter(|p| !p.is_empty())?;
    Some(
        payload
            .iter()
            .map(format_json)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn parse_record(command: &str, text: &str) -> Result<Value, LineError> {
    let invalid = |reason: String| LineError::InvalidRecord {
        command: command.to_string(),
        reason,
    };
    let json = match text.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?,
        None => text.to_string(),
    };
    serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))
}

fn missing(command: &str, argument: &str) -> LineError {
    LineError::MissingArgument {
        command: command.to_string(),
        argument: argument.to_string(),
    }
}

/// Splits off the first whitespace-delimited word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordnet_protocol::ArgumentSpec;
    use serde_json::json;

    fn catalog() -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("show", "list"),
            CommandDescriptor::new("add", "add")
                .with_argument(ArgumentSpec::new("record", ArgumentKind::Record)),
            CommandDescriptor::new("update", "update")
                .with_argument(ArgumentSpec::new("id", ArgumentKind::Integer))
                .with_argument(ArgumentSpec::new("record", ArgumentKind::Record)),
            CommandDescriptor::new("greet", "greet")
                .with_argument(ArgumentSpec::new("who", ArgumentKind::Text).optional()),
        ]
    }

    #[test]
    fn test_simple_command() {
        let request = parse_line("  show  ", &catalog()).unwrap();
        assert_eq!(request.body, vec!["show"]);
        assert!(request.payload.is_none());
    }

    #[test]
    fn test_record_takes_rest_of_line() {
        let request = parse_line(
            r#"update 4 {"name": "two words", "value": 1}"#,
            &catalog(),
        )
        .unwrap();
        assert_eq!(request.body, vec!["update", "4"]);
        assert_eq!(
            request.payload,
            Some(json!({"name": "two words", "value": 1}))
        );
    }

    #[test]
    fn test_integer_is_validated() {
        let err = parse_line(r#"update four {"name": "x", "value": 1}"#, &catalog()).unwrap_err();
        assert!(matches!(err, LineError::NotAnInteger { ref value, .. } if value == "four"));
    }

    #[test]
    fn test_missing_and_extra_arguments() {
        assert!(matches!(
            parse_line("add", &catalog()),
            Err(LineError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_line("update", &catalog()),
            Err(LineError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_line("show everything", &catalog()),
            Err(LineError::UnexpectedArgument { .. })
        ));
        assert!(matches!(parse_line("   ", &catalog()), Err(LineError::Empty)));
    }

    #[test]
    fn test_optional_argument() {
        assert_eq!(parse_line("greet", &catalog()).unwrap().body, vec!["greet"]);
        assert_eq!(
            parse_line("greet bob", &catalog()).unwrap().body,
            vec!["greet", "bob"]
        );
    }

    #[test]
    fn test_bad_json_record() {
        assert!(matches!(
            parse_line("add {not json", &catalog()),
            Err(LineError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_unknown_command_passes_through() {
        let request = parse_line("frobnicate a b", &catalog()).unwrap();
        assert_eq!(request.body, vec!["frobnicate", "a", "b"]);

        let request = parse_line("count", &[]).unwrap();
        assert_eq!(request.body, vec!["count"]);
    }

    #[test]
    fn test_authenticate() {
        let request = authenticate(Request::new(["show"]), Some("alice"), None);
        assert_eq!(request.auth, Some(Credentials::new("alice", "")));
        let request = authenticate(Request::new(["show"]), None, Some("pw"));
        assert!(request.auth.is_none());
    }

    #[test]
    fn test_format_payload() {
        let response = Response::text("ok").with_payload(vec![json!({"id": 1})]);
        assert!(format_payload(&response).unwrap().contains("\"id\": 1"));
        assert!(format_payload(&Response::text("ok")).is_none());
    }
}

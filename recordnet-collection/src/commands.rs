//! Command set for the record collection.
//!
//! Every response carries the full command catalog so clients can build
//! requests without hard-coding the command list.

use crate::error::CollectionError;
use crate::record::{Record, RecordDraft};
use crate::store::RecordStore;
use parking_lot::Mutex;
use recordnet_protocol::{
    ArgumentKind, ArgumentSpec, CommandDescriptor, DispatchError, Dispatcher, Request, Response,
};

/// Dispatcher that runs collection commands against a shared store.
#[derive(Debug, Default)]
pub struct CollectionDispatcher {
    store: Mutex<RecordStore>,
}

impl CollectionDispatcher {
    pub fn new() -> Self {
        Self::with_store(RecordStore::new())
    }

    pub fn with_store(store: RecordStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    fn help(&self) -> Response {
        let mut text = String::from("Available commands:");
        for command in commands() {
            text.push_str("\n  ");
            text.push_str(&command.name);
            for arg in &command.arguments {
                let arg = match arg.kind {
                    ArgumentKind::Record => format!("{{{}}}", arg.name),
                    _ => format!("<{}>", arg.name),
                };
                text.push(' ');
                text.push_str(&arg);
            }
            text.push_str(" - ");
            text.push_str(&command.description);
        }
        Response::text(text)
    }

    fn info(&self) -> Result<Response, CollectionError> {
        let info = self.store.lock().info();
        let text = format!(
            "Collection type: {}\nCreated at: {}\nRecords: {}",
            info.kind,
            info.created_at.to_rfc3339(),
            info.len
        );
        Ok(Response::text(text).with_payload(vec![serde_json::to_value(&info)?]))
    }

    fn show(&self) -> Result<Response, CollectionError> {
        let store = self.store.lock();
        if store.is_empty() {
            return Ok(Response::text("Collection is empty").with_payload(Vec::new()));
        }
        let text = store.iter().map(describe).collect::<Vec<_>>().join("\n");
        let payload = store
            .iter()
            .map(Record::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Response::text(text).with_payload(payload))
    }

    fn count(&self) -> Response {
        Response::text(self.store.lock().len().to_string())
    }

    fn add(&self, request: &Request) -> Result<Response, DispatchError> {
        let draft = draft(request, "add")?;
        let owner = request.auth.as_ref().map(|auth| auth.username.clone());
        let mut store = self.store.lock();
        let record = store.insert(draft, owner)?;
        tracing::debug!("Added record {}", record.id);
        Ok(Response::text(format!("Record {} added", record.id))
            .with_payload(vec![record.to_value()?]))
    }

    fn update(&self, request: &Request) -> Result<Response, DispatchError> {
        let id = parse_id(request.args().first())?;
        let draft = draft(request, "update")?;
        let mut store = self.store.lock();
        let record = store.update(id, draft)?;
        tracing::debug!("Updated record {}", id);
        Ok(Response::text(format!("Record {} updated", id)).with_payload(vec![record.to_value()?]))
    }

    fn remove(&self, request: &Request) -> Result<Response, DispatchError> {
        let id = parse_id(request.args().first())?;
        self.store.lock().remove(id)?;
        tracing::debug!("Removed record {}", id);
        Ok(Response::text(format!("Record {} removed", id)))
    }

    fn clear(&self) -> Response {
        let removed = self.store.lock().clear();
        tracing::debug!("Cleared {} records", removed);
        Response::text(format!("Removed {} records", removed))
    }
}

impl Dispatcher for CollectionDispatcher {
    fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        let name = request.command().ok_or(DispatchError::EmptyRequest)?;
        let descriptor = commands()
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DispatchError::UnknownCommand(name.to_string()))?;
        check_arity(&descriptor, request)?;

        let response = match name {
            "help" => self.help(),
            "info" => self.info()?,
            "show" => self.show()?,
            "count" => self.count(),
            "add" => self.add(request)?,
            "update" => self.update(request)?,
            "remove_by_id" => self.remove(request)?,
            "clear" => self.clear(),
            other => return Err(DispatchError::UnknownCommand(other.to_string())),
        };
        Ok(response.with_catalog(self.catalog()))
    }

    fn catalog(&self) -> Vec<CommandDescriptor> {
        commands()
    }
}

/// The collection's command catalog.
pub fn commands() -> Vec<CommandDescriptor> {
    let id = || ArgumentSpec::new("id", ArgumentKind::Integer);
    let record = || ArgumentSpec::new("record", ArgumentKind::Record);
    vec![
        CommandDescriptor::new("help", "show available commands"),
        CommandDescriptor::new("info", "show information about the collection"),
        CommandDescriptor::new("show", "list every record"),
        CommandDescriptor::new("count", "show the number of records"),
        CommandDescriptor::new("add", "add a new record").with_argument(record()),
        CommandDescriptor::new("update", "replace the record with the given id")
            .with_argument(id())
            .with_argument(record()),
        CommandDescriptor::new("remove_by_id", "remove the record with the given id")
            .with_argument(id()),
        CommandDescriptor::new("clear", "remove every record"),
    ]
}

/// Checks the positional argument count. Record arguments travel in the
/// payload, not in the body.
fn check_arity(descriptor: &CommandDescriptor, request: &Request) -> Result<(), DispatchError> {
    let positional = descriptor
        .arguments
        .iter()
        .filter(|a| a.kind != ArgumentKind::Record);
    let max = positional.clone().count();
    let min = positional.filter(|a| !a.optional).count();
    let given = request.args().len();
    if given < min || given > max {
        return Err(DispatchError::InvalidArgument(format!(
            "{} expects {} argument(s), got {}",
            descriptor.name, max, given
        )));
    }
    Ok(())
}

fn parse_id(arg: Option<&String>) -> Result<u64, CollectionError> {
    let value = arg.map(String::as_str).unwrap_or_default();
    value.parse().map_err(|_| CollectionError::InvalidId {
        value: value.to_string(),
    })
}

fn draft(request: &Request, command: &str) -> Result<RecordDraft, DispatchError> {
    let payload = request.payload.as_ref().ok_or_else(|| {
        DispatchError::InvalidArgument(format!("{} expects a record", command))
    })?;
    Ok(RecordDraft::from_value(payload)?)
}

fn describe(record: &Record) -> String {
    let mut line = format!("#{} {} = {}", record.id, record.name, record.value);
    if !record.tags.is_empty() {
        line.push_str(&format!(" [{}]", record.tags.join(", ")));
    }
    if let Some(owner) = &record.owner {
        line.push_str(&format!(" (owner: {})", owner));
    }
    line
}

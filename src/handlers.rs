//! One request decoder per endpoint. Each parses its JSON body into a record, runs one or two
//! store operations through the [`Executor`] and returns the [`Outcome`] to send back.
use tracing::{debug, info, warn};

use crate::command::{Arg, Operation};
use crate::decode::{Outcome, STROK};
use crate::engine::StoreEngine;
use crate::executor::Executor;
use crate::record::{FileAllQuery, FileQuery, FileRecord, TraceQuery, TraceRecord, UserQuery, UserRecord, UserRegistration};
use crate::Result;

/// The endpoints served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /userregister`
    UserRegister,
    /// `POST /userget`
    UserGet,
    /// `POST /fileset`
    FileSet,
    /// `POST /fileget`
    FileGet,
    /// `POST /filegetall`
    FileGetAll,
    /// `POST /filesettrace`
    FileSetTrace,
    /// `POST /filegettrace`
    FileGetTrace,
}

impl Endpoint {
    /// matches a request method and path to an endpoint, `None` if nothing is served there
    pub fn route(method: &str, path: &str) -> Option<Endpoint> {
        if !method.eq_ignore_ascii_case("POST") {
            return None;
        }
        match path {
            "/userregister" => Some(Endpoint::UserRegister),
            "/userget" => Some(Endpoint::UserGet),
            "/fileset" => Some(Endpoint::FileSet),
            "/fileget" => Some(Endpoint::FileGet),
            "/filegetall" => Some(Endpoint::FileGetAll),
            "/filesettrace" => Some(Endpoint::FileSetTrace),
            "/filegettrace" => Some(Endpoint::FileGetTrace),
            _ => None,
        }
    }

    /// runs this endpoint's request decoder over `body`
    ///
    /// # Errors
    /// - `KsError::Json` or `KsError::InvalidRequest` if the body is not acceptable
    /// - `KsError::Unavailable` if the store could not be reached
    pub fn handle<E: StoreEngine>(self, exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
        match self {
            Endpoint::UserRegister => user_register(exec, body),
            Endpoint::UserGet => user_get(exec, body),
            Endpoint::FileSet => file_set(exec, body),
            Endpoint::FileGet => file_get(exec, body),
            Endpoint::FileGetAll => file_get_all(exec, body),
            Endpoint::FileSetTrace => file_set_trace(exec, body),
            Endpoint::FileGetTrace => file_get_trace(exec, body),
        }
    }
}

/// Registers a user.
///
/// With `flag` 1 the record is always written. With `flag` 0 an existing registration for the
/// machine is returned unchanged, and the record is only written if there is none.
///
/// The lookup and the insert are two separate store commands; two concurrent first
/// registrations of the same machine can both insert, and the last write wins.
pub fn user_register<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let reg = UserRegistration::parse(body)?;

    if !reg.force {
        match exec.run(Operation::UserGet, &[reg.user.machine.as_str().into()])? {
            Outcome::Success(existing) => {
                debug!(machine = %reg.user.machine, "already registered");
                return Ok(Outcome::Success(existing));
            }
            Outcome::NotFound => {}
            Outcome::Failure => return Ok(Outcome::Failure),
        }
    }
    insert_user(exec, &reg.user)
}

fn insert_user<E: StoreEngine>(exec: &Executor<E>, user: &UserRecord) -> Result<Outcome> {
    let args: [Arg; 3] = [
        user.machine.as_str().into(),
        user.machine.as_str().into(),
        user.username.as_str().into(),
    ];
    match exec.run(Operation::UserRegister, &args)? {
        Outcome::Success(_) => {
            info!(machine = %user.machine, username = %user.username, "user registered");
            Ok(Outcome::Success(serde_json::to_string(user)?))
        }
        other => Ok(other),
    }
}

/// Looks up the registration of a machine
pub fn user_get<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let q = UserQuery::parse(body)?;
    exec.run(Operation::UserGet, &[q.machine.into()])
}

/// Stores a file record under its own key and then in its machine's file index.
///
/// The two writes are independent. If the second one fails the file can still be fetched by
/// uuid but will not be listed for its machine; the failure is reported to the caller and
/// logged, nothing is rolled back.
pub fn file_set<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let f = FileRecord::parse(body)?;

    let by_uuid: [Arg; 3] = [f.uuid.as_str().into(), f.uuid.as_str().into(), f.data.as_str().into()];
    let outcome = exec.run(Operation::SetFile, &by_uuid)?;
    if outcome != Outcome::Success(STROK.to_string()) {
        return Ok(outcome);
    }

    let by_machine: [Arg; 3] = [f.machine.as_str().into(), f.uuid.as_str().into(), f.data.into()];
    let outcome = exec.run(Operation::SetMachineFile, &by_machine)?;
    if let Outcome::Failure = outcome {
        warn!(uuid = %f.uuid, machine = %f.machine, "file stored but missing from its machine's index");
    }
    Ok(outcome)
}

/// Fetches a single file record by uuid
pub fn file_get<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let q = FileQuery::parse(body)?;
    exec.run(Operation::GetFile, &[q.uuid.as_str().into(), q.uuid.into()])
}

/// Fetches one page of a machine's files
pub fn file_get_all<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let q = FileAllQuery::parse(body)?;
    exec.run(Operation::GetAllFiles, &[q.machine.into(), q.page.into(), exec.page_size().into()])
}

/// Appends a trace entry to a file
pub fn file_set_trace<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let t = TraceRecord::parse(body)?;
    debug!(uuid = %t.uuid, field = %t.field, "appending trace");
    exec.run(Operation::SetTrace, &[t.uuid.into(), t.field.into(), t.data.into()])
}

/// Fetches one page of a file's trace entries
pub fn file_get_trace<E: StoreEngine>(exec: &Executor<E>, body: &[u8]) -> Result<Outcome> {
    let q = TraceQuery::parse(body)?;
    exec.run(Operation::GetTraces, &[q.uuid.into(), q.page.into(), exec.page_size().into()])
}

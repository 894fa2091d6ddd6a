//! The command table. Every logical store operation maps to exactly one argument template
//! and exactly one reply decoder.
use std::fmt;

use crate::decode::{self, Outcome};
use crate::{KsError, Result};

/// A reply decoder turns one raw store reply into an [`Outcome`]
pub type Decoder = fn(redis::Value) -> Outcome;

/// These are the logical operations the gateway performs against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// write a user record into `userkey:<machine>`
    UserRegister,
    /// read back every field of `userkey:<machine>`
    UserGet,
    /// write a file record into `filekey:<uuid>`
    SetFile,
    /// write a file record into its owning machine's index, `machine:<machine>`
    SetMachineFile,
    /// read a single file record
    GetFile,
    /// scan one page of a machine's file index
    GetAllFiles,
    /// append a trace entry to `filekey:<uuid>`
    SetTrace,
    /// scan one page of the trace entries of a file
    GetTraces,
}

/// A resolved entry of the command table
#[derive(Clone, Copy)]
pub struct Action {
    /// whitespace separated argument template, each `{}` takes one positional argument
    pub template: &'static str,
    /// interprets the store's reply
    pub decoder: Decoder,
}

impl Operation {
    /// every operation, in table order
    pub const ALL: [Operation; 8] = [
        Operation::UserRegister,
        Operation::UserGet,
        Operation::SetFile,
        Operation::SetMachineFile,
        Operation::GetFile,
        Operation::GetAllFiles,
        Operation::SetTrace,
        Operation::GetTraces,
    ];

    /// looks up the command table entry for this operation
    pub fn action(self) -> Action {
        let (template, decoder): (&'static str, Decoder) = match self {
            Operation::UserRegister => ("HMSET userkey:{} machine {} username {}", decode::status),
            Operation::UserGet => ("HGETALL userkey:{}", decode::hash_getall),
            Operation::SetFile => ("HMSET filekey:{} {} {}", decode::status),
            Operation::SetMachineFile => ("HMSET machine:{} {} {}", decode::status),
            Operation::GetFile => ("HGET filekey:{} {}", decode::hash_get),
            Operation::GetAllFiles => ("HSCAN machine:{} {} COUNT {}", decode::scan_files),
            Operation::SetTrace => ("HSET filekey:{} {} {}", decode::status),
            Operation::GetTraces => ("HSCAN filekey:{} {} MATCH trace:* COUNT {}", decode::scan_traces),
        };
        Action { template, decoder }
    }

    /// number of positional arguments this operation's template expects
    pub fn arity(self) -> usize {
        self.action().template.matches("{}").count()
    }
}

/// A positional argument substituted into a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// a string argument, e.g. an identifier or a JSON document
    Str(String),
    /// an unsigned integer argument, e.g. a scan cursor
    Int(u64),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => f.write_str(s),
            Arg::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::Int(n)
    }
}

/// Formats `template` into the argument vector of a store command.
///
/// The template is split on whitespace first, so a substituted value is always exactly one
/// store argument, even when it contains spaces.
///
/// # Errors
/// returns [`KsError::Format`] if the number of `args` does not match the number of
/// placeholders in the template
pub fn format(template: &str, args: &[Arg]) -> Result<Vec<String>> {
    let mut remaining = args.iter();
    let mut out = Vec::new();

    for token in template.split_whitespace() {
        let mut pieces = token.split("{}");
        let mut formatted = pieces.next().unwrap_or_default().to_string();
        for piece in pieces {
            let arg = remaining.next().ok_or_else(|| {
                KsError::Format(format!("'{}' needs more than {} arguments", template, args.len()))
            })?;
            formatted.push_str(&arg.to_string());
            formatted.push_str(piece);
        }
        out.push(formatted);
    }

    if remaining.next().is_some() {
        return Err(KsError::Format(format!(
            "'{}' was given {} arguments, too many",
            template,
            args.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_operation_has_a_unique_template() {
        let templates: HashSet<_> = Operation::ALL.iter().map(|op| op.action().template).collect();
        assert_eq!(templates.len(), Operation::ALL.len());
        let ops: HashSet<_> = Operation::ALL.iter().collect();
        assert_eq!(ops.len(), Operation::ALL.len());
    }

    /// position in `Operation::ALL` and expected arity; no wildcard arm, so a new variant has to be
    /// added here
    fn expected(op: Operation) -> (usize, usize) {
        match op {
            Operation::UserRegister => (0, 3),
            Operation::UserGet => (1, 1),
            Operation::SetFile => (2, 3),
            Operation::SetMachineFile => (3, 3),
            Operation::GetFile => (4, 2),
            Operation::GetAllFiles => (5, 3),
            Operation::SetTrace => (6, 3),
            Operation::GetTraces => (7, 3),
        }
    }

    #[test]
    fn every_operation_is_listed_with_its_arity() {
        for op in Operation::ALL {
            let (index, arity) = expected(op);
            assert_eq!(Operation::ALL.get(index), Some(&op));
            assert_eq!(op.arity(), arity, "{:?}", op);

            let args: Vec<Arg> = (0..arity).map(|i| Arg::from(i as u64)).collect();
            let cmd = format(op.action().template, &args).unwrap();
            assert!(!cmd.iter().any(|part| part.contains("{}")), "{:?}", op);
        }
    }

    #[test]
    fn format_keeps_values_with_spaces_whole() {
        let args = vec![Arg::from("f1"), Arg::from("f1"), Arg::from(r#"{"a": "b c"}"#)];
        let cmd = format(Operation::SetFile.action().template, &args).unwrap();
        assert_eq!(cmd, vec!["HMSET", "filekey:f1", "f1", r#"{"a": "b c"}"#]);
    }

    #[test]
    fn format_substitutes_integers() {
        let args = vec![Arg::from("u1"), Arg::from(17u64), Arg::from(20u64)];
        let cmd = format(Operation::GetTraces.action().template, &args).unwrap();
        assert_eq!(cmd, vec!["HSCAN", "filekey:u1", "17", "MATCH", "trace:*", "COUNT", "20"]);
    }

    #[test]
    fn format_rejects_wrong_arity() {
        let too_few = format(Operation::GetFile.action().template, &[Arg::from("x")]);
        assert!(matches!(too_few, Err(KsError::Format(_))));

        let too_many = format(Operation::UserGet.action().template, &[Arg::from("x"), Arg::from("y")]);
        assert!(matches!(too_many, Err(KsError::Format(_))));
    }
}

//! Request line parser
//!
//! Two-phase parsing:
//! 1. Parse the command line (without its line terminator) into a request
//! 2. For store commands, the caller reads the announced body separately

use crate::ProtocolError;
use crate::protocol::command::{Command, MAX_KEY_LENGTH, is_valid_key};
use crate::scheduler::Request;
use crate::storage::{calculate_expire_at, calculate_grace_end};
use bytes::Bytes;

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub request: Request,
    /// Body length announced by a store command
    pub body: Option<usize>,
}

/// Parse one command line
pub fn parse_line(line: &[u8]) -> Result<ParsedLine, ProtocolError> {
    let mut parts = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty());

    let name = parts.next().ok_or(ProtocolError::EmptyLine)?;
    let command = Command::from_name(name).ok_or_else(|| {
        ProtocolError::InvalidCommand(String::from_utf8_lossy(name).to_string())
    })?;

    let mut request = Request::new(command);
    if command.needs_key()
        && let Some(key) = parts.next()
    {
        request.key = Some(parse_key(key)?);
    }

    let mut body = None;
    match command {
        Command::Set
        | Command::Add
        | Command::Replace
        | Command::Append
        | Command::Prepend
        | Command::Cas => {
            body = Some(parse_storage_args(&mut request, parts)?);
        }
        Command::Delete => parse_delete_args(&mut request, parts)?,
        Command::Incr | Command::Decr => parse_arith_args(&mut request, parts)?,
        Command::Get | Command::Gets | Command::Stat | Command::ZeroOps => {}
    }

    Ok(ParsedLine { request, body })
}

fn parse_key(key: &[u8]) -> Result<Bytes, ProtocolError> {
    if !is_valid_key(key) {
        if key.len() > MAX_KEY_LENGTH {
            return Err(ProtocolError::KeyTooLong);
        }
        return Err(ProtocolError::InvalidKey(
            String::from_utf8_lossy(key).to_string(),
        ));
    }
    Ok(Bytes::copy_from_slice(key))
}

/// Split trailing arguments into numbers and an optional `noreply` word
fn numeric_args<'a>(
    parts: impl Iterator<Item = &'a [u8]>,
) -> Result<(Vec<u64>, bool), ProtocolError> {
    let mut numbers = Vec::with_capacity(5);
    let mut noreply = false;
    for part in parts {
        if noreply {
            // `noreply` must be the last argument
            return Err(ProtocolError::InvalidNumber);
        }
        if part.eq_ignore_ascii_case(b"noreply") {
            noreply = true;
        } else {
            numbers.push(parse_u64(part).ok_or(ProtocolError::InvalidNumber)?);
        }
    }
    Ok((numbers, noreply))
}

/// `[flags] [exptime] <bytes> [cas] [noreply]`
///
/// Accepts the short forms `<bytes>` and `<flags> <bytes>`. A numeric last
/// argument in noreply position counts as noreply when non-zero.
fn parse_storage_args<'a>(
    request: &mut Request,
    parts: impl Iterator<Item = &'a [u8]>,
) -> Result<usize, ProtocolError> {
    let (numbers, mut noreply) = numeric_args(parts)?;
    let is_cas = request.command == Command::Cas;

    let (flags, exptime, bytes) = match numbers.as_slice() {
        [] => return Err(ProtocolError::MissingLength),
        [bytes] => (0, 0, *bytes),
        [flags, bytes] => (*flags, 0, *bytes),
        [flags, exptime, bytes, rest @ ..] => {
            match (is_cas, rest) {
                (_, []) => {}
                (true, [cas]) => request.cas = *cas,
                (false, [flag]) => noreply |= *flag != 0,
                (_, [cas, flag]) => {
                    request.cas = *cas;
                    noreply |= *flag != 0;
                }
                _ => return Err(ProtocolError::InvalidNumber),
            }
            (*flags, *exptime, *bytes)
        }
    };

    request.flags = u32::try_from(flags).map_err(|_| ProtocolError::InvalidNumber)?;
    request.exptime = calculate_expire_at(exptime);
    request.noreply = noreply;
    usize::try_from(bytes).map_err(|_| ProtocolError::InvalidNumber)
}

/// `[time] [noreply]`
fn parse_delete_args<'a>(
    request: &mut Request,
    parts: impl Iterator<Item = &'a [u8]>,
) -> Result<(), ProtocolError> {
    let (numbers, noreply) = numeric_args(parts)?;
    let (time, flag) = match numbers.as_slice() {
        [] => (0, 0),
        [time] => (*time, 0),
        [time, flag] => (*time, *flag),
        _ => return Err(ProtocolError::InvalidNumber),
    };
    request.exptime = calculate_grace_end(time);
    request.noreply = noreply || flag != 0;
    Ok(())
}

/// `<delta> [noreply]`
fn parse_arith_args<'a>(
    request: &mut Request,
    parts: impl Iterator<Item = &'a [u8]>,
) -> Result<(), ProtocolError> {
    let (numbers, noreply) = numeric_args(parts)?;
    let (delta, flag) = match numbers.as_slice() {
        [delta] => (*delta, 0),
        [delta, flag] => (*delta, *flag),
        _ => return Err(ProtocolError::InvalidNumber),
    };
    request.delta = delta;
    request.noreply = noreply || flag != 0;
    Ok(())
}

/// Parse bytes as u64
fn parse_u64(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

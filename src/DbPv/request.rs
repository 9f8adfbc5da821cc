// Channel request options in the protocol's usual text form:
//
//   record[process=true,queueSize=4]field(value,alarm,timeStamp)
//
// Either part may be left out; a bare `value,alarm` list is accepted as the
// field part.

use std::str::FromStr;

use super::Structs::FieldSet;
use crate::error::{Error, Result};

/// Monitor depth when none is requested.
pub const DEFAULT_QUEUE_SIZE: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request {
    pub fields: FieldSet,
    pub process: bool,
    pub queue_size: usize,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            fields: FieldSet::VALUE | FieldSet::ALARM | FieldSet::TIME_STAMP,
            process: false,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

fn config(message: impl Into<String>) -> Error {
    Error::Configuration(message.into())
}

/// Splits `open ... close` off the front of `s`, returning the inside and
/// what follows.
fn bracketed(s: &str, open: char, close: char) -> Result<(&str, &str)> {
    let body = s
        .trim_start()
        .strip_prefix(open)
        .ok_or_else(|| config(format!("expected '{open}' in request")))?;
    let end = body
        .find(close)
        .ok_or_else(|| config(format!("missing '{close}' in request")))?;
    Ok((&body[..end], &body[end + 1..]))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(config(format!("expected true or false, got '{other}'"))),
    }
}

fn parse_options(options: &str, request: &mut Request) -> Result<()> {
    for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| config(format!("record option '{option}' has no value")))?;
        match key.trim() {
            "process" => request.process = parse_bool(value)?,
            "queueSize" => {
                let size: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| config(format!("queueSize '{}' is not a number", value.trim())))?;
                if size == 0 {
                    return Err(config("queue size must be at least 1"));
                }
                request.queue_size = size;
            }
            other => return Err(config(format!("unknown record option '{other}'"))),
        }
    }
    Ok(())
}

fn parse_fields(list: &str) -> Result<FieldSet> {
    let mut fields = FieldSet::empty();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        fields |= FieldSet::from_request_name(name)
            .ok_or_else(|| config(format!("unknown field '{name}'")))?;
    }
    // An empty selection means the whole structure.
    if fields.is_empty() {
        fields = FieldSet::all();
    }
    Ok(fields)
}

impl FromStr for Request {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut request = Request::default();
        let mut rest = s.trim();
        if rest.is_empty() {
            return Ok(request);
        }
        if let Some(after) = rest.strip_prefix("record") {
            let (options, tail) = bracketed(after, '[', ']')?;
            parse_options(options, &mut request)?;
            rest = tail.trim();
        }
        if let Some(after) = rest.strip_prefix("field") {
            let (list, tail) = bracketed(after, '(', ')')?;
            if !tail.trim().is_empty() {
                return Err(config(format!("trailing text '{}' in request", tail.trim())));
            }
            request.fields = parse_fields(list)?;
        } else if !rest.is_empty() {
            request.fields = parse_fields(rest)?;
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_default() {
        assert_eq!("".parse::<Request>().unwrap(), Request::default());
        assert_eq!(Request::default().queue_size, 2);
    }

    #[test]
    fn empty_field_list_selects_everything() {
        let request: Request = "field()".parse().unwrap();
        assert_eq!(request.fields, FieldSet::all());
    }

    #[test]
    fn bare_list_is_the_field_part() {
        let request: Request = "value, display".parse().unwrap();
        assert_eq!(request.fields, FieldSet::VALUE | FieldSet::DISPLAY);
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// One step of a simulation script. The textual form is one
/// command per line, with semicolon-separated fields:
/// `A;<id>;<size>`, `D;<id>`, `C` and `O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Alloc { id: u64, size: u64 },
    Dealloc { id: u64 },
    Compact,
    Report,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Alloc { id, size } => write!(f, "A;{};{}", id, size),
            Command::Dealloc { id } => write!(f, "D;{}", id),
            Command::Compact => write!(f, "C"),
            Command::Report => write!(f, "O"),
        }
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Line {line}: unknown command '{found}'.")]
    UnknownCommand { line: usize, found: String },

    #[error("Line {line}: missing field '{field}'.")]
    MissingField { line: usize, field: &'static str },

    #[error("Line {line}: '{found}' is not a valid number.")]
    InvalidNumber { line: usize, found: String },

    #[error("The script must start with the pool size.")]
    MissingSize,
}

/// A parsed simulation script: the pool size followed by the
/// commands to run against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub size: u64,
    pub commands: Vec<Command>,
}

impl FromStr for Script {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        // Blank lines are skipped, but line numbers in errors
        // refer to the original text.
        let mut lines = s
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (line, first) = lines.next().ok_or(ParseError::MissingSize)?;
        let size = parse_number(line, first)?;

        let mut commands = Vec::new();
        for (line, text) in lines {
            commands.push(parse_command(line, text)?);
        }

        Ok(Self { size, commands })
    }
}

fn parse_command(line: usize, text: &str) -> ParseResult<Command> {
    let mut fields = text.split(';');

    // The iterator always yields at least one (possibly
    // empty) field, so this cannot fail.
    let letter = fields.next().unwrap_or_default();

    match letter {
        "A" => {
            let id = parse_field(line, &mut fields, "id")?;
            let size = parse_field(line, &mut fields, "size")?;
            Ok(Command::Alloc { id, size })
        }
        "D" => {
            let id = parse_field(line, &mut fields, "id")?;
            Ok(Command::Dealloc { id })
        }
        "C" => Ok(Command::Compact),
        "O" => Ok(Command::Report),
        _ => Err(ParseError::UnknownCommand {
            line,
            found: letter.to_owned(),
        }),
    }
}

fn parse_field<'a>(
    line: usize,
    fields: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> ParseResult<u64> {
    let text = fields
        .next()
        .ok_or(ParseError::MissingField { line, field })?;
    parse_number(line, text)
}

fn parse_number(line: usize, text: &str) -> ParseResult<u64> {
    text.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        found: text.to_owned(),
    })
}

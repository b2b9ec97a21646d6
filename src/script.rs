//! Line-oriented allocation trace scripts.
//!
//! One command per line: `a <id> <size>` binds an id to a fresh
//! allocation, `r <id> <size>` rebinds it to a reallocation of its current
//! pointer, `f <id>` frees it. Blank lines and `#` comments are skipped.
//! Ids are arbitrary integers and may be reused; the allocator itself
//! never sees them.

use crate::error::AllocError;
use crate::mem::allocator::SegmentAllocator;
use crate::mem::{SegPtr, EMPTY_PTR};
use std::collections::HashMap;
use std::num::ParseIntError;
use std::str::SplitWhitespace;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Alloc { id: usize, size: usize },
    Realloc { id: usize, size: usize },
    Free { id: usize },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: unknown directive `{directive}`")]
    UnknownDirective { line: usize, directive: String },

    #[error("line {line}: expected `{expected}`")]
    Malformed { line: usize, expected: &'static str },

    #[error("line {line}: bad number")]
    BadNumber {
        line: usize,
        #[source]
        source: ParseIntError,
    },
}

pub fn parse(text: &str) -> Result<Vec<Command>, ScriptError> {
    let mut commands = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let Some(directive) = fields.next() else {
            continue;
        };

        let command = match directive {
            "a" => Command::Alloc {
                id: field(&mut fields, line, "a <id> <size>")?,
                size: field(&mut fields, line, "a <id> <size>")?,
            },
            "r" => Command::Realloc {
                id: field(&mut fields, line, "r <id> <size>")?,
                size: field(&mut fields, line, "r <id> <size>")?,
            },
            "f" => Command::Free {
                id: field(&mut fields, line, "f <id>")?,
            },
            other => {
                return Err(ScriptError::UnknownDirective {
                    line,
                    directive: other.to_string(),
                })
            }
        };

        if fields.next().is_some() {
            return Err(ScriptError::Malformed {
                line,
                expected: "no trailing fields",
            });
        }

        commands.push(command);
    }

    Ok(commands)
}

fn field(
    fields: &mut SplitWhitespace<'_>,
    line: usize,
    expected: &'static str,
) -> Result<usize, ScriptError> {
    let raw = fields.next().ok_or(ScriptError::Malformed { line, expected })?;

    raw.parse()
        .map_err(|source| ScriptError::BadNumber { line, source })
}

/// Drives an allocator from a parsed script, tracking the pointer each id
/// is currently bound to. Freeing an unbound id and reallocating an
/// unbound id both go through with the null pointer, mirroring the
/// allocator's own `EMPTY_PTR` semantics.
pub struct ScriptRunner {
    allocator: SegmentAllocator,
    bindings: HashMap<usize, SegPtr>,
}

impl ScriptRunner {
    pub fn new(allocator: SegmentAllocator) -> Self {
        Self {
            allocator,
            bindings: HashMap::new(),
        }
    }

    pub fn allocator(&self) -> &SegmentAllocator {
        &self.allocator
    }

    /// Pointer currently bound to `id`, `EMPTY_PTR` when unbound.
    pub fn lookup(&self, id: usize) -> SegPtr {
        self.bindings.get(&id).copied().unwrap_or(EMPTY_PTR)
    }

    pub fn step(&mut self, command: Command) -> Result<(), AllocError> {
        match command {
            Command::Alloc { id, size } => {
                let ptr = self.allocator.allocate(size)?;
                self.bindings.insert(id, ptr);
            }
            Command::Realloc { id, size } => {
                let old = self.lookup(id);
                let ptr = self.allocator.reallocate(old, size)?;
                self.bindings.insert(id, ptr);
            }
            Command::Free { id } => {
                let ptr = self.bindings.remove(&id).unwrap_or(EMPTY_PTR);
                self.allocator.deallocate(ptr);
            }
        }

        Ok(())
    }

    pub fn run(&mut self, commands: &[Command]) -> Result<(), AllocError> {
        for &command in commands {
            self.step(command)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Command, ScriptError, ScriptRunner};
    use crate::mem::allocator::{Policy, SegmentAllocator};
    use crate::utils::mem_context::backing;

    #[test]
    fn parsing_works_fine() {
        let script = "\
# warmup
a 0 24

a 1 100
r 0 48
f 1
f 0
";

        let commands = parse(script).expect("Unable to parse");
        assert_eq!(
            commands,
            vec![
                Command::Alloc { id: 0, size: 24 },
                Command::Alloc { id: 1, size: 100 },
                Command::Realloc { id: 0, size: 48 },
                Command::Free { id: 1 },
                Command::Free { id: 0 },
            ]
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(matches!(
            parse("x 1 2"),
            Err(ScriptError::UnknownDirective { line: 1, .. })
        ));
        assert!(matches!(
            parse("a 1"),
            Err(ScriptError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            parse("f 1 2"),
            Err(ScriptError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            parse("a one 2"),
            Err(ScriptError::BadNumber { line: 1, .. })
        ));
    }

    #[test]
    fn runner_tracks_bindings() {
        backing::clear();
        let start = backing::reserve(1024).expect("Unable to reserve");
        let allocator =
            SegmentAllocator::init(start, 1024, Policy::Explicit).expect("Unable to init");

        let mut runner = ScriptRunner::new(allocator);
        let commands = parse("a 7 100\nr 7 300\nf 7\n").expect("Unable to parse");

        runner.step(commands[0]).expect("alloc step");
        let first = runner.lookup(7);
        assert_ne!(first, crate::mem::EMPTY_PTR);

        runner.step(commands[1]).expect("realloc step");
        assert_eq!(runner.lookup(7), first, "in-place growth keeps the pointer");

        runner.step(commands[2]).expect("free step");
        assert_eq!(runner.lookup(7), crate::mem::EMPTY_PTR);

        runner.allocator().validate().expect("heap must be consistent");
    }

    #[test]
    fn freeing_an_unbound_id_is_a_noop() {
        backing::clear();
        let start = backing::reserve(1024).expect("Unable to reserve");
        let allocator =
            SegmentAllocator::init(start, 1024, Policy::Explicit).expect("Unable to init");

        let mut runner = ScriptRunner::new(allocator);
        runner
            .run(&parse("f 42\n").expect("Unable to parse"))
            .expect("free of an unbound id");

        assert_eq!(runner.allocator().free_block_count(), 1);
    }
}

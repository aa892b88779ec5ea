//! Receiver side of the trace protocol.

use thiserror::Error;

use crate::event::{ClassEvent, FunctionEvent, TraceEvent};

/// A type rebuilt from class events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub module: String,
    pub name: String,
    pub args: Vec<TypeNode>,
}

impl TypeNode {
    /// Number of nodes in this tree.
    pub fn size(&self) -> usize {
        1 + self.args.iter().map(TypeNode::size).sum::<usize>()
    }
}

/// A compiled method rebuilt from one complete trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedMethod {
    pub name: String,
    pub signature: Vec<u8>,
    pub type_args: Vec<TypeNode>,
    pub owner: TypeNode,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("class '{name}' depends on {dep_count} types but only {available} precede it")]
    Underflow {
        name: String,
        dep_count: u32,
        available: usize,
    },

    #[error("function '{name}' needs {needed} units (type arguments and owner), found {available}")]
    MissingOwner {
        name: String,
        needed: usize,
        available: usize,
    },

    #[error("function '{name}' leaves {leftover} unconsumed units")]
    Unbalanced { name: String, leftover: usize },

    #[error("trace ended with {pending} units and no function event")]
    Truncated { pending: usize },
}

/// Consumes events one at a time and rebuilds the dependency trees.
///
/// After an error the reader discards its stack and starts over at the next event.
#[derive(Debug, Default)]
pub struct TraceReader {
    stack: Vec<TypeNode>,
}

impl TraceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units currently on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn read(&mut self, event: &TraceEvent) -> Result<Option<ReplayedMethod>, TraceError> {
        match event {
            TraceEvent::Class(class) => self.read_class(class).map(|()| None),
            TraceEvent::Function(function) => self.read_function(function).map(Some),
        }
    }

    pub fn read_class(&mut self, event: &ClassEvent) -> Result<(), TraceError> {
        let dep_count = event.dep_count as usize;
        if dep_count > self.stack.len() {
            let available = self.stack.len();
            self.stack.clear();
            return Err(TraceError::Underflow {
                name: event.name.clone(),
                dep_count: event.dep_count,
                available,
            });
        }
        let args = self.stack.split_off(self.stack.len() - dep_count);
        self.stack.push(TypeNode {
            module: event.module.clone(),
            name: event.name.clone(),
            args,
        });
        Ok(())
    }

    pub fn read_function(&mut self, event: &FunctionEvent) -> Result<ReplayedMethod, TraceError> {
        let needed = event.type_arg_count as usize + 1;
        let available = self.stack.len();
        if needed > available {
            self.stack.clear();
            return Err(TraceError::MissingOwner {
                name: event.name.clone(),
                needed,
                available,
            });
        }
        if needed < available {
            self.stack.clear();
            return Err(TraceError::Unbalanced {
                name: event.name.clone(),
                leftover: available - needed,
            });
        }

        let mut units = std::mem::take(&mut self.stack);
        // `needed >= 1` and `units.len() == needed`.
        let owner = units.pop().ok_or(TraceError::MissingOwner {
            name: event.name.clone(),
            needed,
            available,
        })?;
        Ok(ReplayedMethod {
            name: event.name.clone(),
            signature: event.signature.clone(),
            type_args: units,
            owner,
        })
    }

    /// Checks that no partial trace is pending.
    pub fn finish(self) -> Result<(), TraceError> {
        match self.stack.len() {
            0 => Ok(()),
            pending => Err(TraceError::Truncated { pending }),
        }
    }
}

/// Validates a whole event stream and returns every method it describes.
pub fn check_balance(events: &[TraceEvent]) -> Result<Vec<ReplayedMethod>, TraceError> {
    let mut reader = TraceReader::new();
    let mut methods = Vec::new();
    for event in events {
        if let Some(method) = reader.read(event)? {
            methods.push(method);
        }
    }
    reader.finish()?;
    Ok(methods)
}

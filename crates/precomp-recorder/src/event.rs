use std::fmt;

/// Announces one type. `dep_count` immediately preceding units are its generic
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassEvent {
    /// File identity of the module owning the type (its generic definition).
    pub module: String,
    /// Nested-aware qualified name, instantiation arguments included.
    pub name: String,
    pub dep_count: u32,
}

/// Announces the compiled method. Consumes `type_arg_count` argument units plus
/// the unit of its declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionEvent {
    pub name: String,
    pub signature: Vec<u8>,
    pub type_arg_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    Class(ClassEvent),
    Function(FunctionEvent),
}

impl TraceEvent {
    /// Units popped from the receiver's stack by this event.
    pub fn pops(&self) -> usize {
        match self {
            TraceEvent::Class(class) => class.dep_count as usize,
            TraceEvent::Function(function) => function.type_arg_count as usize + 1,
        }
    }

    /// Units pushed by this event.
    pub fn pushes(&self) -> usize {
        match self {
            TraceEvent::Class(_) => 1,
            TraceEvent::Function(_) => 0,
        }
    }
}

impl From<ClassEvent> for TraceEvent {
    fn from(event: ClassEvent) -> Self {
        TraceEvent::Class(event)
    }
}

impl From<FunctionEvent> for TraceEvent {
    fn from(event: FunctionEvent) -> Self {
        TraceEvent::Function(event)
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Class(class) => {
                write!(f, "class    [{}] {} ({})", class.module, class.name, class.dep_count)
            }
            TraceEvent::Function(function) => {
                write!(f, "function {} [", function.name)?;
                for (i, byte) in function.signature.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "] ({})", function.type_arg_count)
            }
        }
    }
}

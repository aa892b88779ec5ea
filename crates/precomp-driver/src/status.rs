use std::fmt;

/// Status vocabulary of the driver boundary, shaped like an `HRESULT`.
///
/// Zero is success, positive values are benign non-success, negative values are
/// errors. The values are stable: they cross the C ABI unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub i32);

const fn error(code: u32) -> Status {
    // Severity bit plus FACILITY_ITF, the facility reserved for interface-defined codes.
    Status((0x8004_0000 | code) as i32)
}

impl Status {
    pub const OK: Status = Status(0);
    /// The request was valid but nothing could be produced (`S_FALSE` analogue).
    pub const UNABLE: Status = Status(1);

    pub const MODULE_NOT_FOUND: Status = error(0x0201);
    pub const TYPE_NOT_FOUND: Status = error(0x0202);
    pub const ENCLOSING_TYPE_NOT_FOUND: Status = error(0x0203);
    pub const METHOD_NOT_FOUND: Status = error(0x0204);
    pub const AMBIGUOUS: Status = error(0x0205);
    pub const INVALID_HANDLE: Status = error(0x0206);
    pub const INVALID_ARGUMENT: Status = error(0x0207);
    pub const TYPE_LOAD: Status = error(0x0208);
    pub const INSTANTIATION: Status = error(0x0209);
    pub const ENGINE_FAULT: Status = error(0x020a);
    pub const PANIC: Status = error(0x020b);

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn is_error(self) -> bool {
        self.0 < 0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::OK => "OK",
            Status::UNABLE => "UNABLE",
            Status::MODULE_NOT_FOUND => "MODULE_NOT_FOUND",
            Status::TYPE_NOT_FOUND => "TYPE_NOT_FOUND",
            Status::ENCLOSING_TYPE_NOT_FOUND => "ENCLOSING_TYPE_NOT_FOUND",
            Status::METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
            Status::AMBIGUOUS => "AMBIGUOUS",
            Status::INVALID_HANDLE => "INVALID_HANDLE",
            Status::INVALID_ARGUMENT => "INVALID_ARGUMENT",
            Status::TYPE_LOAD => "TYPE_LOAD",
            Status::INSTANTIATION => "INSTANTIATION",
            Status::ENGINE_FAULT => "ENGINE_FAULT",
            Status::PANIC => "PANIC",
            _ => return None,
        })
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Status::{}", name),
            None => write!(f, "Status({:#010x})", self.0),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

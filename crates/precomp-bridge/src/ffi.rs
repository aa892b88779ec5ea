//! C ABI of the driver and recorder interfaces.
//!
//! Handles cross the boundary as their raw bits (`usize`, zero is invalid). Every
//! exported function reports failures through the status vocabulary of
//! [`Status`] and runs under `catch_unwind`; no unwind reaches the tool.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_long, c_uint, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use precomp_driver::{DriverError, DriverInterface, Status};
use precomp_handles::{FuncRef, TypeRef};
use precomp_recorder::Recorder;

use crate::observer::Discovery;

/// Driver interface handed to the tool.
#[repr(C)]
pub struct DriverTable {
    pub ctx: *const c_void,
    pub resolve_class: unsafe extern "C" fn(
        ctx: *const c_void,
        file_name: *const c_char,
        class_name: *const c_char,
        status: *mut c_long,
    ) -> usize,
    pub specialize_class: unsafe extern "C" fn(
        ctx: *const c_void,
        generic: usize,
        type_args: *const usize,
        type_arg_count: c_uint,
        status: *mut c_long,
    ) -> usize,
    pub resolve_function: unsafe extern "C" fn(
        ctx: *const c_void,
        class: usize,
        method_name: *const c_char,
        signature: *const u8,
        signature_len: c_uint,
        status: *mut c_long,
    ) -> usize,
    /// Returns zero on failure; there is no status channel.
    pub specialize_function: unsafe extern "C" fn(
        ctx: *const c_void,
        generic: usize,
        type_args: *const usize,
        type_arg_count: c_uint,
    ) -> usize,
    /// Returns the status. `code_size`, when non-null, receives the size of freshly
    /// generated code and is left untouched otherwise.
    pub compile_function:
        unsafe extern "C" fn(ctx: *const c_void, function: usize, code_size: *mut c_long) -> c_long,
}

/// Recorder interface handed back by the tool.
#[repr(C)]
pub struct RecorderTable {
    pub record_class:
        unsafe extern "C" fn(module: *const c_char, name: *const c_char, dep_count: c_uint),
    pub record_function: unsafe extern "C" fn(
        name: *const c_char,
        signature: *const u8,
        signature_len: c_uint,
        type_arg_count: c_uint,
    ),
}

/// Registration function the tool exports.
pub type ObserverEntry = unsafe extern "C" fn(driver: *const DriverTable) -> *const RecorderTable;

/// Owns a [`DriverTable`] and the driver its context points to.
pub struct ExportedDriver {
    table: Box<DriverTable>,
    // Referenced by `table.ctx`.
    _driver: Box<Arc<dyn DriverInterface>>,
}

// SAFETY: the table is immutable and its context is an `Arc<dyn DriverInterface>`,
// which is `Send + Sync`.
unsafe impl Send for ExportedDriver {}
unsafe impl Sync for ExportedDriver {}

impl ExportedDriver {
    pub fn new(driver: Arc<dyn DriverInterface>) -> Self {
        let driver = Box::new(driver);
        let table = Box::new(DriverTable {
            ctx: &*driver as *const Arc<dyn DriverInterface> as *const c_void,
            resolve_class: driver_resolve_class,
            specialize_class: driver_specialize_class,
            resolve_function: driver_resolve_function,
            specialize_function: driver_specialize_function,
            compile_function: driver_compile_function,
        });
        ExportedDriver {
            table,
            _driver: driver,
        }
    }

    pub fn table(&self) -> &DriverTable {
        &self.table
    }

    /// Keeps the table alive for the rest of the process. Tools may hold on to the
    /// pointer they were given indefinitely.
    pub fn leak(self) -> &'static DriverTable {
        let ExportedDriver { table, _driver: driver } = self;
        Box::leak(driver);
        Box::leak(table)
    }
}

/// Runs `op` with panics converted into [`Status::PANIC`].
fn guarded<T>(op: impl FnOnce() -> Result<T, Status>) -> Result<T, Status> {
    match catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(_) => {
            log::error!("panic inside a driver call");
            Err(Status::PANIC)
        }
    }
}

/// Handle bits for the tool, zero on failure, with the status stored in `out`.
unsafe fn handle_result(result: Result<usize, Status>, out: *mut c_long) -> usize {
    let (bits, status) = match result {
        Ok(bits) => (bits, Status::OK),
        Err(status) => (0, status),
    };
    if !out.is_null() {
        *out = status.0 as c_long;
    }
    bits
}

fn report(error: DriverError) -> Status {
    log::debug!("driver call failed: {}", error);
    error.status()
}

unsafe fn driver_ref<'a>(ctx: *const c_void) -> Result<&'a Arc<dyn DriverInterface>, Status> {
    (ctx as *const Arc<dyn DriverInterface>)
        .as_ref()
        .ok_or(Status::INVALID_ARGUMENT)
}

unsafe fn str_arg<'a>(ptr: *const c_char) -> Result<&'a str, Status> {
    if ptr.is_null() {
        return Err(Status::INVALID_ARGUMENT);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| Status::INVALID_ARGUMENT)
}

unsafe fn slice_arg<'a, T>(ptr: *const T, len: c_uint) -> Result<&'a [T], Status> {
    match (ptr.is_null(), len) {
        (_, 0) => Ok(Default::default()),
        (true, _) => Err(Status::INVALID_ARGUMENT),
        (false, len) => Ok(std::slice::from_raw_parts(ptr, len as usize)),
    }
}

unsafe fn type_args(ptr: *const usize, count: c_uint) -> Result<Vec<TypeRef>, Status> {
    Ok(slice_arg(ptr, count)?
        .iter()
        .map(|&bits| TypeRef::from_bits(bits))
        .collect())
}

unsafe extern "C" fn driver_resolve_class(
    ctx: *const c_void,
    file_name: *const c_char,
    class_name: *const c_char,
    status: *mut c_long,
) -> usize {
    let result = guarded(|| {
        let driver = driver_ref(ctx)?;
        let ty = driver
            .resolve_class(str_arg(file_name)?, str_arg(class_name)?)
            .map_err(report)?;
        Ok(ty.to_bits())
    });
    handle_result(result, status)
}

unsafe extern "C" fn driver_specialize_class(
    ctx: *const c_void,
    generic: usize,
    args: *const usize,
    count: c_uint,
    status: *mut c_long,
) -> usize {
    let result = guarded(|| {
        let driver = driver_ref(ctx)?;
        let ty = driver
            .specialize_class(TypeRef::from_bits(generic), &type_args(args, count)?)
            .map_err(report)?;
        Ok(ty.to_bits())
    });
    handle_result(result, status)
}

unsafe extern "C" fn driver_resolve_function(
    ctx: *const c_void,
    class: usize,
    method_name: *const c_char,
    signature: *const u8,
    signature_len: c_uint,
    status: *mut c_long,
) -> usize {
    let result = guarded(|| {
        let driver = driver_ref(ctx)?;
        let function = driver
            .resolve_function(
                TypeRef::from_bits(class),
                str_arg(method_name)?,
                slice_arg(signature, signature_len)?,
            )
            .map_err(report)?;
        Ok(function.to_bits())
    });
    handle_result(result, status)
}

unsafe extern "C" fn driver_specialize_function(
    ctx: *const c_void,
    generic: usize,
    args: *const usize,
    count: c_uint,
) -> usize {
    let result = guarded(|| {
        let driver = driver_ref(ctx)?;
        let function = driver
            .specialize_function(FuncRef::from_bits(generic), &type_args(args, count)?)
            .map_err(report)?;
        Ok(function.to_bits())
    });
    handle_result(result, std::ptr::null_mut())
}

unsafe extern "C" fn driver_compile_function(
    ctx: *const c_void,
    function: usize,
    code_size: *mut c_long,
) -> c_long {
    let result = guarded(|| {
        let driver = driver_ref(ctx)?;
        driver
            .compile_function(FuncRef::from_bits(function))
            .map_err(report)
    });
    let status = match result {
        Ok(outcome) => {
            if let (Some(size), false) = (outcome.code_size(), code_size.is_null()) {
                *code_size = size as c_long;
            }
            outcome.status()
        }
        Err(status) => status,
    };
    status.0 as c_long
}

/// [`Recorder`] backed by a tool's [`RecorderTable`].
pub struct ForeignRecorder {
    table: *const RecorderTable,
}

// SAFETY: the tool's table is immutable after registration and its callbacks are
// required to be callable from any thread.
unsafe impl Send for ForeignRecorder {}
unsafe impl Sync for ForeignRecorder {}

impl ForeignRecorder {
    /// # Safety
    /// `table` must be null or point to a `RecorderTable` that stays valid for the
    /// lifetime of the returned recorder.
    pub unsafe fn from_raw(table: *const RecorderTable) -> Option<Self> {
        if table.is_null() {
            None
        } else {
            Some(ForeignRecorder { table })
        }
    }
}

fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

impl Recorder for ForeignRecorder {
    fn record_class(&self, module: &str, name: &str, dep_count: u32) {
        let module = c_string(module);
        let name = c_string(name);
        // SAFETY: `from_raw` contract.
        unsafe { ((*self.table).record_class)(module.as_ptr(), name.as_ptr(), dep_count as c_uint) }
    }

    fn record_function(&self, name: &str, signature: &[u8], type_arg_count: u32) {
        let name = c_string(name);
        // SAFETY: `from_raw` contract.
        unsafe {
            ((*self.table).record_function)(
                name.as_ptr(),
                signature.as_ptr(),
                signature.len() as c_uint,
                type_arg_count as c_uint,
            )
        }
    }
}

/// Hands `driver` to a tool's registration function and wraps what it returns.
///
/// # Safety
/// `entry` must follow the [`ObserverEntry`] contract: it may keep the table pointer
/// for the rest of the process and must return null or a table that stays valid.
pub unsafe fn connect(
    entry: ObserverEntry,
    driver: Arc<dyn DriverInterface>,
) -> Option<ForeignRecorder> {
    let table = ExportedDriver::new(driver).leak();
    let recorder = ForeignRecorder::from_raw(entry(table));
    if recorder.is_none() {
        log::info!("observer registration function returned no recorder");
    }
    recorder
}

/// Looks the registration function up by name in the running program and the
/// libraries it has loaded.
pub struct SymbolDiscovery {
    symbol: String,
}

impl SymbolDiscovery {
    pub fn new(symbol: impl Into<String>) -> Self {
        SymbolDiscovery {
            symbol: symbol.into(),
        }
    }

    fn lookup(&self) -> Option<ObserverEntry> {
        let image = match this_image() {
            Ok(image) => image,
            Err(e) => {
                log::debug!("cannot open the running image: {}", e);
                return None;
            }
        };
        // SAFETY: the symbol is only ever declared with the `ObserverEntry` signature.
        match unsafe { image.get::<ObserverEntry>(self.symbol.as_bytes()) } {
            Ok(symbol) => Some(*symbol),
            Err(e) => {
                log::debug!("observer symbol '{}' not found: {}", self.symbol, e);
                None
            }
        }
    }
}

impl Discovery for SymbolDiscovery {
    fn discover(&self, driver: &Arc<dyn DriverInterface>) -> Option<Arc<dyn Recorder>> {
        let entry = self.lookup()?;
        log::info!("found observer entry point '{}'", self.symbol);
        // SAFETY: `lookup` only returns functions exported under the agreed name.
        let recorder = unsafe { connect(entry, driver.clone()) }?;
        Some(Arc::new(recorder))
    }
}

#[cfg(unix)]
fn this_image() -> Result<libloading::Library, libloading::Error> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_image() -> Result<libloading::Library, libloading::Error> {
    libloading::os::windows::Library::this().map(Into::into)
}

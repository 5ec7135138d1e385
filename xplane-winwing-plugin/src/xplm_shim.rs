//! Dataref, command and logging access to X-Plane behind `XplmApi`.
//!
//! `RealXplm` forwards to the SDK; `MockXplm` keeps datarefs in memory and
//! records writes and command phases for the profile tests.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Opaque handle to an X-Plane dataref (pointer-sized).
pub type DataRefHandle = usize;
/// Opaque handle to an X-Plane command (pointer-sized).
pub type CommandHandle = usize;

/// `XPLMDataTypeID` bits.
pub mod data_type {
    pub const INT: i32         = 1;
    pub const FLOAT: i32       = 2;
    pub const DOUBLE: i32      = 4;
    pub const FLOAT_ARRAY: i32 = 8;
    pub const INT_ARRAY: i32   = 16;
    pub const DATA: i32        = 32;
}

/// Phase of a command invocation. `Once` is a begin immediately followed by
/// an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandPhase {
    Begin,
    Continue,
    End,
    Once,
}

// ── DataRefValue (mock storage) ───────────────────────────────────────────────

/// Value stored in the mock shim for a single dataref.
#[derive(Debug, Clone, PartialEq)]
pub enum DataRefValue {
    Float(f32),
    Double(f64),
    Int(i32),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Bytes(Vec<u8>),
}

impl DataRefValue {
    fn type_bits(&self) -> i32 {
        match self {
            Self::Float(_)      => data_type::FLOAT | data_type::DOUBLE,
            Self::Double(_)     => data_type::DOUBLE,
            Self::Int(_)        => data_type::INT,
            Self::FloatArray(_) => data_type::FLOAT_ARRAY,
            Self::IntArray(_)   => data_type::INT_ARRAY,
            Self::Bytes(_)      => data_type::DATA,
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Abstraction over every XPLM call the plugin makes outside the entry points.
///
/// `Send + Sync` so the trait object can be shared with the logging layer.
/// Array getters follow the SDK convention: with an empty `out` they return
/// the total element count, otherwise the number of elements copied.
pub trait XplmApi: Send + Sync {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle>;
    fn dataref_types(&self, handle: DataRefHandle) -> i32;
    fn get_float(&self, handle: DataRefHandle) -> f32;
    fn get_double(&self, handle: DataRefHandle) -> f64;
    fn get_int(&self, handle: DataRefHandle) -> i32;
    fn get_float_array(&self, handle: DataRefHandle, offset: usize, out: &mut [f32]) -> usize;
    fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]) -> usize;
    fn get_bytes(&self, handle: DataRefHandle, offset: usize, out: &mut [u8]) -> usize;
    fn set_float(&self, handle: DataRefHandle, value: f32);
    fn set_double(&self, handle: DataRefHandle, value: f64);
    fn set_int(&self, handle: DataRefHandle, value: i32);
    fn set_float_array(&self, handle: DataRefHandle, offset: usize, values: &[f32]);
    fn set_int_array(&self, handle: DataRefHandle, offset: usize, values: &[i32]);
    fn set_bytes(&self, handle: DataRefHandle, offset: usize, values: &[u8]);

    fn find_command(&self, name: &str) -> Option<CommandHandle>;
    fn command_begin(&self, handle: CommandHandle);
    fn command_end(&self, handle: CommandHandle);
    fn command_once(&self, handle: CommandHandle);

    fn log(&self, message: &str);
}

// ── MockXplm ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockInner {
    datarefs: HashMap<String, DataRefValue>,
    /// handle → canonical path (assigned on first `find_dataref` call)
    handles: Vec<String>,
    commands: Vec<String>,
    /// recorded scalar writes: (path, value as written)
    writes: Vec<(String, DataRefValue)>,
    /// recorded command invocations
    command_log: Vec<(String, CommandPhase)>,
    log_messages: Vec<String>,
}

impl MockInner {
    fn path(&self, handle: DataRefHandle) -> Option<&String> {
        self.handles.get(handle)
    }

    fn value(&self, handle: DataRefHandle) -> Option<&DataRefValue> {
        self.path(handle).and_then(|p| self.datarefs.get(p))
    }

    fn record(&mut self, handle: DataRefHandle, value: DataRefValue) {
        if let Some(path) = self.path(handle).cloned() {
            self.datarefs.insert(path.clone(), value.clone());
            self.writes.push((path, value));
        }
    }
}

/// Test implementation. Returns configurable values, records writes and
/// command invocations.
#[derive(Default)]
pub struct MockXplm {
    inner: Mutex<MockInner>,
}

impl MockXplm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a dataref. Also used by tests to emulate the sim
    /// changing a value between flight-loop ticks.
    pub fn set_dataref(&self, path: &str, value: DataRefValue) {
        self.inner.lock().datarefs.insert(path.to_string(), value);
    }

    /// Make a dataref disappear (e.g. after an aircraft unload).
    pub fn remove_dataref(&self, path: &str) {
        self.inner.lock().datarefs.remove(path);
    }

    pub fn dataref(&self, path: &str) -> Option<DataRefValue> {
        self.inner.lock().datarefs.get(path).cloned()
    }

    /// Register a command so `find_command` succeeds.
    pub fn add_command(&self, name: &str) {
        let mut g = self.inner.lock();
        if !g.commands.iter().any(|c| c == name) {
            g.commands.push(name.to_string());
        }
    }

    /// Snapshot of every dataref write (path, value).
    pub fn writes(&self) -> Vec<(String, DataRefValue)> {
        self.inner.lock().writes.clone()
    }

    /// Snapshot of every command invocation (name, phase).
    pub fn command_calls(&self) -> Vec<(String, CommandPhase)> {
        self.inner.lock().command_log.clone()
    }

    /// Snapshot all logged messages.
    pub fn log_messages(&self) -> Vec<String> {
        self.inner.lock().log_messages.clone()
    }

    fn command_phase(&self, handle: CommandHandle, phase: CommandPhase) {
        let mut g = self.inner.lock();
        if let Some(name) = g.commands.get(handle).cloned() {
            g.command_log.push((name, phase));
        }
    }
}

fn copy_out<T: Copy>(src: &[T], offset: usize, out: &mut [T]) -> usize {
    if out.is_empty() {
        return src.len();
    }
    let avail = src.get(offset..).unwrap_or(&[]);
    let n = avail.len().min(out.len());
    out[..n].copy_from_slice(&avail[..n]);
    n
}

fn splice<T: Copy + Default>(dst: &mut Vec<T>, offset: usize, values: &[T]) {
    if dst.len() < offset + values.len() {
        dst.resize(offset + values.len(), T::default());
    }
    dst[offset..offset + values.len()].copy_from_slice(values);
}

impl XplmApi for MockXplm {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
        let mut g = self.inner.lock();
        if !g.datarefs.contains_key(path) {
            return None;
        }
        // Reuse existing handle if already assigned.
        if let Some(idx) = g.handles.iter().position(|p| p == path) {
            return Some(idx);
        }
        let idx = g.handles.len();
        g.handles.push(path.to_string());
        Some(idx)
    }

    fn dataref_types(&self, handle: DataRefHandle) -> i32 {
        self.inner.lock().value(handle).map_or(0, DataRefValue::type_bits)
    }

    fn get_float(&self, handle: DataRefHandle) -> f32 {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::Float(v))  => *v,
            Some(DataRefValue::Double(v)) => *v as f32,
            Some(DataRefValue::Int(v))    => *v as f32,
            _ => 0.0,
        }
    }

    fn get_double(&self, handle: DataRefHandle) -> f64 {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::Double(v)) => *v,
            Some(DataRefValue::Float(v))  => f64::from(*v),
            Some(DataRefValue::Int(v))    => f64::from(*v),
            _ => 0.0,
        }
    }

    fn get_int(&self, handle: DataRefHandle) -> i32 {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::Int(v))    => *v,
            Some(DataRefValue::Float(v))  => *v as i32,
            Some(DataRefValue::Double(v)) => *v as i32,
            _ => 0,
        }
    }

    fn get_float_array(&self, handle: DataRefHandle, offset: usize, out: &mut [f32]) -> usize {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::FloatArray(arr)) => copy_out(arr, offset, out),
            _ => 0,
        }
    }

    fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]) -> usize {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::IntArray(arr)) => copy_out(arr, offset, out),
            _ => 0,
        }
    }

    fn get_bytes(&self, handle: DataRefHandle, offset: usize, out: &mut [u8]) -> usize {
        match self.inner.lock().value(handle) {
            Some(DataRefValue::Bytes(arr)) => copy_out(arr, offset, out),
            _ => 0,
        }
    }

    fn set_float(&self, handle: DataRefHandle, value: f32) {
        self.inner.lock().record(handle, DataRefValue::Float(value));
    }

    fn set_double(&self, handle: DataRefHandle, value: f64) {
        self.inner.lock().record(handle, DataRefValue::Double(value));
    }

    fn set_int(&self, handle: DataRefHandle, value: i32) {
        self.inner.lock().record(handle, DataRefValue::Int(value));
    }

    fn set_float_array(&self, handle: DataRefHandle, offset: usize, values: &[f32]) {
        let mut g = self.inner.lock();
        let mut arr = match g.value(handle) {
            Some(DataRefValue::FloatArray(a)) => a.clone(),
            _ => Vec::new(),
        };
        splice(&mut arr, offset, values);
        g.record(handle, DataRefValue::FloatArray(arr));
    }

    fn set_int_array(&self, handle: DataRefHandle, offset: usize, values: &[i32]) {
        let mut g = self.inner.lock();
        let mut arr = match g.value(handle) {
            Some(DataRefValue::IntArray(a)) => a.clone(),
            _ => Vec::new(),
        };
        splice(&mut arr, offset, values);
        g.record(handle, DataRefValue::IntArray(arr));
    }

    fn set_bytes(&self, handle: DataRefHandle, offset: usize, values: &[u8]) {
        let mut g = self.inner.lock();
        let mut arr = match g.value(handle) {
            Some(DataRefValue::Bytes(a)) => a.clone(),
            _ => Vec::new(),
        };
        splice(&mut arr, offset, values);
        g.record(handle, DataRefValue::Bytes(arr));
    }

    fn find_command(&self, name: &str) -> Option<CommandHandle> {
        self.inner.lock().commands.iter().position(|c| c == name)
    }

    fn command_begin(&self, handle: CommandHandle) {
        self.command_phase(handle, CommandPhase::Begin);
    }

    fn command_end(&self, handle: CommandHandle) {
        self.command_phase(handle, CommandPhase::End);
    }

    fn command_once(&self, handle: CommandHandle) {
        self.command_phase(handle, CommandPhase::Once);
    }

    fn log(&self, message: &str) {
        self.inner.lock().log_messages.push(message.to_string());
    }
}

// ── RealXplm (production builds only) ─────────────────────────────────────────

#[cfg(not(test))]
pub use real::RealXplm;

#[cfg(not(test))]
mod real {
    use super::{CommandHandle, DataRefHandle, XplmApi};
    use crate::xplm_sys as sys;
    use std::ffi::{c_int, c_void, CString};
    use std::ptr;

    /// Production implementation over the raw XPLM extern calls.
    pub struct RealXplm;

    fn clamp_len(n: c_int) -> usize {
        usize::try_from(n).unwrap_or(0)
    }

    impl XplmApi for RealXplm {
        fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
            let c = CString::new(path).ok()?;
            let h = unsafe { sys::XPLMFindDataRef(c.as_ptr()) };
            if h.is_null() { None } else { Some(h as usize) }
        }

        fn dataref_types(&self, handle: DataRefHandle) -> i32 {
            unsafe { sys::XPLMGetDataRefTypes(handle as _) }
        }

        fn get_float(&self, handle: DataRefHandle) -> f32 {
            unsafe { sys::XPLMGetDataf(handle as _) }
        }

        fn get_double(&self, handle: DataRefHandle) -> f64 {
            unsafe { sys::XPLMGetDatad(handle as _) }
        }

        fn get_int(&self, handle: DataRefHandle) -> i32 {
            unsafe { sys::XPLMGetDatai(handle as _) }
        }

        fn get_float_array(&self, handle: DataRefHandle, offset: usize, out: &mut [f32]) -> usize {
            let dst = if out.is_empty() { ptr::null_mut() } else { out.as_mut_ptr() };
            clamp_len(unsafe {
                sys::XPLMGetDatavf(handle as _, dst, offset as c_int, out.len() as c_int)
            })
        }

        fn get_int_array(&self, handle: DataRefHandle, offset: usize, out: &mut [i32]) -> usize {
            let dst = if out.is_empty() { ptr::null_mut() } else { out.as_mut_ptr() };
            clamp_len(unsafe {
                sys::XPLMGetDatavi(handle as _, dst, offset as c_int, out.len() as c_int)
            })
        }

        fn get_bytes(&self, handle: DataRefHandle, offset: usize, out: &mut [u8]) -> usize {
            let dst = if out.is_empty() { ptr::null_mut() } else { out.as_mut_ptr() as *mut c_void };
            clamp_len(unsafe {
                sys::XPLMGetDatab(handle as _, dst, offset as c_int, out.len() as c_int)
            })
        }

        fn set_float(&self, handle: DataRefHandle, value: f32) {
            unsafe { sys::XPLMSetDataf(handle as _, value) }
        }

        fn set_double(&self, handle: DataRefHandle, value: f64) {
            unsafe { sys::XPLMSetDatad(handle as _, value) }
        }

        fn set_int(&self, handle: DataRefHandle, value: i32) {
            unsafe { sys::XPLMSetDatai(handle as _, value) }
        }

        fn set_float_array(&self, handle: DataRefHandle, offset: usize, values: &[f32]) {
            unsafe {
                sys::XPLMSetDatavf(handle as _, values.as_ptr(), offset as c_int, values.len() as c_int)
            }
        }

        fn set_int_array(&self, handle: DataRefHandle, offset: usize, values: &[i32]) {
            unsafe {
                sys::XPLMSetDatavi(handle as _, values.as_ptr(), offset as c_int, values.len() as c_int)
            }
        }

        fn set_bytes(&self, handle: DataRefHandle, offset: usize, values: &[u8]) {
            unsafe {
                sys::XPLMSetDatab(
                    handle as _,
                    values.as_ptr() as *const c_void,
                    offset as c_int,
                    values.len() as c_int,
                )
            }
        }

        fn find_command(&self, name: &str) -> Option<CommandHandle> {
            let c = CString::new(name).ok()?;
            let h = unsafe { sys::XPLMFindCommand(c.as_ptr()) };
            if h.is_null() { None } else { Some(h as usize) }
        }

        fn command_begin(&self, handle: CommandHandle) {
            unsafe { sys::XPLMCommandBegin(handle as _) }
        }

        fn command_end(&self, handle: CommandHandle) {
            unsafe { sys::XPLMCommandEnd(handle as _) }
        }

        fn command_once(&self, handle: CommandHandle) {
            unsafe { sys::XPLMCommandOnce(handle as _) }
        }

        fn log(&self, message: &str) {
            if let Ok(c) = CString::new(message) {
                unsafe { sys::XPLMDebugString(c.as_ptr()) }
            }
        }
    }
}

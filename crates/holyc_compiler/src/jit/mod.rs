//! JIT session store and module installation.
//!
//! A [`JitSession`] owns everything a named session has loaded: installed IR
//! modules, the host memory backing their globals and string constants, and
//! the synthetic code addresses handed out for function values. Sessions
//! live in a [`SessionStore`]; the process-wide store backs the CLI while
//! tests construct isolated stores of their own.
//!
//! Symbol resolution is module-first, newest module wins, then the runtime
//! shim table. Host-process symbols are not consulted at all; the setjmp
//! family the emitted code relies on is modeled directly by the
//! interpreter.

pub mod interp;

use crate::ir::{Const, Module, Type};
use crate::runtime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Map an optional session name to its key; the empty name is the reserved
/// default session.
pub fn session_key(name: &str) -> String {
    if name.is_empty() {
        "__default__".to_string()
    } else {
        name.to_string()
    }
}

/// A process-wide or test-local collection of named sessions.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<JitSession>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore { sessions: Mutex::new(HashMap::new()) }
    }

    /// The store used by the driver process.
    pub fn global() -> &'static SessionStore {
        static GLOBAL: OnceLock<SessionStore> = OnceLock::new();
        GLOBAL.get_or_init(SessionStore::new)
    }

    pub fn get_or_create(&self, name: &str) -> Arc<JitSession> {
        let key = session_key(name);
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                log::trace!("creating jit session '{key}'");
                Arc::new(JitSession::new(key.clone()))
            })
            .clone()
    }

    /// Drop everything bound to a session name. Outstanding spawned tasks
    /// are drained first.
    pub fn remove(&self, name: &str) {
        runtime::hc_spawn_wait_all();
        let key = session_key(name);
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        if sessions.remove(&key).is_some() {
            log::trace!("dropped jit session '{key}'");
        }
    }
}

/// A block of session-owned memory with a stable, 8-byte-aligned address.
struct MemBlock {
    data: Box<[u64]>,
}

impl MemBlock {
    fn zeroed(size: usize) -> MemBlock {
        let words = size.div_ceil(8).max(1);
        MemBlock { data: vec![0u64; words].into_boxed_slice() }
    }

    fn addr(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

/// One resolved global: its address in session memory and its value type.
#[derive(Debug, Clone)]
pub(crate) struct GlobalCell {
    pub addr: usize,
    pub ty: Type,
}

/// A module installed into a session, with its private symbol table.
pub(crate) struct InstalledModule {
    pub module: Arc<Module>,
    /// Globals defined by this module (including private constants).
    pub globals: HashMap<String, GlobalCell>,
    /// Names this module declared external; resolved against older modules
    /// or lazily materialized.
    pub extern_globals: HashMap<String, Type>,
}

pub(crate) struct SessionState {
    pub modules: Vec<Arc<InstalledModule>>,
    /// Synthetic code addresses for function values.
    pub fn_addr_by_name: HashMap<String, usize>,
    pub fn_by_addr: HashMap<usize, String>,
    /// Zero-filled cells materialized for unresolved externals.
    pub late_globals: HashMap<String, GlobalCell>,
    memory: Vec<MemBlock>,
    /// argv block handed to entry thunks: "holyc-jit" + [ptr, null].
    argv_addr: usize,
}

pub struct JitSession {
    name: String,
    pub(crate) state: RwLock<SessionState>,
}

impl JitSession {
    fn new(name: String) -> JitSession {
        JitSession {
            name,
            state: RwLock::new(SessionState {
                modules: Vec::new(),
                fn_addr_by_name: HashMap::new(),
                fn_by_addr: HashMap::new(),
                late_globals: HashMap::new(),
                memory: Vec::new(),
                argv_addr: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install a verified module: allocate and initialize its globals and
    /// register its functions.
    pub fn install_module(&self, module: Module) -> Result<(), String> {
        let module = Arc::new(module);
        let mut state = self.state.write().expect("session state poisoned");

        let mut installed = InstalledModule {
            module: module.clone(),
            globals: HashMap::new(),
            extern_globals: HashMap::new(),
        };

        // Pass 1: allocate zeroed cells so initializers can take addresses.
        for global in &module.globals {
            match &global.init {
                None => {
                    installed.extern_globals.insert(global.name.clone(), global.ty.clone());
                }
                Some(_) => {
                    let size = module.size_of(&global.ty).max(1);
                    let addr = state.allocate(size);
                    installed
                        .globals
                        .insert(global.name.clone(), GlobalCell { addr, ty: global.ty.clone() });
                }
            }
        }

        // Function address tokens, newest module shadowing older names.
        for func in &module.functions {
            if func.is_declaration() {
                continue;
            }
            let token = state.allocate(1);
            state.fn_addr_by_name.insert(func.name.clone(), token);
            state.fn_by_addr.insert(token, func.name.clone());
        }

        // Pass 2: write initializers.
        for global in &module.globals {
            let Some(init) = &global.init else {
                continue;
            };
            let addr = installed.globals[&global.name].addr;
            write_const(&mut state, &installed, &module, init, &global.ty, addr)?;
        }

        state.modules.push(Arc::new(installed));
        log::debug!(
            "session '{}': installed module #{} ({} globals, {} functions)",
            self.name,
            state.modules.len(),
            module.globals.len(),
            module.functions.iter().filter(|f| !f.is_declaration()).count()
        );
        Ok(())
    }

    /// Resolve a defined function, newest module first.
    pub(crate) fn find_function(
        &self,
        name: &str,
    ) -> Option<(Arc<InstalledModule>, Arc<Module>, String)> {
        let state = self.state.read().expect("session state poisoned");
        for installed in state.modules.iter().rev() {
            if let Some(func) = installed.module.function(name) {
                if !func.is_declaration() {
                    return Some((installed.clone(), installed.module.clone(), name.to_string()));
                }
            }
        }
        None
    }

    /// Address of a global as seen from `from`, searching the defining
    /// module, then older modules, then late-materialized cells.
    pub(crate) fn resolve_global(
        &self,
        from: &InstalledModule,
        name: &str,
    ) -> Option<GlobalCell> {
        if let Some(cell) = from.globals.get(name) {
            return Some(cell.clone());
        }

        {
            let state = self.state.read().expect("session state poisoned");
            for installed in state.modules.iter().rev() {
                if let Some(cell) = installed.globals.get(name) {
                    return Some(cell.clone());
                }
            }
            if let Some(cell) = state.late_globals.get(name) {
                return Some(cell.clone());
            }
        }

        // Declared-but-undefined symbols materialize as zero-filled cells so
        // REPL prelude externs stay usable before their definition loads.
        let ty = from.extern_globals.get(name)?.clone();
        let mut state = self.state.write().expect("session state poisoned");
        if let Some(cell) = state.late_globals.get(name) {
            return Some(cell.clone());
        }
        let size = from.module.size_of(&ty).max(1);
        let addr = state.allocate(size);
        log::trace!("materializing unresolved external '@{name}' ({size} bytes)");
        let cell = GlobalCell { addr, ty };
        state.late_globals.insert(name.to_string(), cell.clone());
        Some(cell)
    }

    /// Synthetic code address for a function or runtime symbol.
    pub(crate) fn address_of_symbol(&self, name: &str) -> Option<usize> {
        {
            let state = self.state.read().expect("session state poisoned");
            if let Some(addr) = state.fn_addr_by_name.get(name) {
                return Some(*addr);
            }
        }
        if runtime::is_runtime_symbol(name) {
            let mut state = self.state.write().expect("session state poisoned");
            if let Some(addr) = state.fn_addr_by_name.get(name) {
                return Some(*addr);
            }
            let token = state.allocate(1);
            state.fn_addr_by_name.insert(name.to_string(), token);
            state.fn_by_addr.insert(token, name.to_string());
            return Some(token);
        }
        None
    }

    pub(crate) fn function_name_of_addr(&self, addr: usize) -> Option<String> {
        let state = self.state.read().expect("session state poisoned");
        state.fn_by_addr.get(&addr).cloned()
    }

    /// The argv block passed to host-style entry points.
    pub(crate) fn argv_addr(&self) -> usize {
        {
            let state = self.state.read().expect("session state poisoned");
            if state.argv_addr != 0 {
                return state.argv_addr;
            }
        }
        let mut state = self.state.write().expect("session state poisoned");
        if state.argv_addr != 0 {
            return state.argv_addr;
        }
        let name = state.allocate_bytes(b"holyc-jit\0");
        let argv = state.allocate(16);
        unsafe {
            *(argv as *mut usize) = name;
            *((argv + 8) as *mut usize) = 0;
        }
        state.argv_addr = argv;
        argv
    }
}

impl SessionState {
    fn allocate(&mut self, size: usize) -> usize {
        let block = MemBlock::zeroed(size);
        let addr = block.addr();
        self.memory.push(block);
        addr
    }

    fn allocate_bytes(&mut self, bytes: &[u8]) -> usize {
        let addr = self.allocate(bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        addr
    }
}

/// Write a constant initializer into session memory at `addr`.
fn write_const(
    state: &mut SessionState,
    installed: &InstalledModule,
    module: &Module,
    value: &Const,
    ty: &Type,
    addr: usize,
) -> Result<(), String> {
    match value {
        Const::Zero(_) | Const::Null => Ok(()),
        Const::Int(_, v) => {
            write_int(addr, *v, module.size_of(ty));
            Ok(())
        }
        Const::Bytes(bytes) => {
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
            }
            Ok(())
        }
        Const::GlobalRef(name) => {
            let target = resolve_init_address(state, installed, name)?;
            write_int(addr, target as i64, 8);
            Ok(())
        }
        Const::PtrToInt(inner, to) => {
            let size = module.size_of(to);
            let target = match inner.as_ref() {
                Const::GlobalRef(name) => resolve_init_address(state, installed, name)? as i64,
                Const::Int(_, v) => *v,
                other => {
                    return Err(format!("unsupported ptrtoint initializer: {other:?}"));
                }
            };
            write_int(addr, target, size);
            Ok(())
        }
        Const::IntToPtr(inner) => {
            let Const::Int(_, v) = inner.as_ref() else {
                return Err("unsupported inttoptr initializer".to_string());
            };
            write_int(addr, *v, 8);
            Ok(())
        }
        Const::Struct(tys, fields) => {
            let mut offset = 0usize;
            for (field_ty, field) in tys.iter().zip(fields.iter()) {
                write_const(state, installed, module, field, field_ty, addr + offset)?;
                offset += module.size_of(field_ty);
            }
            Ok(())
        }
        Const::Array(elem_ty, items) => {
            let elem_size = module.size_of(elem_ty);
            for (i, item) in items.iter().enumerate() {
                write_const(state, installed, module, item, elem_ty, addr + i * elem_size)?;
            }
            Ok(())
        }
    }
}

fn resolve_init_address(
    state: &mut SessionState,
    installed: &InstalledModule,
    name: &str,
) -> Result<usize, String> {
    if let Some(cell) = installed.globals.get(name) {
        return Ok(cell.addr);
    }
    for older in state.modules.iter().rev() {
        if let Some(cell) = older.globals.get(name) {
            return Ok(cell.addr);
        }
    }
    if let Some(addr) = state.fn_addr_by_name.get(name) {
        return Ok(*addr);
    }
    Err(format!("initializer references unknown symbol '@{name}'"))
}

fn write_int(addr: usize, value: i64, size: usize) {
    let bytes = value.to_le_bytes();
    let count = size.min(8).max(1);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, count);
    }
}


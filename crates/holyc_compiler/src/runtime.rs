//! Runtime shims backing the emitted code.
//!
//! These are the `hc_*` and TempleOS-compatibility symbols the execution
//! engine resolves for JIT'd modules: printing, setjmp-style exception
//! state, reflection tables with hash-class lookup, heap helpers, and the
//! task-spawn bookkeeping. The try stack, exception payload, and reflection
//! cache are thread-local; the spawn in-flight counter is process-wide
//! behind a mutex/condvar pair.
//!
//! Functions that take raw addresses operate on real host memory: the JIT
//! engine hands out genuine pointers for allocas, globals, and interned
//! strings, so C-string walks and reflection-node pointer chains behave
//! exactly as native code would.

use holyc_frontend::printfmt::{parse_format_pieces, FormatPiece, FormatSpec};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write as _;
use std::sync::{Condvar, Mutex};

/// Bytes reserved for one `hc_try_frame`; comfortably covers the host
/// `jmp_buf` plus the chain pointer on the supported targets.
pub const TRY_FRAME_SIZE: usize = 512;

/// Name of the emitted reflection-table global.
pub const RUNTIME_REFLECTION_TABLE: &str = ".hc.reflection";

const ABI_VERSION_MAJOR: i64 = 1;
const ABI_VERSION_MINOR: i64 = 0;

/// Symbols the JIT resolver serves from this module.
pub const RUNTIME_SYMBOLS: &[&str] = &[
    "hc_runtime_abi_version",
    "hc_print_str",
    "hc_put_char",
    "hc_print_fmt",
    "hc_try_push",
    "hc_try_pop",
    "hc_throw_i64",
    "hc_exception_payload",
    "hc_exception_active",
    "hc_try_depth",
    "hc_register_reflection_table",
    "hc_reflection_field_count",
    "hc_reflection_fields",
    "hc_malloc",
    "hc_free",
    "hc_memcpy",
    "hc_memset",
    "CallStkGrow",
    "Spawn",
    "JobQue",
    "JobResGet",
    "HashFind",
    "MemberMetaData",
    "MemberMetaFind",
    "hc_task_spawn",
    "hc_spawn_wait_all",
];

/// Host symbols the engine may resolve outside the runtime shim set.
pub const HOST_SETJMP_ALLOWLIST: &[&str] = &["_setjmp", "setjmp", "__sigsetjmp"];

pub fn is_runtime_symbol(name: &str) -> bool {
    RUNTIME_SYMBOLS.contains(&name)
}

pub fn hc_runtime_abi_version() -> i64 {
    (ABI_VERSION_MAJOR << 32) | ABI_VERSION_MINOR
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

/// Read a NUL-terminated C string out of engine memory.
///
/// Callers guarantee `addr` points at engine-owned, NUL-terminated bytes.
pub unsafe fn read_cstr(addr: usize) -> String {
    if addr == 0 {
        return String::new();
    }
    let mut out = Vec::new();
    let mut p = addr as *const u8;
    loop {
        let b = unsafe { *p };
        if b == 0 {
            break;
        }
        out.push(b);
        p = unsafe { p.add(1) };
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn hc_print_str(text_addr: usize) {
    if text_addr == 0 {
        return;
    }
    let text = unsafe { read_cstr(text_addr) };
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

pub fn hc_put_char(ch: i64) {
    let byte = (ch & 0xff) as u8;
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(&[byte]);
    let _ = stdout.flush();
}

pub fn hc_print_fmt(format_addr: usize, args_addr: usize, arg_count: i64) {
    if format_addr == 0 {
        return;
    }
    let format = unsafe { read_cstr(format_addr) };
    let count = arg_count.max(0) as usize;
    let mut args = Vec::with_capacity(count);
    for i in 0..count {
        let value = if args_addr == 0 {
            0
        } else {
            unsafe { *((args_addr as *const i64).add(i)) }
        };
        args.push(value);
    }

    let rendered = format_holyc(&format, &args);
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(rendered.as_bytes());
    let _ = stdout.flush();
}

/// Render a format string with packed i64 arguments, using the same
/// format-spec grammar sema validated against.
pub fn format_holyc(format: &str, args: &[i64]) -> String {
    let Ok(pieces) = parse_format_pieces(format) else {
        // An unparseable format at runtime degrades to the raw text.
        return format.to_string();
    };

    let mut out = String::new();
    let mut arg_index = 0usize;
    let mut next_arg = |fallback: i64| -> i64 {
        if arg_index >= args.len() {
            return fallback;
        }
        let value = args[arg_index];
        arg_index += 1;
        value
    };

    for piece in pieces {
        match piece {
            FormatPiece::Literal(text) => out.push_str(&text),
            FormatPiece::Spec(spec) => {
                let width = if spec.atom.width_from_arg {
                    usize::try_from(next_arg(0)).unwrap_or(0)
                } else {
                    spec.width.unwrap_or(0)
                };
                let precision = if spec.atom.precision_from_arg {
                    Some(usize::try_from(next_arg(0)).unwrap_or(0))
                } else {
                    spec.precision
                };
                render_spec(&spec, width, precision, &mut next_arg, &mut out);
            }
        }
    }
    out
}

fn render_spec(
    spec: &FormatSpec,
    width: usize,
    precision: Option<usize>,
    next_arg: &mut dyn FnMut(i64) -> i64,
    out: &mut String,
) {
    let flags = spec.flags;
    match spec.atom.conv {
        'd' | 'i' => {
            let value = next_arg(0);
            let digits = value.unsigned_abs().to_string();
            let sign = if value < 0 {
                "-"
            } else if flags.plus {
                "+"
            } else if flags.space {
                " "
            } else {
                ""
            };
            push_padded_number(out, sign, &digits, width, flags.left_align, flags.zero_pad);
        }
        'u' => {
            let digits = (next_arg(0) as u64).to_string();
            push_padded_number(out, "", &digits, width, flags.left_align, flags.zero_pad);
        }
        'x' | 'X' | 'o' => {
            let value = next_arg(0) as u64;
            let mut digits = match spec.atom.conv {
                'x' => format!("{value:x}"),
                'X' => format!("{value:X}"),
                _ => format!("{value:o}"),
            };
            if flags.alt && value != 0 && spec.atom.conv != 'o' {
                digits = format!("0{}{digits}", spec.atom.conv);
            }
            push_padded_number(out, "", &digits, width, flags.left_align, flags.zero_pad);
        }
        'b' => {
            let value = next_arg(0) as u64;
            let digits =
                if value == 0 { "0".to_string() } else { format!("{value:b}") };
            out.push_str(&digits);
        }
        'c' => {
            let value = next_arg(0);
            out.push((value & 0xff) as u8 as char);
        }
        's' => {
            let addr = next_arg(0) as usize;
            let mut text = if addr == 0 {
                "(null)".to_string()
            } else {
                unsafe { read_cstr(addr) }
            };
            if let Some(precision) = precision {
                text.truncate(precision);
            }
            push_padded(out, &text, width, flags.left_align);
        }
        'p' => {
            let addr = next_arg(0) as u64;
            push_padded(out, &format!("0x{addr:x}"), width, flags.left_align);
        }
        'P' => {
            let addr = next_arg(0) as u64;
            let text = if addr == 0 { "0x0".to_string() } else { format!("0x{addr:x}") };
            push_padded(out, &text, width, flags.left_align);
        }
        'z' => {
            let index = next_arg(0);
            let table = next_arg(0) as usize;
            out.push_str(&lookup_z_string(table, index));
        }
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let value = f64::from_bits(next_arg(0) as u64);
            let prec = precision.unwrap_or(6);
            let text = match spec.atom.conv {
                'e' | 'E' => {
                    let rendered = format!("{value:.prec$e}");
                    if spec.atom.conv == 'E' {
                        rendered.to_uppercase()
                    } else {
                        rendered
                    }
                }
                'g' | 'G' => format!("{value}"),
                _ => format!("{value:.prec$}"),
            };
            push_padded_number(out, "", &text, width, flags.left_align, flags.zero_pad);
        }
        _ => {}
    }
}

fn push_padded(out: &mut String, text: &str, width: usize, left_align: bool) {
    if text.len() >= width {
        out.push_str(text);
        return;
    }
    let pad = width - text.len();
    if left_align {
        out.push_str(text);
        out.push_str(&" ".repeat(pad));
    } else {
        out.push_str(&" ".repeat(pad));
        out.push_str(text);
    }
}

fn push_padded_number(
    out: &mut String,
    sign: &str,
    digits: &str,
    width: usize,
    left_align: bool,
    zero_pad: bool,
) {
    let len = sign.len() + digits.len();
    if len >= width {
        out.push_str(sign);
        out.push_str(digits);
        return;
    }
    let pad = width - len;
    if left_align {
        out.push_str(sign);
        out.push_str(digits);
        out.push_str(&" ".repeat(pad));
    } else if zero_pad {
        out.push_str(sign);
        out.push_str(&"0".repeat(pad));
        out.push_str(digits);
    } else {
        out.push_str(&" ".repeat(pad));
        out.push_str(sign);
        out.push_str(digits);
    }
}

/// `%z`: the index-th NUL-terminated entry of a packed string table.
fn lookup_z_string(table_addr: usize, index: i64) -> String {
    if table_addr == 0 || index < 0 {
        return String::new();
    }
    let mut cursor = table_addr;
    for _ in 0..index {
        while unsafe { *(cursor as *const u8) } != 0 {
            cursor += 1;
        }
        cursor += 1;
    }
    unsafe { read_cstr(cursor) }
}

// ---------------------------------------------------------------------------
// Exception state
// ---------------------------------------------------------------------------

thread_local! {
    static TRY_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static EXCEPTION_PAYLOAD: RefCell<i64> = const { RefCell::new(0) };
}

pub fn hc_try_push(frame_addr: usize) {
    if frame_addr == 0 {
        return;
    }
    TRY_STACK.with(|stack| stack.borrow_mut().push(frame_addr));
}

pub fn hc_try_pop(frame_addr: usize) {
    if frame_addr == 0 {
        return;
    }
    TRY_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(position) = stack.iter().rposition(|f| *f == frame_addr) {
            stack.remove(position);
        }
    });
}

/// Record the payload and pop the innermost frame; the engine transfers
/// control to it. `None` means no frame is active (uncaught).
pub fn hc_throw_begin(payload: i64) -> Option<usize> {
    EXCEPTION_PAYLOAD.with(|slot| *slot.borrow_mut() = payload);
    TRY_STACK.with(|stack| stack.borrow_mut().pop())
}

pub fn hc_exception_payload() -> i64 {
    EXCEPTION_PAYLOAD.with(|slot| *slot.borrow())
}

pub fn hc_exception_active() -> i64 {
    TRY_STACK.with(|stack| i64::from(!stack.borrow().is_empty()))
}

pub fn hc_try_depth() -> i64 {
    TRY_STACK.with(|stack| stack.borrow().len() as i64)
}

// ---------------------------------------------------------------------------
// Heap helpers
// ---------------------------------------------------------------------------

static ALLOCATIONS: Mutex<Option<HashMap<usize, Layout>>> = Mutex::new(None);

pub fn hc_malloc(size: i64) -> usize {
    let size = size.max(1) as usize;
    let Ok(layout) = Layout::from_size_align(size, 16) else {
        return 0;
    };
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return 0;
    }
    let addr = ptr as usize;
    let mut allocations = ALLOCATIONS.lock().expect("allocation registry poisoned");
    allocations.get_or_insert_with(HashMap::new).insert(addr, layout);
    addr
}

pub fn hc_free(addr: usize) {
    if addr == 0 {
        return;
    }
    let layout = {
        let mut allocations = ALLOCATIONS.lock().expect("allocation registry poisoned");
        allocations.as_mut().and_then(|map| map.remove(&addr))
    };
    if let Some(layout) = layout {
        unsafe { dealloc(addr as *mut u8, layout) };
    }
}

pub fn hc_memcpy(dst: usize, src: usize, size: i64) -> usize {
    if dst != 0 && src != 0 && size > 0 {
        unsafe {
            std::ptr::copy(src as *const u8, dst as *mut u8, size as usize);
        }
    }
    dst
}

pub fn hc_memset(dst: usize, value: i64, size: i64) -> usize {
    if dst != 0 && size > 0 {
        unsafe {
            std::ptr::write_bytes(dst as *mut u8, (value & 0xff) as u8, size as usize);
        }
    }
    dst
}

// ---------------------------------------------------------------------------
// Spawn bookkeeping
// ---------------------------------------------------------------------------

struct SpawnGate {
    inflight: Mutex<i64>,
    drained: Condvar,
}

static SPAWN_GATE: SpawnGate =
    SpawnGate { inflight: Mutex::new(0), drained: Condvar::new() };

pub fn mark_spawn_start() {
    let mut count = SPAWN_GATE.inflight.lock().expect("spawn gate poisoned");
    *count += 1;
}

pub fn mark_spawn_done() {
    let mut count = SPAWN_GATE.inflight.lock().expect("spawn gate poisoned");
    if *count > 0 {
        *count -= 1;
    }
    if *count == 0 {
        SPAWN_GATE.drained.notify_all();
    }
}

/// Block until every spawned task has finished.
pub fn hc_spawn_wait_all() {
    let mut count = SPAWN_GATE.inflight.lock().expect("spawn gate poisoned");
    while *count > 0 {
        count = SPAWN_GATE.drained.wait(count).expect("spawn gate poisoned");
    }
}

pub fn spawn_inflight() -> i64 {
    *SPAWN_GATE.inflight.lock().expect("spawn gate poisoned")
}

// ---------------------------------------------------------------------------
// Reflection cache
// ---------------------------------------------------------------------------

// Layouts mirror the aggregate shapes sema bootstraps: every field is one
// 8-byte slot, so GEP offsets computed from the packed hc.* layouts land on
// these fields.
#[repr(C)]
struct HcMemberMeta {
    key: *mut u8,
    value: i64,
    next: *mut HcMemberMeta,
}

#[repr(C)]
pub struct CMemberLst {
    str_: *mut u8,
    offset: i64,
    next: *mut CMemberLst,
    meta: *mut HcMemberMeta,
}

#[repr(C)]
pub struct CHashClass {
    member_lst_and_root: *mut CMemberLst,
    class_name: *mut u8,
    next: *mut CHashClass,
    tail: *mut CMemberLst,
    next_offset: i64,
}

struct ReflectionState {
    fields_addr: usize,
    field_count: usize,
    classes: *mut CHashClass,
    cache_ready: bool,
}

thread_local! {
    static REFLECTION: RefCell<ReflectionState> = const {
        RefCell::new(ReflectionState {
            fields_addr: 0,
            field_count: 0,
            classes: std::ptr::null_mut(),
            cache_ready: false,
        })
    };
}

fn leak_cstring(text: &str) -> *mut u8 {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    Box::leak(bytes.into_boxed_slice()).as_mut_ptr()
}

fn estimate_type_size(type_name: &str) -> i64 {
    if type_name.contains('*') {
        return 8;
    }
    match type_name {
        "I8" | "U8" | "Bool" => 1,
        "I16" | "U16" => 2,
        "I32" | "U32" => 4,
        _ => 8,
    }
}

/// The limited constant grammar accepted in metadata values.
fn parse_simple_int_expr(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(value) = holyc_frontend::preprocessor::parse_int_base0(trimmed) {
        return Some(value);
    }

    let bytes = trimmed.as_bytes();
    let mut split = None;
    for i in 1..bytes.len() {
        if bytes[i] == b'+' || bytes[i] == b'-' {
            split = Some(i);
        }
    }
    if split.is_none() {
        for i in 1..bytes.len() {
            if matches!(bytes[i], b'*' | b'/' | b'%') {
                split = Some(i);
            }
        }
    }

    let Some(split) = split else {
        return match trimmed {
            "TRUE" | "RED" => Some(1),
            "FALSE" | "NULL" => Some(0),
            _ => trimmed.parse::<f64>().ok().map(|v| v as i64),
        };
    };

    let lhs = parse_simple_int_expr(&trimmed[..split])?;
    let rhs = parse_simple_int_expr(&trimmed[split + 1..])?;
    match bytes[split] {
        b'+' => Some(lhs.wrapping_add(rhs)),
        b'-' => Some(lhs.wrapping_sub(rhs)),
        b'*' => Some(lhs.wrapping_mul(rhs)),
        b'/' => (rhs != 0).then(|| lhs.wrapping_div(rhs)),
        b'%' => (rhs != 0).then(|| lhs.wrapping_rem(rhs)),
        _ => None,
    }
}

fn parse_meta_value(token: &str) -> i64 {
    if token.starts_with('"') {
        let decoded = holyc_frontend::literals::decode_quoted_string(token);
        return leak_cstring(&decoded) as i64;
    }
    if let Some(_symbol) = token.strip_prefix('&') {
        // No host symbol resolution in the self-hosted engine.
        return 0;
    }
    parse_simple_int_expr(token).unwrap_or(0)
}

fn tokenize_annotations(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let start = i;
        if bytes[i] == b'"' {
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'"' && bytes[i - 1] != b'\\' {
                    i += 1;
                    break;
                }
                i += 1;
            }
        } else {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        }
        tokens.push(String::from_utf8_lossy(&bytes[start..i]).into_owned());
    }
    tokens
}

unsafe fn free_reflection_cache(state: &mut ReflectionState) {
    let mut class = state.classes;
    while !class.is_null() {
        let next_class = unsafe { (*class).next };
        let mut member = unsafe { (*class).member_lst_and_root };
        while !member.is_null() {
            let next_member = unsafe { (*member).next };
            let mut meta = unsafe { (*member).meta };
            while !meta.is_null() {
                let next_meta = unsafe { (*meta).next };
                drop(unsafe { Box::from_raw(meta) });
                meta = next_meta;
            }
            drop(unsafe { Box::from_raw(member) });
            member = next_member;
        }
        drop(unsafe { Box::from_raw(class) });
        class = next_class;
    }
    state.classes = std::ptr::null_mut();
    state.cache_ready = false;
}

pub fn hc_register_reflection_table(fields_addr: usize, field_count: i64) {
    REFLECTION.with(|state| {
        let mut state = state.borrow_mut();
        state.fields_addr = fields_addr;
        state.field_count = field_count.max(0) as usize;
        unsafe { free_reflection_cache(&mut state) };
    });
}

pub fn hc_reflection_field_count() -> i64 {
    REFLECTION.with(|state| state.borrow().field_count as i64)
}

pub fn hc_reflection_fields() -> usize {
    REFLECTION.with(|state| state.borrow().fields_addr)
}

fn ensure_reflection_cache(state: &mut ReflectionState) {
    if state.cache_ready {
        return;
    }
    unsafe { free_reflection_cache(state) };

    if state.fields_addr == 0 || state.field_count == 0 {
        state.cache_ready = true;
        return;
    }

    // Each table row is four pointers: aggregate, field, type, annotations.
    for i in 0..state.field_count {
        let row = state.fields_addr + i * 32;
        let aggregate_addr = unsafe { *(row as *const usize) };
        let field_addr = unsafe { *((row + 8) as *const usize) };
        let type_addr = unsafe { *((row + 16) as *const usize) };
        let annotations_addr = unsafe { *((row + 24) as *const usize) };
        if aggregate_addr == 0 || field_addr == 0 {
            continue;
        }

        let aggregate = unsafe { read_cstr(aggregate_addr) };
        let field = unsafe { read_cstr(field_addr) };
        let type_name = unsafe { read_cstr(type_addr) };
        let annotations = unsafe { read_cstr(annotations_addr) };

        let class = find_or_create_class(state, &aggregate);
        append_member_field(class, &field, &type_name, &annotations);
    }
    state.cache_ready = true;
}

fn find_class_by_name(state: &ReflectionState, name: &str) -> *mut CHashClass {
    let mut class = state.classes;
    while !class.is_null() {
        let class_name = unsafe { read_cstr((*class).class_name as usize) };
        if class_name == name {
            return class;
        }
        class = unsafe { (*class).next };
    }
    std::ptr::null_mut()
}

fn find_or_create_class(state: &mut ReflectionState, name: &str) -> *mut CHashClass {
    let existing = find_class_by_name(state, name);
    if !existing.is_null() {
        return existing;
    }
    let class = Box::into_raw(Box::new(CHashClass {
        member_lst_and_root: std::ptr::null_mut(),
        class_name: leak_cstring(name),
        next: state.classes,
        tail: std::ptr::null_mut(),
        next_offset: 0,
    }));
    state.classes = class;
    class
}

fn append_member_field(class: *mut CHashClass, field: &str, type_name: &str, annotations: &str) {
    let member = Box::into_raw(Box::new(CMemberLst {
        str_: leak_cstring(field),
        offset: unsafe { (*class).next_offset },
        next: std::ptr::null_mut(),
        meta: std::ptr::null_mut(),
    }));
    unsafe {
        (*class).next_offset += estimate_type_size(type_name);
        if (*class).member_lst_and_root.is_null() {
            (*class).member_lst_and_root = member;
        } else {
            (*(*class).tail).next = member;
        }
        (*class).tail = member;
    }

    if annotations.is_empty() {
        return;
    }
    let tokens = tokenize_annotations(annotations);
    let mut i = 0usize;
    while i < tokens.len() {
        let key = &tokens[i];
        let value = tokens.get(i + 1).map(String::as_str).unwrap_or("1");
        let meta = Box::into_raw(Box::new(HcMemberMeta {
            key: leak_cstring(key),
            value: parse_meta_value(value),
            next: std::ptr::null_mut(),
        }));
        unsafe {
            if (*member).meta.is_null() {
                (*member).meta = meta;
            } else {
                let mut cursor = (*member).meta;
                while !(*cursor).next.is_null() {
                    cursor = (*cursor).next;
                }
                (*cursor).next = meta;
            }
        }
        i += 2;
    }
}

pub fn hash_find(name_addr: usize, _table_addr: usize, _kind: i64) -> usize {
    let name = unsafe { read_cstr(name_addr) };
    REFLECTION.with(|state| {
        let mut state = state.borrow_mut();
        ensure_reflection_cache(&mut state);
        find_class_by_name(&state, &name) as usize
    })
}

pub fn member_meta_data(key_addr: usize, member_addr: usize) -> i64 {
    if key_addr == 0 || member_addr == 0 {
        return 0;
    }
    let key = unsafe { read_cstr(key_addr) };
    let member = member_addr as *const CMemberLst;
    let mut meta = unsafe { (*member).meta };
    while !meta.is_null() {
        let meta_key = unsafe { read_cstr((*meta).key as usize) };
        if meta_key == key {
            return unsafe { (*meta).value };
        }
        meta = unsafe { (*meta).next };
    }
    0
}

pub fn member_meta_find(key_addr: usize, member_addr: usize) -> i64 {
    if key_addr == 0 || member_addr == 0 {
        return 0;
    }
    let key = unsafe { read_cstr(key_addr) };
    let member = member_addr as *const CMemberLst;
    let mut meta = unsafe { (*member).meta };
    while !meta.is_null() {
        let meta_key = unsafe { read_cstr((*meta).key as usize) };
        if meta_key == key {
            return meta as i64;
        }
        meta = unsafe { (*meta).next };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_version_packs_major_minor() {
        assert_eq!(hc_runtime_abi_version(), 1 << 32);
    }

    #[test]
    fn format_integers_and_padding() {
        assert_eq!(format_holyc("%d!", &[42]), "42!");
        assert_eq!(format_holyc("%5d", &[42]), "   42");
        assert_eq!(format_holyc("%-5d|", &[42]), "42   |");
        assert_eq!(format_holyc("%05d", &[42]), "00042");
        assert_eq!(format_holyc("%05d", &[-42]), "-0042");
        assert_eq!(format_holyc("%x %X %o", &[255, 255, 8]), "ff FF 10");
        assert_eq!(format_holyc("%u", &[-1]), u64::MAX.to_string());
    }

    #[test]
    fn format_binary_and_percent() {
        assert_eq!(format_holyc("%b", &[5]), "101");
        assert_eq!(format_holyc("%b", &[0]), "0");
        assert_eq!(format_holyc("100%%", &[]), "100%");
    }

    #[test]
    fn format_star_width() {
        assert_eq!(format_holyc("%*d", &[5, 42]), "   42");
    }

    #[test]
    fn format_strings_and_chars() {
        let text = b"holy\0";
        let addr = text.as_ptr() as i64;
        assert_eq!(format_holyc("%s %c", &[addr, 'C' as i64]), "holy C");
        assert_eq!(format_holyc("%s", &[0]), "(null)");
    }

    #[test]
    fn format_floats_from_bits() {
        let bits = 2.5f64.to_bits() as i64;
        assert_eq!(format_holyc("%f", &[bits]), "2.500000");
        assert_eq!(format_holyc("%.2f", &[bits]), "2.50");
    }

    #[test]
    fn format_z_string_table() {
        let table = b"zero\0one\0two\0";
        let addr = table.as_ptr() as i64;
        assert_eq!(format_holyc("%z", &[1, addr]), "one");
        assert_eq!(format_holyc("%z", &[2, addr]), "two");
    }

    #[test]
    fn format_pointer_forms() {
        assert_eq!(format_holyc("%P", &[0]), "0x0");
        assert_eq!(format_holyc("%p", &[0x10]), "0x10");
    }

    #[test]
    fn try_stack_discipline() {
        hc_try_push(0x1000);
        hc_try_push(0x2000);
        assert_eq!(hc_try_depth(), 2);
        assert_eq!(hc_exception_active(), 1);
        assert_eq!(hc_throw_begin(7), Some(0x2000));
        assert_eq!(hc_exception_payload(), 7);
        hc_try_pop(0x1000);
        assert_eq!(hc_try_depth(), 0);
        assert_eq!(hc_exception_active(), 0);
    }

    #[test]
    fn malloc_free_round_trip() {
        let addr = hc_malloc(64);
        assert_ne!(addr, 0);
        hc_memset(addr, 0xab, 64);
        let copy = hc_malloc(64);
        hc_memcpy(copy, addr, 64);
        assert_eq!(unsafe { *(copy as *const u8) }, 0xab);
        hc_free(addr);
        hc_free(copy);
    }

    #[test]
    fn spawn_gate_counts() {
        mark_spawn_start();
        assert_eq!(spawn_inflight(), 1);
        mark_spawn_done();
        assert_eq!(spawn_inflight(), 0);
        hc_spawn_wait_all();
    }

    #[test]
    fn reflection_cache_lookup() {
        // Build a two-row table in host memory: CPoint.x (I64) and
        // CPoint.y (I64 with a meta annotation).
        let names: Vec<*mut u8> = ["CPoint", "x", "I64", "", "CPoint", "y", "I64", "\"fmt\" 8"]
            .iter()
            .map(|s| leak_cstring(s))
            .collect();
        let rows: Vec<usize> = names.iter().map(|p| *p as usize).collect();
        hc_register_reflection_table(rows.as_ptr() as usize, 2);

        let class_name = leak_cstring("CPoint");
        let class = hash_find(class_name as usize, 0, 0);
        assert_ne!(class, 0);

        let class = class as *const CHashClass;
        let member = unsafe { (*class).member_lst_and_root };
        assert_eq!(unsafe { read_cstr((*member).str_ as usize) }, "x");
        assert_eq!(unsafe { (*member).offset }, 0);
        let second = unsafe { (*member).next };
        assert_eq!(unsafe { read_cstr((*second).str_ as usize) }, "y");
        assert_eq!(unsafe { (*second).offset }, 8);

        let key = leak_cstring("\"fmt\"");
        let value = member_meta_data(key as usize, second as usize);
        assert_eq!(value, 8);

        hc_register_reflection_table(0, 0);
    }

    #[test]
    fn meta_value_grammar() {
        assert_eq!(parse_simple_int_expr("4+4"), Some(8));
        assert_eq!(parse_simple_int_expr("TRUE"), Some(1));
        assert_eq!(parse_simple_int_expr("2*8"), Some(16));
        assert_eq!(parse_simple_int_expr("junk"), None);
    }
}

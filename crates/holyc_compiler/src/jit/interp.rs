//! The IR execution engine.
//!
//! A typed interpreter over verified IR. Allocas, globals, and string
//! constants live in real host memory, so pointer arithmetic, lane
//! read-modify-write sequences, reflection-node chains, and the runtime's
//! C-string walks behave exactly as native code would. The setjmp family is
//! modeled directly: a `_setjmp` call records a resume point for its frame
//! address, and `hc_throw_i64` unwinds interpreter frames to the innermost
//! pushed frame, resuming the recorded point with result 1.
//!
//! Integer values are kept canonically sign-extended to 64 bits for their
//! width (i1 is kept as 0/1); loads sign-extend, which matches the
//! emitter's sign-extending `CastIfNeeded` discipline.

use super::{InstalledModule, JitSession};
use crate::ir::{BinOp, Callee, CastOp, Function, ICmpPred, Inst, Module, Op, RmwOp, Term, Type, Value};
use crate::runtime;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const MAX_CALL_DEPTH: usize = 2_000;

static NEXT_TASK_ID: AtomicI64 = AtomicI64::new(1);

/// A runtime value. Pointers are addresses in the `I` arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RtVal {
    I(i64),
    F(f64),
}

impl RtVal {
    fn as_i64(self) -> i64 {
        match self {
            RtVal::I(v) => v,
            RtVal::F(f) => f as i64,
        }
    }
}

/// How a function invocation finished.
enum CallOutcome {
    Return(Option<RtVal>),
    /// Unwinding toward the setjmp point registered for this frame address.
    Unwind(usize),
}

enum CallResult {
    Value(Option<RtVal>),
    Unwind(usize),
}

/// Execute `entry` in the session with host-main argument conventions and
/// reduce the result to an `i32`, the entry-thunk contract.
pub fn execute_entry(session: &Arc<JitSession>, entry: &str) -> Result<i32, String> {
    let Some((installed, module, name)) = session.find_function(entry) else {
        return Err(format!("jit: missing entry symbol '{entry}'"));
    };
    let func = module
        .function(&name)
        .ok_or_else(|| format!("jit: missing entry symbol '{entry}'"))?;

    let mut args = Vec::with_capacity(func.params.len());
    for (i, param) in func.params.iter().enumerate() {
        let value = if i < 2 {
            if param.ty.is_pointer() {
                RtVal::I(session.argv_addr() as i64)
            } else {
                RtVal::I(1)
            }
        } else {
            RtVal::I(0)
        };
        args.push(value);
    }

    let engine = Engine { session: session.clone() };
    match engine.call_function(&installed, &module, func, &args, 0)? {
        CallOutcome::Return(value) => {
            let raw = value.map(RtVal::as_i64).unwrap_or(0);
            Ok(raw as i32)
        }
        CallOutcome::Unwind(_) => {
            Err("fatal runtime error: exception unwound past the jit entry".to_string())
        }
    }
}

/// Call a function by its synthetic code address with plain i64 arguments.
/// This is the path spawned tasks and `CallStkGrow` use.
pub fn call_address(session: &Arc<JitSession>, addr: usize, args: &[i64]) -> Result<i64, String> {
    let engine = Engine { session: session.clone() };
    engine.call_by_address(addr, args, 0)
}

struct Engine {
    session: Arc<JitSession>,
}

impl Engine {
    fn call_by_address(&self, addr: usize, args: &[i64], depth: usize) -> Result<i64, String> {
        let Some(name) = self.session.function_name_of_addr(addr) else {
            return Err(format!("jit: call target 0x{addr:x} is not a function"));
        };
        if runtime::is_runtime_symbol(&name) {
            return match self.dispatch_runtime(&name, args)? {
                CallResult::Value(value) => Ok(value.map(RtVal::as_i64).unwrap_or(0)),
                CallResult::Unwind(_) => {
                    Err("fatal runtime error: exception unwound past an indirect call".to_string())
                }
            };
        }

        let Some((installed, module, fn_name)) = self.session.find_function(&name) else {
            return Err(format!("jit: symbol not found: {name}"));
        };
        let func = module
            .function(&fn_name)
            .ok_or_else(|| format!("jit: symbol not found: {fn_name}"))?;

        let mut call_args = Vec::with_capacity(func.params.len());
        for i in 0..func.params.len() {
            call_args.push(RtVal::I(args.get(i).copied().unwrap_or(0)));
        }
        match self.call_function(&installed, &module, func, &call_args, depth)? {
            CallOutcome::Return(value) => Ok(value.map(RtVal::as_i64).unwrap_or(0)),
            CallOutcome::Unwind(_) => Err(format!(
                "fatal runtime error: exception unwound past task entry '{name}'"
            )),
        }
    }

    fn call_function(
        &self,
        installed: &Arc<InstalledModule>,
        module: &Arc<Module>,
        func: &Function,
        args: &[RtVal],
        depth: usize,
    ) -> Result<CallOutcome, String> {
        if depth > MAX_CALL_DEPTH {
            return Err(format!("jit: call depth limit exceeded in '{}'", func.name));
        }

        let mut frame = Frame {
            values: vec![None; frame_slot_count(func)],
            allocas: Vec::new(),
            setjmp_points: Vec::new(),
        };

        let mut block_idx = 0usize;
        let mut inst_idx = 0usize;

        loop {
            let block = &func.blocks[block_idx];

            if inst_idx < block.insts.len() {
                let inst = &block.insts[inst_idx];
                match self.exec_inst(
                    installed, module, args, &mut frame, inst, block_idx, inst_idx, depth,
                )? {
                    InstFlow::Next => {
                        inst_idx += 1;
                    }
                    InstFlow::Unwind(target) => {
                        match frame.resume_point(target) {
                            Some((resume_block, resume_inst, result_id)) => {
                                frame.set(result_id, RtVal::I(1));
                                block_idx = resume_block;
                                inst_idx = resume_inst + 1;
                            }
                            None => return Ok(CallOutcome::Unwind(target)),
                        }
                    }
                }
                continue;
            }

            let term = block
                .term
                .as_ref()
                .ok_or_else(|| format!("jit: fell off unterminated block in '{}'", func.name))?;
            match term {
                Term::Ret(None) => return Ok(CallOutcome::Return(None)),
                Term::Ret(Some((_, value))) => {
                    let value = self.value_of(installed, module, args, &frame, value)?;
                    return Ok(CallOutcome::Return(Some(value)));
                }
                Term::Br(label) => {
                    block_idx = func
                        .block_index(label)
                        .ok_or_else(|| format!("jit: missing block '{label}'"))?;
                    inst_idx = 0;
                }
                Term::CondBr { cond, then_label, else_label } => {
                    let cond = self.value_of(installed, module, args, &frame, cond)?;
                    let label = if cond.as_i64() != 0 { then_label } else { else_label };
                    block_idx = func
                        .block_index(label)
                        .ok_or_else(|| format!("jit: missing block '{label}'"))?;
                    inst_idx = 0;
                }
                Term::Unreachable => {
                    return Err(format!("jit: executed unreachable in '{}'", func.name));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_inst(
        &self,
        installed: &Arc<InstalledModule>,
        module: &Arc<Module>,
        args: &[RtVal],
        // args above are the function arguments; frame holds local values.
        frame: &mut Frame,
        inst: &Inst,
        block_idx: usize,
        inst_idx: usize,
        depth: usize,
    ) -> Result<InstFlow, String> {
        match &inst.op {
            Op::Alloca { ty } => {
                // u64-backed so every slot is 8-byte aligned.
                let words = module.size_of(ty).div_ceil(8).max(1);
                let block = vec![0u64; words].into_boxed_slice();
                let addr = block.as_ptr() as usize;
                frame.allocas.push(block);
                frame.set(inst.id.expect("alloca produces a value"), RtVal::I(addr as i64));
                Ok(InstFlow::Next)
            }

            Op::Load { ty, ptr } => {
                let addr = self.value_of(installed, module, args, frame, ptr)?.as_i64() as usize;
                if addr == 0 {
                    return Err("jit: load through null pointer".to_string());
                }
                let value = unsafe { read_scalar(addr, ty, module) }?;
                frame.set(inst.id.expect("load produces a value"), value);
                Ok(InstFlow::Next)
            }

            Op::Store { ty, val, ptr } => {
                let addr = self.value_of(installed, module, args, frame, ptr)?.as_i64() as usize;
                if addr == 0 {
                    return Err("jit: store through null pointer".to_string());
                }
                let value = self.value_of(installed, module, args, frame, val)?;
                unsafe { write_scalar(addr, ty, module, value) }?;
                Ok(InstFlow::Next)
            }

            Op::Bin { op, ty, lhs, rhs } => {
                let bits = ty.int_bits().unwrap_or(64);
                let a = self.value_of(installed, module, args, frame, lhs)?.as_i64();
                let b = self.value_of(installed, module, args, frame, rhs)?.as_i64();
                let value = exec_bin(*op, bits, a, b)?;
                frame.set(inst.id.expect("bin produces a value"), RtVal::I(value));
                Ok(InstFlow::Next)
            }

            Op::ICmp { pred, lhs, rhs, .. } => {
                let a = self.value_of(installed, module, args, frame, lhs)?.as_i64();
                let b = self.value_of(installed, module, args, frame, rhs)?.as_i64();
                let result = match pred {
                    ICmpPred::Eq => a == b,
                    ICmpPred::Ne => a != b,
                    ICmpPred::Slt => a < b,
                    ICmpPred::Sgt => a > b,
                    ICmpPred::Sle => a <= b,
                    ICmpPred::Sge => a >= b,
                };
                frame.set(inst.id.expect("icmp produces a value"), RtVal::I(i64::from(result)));
                Ok(InstFlow::Next)
            }

            Op::Cast { op, from, to, val } => {
                let value = self.value_of(installed, module, args, frame, val)?;
                let out = exec_cast(*op, from, to, value);
                frame.set(inst.id.expect("cast produces a value"), out);
                Ok(InstFlow::Next)
            }

            Op::Gep { elem, base, indices, .. } => {
                let base_addr =
                    self.value_of(installed, module, args, frame, base)?.as_i64() as usize;
                let mut addr = base_addr;
                let mut current = elem.clone();
                for (i, (_, index)) in indices.iter().enumerate() {
                    let index = self.value_of(installed, module, args, frame, index)?.as_i64();
                    if i == 0 {
                        addr = addr
                            .wrapping_add((index as isize as usize).wrapping_mul(module.size_of(&current)));
                        continue;
                    }
                    match current.clone() {
                        Type::Struct(name) => {
                            let def = module
                                .struct_def(&name)
                                .ok_or_else(|| format!("jit: unknown struct '%{name}'"))?;
                            let field = index as usize;
                            addr = addr.wrapping_add(
                                module.struct_field_offset(&def.fields, field),
                            );
                            current = def.fields[field].clone();
                        }
                        Type::Tuple(fields) => {
                            let field = index as usize;
                            addr = addr.wrapping_add(module.struct_field_offset(&fields, field));
                            current = fields[field].clone();
                        }
                        Type::Array(elem_ty, _) => {
                            addr = addr.wrapping_add(
                                (index as isize as usize).wrapping_mul(module.size_of(&elem_ty)),
                            );
                            current = (*elem_ty).clone();
                        }
                        other => {
                            return Err(format!("jit: gep through non-aggregate type {other}"));
                        }
                    }
                }
                frame.set(inst.id.expect("gep produces a value"), RtVal::I(addr as i64));
                Ok(InstFlow::Next)
            }

            Op::AtomicRmw { op, ty, ptr, val } => {
                let addr = self.value_of(installed, module, args, frame, ptr)?.as_i64() as usize;
                if addr == 0 {
                    return Err("jit: atomic op through null pointer".to_string());
                }
                let operand = self.value_of(installed, module, args, frame, val)?.as_i64();
                let old = exec_atomic_rmw(*op, ty, module, addr, operand)?;
                frame.set(inst.id.expect("atomicrmw produces a value"), RtVal::I(old));
                Ok(InstFlow::Next)
            }

            Op::Call { callee, args: call_args, .. } => {
                let mut evaluated = Vec::with_capacity(call_args.len());
                for (_, arg) in call_args {
                    evaluated.push(self.value_of(installed, module, args, frame, arg)?);
                }

                // The setjmp family records a resume point in this frame.
                if let Callee::Direct(name) = callee {
                    if runtime::HOST_SETJMP_ALLOWLIST.contains(&name.as_str()) {
                        let frame_addr = evaluated
                            .first()
                            .map(|v| v.as_i64() as usize)
                            .unwrap_or(0);
                        let result_id = inst.id.expect("setjmp produces a value");
                        frame.register_setjmp(frame_addr, block_idx, inst_idx, result_id);
                        frame.set(result_id, RtVal::I(0));
                        return Ok(InstFlow::Next);
                    }
                }

                let result = match callee {
                    Callee::Direct(name) => self.call_named(name, &evaluated, depth)?,
                    Callee::Indirect(target) => {
                        let addr =
                            self.value_of(installed, module, args, frame, target)?.as_i64() as usize;
                        self.call_addr_value(addr, &evaluated, depth)?
                    }
                    // Inline asm cannot run on the self-hosted engine; the
                    // operands were evaluated for their side effects and any
                    // output slots read as zero.
                    Callee::Asm { .. } => CallResult::Value(Some(RtVal::I(0))),
                };

                match result {
                    CallResult::Value(value) => {
                        if let Some(id) = inst.id {
                            frame.set(id, value.unwrap_or(RtVal::I(0)));
                        }
                        Ok(InstFlow::Next)
                    }
                    CallResult::Unwind(target) => Ok(InstFlow::Unwind(target)),
                }
            }
        }
    }

    fn call_named(&self, name: &str, args: &[RtVal], depth: usize) -> Result<CallResult, String> {
        if runtime::is_runtime_symbol(name) {
            let raw: Vec<i64> = args.iter().map(|v| v.as_i64()).collect();
            return self.dispatch_runtime(name, &raw);
        }

        let Some((installed, module, fn_name)) = self.session.find_function(name) else {
            return Err(format!("jit: symbol not found: {name}"));
        };
        let func = module
            .function(&fn_name)
            .ok_or_else(|| format!("jit: symbol not found: {fn_name}"))?;
        match self.call_function(&installed, &module, func, args, depth + 1)? {
            CallOutcome::Return(value) => Ok(CallResult::Value(value)),
            CallOutcome::Unwind(target) => Ok(CallResult::Unwind(target)),
        }
    }

    fn call_addr_value(
        &self,
        addr: usize,
        args: &[RtVal],
        depth: usize,
    ) -> Result<CallResult, String> {
        let Some(name) = self.session.function_name_of_addr(addr) else {
            return Err(format!("jit: indirect call target 0x{addr:x} is not a function"));
        };
        self.call_named(&name, args, depth)
    }

    fn value_of(
        &self,
        installed: &Arc<InstalledModule>,
        _module: &Arc<Module>,
        args: &[RtVal],
        frame: &Frame,
        value: &Value,
    ) -> Result<RtVal, String> {
        match value {
            Value::Local(id) => frame
                .get(*id)
                .ok_or_else(|| format!("jit: read of undefined value %t{id}")),
            Value::Arg(index) => args
                .get(*index as usize)
                .copied()
                .ok_or_else(|| format!("jit: argument index {index} out of range")),
            Value::ConstInt(ty, v) => {
                let bits = ty.int_bits().unwrap_or(64);
                Ok(RtVal::I(canon(*v, bits)))
            }
            Value::NullPtr => Ok(RtVal::I(0)),
            Value::Global(name) => {
                if let Some(cell) = self.session.resolve_global(installed, name) {
                    return Ok(RtVal::I(cell.addr as i64));
                }
                if let Some(addr) = self.session.address_of_symbol(name) {
                    return Ok(RtVal::I(addr as i64));
                }
                Err(format!("jit: symbol not found: {name}"))
            }
        }
    }

    // -- runtime dispatch ----------------------------------------------------

    fn dispatch_runtime(&self, name: &str, args: &[i64]) -> Result<CallResult, String> {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);

        let value = match name {
            "hc_runtime_abi_version" => Some(runtime::hc_runtime_abi_version()),
            "hc_print_str" => {
                runtime::hc_print_str(arg(0) as usize);
                None
            }
            "hc_put_char" => {
                runtime::hc_put_char(arg(0));
                None
            }
            "hc_print_fmt" => {
                runtime::hc_print_fmt(arg(0) as usize, arg(1) as usize, arg(2));
                None
            }
            "hc_try_push" => {
                runtime::hc_try_push(arg(0) as usize);
                None
            }
            "hc_try_pop" => {
                runtime::hc_try_pop(arg(0) as usize);
                None
            }
            "hc_throw_i64" => {
                return match runtime::hc_throw_begin(arg(0)) {
                    Some(frame_addr) => Ok(CallResult::Unwind(frame_addr)),
                    None => Err(format!(
                        "fatal runtime error: uncaught HolyC exception payload={}",
                        arg(0)
                    )),
                };
            }
            "hc_exception_payload" => Some(runtime::hc_exception_payload()),
            "hc_exception_active" => Some(runtime::hc_exception_active()),
            "hc_try_depth" => Some(runtime::hc_try_depth()),
            "hc_register_reflection_table" => {
                runtime::hc_register_reflection_table(arg(0) as usize, arg(1));
                None
            }
            "hc_reflection_field_count" => Some(runtime::hc_reflection_field_count()),
            "hc_reflection_fields" => Some(runtime::hc_reflection_fields() as i64),
            "hc_malloc" => Some(runtime::hc_malloc(arg(0)) as i64),
            "hc_free" => {
                runtime::hc_free(arg(0) as usize);
                None
            }
            "hc_memcpy" => Some(runtime::hc_memcpy(arg(0) as usize, arg(1) as usize, arg(2)) as i64),
            "hc_memset" => Some(runtime::hc_memset(arg(0) as usize, arg(1), arg(2)) as i64),
            "CallStkGrow" => {
                let fn_addr = arg(2) as usize;
                if fn_addr == 0 {
                    Some(0)
                } else {
                    Some(self.call_by_address(fn_addr, &[arg(3), arg(4), arg(5)], 0)?)
                }
            }
            "Spawn" => Some(self.spawn_task(arg(0) as usize, arg(1))),
            "JobQue" => Some(self.job_que(arg(0) as usize, arg(1))),
            "JobResGet" => Some(job_res_get(arg(0) as usize)),
            "HashFind" => Some(runtime::hash_find(arg(0) as usize, arg(1) as usize, arg(2)) as i64),
            "MemberMetaData" => Some(runtime::member_meta_data(arg(0) as usize, arg(1) as usize)),
            "MemberMetaFind" => Some(runtime::member_meta_find(arg(0) as usize, arg(1) as usize)),
            "hc_task_spawn" => Some(self.task_spawn_command(arg(0) as usize)),
            "hc_spawn_wait_all" => {
                runtime::hc_spawn_wait_all();
                None
            }
            other => return Err(format!("jit: symbol not found: {other}")),
        };
        Ok(CallResult::Value(value.map(RtVal::I)))
    }

    /// `Spawn(fn, data, …)`: a detached task executing `fn(data)`.
    fn spawn_task(&self, fn_addr: usize, data: i64) -> i64 {
        if fn_addr == 0 {
            return 0;
        }
        runtime::mark_spawn_start();
        let session = self.session.clone();
        std::thread::spawn(move || {
            if let Err(message) = call_address(&session, fn_addr, &[data]) {
                eprintln!("warning: spawned task failed: {message}");
            }
            runtime::mark_spawn_done();
        });
        NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// `JobQue(fn, arg, …)`: a joinable worker; `JobResGet` joins it.
    fn job_que(&self, fn_addr: usize, arg: i64) -> i64 {
        if fn_addr == 0 {
            return 0;
        }
        let session = self.session.clone();
        let handle = std::thread::spawn(move || {
            if let Err(message) = call_address(&session, fn_addr, &[arg]) {
                eprintln!("warning: queued job failed: {message}");
            }
            0i64
        });
        Box::into_raw(Box::new(JobHandle { handle: Some(handle) })) as i64
    }

    /// `hc_task_spawn(cmd)`: run a shell command on a detached task.
    fn task_spawn_command(&self, command_addr: usize) -> i64 {
        let command = unsafe { runtime::read_cstr(command_addr) };
        if command.is_empty() {
            return -1;
        }
        runtime::mark_spawn_start();
        std::thread::spawn(move || {
            let status = std::process::Command::new("sh").arg("-c").arg(&command).status();
            if status.is_err() {
                eprintln!("warning: Spawn command launch failed: {command}");
            }
            runtime::mark_spawn_done();
        });
        NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
    }
}

struct JobHandle {
    handle: Option<std::thread::JoinHandle<i64>>,
}

fn job_res_get(job_addr: usize) -> i64 {
    if job_addr == 0 {
        return 0;
    }
    let mut job = unsafe { Box::from_raw(job_addr as *mut JobHandle) };
    match job.handle.take() {
        Some(handle) => handle.join().unwrap_or(0),
        None => 0,
    }
}

enum InstFlow {
    Next,
    Unwind(usize),
}

struct Frame {
    values: Vec<Option<RtVal>>,
    allocas: Vec<Box<[u64]>>,
    /// `(frame_addr, block, inst, result_id)` per executed `_setjmp`.
    setjmp_points: Vec<(usize, usize, usize, u32)>,
}

impl Frame {
    fn set(&mut self, id: u32, value: RtVal) {
        let index = id as usize;
        if index >= self.values.len() {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some(value);
    }

    fn get(&self, id: u32) -> Option<RtVal> {
        self.values.get(id as usize).copied().flatten()
    }

    fn register_setjmp(&mut self, frame_addr: usize, block: usize, inst: usize, result_id: u32) {
        if let Some(entry) = self.setjmp_points.iter_mut().find(|(addr, ..)| *addr == frame_addr) {
            *entry = (frame_addr, block, inst, result_id);
        } else {
            self.setjmp_points.push((frame_addr, block, inst, result_id));
        }
    }

    fn resume_point(&self, frame_addr: usize) -> Option<(usize, usize, u32)> {
        self.setjmp_points
            .iter()
            .find(|(addr, ..)| *addr == frame_addr)
            .map(|(_, block, inst, id)| (*block, *inst, *id))
    }
}

fn frame_slot_count(func: &Function) -> usize {
    let mut max_id = 0u32;
    for block in &func.blocks {
        for inst in &block.insts {
            if let Some(id) = inst.id {
                max_id = max_id.max(id + 1);
            }
        }
    }
    max_id as usize
}

/// Canonical form: sign-extended to 64 bits for the width, except i1 which
/// stays 0/1.
fn canon(value: i64, bits: u32) -> i64 {
    match bits {
        1 => value & 1,
        64 => value,
        bits => {
            let shift = 64 - bits;
            (value << shift) >> shift
        }
    }
}

fn mask_to(value: i64, bits: u32) -> u64 {
    if bits >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    }
}

fn exec_bin(op: BinOp, bits: u32, a: i64, b: i64) -> Result<i64, String> {
    let value = match op {
        BinOp::Add => canon((mask_to(a, bits).wrapping_add(mask_to(b, bits))) as i64, bits),
        BinOp::Sub => canon((mask_to(a, bits).wrapping_sub(mask_to(b, bits))) as i64, bits),
        BinOp::Mul => canon((mask_to(a, bits).wrapping_mul(mask_to(b, bits))) as i64, bits),
        BinOp::SDiv => {
            if b == 0 {
                return Err("jit: integer division by zero".to_string());
            }
            canon(a.wrapping_div(b), bits)
        }
        BinOp::SRem => {
            if b == 0 {
                return Err("jit: integer remainder by zero".to_string());
            }
            canon(a.wrapping_rem(b), bits)
        }
        BinOp::And => canon((mask_to(a, bits) & mask_to(b, bits)) as i64, bits),
        BinOp::Or => canon((mask_to(a, bits) | mask_to(b, bits)) as i64, bits),
        BinOp::Xor => canon((mask_to(a, bits) ^ mask_to(b, bits)) as i64, bits),
        BinOp::Shl => {
            let amount = shift_amount(b, bits);
            canon((mask_to(a, bits) << amount) as i64, bits)
        }
        BinOp::LShr => {
            let amount = shift_amount(b, bits);
            canon((mask_to(a, bits) >> amount) as i64, bits)
        }
        BinOp::AShr => {
            let amount = shift_amount(b, bits);
            canon(a >> amount, bits)
        }
    };
    Ok(value)
}

fn shift_amount(amount: i64, bits: u32) -> u32 {
    let max = bits.max(1);
    ((amount as u64) % u64::from(max)) as u32
}

fn exec_cast(op: CastOp, from: &Type, to: &Type, value: RtVal) -> RtVal {
    match op {
        // i1 is held as 0/1, so sign extension must widen explicitly; wider
        // integers are already canonically sign-extended.
        CastOp::SExt if matches!(from, Type::I1) => {
            RtVal::I(if value.as_i64() != 0 { -1 } else { 0 })
        }
        CastOp::SExt => RtVal::I(value.as_i64()),
        CastOp::ZExt => {
            let from_bits = from.int_bits().unwrap_or(64);
            let widened = mask_to(value.as_i64(), from_bits) as i64;
            RtVal::I(canon(widened, to.int_bits().unwrap_or(64)))
        }
        CastOp::Trunc => RtVal::I(canon(value.as_i64(), to.int_bits().unwrap_or(64))),
        CastOp::PtrToInt => RtVal::I(canon(value.as_i64(), to.int_bits().unwrap_or(64))),
        CastOp::IntToPtr => RtVal::I(value.as_i64()),
        CastOp::Bitcast => match (from, to) {
            (Type::F64, _) => match value {
                RtVal::F(f) => RtVal::I(f.to_bits() as i64),
                RtVal::I(v) => RtVal::I(v),
            },
            (_, Type::F64) => RtVal::F(f64::from_bits(value.as_i64() as u64)),
            _ => value,
        },
        CastOp::SIToFP => RtVal::F(value.as_i64() as f64),
        CastOp::FPToSI => match value {
            RtVal::F(f) => RtVal::I(f as i64),
            RtVal::I(v) => RtVal::I(v),
        },
    }
}

/// Read a scalar from engine memory, sign-extending integers to canonical
/// form.
unsafe fn read_scalar(addr: usize, ty: &Type, module: &Module) -> Result<RtVal, String> {
    match ty {
        Type::I1 => Ok(RtVal::I(i64::from(unsafe { *(addr as *const u8) } != 0))),
        Type::I8 => Ok(RtVal::I(i64::from(unsafe { *(addr as *const i8) }))),
        Type::I16 => Ok(RtVal::I(i64::from(unsafe {
            std::ptr::read_unaligned(addr as *const i16)
        }))),
        Type::I32 => Ok(RtVal::I(i64::from(unsafe {
            std::ptr::read_unaligned(addr as *const i32)
        }))),
        Type::I64 => Ok(RtVal::I(unsafe { std::ptr::read_unaligned(addr as *const i64) })),
        Type::F64 => Ok(RtVal::F(f64::from_bits(unsafe {
            std::ptr::read_unaligned(addr as *const u64)
        }))),
        Type::Ptr => Ok(RtVal::I(unsafe { std::ptr::read_unaligned(addr as *const usize) } as i64)),
        other => {
            let _ = module;
            Err(format!("jit: load of non-scalar type {other}"))
        }
    }
}

unsafe fn write_scalar(addr: usize, ty: &Type, module: &Module, value: RtVal) -> Result<(), String> {
    match ty {
        Type::I1 => unsafe { *(addr as *mut u8) = (value.as_i64() & 1) as u8 },
        Type::I8 => unsafe { *(addr as *mut u8) = value.as_i64() as u8 },
        Type::I16 => unsafe {
            std::ptr::write_unaligned(addr as *mut i16, value.as_i64() as i16)
        },
        Type::I32 => unsafe {
            std::ptr::write_unaligned(addr as *mut i32, value.as_i64() as i32)
        },
        Type::I64 => unsafe { std::ptr::write_unaligned(addr as *mut i64, value.as_i64()) },
        Type::F64 => {
            let bits = match value {
                RtVal::F(f) => f.to_bits(),
                RtVal::I(v) => v as u64,
            };
            unsafe { std::ptr::write_unaligned(addr as *mut u64, bits) };
        }
        Type::Ptr => unsafe {
            std::ptr::write_unaligned(addr as *mut usize, value.as_i64() as usize)
        },
        other => {
            let _ = module;
            return Err(format!("jit: store of non-scalar type {other}"));
        }
    }
    Ok(())
}

fn exec_atomic_rmw(
    op: RmwOp,
    ty: &Type,
    module: &Module,
    addr: usize,
    operand: i64,
) -> Result<i64, String> {
    if *ty == Type::I64 && addr % 8 == 0 {
        let atomic = unsafe { AtomicI64::from_ptr(addr as *mut i64) };
        let old = match op {
            RmwOp::Xchg => atomic.swap(operand, Ordering::SeqCst),
            RmwOp::Add => atomic.fetch_add(operand, Ordering::SeqCst),
            RmwOp::Sub => atomic.fetch_sub(operand, Ordering::SeqCst),
            RmwOp::And => atomic.fetch_and(operand, Ordering::SeqCst),
            RmwOp::Or => atomic.fetch_or(operand, Ordering::SeqCst),
            RmwOp::Xor => atomic.fetch_xor(operand, Ordering::SeqCst),
        };
        return Ok(old);
    }

    // Narrow widths fall back to a plain read-modify-write.
    let old = unsafe { read_scalar(addr, ty, module) }?.as_i64();
    let bits = ty.int_bits().unwrap_or(64);
    let updated = match op {
        RmwOp::Xchg => canon(operand, bits),
        RmwOp::Add => exec_bin(BinOp::Add, bits, old, operand)?,
        RmwOp::Sub => exec_bin(BinOp::Sub, bits, old, operand)?,
        RmwOp::And => exec_bin(BinOp::And, bits, old, operand)?,
        RmwOp::Or => exec_bin(BinOp::Or, bits, old, operand)?,
        RmwOp::Xor => exec_bin(BinOp::Xor, bits, old, operand)?,
    };
    unsafe { write_scalar(addr, ty, module, RtVal::I(updated)) }?;
    Ok(old)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_rules() {
        assert_eq!(canon(0xff, 8), -1);
        assert_eq!(canon(0x7f, 8), 127);
        assert_eq!(canon(1, 1), 1);
        assert_eq!(canon(-1, 64), -1);
    }

    #[test]
    fn binary_ops_wrap_at_width() {
        assert_eq!(exec_bin(BinOp::Add, 8, 127, 1).unwrap(), -128);
        assert_eq!(exec_bin(BinOp::LShr, 8, -1, 4).unwrap(), 0x0f);
        assert_eq!(exec_bin(BinOp::AShr, 64, -8, 1).unwrap(), -4);
        assert!(exec_bin(BinOp::SDiv, 64, 1, 0).is_err());
    }

    #[test]
    fn zext_uses_source_width() {
        let value = exec_cast(CastOp::ZExt, &Type::I8, &Type::I64, RtVal::I(-1));
        assert_eq!(value, RtVal::I(0xff));
        let value = exec_cast(CastOp::Trunc, &Type::I64, &Type::I8, RtVal::I(0x1ff));
        assert_eq!(value, RtVal::I(-1));
    }

    #[test]
    fn float_bit_casts_round_trip() {
        let bits = exec_cast(CastOp::Bitcast, &Type::F64, &Type::I64, RtVal::F(2.5));
        let back = exec_cast(CastOp::Bitcast, &Type::I64, &Type::F64, bits);
        assert_eq!(back, RtVal::F(2.5));
    }
}

//! Function-body builder with an insertion point.
//!
//! Mirrors the IRBuilder discipline: blocks are created up front and the
//! builder appends instructions at the current position; entry-block allocas
//! are inserted at the top of the first block so every local has a stable
//! slot regardless of control flow.

use super::module::{Block, Callee, Function, Inst, Op, Param, Term, Value};
use super::types::{BinOp, CastOp, ICmpPred, RmwOp, Type};
use std::collections::HashMap;

pub struct FunctionBuilder {
    func: Function,
    current: usize,
    next_id: u32,
    label_counts: HashMap<String, u32>,
}

impl FunctionBuilder {
    /// Start building a function with an `entry` block selected.
    pub fn new(mut func: Function) -> FunctionBuilder {
        func.blocks.clear();
        func.blocks.push(Block::new("entry"));
        let mut label_counts = HashMap::new();
        label_counts.insert("entry".to_string(), 1);
        FunctionBuilder { func, current: 0, next_id: 0, label_counts }
    }

    pub fn finish(self) -> Function {
        self.func
    }

    pub fn param_count(&self) -> usize {
        self.func.params.len()
    }

    pub fn param(&self, index: usize) -> &Param {
        &self.func.params[index]
    }

    pub fn return_type(&self) -> &Type {
        &self.func.ret
    }

    /// Create a new block with a unique label derived from `name`.
    pub fn create_block(&mut self, name: &str) -> String {
        let count = self.label_counts.entry(name.to_string()).or_insert(0);
        let label = if *count == 0 { name.to_string() } else { format!("{name}{count}") };
        *count += 1;
        self.func.blocks.push(Block::new(label.clone()));
        label
    }

    pub fn position_at_end(&mut self, label: &str) {
        self.current = self
            .func
            .block_index(label)
            .unwrap_or_else(|| panic!("builder positioned at unknown block {label}"));
    }

    pub fn current_block(&self) -> &str {
        &self.func.blocks[self.current].label
    }

    pub fn is_terminated(&self) -> bool {
        self.func.blocks[self.current].is_terminated()
    }

    fn push(&mut self, op: Op, produces: bool) -> Option<Value> {
        let id = if produces {
            let id = self.next_id;
            self.next_id += 1;
            Some(id)
        } else {
            None
        };
        self.func.blocks[self.current].insts.push(Inst { id, op });
        id.map(Value::Local)
    }

    /// Allocate a stack slot in the entry block.
    pub fn entry_alloca(&mut self, ty: Type) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.func.blocks[0].insts.insert(0, Inst { id: Some(id), op: Op::Alloca { ty } });
        Value::Local(id)
    }

    /// Allocate at the current position (print argument packs).
    pub fn alloca(&mut self, ty: Type) -> Value {
        self.push(Op::Alloca { ty }, true).expect("alloca produces a value")
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Value {
        self.push(Op::Load { ty, ptr }, true).expect("load produces a value")
    }

    pub fn store(&mut self, ty: Type, val: Value, ptr: Value) {
        self.push(Op::Store { ty, val, ptr }, false);
    }

    pub fn bin(&mut self, op: BinOp, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push(Op::Bin { op, ty, lhs, rhs }, true).expect("bin produces a value")
    }

    pub fn icmp(&mut self, pred: ICmpPred, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push(Op::ICmp { pred, ty, lhs, rhs }, true).expect("icmp produces a value")
    }

    pub fn cast(&mut self, op: CastOp, from: Type, to: Type, val: Value) -> Value {
        self.push(Op::Cast { op, from, to, val }, true).expect("cast produces a value")
    }

    pub fn gep(
        &mut self,
        elem: Type,
        base: Value,
        indices: Vec<(Type, Value)>,
        inbounds: bool,
    ) -> Value {
        self.push(Op::Gep { elem, base, indices, inbounds }, true).expect("gep produces a value")
    }

    pub fn call(&mut self, callee: Callee, ret: Type, args: Vec<(Type, Value)>) -> Option<Value> {
        let produces = ret.is_first_class();
        self.push(Op::Call { callee, ret, args }, produces)
    }

    pub fn atomic_rmw(&mut self, op: RmwOp, ty: Type, ptr: Value, val: Value) -> Value {
        self.push(Op::AtomicRmw { op, ty, ptr, val }, true).expect("atomicrmw produces a value")
    }

    fn terminate(&mut self, term: Term) {
        let block = &mut self.func.blocks[self.current];
        if block.term.is_none() {
            block.term = Some(term);
        }
    }

    pub fn ret(&mut self, value: Option<(Type, Value)>) {
        self.terminate(Term::Ret(value));
    }

    pub fn br(&mut self, label: &str) {
        self.terminate(Term::Br(label.to_string()));
    }

    pub fn cond_br(&mut self, cond: Value, then_label: &str, else_label: &str) {
        self.terminate(Term::CondBr {
            cond,
            then_label: then_label.to_string(),
            else_label: else_label.to_string(),
        });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Term::Unreachable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrLinkage;

    #[test]
    fn blocks_get_unique_labels() {
        let func = Function {
            name: "f".into(),
            ret: Type::Void,
            params: Vec::new(),
            linkage: IrLinkage::External,
            blocks: Vec::new(),
        };
        let mut builder = FunctionBuilder::new(func);
        let a = builder.create_block("if.then");
        let b = builder.create_block("if.then");
        assert_eq!(a, "if.then");
        assert_eq!(b, "if.then1");
    }

    #[test]
    fn entry_allocas_sit_at_block_start() {
        let func = Function {
            name: "f".into(),
            ret: Type::I64,
            params: Vec::new(),
            linkage: IrLinkage::External,
            blocks: Vec::new(),
        };
        let mut builder = FunctionBuilder::new(func);
        let v = builder.bin(BinOp::Add, Type::I64, Value::i64_const(1), Value::i64_const(2));
        let slot = builder.entry_alloca(Type::I64);
        builder.store(Type::I64, v, slot.clone());
        builder.ret(Some((Type::I64, Value::i64_const(0))));

        let func = builder.finish();
        assert!(matches!(func.blocks[0].insts[0].op, Op::Alloca { .. }));
        assert!(func.blocks[0].is_terminated());
    }

    #[test]
    fn first_terminator_wins() {
        let func = Function {
            name: "f".into(),
            ret: Type::Void,
            params: Vec::new(),
            linkage: IrLinkage::External,
            blocks: Vec::new(),
        };
        let mut builder = FunctionBuilder::new(func);
        builder.ret(None);
        builder.unreachable();
        let func = builder.finish();
        assert_eq!(func.blocks[0].term, Some(Term::Ret(None)));
    }
}

//! Data flow graph: instructions, values and EBB parameters
//!
//! Value and EBB numbers double as table indexes. The parser defines values at
//! the numbers written in the source, so the tables may contain unused
//! numbers; passes create fresh values above the largest number in use.

use crate::ir::entities::{Ebb, FuncRef, Inst, SigRef, Value};
use crate::ir::extfunc::{ExtFuncData, Signature};
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;
use std::ops::{Index, IndexMut};

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Result number `n` of an instruction.
    Result(Inst, usize),
    /// Parameter number `n` of an EBB.
    Param(Ebb, usize),
    /// Created but currently not attached anywhere.
    Detached,
}

#[derive(Debug, Clone)]
struct ValueData {
    ty: Type,
    def: ValueDef,
}

#[derive(Debug, Clone, Default)]
struct EbbData {
    params: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    insts: Vec<InstructionData>,
    results: Vec<Vec<Value>>,
    values: Vec<Option<ValueData>>,
    ebbs: Vec<EbbData>,
    /// Signatures declared in the preamble, `sig0` first.
    pub signatures: Vec<Signature>,
    /// External functions declared in the preamble, `fn0` first.
    pub ext_funcs: Vec<ExtFuncData>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // Instructions.

    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = Inst::new(self.insts.len());
        self.insts.push(data);
        self.results.push(Vec::new());
        inst
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.results[inst.index()]
    }

    pub fn first_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst.index()].first().copied()
    }

    /// Create results for `inst` from the typing rules of its opcode.
    pub fn make_inst_results(&mut self, inst: Inst, ctrl: Option<Type>) -> Result<&[Value], String> {
        let types = self.result_types(&self.insts[inst.index()], ctrl)?;
        for ty in types {
            self.append_result(inst, ty);
        }
        Ok(self.inst_results(inst))
    }

    /// Append a fresh result value to `inst`.
    pub fn append_result(&mut self, inst: Inst, ty: Type) -> Value {
        let value = self.make_value(ty);
        self.attach_result(inst, value);
        value
    }

    /// Append an existing detached value to the results of `inst`.
    pub fn attach_result(&mut self, inst: Inst, value: Value) {
        let num = self.results[inst.index()].len();
        self.results[inst.index()].push(value);
        self.value_data_mut(value).def = ValueDef::Result(inst, num);
    }

    /// Define `value` with an explicit number as the next result of `inst`.
    pub fn define_result(&mut self, inst: Inst, value: Value, ty: Type) -> Result<(), String> {
        self.reserve_value(value, ty)?;
        self.attach_result(inst, value);
        Ok(())
    }

    /// Remove all results from `inst`, leaving them detached.
    pub fn detach_results(&mut self, inst: Inst) -> Vec<Value> {
        let results = std::mem::take(&mut self.results[inst.index()]);
        for &v in &results {
            self.value_data_mut(v).def = ValueDef::Detached;
        }
        results
    }

    /// Replace the result `old` by a fresh value of the same type in the
    /// defining instruction. `old` is left detached and can be attached to
    /// another instruction.
    pub fn replace_result(&mut self, old: Value) -> Option<Value> {
        let (inst, num) = match self.value_def(old) {
            ValueDef::Result(inst, num) => (inst, num),
            _ => return None,
        };
        let new = self.make_value(self.value_type(old));
        self.results[inst.index()][num] = new;
        self.value_data_mut(new).def = ValueDef::Result(inst, num);
        self.value_data_mut(old).def = ValueDef::Detached;
        Some(new)
    }

    /// The controlling type of an instruction: its first result type, or the
    /// type of its first operand.
    pub fn ctrl_type(&self, inst: Inst) -> Option<Type> {
        if let Some(v) = self.first_result(inst) {
            return Some(self.value_type(v));
        }
        self.insts[inst.index()]
            .arguments()
            .first()
            .and_then(|&v| self.try_value_type(v))
    }

    /// Signature used by a call instruction.
    pub fn call_signature(&self, inst: Inst) -> Option<SigRef> {
        match self.insts[inst.index()] {
            InstructionData::Call { func_ref, .. } => self.ext_func(func_ref).map(|f| f.signature),
            InstructionData::CallIndirect { sig_ref, .. } => Some(sig_ref),
            _ => None,
        }
    }

    pub fn ext_func(&self, func_ref: FuncRef) -> Option<&ExtFuncData> {
        self.ext_funcs.get(func_ref.index())
    }

    pub fn signature(&self, sig_ref: SigRef) -> Option<&Signature> {
        self.signatures.get(sig_ref.index())
    }

    /// Result types of an instruction with the given operands.
    pub fn result_types(&self, data: &InstructionData, ctrl: Option<Type>) -> Result<Vec<Type>, String> {
        let opcode = data.opcode();
        let arg_type = |v: Value| {
            self.try_value_type(v)
                .ok_or_else(|| format!("type of {} is not known", v))
        };
        let need_ctrl = || ctrl.ok_or_else(|| format!("`{}` needs an explicit result type", opcode));
        let types = match data {
            InstructionData::NullAry { .. }
            | InstructionData::Jump { .. }
            | InstructionData::Branch { .. }
            | InstructionData::BranchIcmp { .. }
            | InstructionData::MultiAry { .. } => Vec::new(),
            InstructionData::UnaryImm { .. } => vec![need_ctrl()?],
            InstructionData::UnaryIeee32 { .. } => vec![Type::F32],
            InstructionData::UnaryIeee64 { .. } => vec![Type::F64],
            InstructionData::UnaryBool { .. } => vec![ctrl.unwrap_or(Type::B1)],
            InstructionData::Unary { arg, .. } => {
                if opcode.requires_typevar() {
                    vec![need_ctrl()?]
                } else {
                    vec![arg_type(*arg)?]
                }
            }
            InstructionData::Binary { args, .. } => {
                let ty = arg_type(args[0])?;
                match opcode {
                    Opcode::IaddCout | Opcode::IsubBout => vec![ty, Type::B1],
                    _ => vec![ty],
                }
            }
            InstructionData::BinaryImm { arg, .. } => vec![arg_type(*arg)?],
            InstructionData::Ternary { args, .. } => match opcode {
                Opcode::Select => vec![arg_type(args[1])?],
                Opcode::IaddCarry | Opcode::IsubBorrow => vec![arg_type(args[0])?, Type::B1],
                _ => vec![arg_type(args[0])?],
            },
            InstructionData::IntCompare { .. } | InstructionData::IntCompareImm { .. } => vec![Type::B1],
            InstructionData::Call { func_ref, .. } => {
                let sig = self
                    .ext_func(*func_ref)
                    .and_then(|f| self.signature(f.signature))
                    .ok_or_else(|| format!("undeclared function {}", func_ref))?;
                sig.returns.iter().map(|r| r.value_type).collect()
            }
            InstructionData::CallIndirect { sig_ref, .. } => {
                let sig = self
                    .signature(*sig_ref)
                    .ok_or_else(|| format!("undeclared signature {}", sig_ref))?;
                sig.returns.iter().map(|r| r.value_type).collect()
            }
        };
        Ok(types)
    }

    // Values.

    fn make_value(&mut self, ty: Type) -> Value {
        let value = Value::new(self.values.len());
        self.values.push(Some(ValueData {
            ty,
            def: ValueDef::Detached,
        }));
        value
    }

    fn reserve_value(&mut self, value: Value, ty: Type) -> Result<(), String> {
        if value.index() >= self.values.len() {
            self.values.resize(value.index() + 1, None);
        }
        if self.values[value.index()].is_some() {
            return Err(format!("duplicate definition of {}", value));
        }
        self.values[value.index()] = Some(ValueData {
            ty,
            def: ValueDef::Detached,
        });
        Ok(())
    }

    fn value_data_mut(&mut self, value: Value) -> &mut ValueData {
        self.values[value.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("{} is not defined", value))
    }

    /// One past the largest value number in use.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn value_is_valid(&self, value: Value) -> bool {
        matches!(self.values.get(value.index()), Some(Some(_)))
    }

    pub fn value_is_attached(&self, value: Value) -> bool {
        self.value_is_valid(value) && self.value_def(value) != ValueDef::Detached
    }

    pub fn try_value_type(&self, value: Value) -> Option<Type> {
        self.values
            .get(value.index())
            .and_then(|d| d.as_ref())
            .map(|d| d.ty)
    }

    pub fn value_type(&self, value: Value) -> Type {
        match self.try_value_type(value) {
            Some(ty) => ty,
            None => panic!("{} is not defined", value),
        }
    }

    pub fn value_def(&self, value: Value) -> ValueDef {
        match self.values.get(value.index()) {
            Some(Some(data)) => data.def,
            _ => ValueDef::Detached,
        }
    }

    // EBBs.

    pub fn make_ebb(&mut self) -> Ebb {
        let ebb = Ebb::new(self.ebbs.len());
        self.ebbs.push(EbbData::default());
        ebb
    }

    /// Make sure `ebb` has a table entry. Used for EBB numbers from the text.
    pub fn ensure_ebb(&mut self, ebb: Ebb) {
        if ebb.index() >= self.ebbs.len() {
            self.ebbs.resize(ebb.index() + 1, EbbData::default());
        }
    }

    pub fn num_ebbs(&self) -> usize {
        self.ebbs.len()
    }

    pub fn ebb_params(&self, ebb: Ebb) -> &[Value] {
        &self.ebbs[ebb.index()].params
    }

    pub fn append_ebb_param(&mut self, ebb: Ebb, ty: Type) -> Value {
        let value = self.make_value(ty);
        self.attach_ebb_param(ebb, value);
        value
    }

    /// Define `value` with an explicit number as the next parameter of `ebb`.
    pub fn define_ebb_param(&mut self, ebb: Ebb, value: Value, ty: Type) -> Result<(), String> {
        self.reserve_value(value, ty)?;
        self.attach_ebb_param(ebb, value);
        Ok(())
    }

    /// Append a detached value to the parameters of `ebb`.
    pub fn attach_ebb_param(&mut self, ebb: Ebb, value: Value) {
        let num = self.ebbs[ebb.index()].params.len();
        self.ebbs[ebb.index()].params.push(value);
        self.value_data_mut(value).def = ValueDef::Param(ebb, num);
    }
}

impl Index<Inst> for DataFlowGraph {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst.index()]
    }
}

impl IndexMut<Inst> for DataFlowGraph {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::immediates::Imm64;

    #[test]
    fn results_follow_typing_rules() {
        let mut dfg = DataFlowGraph::new();
        let ebb = dfg.make_ebb();
        let a = dfg.append_ebb_param(ebb, Type::I32);
        let b = dfg.append_ebb_param(ebb, Type::I32);
        let inst = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::IaddCout,
            args: [a, b],
        });
        let results = dfg.make_inst_results(inst, None).unwrap().to_vec();
        assert_eq!(results.len(), 2);
        assert_eq!(dfg.value_type(results[0]), Type::I32);
        assert_eq!(dfg.value_type(results[1]), Type::B1);
        assert_eq!(dfg.value_def(results[1]), ValueDef::Result(inst, 1));
    }

    #[test]
    fn iconst_needs_a_type() {
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(1),
        });
        assert!(dfg.make_inst_results(inst, None).is_err());
        assert!(dfg.make_inst_results(inst, Some(Type::I64)).is_ok());
    }

    #[test]
    fn explicit_numbers_leave_gaps_and_reject_duplicates() {
        let mut dfg = DataFlowGraph::new();
        let ebb = Ebb::new(2);
        dfg.ensure_ebb(ebb);
        dfg.define_ebb_param(ebb, Value::new(5), Type::I32).unwrap();
        assert!(!dfg.value_is_valid(Value::new(4)));
        assert_eq!(dfg.num_values(), 6);
        assert!(dfg.define_ebb_param(ebb, Value::new(5), Type::I32).is_err());
        let fresh = dfg.append_ebb_param(ebb, Type::I64);
        assert_eq!(fresh, Value::new(6));
    }

    #[test]
    fn replace_result_detaches_the_old_value() {
        let mut dfg = DataFlowGraph::new();
        let ebb = dfg.make_ebb();
        let a = dfg.append_ebb_param(ebb, Type::I32);
        let inst = dfg.make_inst(InstructionData::Unary {
            opcode: Opcode::Bnot,
            arg: a,
        });
        let old = dfg.append_result(inst, Type::I32);
        let new = dfg.replace_result(old).unwrap();
        assert_eq!(dfg.inst_results(inst), &[new]);
        assert_eq!(dfg.value_def(old), ValueDef::Detached);
    }
}

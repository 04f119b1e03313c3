//! Inserting new instructions into a function

use crate::ir::condcodes::IntCC;
use crate::ir::entities::{Ebb, Inst, Value};
use crate::ir::function::Function;
use crate::ir::immediates::Imm64;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::Type;

#[derive(Debug, Clone, Copy)]
enum InsertPos {
    Before(Inst),
    After(Inst),
    AtEnd(Ebb),
}

/// Builds instructions at a fixed position. Instructions inserted "after" an
/// instruction stay in program order: each new one goes after the previous.
pub struct InsertBuilder<'f> {
    func: &'f mut Function,
    pos: InsertPos,
}

impl<'f> InsertBuilder<'f> {
    pub fn before(func: &'f mut Function, inst: Inst) -> Self {
        Self {
            func,
            pos: InsertPos::Before(inst),
        }
    }

    pub fn after(func: &'f mut Function, inst: Inst) -> Self {
        Self {
            func,
            pos: InsertPos::After(inst),
        }
    }

    pub fn at_end(func: &'f mut Function, ebb: Ebb) -> Self {
        Self {
            func,
            pos: InsertPos::AtEnd(ebb),
        }
    }

    /// Insert an instruction and create its results.
    pub fn build(&mut self, data: InstructionData, ctrl: Option<Type>) -> Inst {
        let inst = self.func.dfg.make_inst(data);
        let types = self
            .func
            .dfg
            .result_types(&self.func.dfg[inst], ctrl)
            .unwrap_or_else(|e| panic!("building {}: {}", self.func.dfg[inst].opcode(), e));
        for ty in types {
            self.func.dfg.append_result(inst, ty);
        }
        self.place(inst);
        inst
    }

    /// Insert an instruction whose results are attached by the caller.
    pub fn build_without_results(&mut self, data: InstructionData) -> Inst {
        let inst = self.func.dfg.make_inst(data);
        self.place(inst);
        inst
    }

    fn place(&mut self, inst: Inst) {
        match self.pos {
            InsertPos::Before(before) => self.func.layout.insert_inst_before(inst, before),
            InsertPos::After(after) => {
                self.func.layout.insert_inst_after(inst, after);
                self.pos = InsertPos::After(inst);
            }
            InsertPos::AtEnd(ebb) => self.func.layout.append_inst(inst, ebb),
        }
    }

    fn first(&self, inst: Inst) -> Value {
        self.func.dfg.inst_results(inst)[0]
    }

    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        let inst = self.build(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: Imm64::new(imm),
            },
            Some(ty),
        );
        self.first(inst)
    }

    pub fn unary(&mut self, opcode: Opcode, arg: Value) -> Value {
        let inst = self.build(InstructionData::Unary { opcode, arg }, None);
        self.first(inst)
    }

    /// `bint`, `uextend` and friends, which need the result type spelled out.
    pub fn unary_typed(&mut self, opcode: Opcode, ty: Type, arg: Value) -> Value {
        let inst = self.build(InstructionData::Unary { opcode, arg }, Some(ty));
        self.first(inst)
    }

    pub fn binary(&mut self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        let inst = self.build(
            InstructionData::Binary {
                opcode,
                args: [lhs, rhs],
            },
            None,
        );
        self.first(inst)
    }

    pub fn binary_imm(&mut self, opcode: Opcode, arg: Value, imm: i64) -> Value {
        let inst = self.build(
            InstructionData::BinaryImm {
                opcode,
                arg,
                imm: Imm64::new(imm),
            },
            None,
        );
        self.first(inst)
    }

    pub fn icmp(&mut self, cond: IntCC, lhs: Value, rhs: Value) -> Value {
        let inst = self.build(
            InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                cond,
                args: [lhs, rhs],
            },
            None,
        );
        self.first(inst)
    }

    pub fn jump(&mut self, destination: Ebb, args: Vec<Value>) -> Inst {
        self.build(
            InstructionData::Jump {
                opcode: Opcode::Jump,
                destination,
                args,
            },
            None,
        )
    }
}
